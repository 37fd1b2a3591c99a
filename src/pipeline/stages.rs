use anyhow::Result;
use chrono::Local;
use tracing::info;

use super::{Stage, StageReport};
use crate::database::Warehouse;
use crate::enricher::DetectionEnricher;
use crate::lake::DataLake;
use crate::loader::RawLoader;
use crate::ml::engine::{ensure_weights, YoloDetector};
use crate::scraper::Scraper;
use crate::source::gateway::GatewaySource;
use crate::utils::config::Config;

pub struct ScrapeStage<'a> {
    config: &'a Config,
    limit: Option<usize>,
}

impl<'a> ScrapeStage<'a> {
    pub fn new(config: &'a Config, limit: Option<usize>) -> Self {
        Self { config, limit }
    }
}

impl Stage for ScrapeStage<'_> {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn run(&mut self) -> Result<StageReport> {
        // Checked before any channel is touched.
        let credentials = self.config.credentials()?;
        let source = GatewaySource::connect(
            &self.config.gateway_url,
            &credentials,
            &self.config.session_name,
            self.config.page_size,
        )?;

        let lake = DataLake::new(&self.config.messages_root, &self.config.images_root);
        let today = Local::now().date_naive();
        let report = Scraper::new(&source, &lake).run(&self.config.channels, today, self.limit);
        Ok(StageReport::Scrape(report))
    }
}

pub struct LoadStage<'a> {
    config: &'a Config,
}

impl<'a> LoadStage<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl Stage for LoadStage<'_> {
    fn name(&self) -> &'static str {
        "load"
    }

    fn run(&mut self) -> Result<StageReport> {
        let mut warehouse = Warehouse::open(&self.config.database_path)?;
        let report = RawLoader::new(&mut warehouse, &self.config.messages_root).run()?;
        info!("Staging table holds {} messages", warehouse.raw_message_count()?);
        Ok(StageReport::Load(report))
    }
}

pub struct EnrichStage<'a> {
    config: &'a Config,
}

impl<'a> EnrichStage<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl Stage for EnrichStage<'_> {
    fn name(&self) -> &'static str {
        "detect"
    }

    fn run(&mut self) -> Result<StageReport> {
        let mut warehouse = Warehouse::open(&self.config.database_path)?;

        ensure_weights(&self.config.model_path, self.config.model_url.as_deref())?;
        let detector = YoloDetector::load(&self.config.model_path, self.config.detection_confidence)?;

        let report = DetectionEnricher::new(&detector, &mut warehouse, &self.config.images_root).run()?;
        info!("Detection table holds {} rows", warehouse.detection_count()?);
        Ok(StageReport::Enrich(report))
    }
}
