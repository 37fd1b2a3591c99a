//! Fail-fast stage sequencing. Each stage only starts once the previous one
//! has returned successfully, since it reads what the previous stage wrote.

pub mod stages;
pub mod transform;

use std::fmt;

use thiserror::Error;
use tracing::{error, info, info_span};

use crate::enricher::EnrichReport;
use crate::loader::LoadReport;
use crate::scraper::ScrapeReport;
pub use stages::{EnrichStage, LoadStage, ScrapeStage};
pub use transform::{TransformReport, TransformStage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageReport {
    Scrape(ScrapeReport),
    Load(LoadReport),
    Enrich(EnrichReport),
    Transform(TransformReport),
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageReport::Scrape(r) => write!(
                f,
                "scrape: {} messages, {} media from {} channels ({} failed)",
                r.messages_written, r.media_downloaded, r.channels_attempted, r.channels_failed
            ),
            StageReport::Load(r) => write!(
                f,
                "load: {} new, {} duplicates, {} invalid, {} failed",
                r.loaded, r.duplicates, r.invalid, r.failed
            ),
            StageReport::Enrich(r) => write!(
                f,
                "detect: {} images processed, {} skipped, {} failed, {} detections",
                r.processed, r.already_processed, r.failed, r.detections_inserted
            ),
            StageReport::Transform(r) => write!(f, "transform: {} commands", r.commands_run),
        }
    }
}

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&mut self) -> anyhow::Result<StageReport>;
}

#[derive(Error, Debug)]
#[error("stage '{stage}' failed: {source:#}")]
pub struct PipelineError {
    pub stage: &'static str,
    /// Reports of the stages that finished before the failure.
    pub completed: Vec<StageReport>,
    pub source: anyhow::Error,
}

#[derive(Default)]
pub struct Pipeline<'a> {
    stages: Vec<Box<dyn Stage + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn then(mut self, stage: impl Stage + 'a) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn run(&mut self) -> Result<Vec<StageReport>, PipelineError> {
        let mut completed = Vec::with_capacity(self.stages.len());

        for stage in &mut self.stages {
            let name = stage.name();
            let _span = info_span!("stage", name).entered();
            info!("Starting stage {}", name);

            match stage.run() {
                Ok(report) => {
                    info!("Stage {} completed ({})", name, report);
                    completed.push(report);
                }
                Err(source) => {
                    error!("Stage {} failed: {:#}", name, source);
                    return Err(PipelineError {
                        stage: name,
                        completed,
                        source,
                    });
                }
            }
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    struct Recorded<'a> {
        name: &'static str,
        fail: bool,
        log: &'a RefCell<Vec<&'static str>>,
    }

    impl Stage for Recorded<'_> {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(&mut self) -> anyhow::Result<StageReport> {
            self.log.borrow_mut().push(self.name);
            if self.fail {
                return Err(anyhow!("exit status 1"));
            }
            Ok(StageReport::Load(LoadReport::default()))
        }
    }

    fn stage<'a>(name: &'static str, fail: bool, log: &'a RefCell<Vec<&'static str>>) -> Recorded<'a> {
        Recorded { name, fail, log }
    }

    #[test]
    fn test_failed_loader_stops_enricher() {
        let log = RefCell::new(Vec::new());
        let mut pipeline = Pipeline::new()
            .then(stage("scrape", false, &log))
            .then(stage("load", true, &log))
            .then(stage("detect", false, &log))
            .then(stage("transform", false, &log));

        let err = pipeline.run().unwrap_err();

        assert_eq!(err.stage, "load");
        assert_eq!(err.completed.len(), 1);
        assert_eq!(*log.borrow(), vec!["scrape", "load"]);
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn test_all_stages_run_in_order() {
        let log = RefCell::new(Vec::new());
        let mut pipeline = Pipeline::new()
            .then(stage("scrape", false, &log))
            .then(stage("load", false, &log))
            .then(stage("detect", false, &log));

        let reports = pipeline.run().unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(*log.borrow(), vec!["scrape", "load", "detect"]);
    }
}
