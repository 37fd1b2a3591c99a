//! Channel scraper loop: resolve, resume, paginate newest to oldest, persist.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::lake::cursor::resume_boundary;
use crate::lake::{DataLake, ScrapedMessage};
use crate::source::{MessageSource, SourceError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub channels_attempted: usize,
    pub channels_failed: usize,
    pub messages_written: usize,
    pub media_downloaded: usize,
    pub write_errors: usize,
    pub rate_limit_waits: usize,
}

pub struct Scraper<'a, S: MessageSource + ?Sized> {
    source: &'a S,
    lake: &'a DataLake,
    sleep: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a, S: MessageSource + ?Sized> Scraper<'a, S> {
    pub fn new(source: &'a S, lake: &'a DataLake) -> Self {
        Self {
            source,
            lake,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the rate-limit sleep.
    pub fn with_sleeper(mut self, sleep: impl FnMut(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Scrapes every channel in order. A failing channel is logged and skipped.
    pub fn run(&mut self, channel_urls: &[String], today: NaiveDate, limit: Option<usize>) -> ScrapeReport {
        let mut report = ScrapeReport::default();

        for url in channel_urls {
            report.channels_attempted += 1;
            if let Err(e) = self.scrape_channel(url, today, limit, &mut report) {
                error!("Scrape of {} aborted: {:#}", url, e);
                report.channels_failed += 1;
            }
        }

        report
    }

    fn scrape_channel(
        &mut self,
        url: &str,
        today: NaiveDate,
        limit: Option<usize>,
        report: &mut ScrapeReport,
    ) -> Result<()> {
        let source = self.source;
        let channel = source
            .resolve(url)
            .with_context(|| format!("Failed to resolve {}", url))?;
        let channel_name = channel.folder_name();

        let channel_dir = self.lake.channel_dir(today, &channel_name);
        fs::create_dir_all(&channel_dir)
            .with_context(|| format!("Failed to create {:?}", channel_dir))?;
        info!("Saving messages to {:?}", channel_dir);

        let boundary = resume_boundary(&channel_dir)?;
        match boundary {
            Some(id) => info!("Resuming scrape for {} below message ID {}", channel_name, id),
            None => info!("Starting new scrape for {} (limit: {:?})", channel_name, limit),
        }

        let mut feed = source.paginate(&channel, boundary, limit)?;
        let mut fetched = 0usize;
        let mut images = 0usize;

        while limit.map_or(true, |max| fetched < max) {
            let message = match feed.next() {
                None => break,
                Some(Ok(message)) => message,
                Some(Err(SourceError::RateLimited { wait })) => {
                    warn!("Rate limit hit for {}. Waiting for {} seconds...", channel_name, wait.as_secs());
                    report.rate_limit_waits += 1;
                    (self.sleep)(wait);
                    info!("Resuming scrape for {} after flood wait", channel_name);
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
            };
            fetched += 1;

            let media_path = self.lake.save_media(source, &channel, &message);
            if media_path.is_some() {
                images += 1;
            }

            let record = ScrapedMessage::from_source(
                &message,
                &channel,
                media_path.map(|p| p.to_string_lossy().into_owned()),
            );
            match self.lake.write_message(today, &record) {
                Ok(_) => report.messages_written += 1,
                Err(e) => {
                    error!("Error saving message {} to JSON: {:#}", message.id, e);
                    report.write_errors += 1;
                }
            }
        }

        report.media_downloaded += images;
        info!(
            channel = %channel_name,
            messages = fetched,
            images,
            "finished scraping channel"
        );
        Ok(())
    }
}
