//! Detection enricher: runs the detector over collected images and records
//! what it finds. Images whose message id already has detections are skipped,
//! which makes re-runs cheap and safe.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam::channel::bounded;
use indicatif::ProgressBar;
use tracing::{debug, error, info, warn};

use crate::database::Warehouse;
use crate::ingest::scanner;
use crate::media::mimetype;
use crate::ml::Detector;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub images_found: usize,
    pub already_processed: usize,
    pub skipped_invalid: usize,
    pub processed: usize,
    pub failed: usize,
    pub detections_inserted: usize,
}

pub struct DetectionEnricher<'a, D: Detector + ?Sized> {
    detector: &'a D,
    warehouse: &'a mut Warehouse,
    images_root: PathBuf,
}

impl<'a, D: Detector + ?Sized> DetectionEnricher<'a, D> {
    pub fn new(detector: &'a D, warehouse: &'a mut Warehouse, images_root: impl Into<PathBuf>) -> Self {
        Self {
            detector,
            warehouse,
            images_root: images_root.into(),
        }
    }

    pub fn run(&mut self) -> Result<EnrichReport> {
        let mut report = EnrichReport::default();

        if !self.images_root.is_dir() {
            error!("Image directory does not exist: {:?}", self.images_root);
            return Ok(report);
        }

        let mut processed = self.warehouse.processed_message_ids()?;
        info!("Found {} previously processed image message IDs", processed.len());

        let (scan_tx, scan_rx) = bounded::<PathBuf>(1024);
        let root = self.images_root.clone();
        let scanner_handle = thread::spawn(move || scanner::scan_images(&root, scan_tx));

        let progress = ProgressBar::new_spinner();
        for path in scan_rx {
            report.images_found += 1;
            progress.inc(1);

            let Some(message_id) = message_id_from_path(&path) else {
                warn!("Skipping non-numeric filename (expected message_id): {:?}", path);
                report.skipped_invalid += 1;
                continue;
            };

            if processed.contains(&message_id) {
                debug!("Image {} already processed. Skipping.", message_id);
                report.already_processed += 1;
                continue;
            }

            match mimetype::is_image_content(&path) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Skipping {:?}: content is not an image", path);
                    report.skipped_invalid += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {:?}: {:#}", path, e);
                    report.skipped_invalid += 1;
                    continue;
                }
            }

            match self.process_image(&path, message_id) {
                Ok(inserted) => {
                    report.processed += 1;
                    report.detections_inserted += inserted;
                    processed.insert(message_id);
                }
                Err(e) => {
                    // Left out of `processed` so a later run retries it.
                    error!("Error processing image {:?}: {:#}", path, e);
                    report.failed += 1;
                }
            }
        }
        progress.finish_and_clear();

        scanner_handle
            .join()
            .map_err(|_| anyhow!("Image scanner thread panicked"))??;

        if report.images_found == 0 {
            warn!("No image files found in {:?}", self.images_root);
        }
        info!(
            found = report.images_found,
            processed = report.processed,
            skipped = report.already_processed,
            failed = report.failed,
            detections = report.detections_inserted,
            "object detection complete"
        );
        Ok(report)
    }

    fn process_image(&mut self, path: &Path, message_id: i64) -> Result<usize> {
        info!("Processing image: {:?} (Message ID: {})", path, message_id);
        let detections = self.detector.detect(path)?;
        let inserted = self
            .warehouse
            .insert_detections(message_id, &path.to_string_lossy(), &detections)?;
        info!("Finished processing {:?}. Found {} detections.", path, detections.len());
        Ok(inserted)
    }
}

/// `<images-root>/<channel>/<message-id>.<ext>` → message id.
fn message_id_from_path(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.parse().ok()
}
