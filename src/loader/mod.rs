//! Raw loader: data-lake JSON files into the staging table, one commit per
//! `<date>/<channel>` directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::database::{RawMessageRecord, Warehouse};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub directories: usize,
    pub files_processed: usize,
    pub loaded: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub failed: usize,
}

enum Parsed {
    Record(RawMessageRecord),
    Invalid,
}

pub struct RawLoader<'a> {
    warehouse: &'a mut Warehouse,
    messages_root: PathBuf,
}

impl<'a> RawLoader<'a> {
    pub fn new(warehouse: &'a mut Warehouse, messages_root: impl Into<PathBuf>) -> Self {
        Self {
            warehouse,
            messages_root: messages_root.into(),
        }
    }

    pub fn run(&mut self) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        if !self.messages_root.is_dir() {
            warn!("Raw messages directory {:?} does not exist; nothing to load", self.messages_root);
            return Ok(report);
        }

        for channel_dir in channel_dirs(&self.messages_root)? {
            info!("Processing directory: {:?}", channel_dir);
            self.load_directory(&channel_dir, &mut report)?;
            report.directories += 1;
            info!("Committed changes for channel directory: {:?}", channel_dir);
        }

        info!(
            files = report.files_processed,
            loaded = report.loaded,
            duplicates = report.duplicates,
            invalid = report.invalid,
            failed = report.failed,
            "data loading complete"
        );
        Ok(report)
    }

    fn load_directory(&mut self, dir: &Path, report: &mut LoadReport) -> Result<()> {
        let files = message_files(dir)?;
        report.files_processed += files.len();

        // Parsing is CPU-only; inserts stay sequential on the one connection.
        let parsed: Vec<Parsed> = files.par_iter().map(|path| parse_file(path)).collect();

        let mut records = Vec::with_capacity(parsed.len());
        for item in parsed {
            match item {
                Parsed::Record(record) => records.push(record),
                Parsed::Invalid => report.invalid += 1,
            }
        }

        let outcome = self
            .warehouse
            .insert_raw_messages(&records)
            .with_context(|| format!("Failed to load {:?}", dir))?;
        report.loaded += outcome.inserted;
        report.duplicates += outcome.duplicates;
        report.failed += outcome.failed;
        Ok(())
    }
}

/// `<root>/<date>/<channel>` directories, sorted.
fn channel_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn message_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn parse_file(path: &Path) -> Parsed {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Error reading {:?}: {}", path, e);
            return Parsed::Invalid;
        }
    };

    let payload: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            error!("Error decoding JSON from {:?}: {}", path, e);
            return Parsed::Invalid;
        }
    };

    match record_from_payload(payload) {
        Ok(record) => Parsed::Record(record),
        Err(e) => {
            warn!("Skipping file {:?}: {}", path, e);
            Parsed::Invalid
        }
    }
}

/// Requires `id`, `channel_id` and `date`; the whole payload is kept verbatim.
fn record_from_payload(payload: Value) -> Result<RawMessageRecord> {
    let id = payload.get("id").and_then(Value::as_i64);
    let channel_id = payload.get("channel_id").and_then(Value::as_i64);
    let date = payload.get("date").and_then(Value::as_str);

    let (Some(id), Some(channel_id), Some(date)) = (id, channel_id, date) else {
        return Err(anyhow!("missing required fields (id, channel_id, or date)"));
    };
    let message_date = parse_message_date(date)?;

    Ok(RawMessageRecord {
        id,
        channel_id,
        message_date,
        raw_data: payload.to_string(),
    })
}

/// ISO-8601 with offset; a naive timestamp is taken as UTC.
fn parse_message_date(raw: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("invalid date '{}'", raw))?;
    Ok(naive.and_utc().fixed_offset())
}
