use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection};
use tracing::{debug, error};

use crate::database::schema::SCHEMA;
use crate::ml::Detection;

/// Staging-table row for one message file.
#[derive(Debug, Clone)]
pub struct RawMessageRecord {
    pub id: i64,
    pub channel_id: i64,
    pub message_date: DateTime<FixedOffset>,
    pub raw_data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// One connection per stage invocation; dropped (and closed) when the stage ends.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.execute_batch(SCHEMA).context("Failed to initialize schema")?;
        Ok(Self { conn })
    }

    /// Inserts the batch in one transaction. Existing ids are left untouched and
    /// counted as duplicates; a row that fails is logged and the rest still commit.
    pub fn insert_raw_messages(&mut self, records: &[RawMessageRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let tx = self.conn.transaction().context("Failed to begin transaction")?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_telegram_messages (id, channel_id, message_date, raw_data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
            )?;

            for record in records {
                match stmt.execute(params![
                    record.id,
                    record.channel_id,
                    record.message_date.to_rfc3339(),
                    record.raw_data,
                ]) {
                    Ok(0) => {
                        debug!("Message ID {} already exists. Skipping.", record.id);
                        outcome.duplicates += 1;
                    }
                    Ok(_) => outcome.inserted += 1,
                    Err(e) => {
                        error!("Failed to insert message {}: {}", record.id, e);
                        outcome.failed += 1;
                    }
                }
            }
        }

        tx.commit().context("Failed to commit transaction")?;
        Ok(outcome)
    }

    pub fn raw_message_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM raw_telegram_messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Message ids that already have at least one detection row.
    pub fn processed_message_ids(&self) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT message_id FROM raw_image_detections")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .context("Failed to read processed message ids")?;
        Ok(ids)
    }

    /// Stores one image's detections atomically. Rows that collide with the
    /// (message, path, class) key are ignored. Returns the number of new rows.
    pub fn insert_detections(
        &mut self,
        message_id: i64,
        image_path: &str,
        detections: &[Detection],
    ) -> Result<usize> {
        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_image_detections
                    (message_id, image_path, detected_object_class, confidence_score)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (message_id, image_path, detected_object_class) DO NOTHING",
            )?;

            for detection in detections {
                inserted += stmt
                    .execute(params![
                        message_id,
                        image_path,
                        detection.class_name,
                        round_confidence(detection.confidence),
                    ])
                    .with_context(|| {
                        format!("Failed to insert detection '{}' for {}", detection.class_name, image_path)
                    })?;
            }
        }

        tx.commit().context("Failed to commit transaction")?;
        Ok(inserted)
    }

    pub fn detection_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM raw_image_detections", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Four decimal places.
fn round_confidence(confidence: f32) -> f64 {
    (f64::from(confidence) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_name: &str, confidence: f32) -> Detection {
        Detection {
            class_name: class_name.to_string(),
            confidence,
            bbox: [0.0, 0.0, 10.0, 10.0],
        }
    }

    fn raw(id: i64) -> RawMessageRecord {
        RawMessageRecord {
            id,
            channel_id: 1,
            message_date: DateTime::parse_from_rfc3339("2024-05-01T09:30:00+03:00").unwrap(),
            raw_data: format!(r#"{{"id":{}}}"#, id),
        }
    }

    #[test]
    fn test_detection_insert_is_conflict_safe() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut warehouse = Warehouse::open(&dir.path().join("warehouse.db"))?;

        assert_eq!(warehouse.insert_detections(7, "a.jpg", &[detection("mask", 0.91)])?, 1);
        assert_eq!(warehouse.insert_detections(7, "a.jpg", &[detection("mask", 0.87)])?, 0);

        assert_eq!(warehouse.detection_count()?, 1);
        assert_eq!(warehouse.processed_message_ids()?, HashSet::from([7]));
        Ok(())
    }

    #[test]
    fn test_confidence_rounded_to_four_places() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut warehouse = Warehouse::open(&dir.path().join("warehouse.db"))?;
        warehouse.insert_detections(3, "b.jpg", &[detection("bottle", 0.123_456)])?;

        let stored: f64 = warehouse.connection().query_row(
            "SELECT confidence_score FROM raw_image_detections WHERE message_id = 3",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(stored, 0.1235);
        Ok(())
    }

    #[test]
    fn test_failed_detection_batch_rolls_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut warehouse = Warehouse::open(&dir.path().join("warehouse.db"))?;
        warehouse.connection().execute_batch(
            "CREATE TRIGGER reject_unknown BEFORE INSERT ON raw_image_detections
             WHEN NEW.detected_object_class = 'unknown'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )?;

        let result = warehouse.insert_detections(
            11,
            "c.jpg",
            &[detection("person", 0.8), detection("unknown", 0.5)],
        );

        assert!(result.is_err());
        assert_eq!(warehouse.detection_count()?, 0);
        assert!(warehouse.processed_message_ids()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_raw_insert_skips_existing_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut warehouse = Warehouse::open(&dir.path().join("warehouse.db"))?;

        let first = warehouse.insert_raw_messages(&[raw(1), raw(2)])?;
        assert_eq!(first, BatchOutcome { inserted: 2, duplicates: 0, failed: 0 });

        let second = warehouse.insert_raw_messages(&[raw(2), raw(3)])?;
        assert_eq!(second, BatchOutcome { inserted: 1, duplicates: 1, failed: 0 });
        assert_eq!(warehouse.raw_message_count()?, 3);

        let stored_date: String = warehouse.connection().query_row(
            "SELECT message_date FROM raw_telegram_messages WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(stored_date, "2024-05-01T09:30:00+03:00");
        Ok(())
    }
}
