use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, error, info};

use super::record::ScrapedMessage;
use crate::source::{Channel, Media, MessageSource, SourceMessage};

/// Roots of the message and media trees.
#[derive(Debug, Clone)]
pub struct DataLake {
    messages_root: PathBuf,
    images_root: PathBuf,
}

impl DataLake {
    pub fn new(messages_root: impl Into<PathBuf>, images_root: impl Into<PathBuf>) -> Self {
        Self {
            messages_root: messages_root.into(),
            images_root: images_root.into(),
        }
    }

    /// `<messages-root>/<YYYY-MM-DD>/<channel>`
    pub fn channel_dir(&self, date: NaiveDate, channel_name: &str) -> PathBuf {
        self.messages_root
            .join(date.format("%Y-%m-%d").to_string())
            .join(channel_name)
    }

    /// `<images-root>/<channel>/<id>.<ext>`
    pub fn media_path(&self, channel_name: &str, message_id: i64, ext: &str) -> PathBuf {
        self.images_root
            .join(channel_name.replace('@', ""))
            .join(format!("{}.{}", message_id, ext))
    }

    pub fn write_message(&self, date: NaiveDate, record: &ScrapedMessage) -> Result<PathBuf> {
        let dir = self.channel_dir(date, &record.channel_name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

        let path = dir.join(format!("{}.json", record.id));
        let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush()?;

        debug!("Saved message {} to {:?}", record.id, path);
        Ok(path)
    }

    /// Downloads the message's media if its kind is supported. Download failures
    /// are logged and reported as `None`; they never fail the message itself.
    pub fn save_media<S: MessageSource + ?Sized>(
        &self,
        source: &S,
        channel: &Channel,
        message: &SourceMessage,
    ) -> Option<PathBuf> {
        let media = message.media.as_ref()?;
        let channel_name = channel.folder_name();

        let Some(ext) = media_extension(media) else {
            info!(
                "Skipping unsupported media ({}) in message {} from {}",
                media.type_name(),
                message.id,
                channel_name
            );
            return None;
        };

        let path = self.media_path(&channel_name, message.id, &ext);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create media directory {:?}: {}", parent, e);
                return None;
            }
        }

        match source.download_media(channel, message, &path) {
            Ok(()) => {
                debug!("Downloaded media for message {} to {:?}", message.id, path);
                Some(path)
            }
            Err(e) => {
                error!(
                    "Error downloading media for message {} from {}: {}",
                    message.id, channel_name, e
                );
                None
            }
        }
    }
}

/// File extension for a media kind, or `None` when the kind is not stored.
pub fn media_extension(media: &Media) -> Option<String> {
    match media {
        Media::Photo => Some("jpg".to_string()),
        Media::Document { mime_type: Some(mime) } if mime.contains("image") => {
            mime.rsplit('/').next().map(str::to_string)
        }
        Media::Document { mime_type: Some(_) } => None,
        Media::Document { mime_type: None } => Some("bin".to_string()),
        Media::Other(_) => None,
    }
}
