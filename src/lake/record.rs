use serde::{Deserialize, Serialize};

use crate::source::{Channel, SourceMessage};

/// On-disk form of one captured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedMessage {
    pub id: i64,
    pub date: String,
    pub message: Option<String>,
    pub sender_id: Option<i64>,
    pub channel_id: i64,
    pub channel_name: String,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub replies_count: i64,
    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_local_path: Option<String>,
    pub raw_message_json: String,
}

impl ScrapedMessage {
    pub fn from_source(
        message: &SourceMessage,
        channel: &Channel,
        media_local_path: Option<String>,
    ) -> Self {
        Self {
            id: message.id,
            date: message.date.to_rfc3339(),
            message: message.text.clone(),
            sender_id: message.sender_id,
            channel_id: channel.id,
            channel_name: channel.folder_name(),
            views: message.views,
            forwards: message.forwards,
            replies_count: message.replies,
            has_media: message.media.is_some(),
            media_type: message.media.as_ref().map(|m| m.type_name().to_string()),
            media_local_path,
            raw_message_json: message.raw.to_string(),
        }
    }
}
