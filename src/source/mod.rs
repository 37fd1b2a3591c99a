//! The messaging platform, seen through the `MessageSource` capability.
//!
//! The scraper only ever talks to a `MessageSource`, so the real HTTP gateway
//! client and the in-memory fakes used by tests are interchangeable.

pub mod gateway;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("rate limited, retry in {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    #[error("platform unreachable: {0}")]
    Unreachable(String),

    #[error("platform error: {0}")]
    Rpc(String),

    #[error("malformed platform response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A resolved channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub username: Option<String>,
    pub title: String,
}

impl Channel {
    /// Directory name used for this channel in the data lake.
    pub fn folder_name(&self) -> String {
        match &self.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => self.title.replace(' ', "_"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Photo,
    Document { mime_type: Option<String> },
    /// Any other attachment (web page previews, polls, ...), by platform type name.
    Other(String),
}

impl Media {
    pub fn type_name(&self) -> &str {
        match self {
            Media::Photo => "MessageMediaPhoto",
            Media::Document { .. } => "MessageMediaDocument",
            Media::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub sender_id: Option<i64>,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub replies: i64,
    pub media: Option<Media>,
    /// Full payload as the platform returned it.
    pub raw: serde_json::Value,
}

/// Newest-first message stream. A `RateLimited` item does not end the stream:
/// pulling again continues from the same position.
pub type MessageFeed<'a> = Box<dyn Iterator<Item = Result<SourceMessage, SourceError>> + 'a>;

pub trait MessageSource {
    fn resolve(&self, channel_url: &str) -> Result<Channel, SourceError>;

    /// Messages with id strictly below `older_than` (all when `None`), newest first,
    /// at most `limit` of them.
    fn paginate<'a>(
        &'a self,
        channel: &'a Channel,
        older_than: Option<i64>,
        limit: Option<usize>,
    ) -> Result<MessageFeed<'a>, SourceError>;

    fn download_media(
        &self,
        channel: &Channel,
        message: &SourceMessage,
        dest: &Path,
    ) -> Result<(), SourceError>;
}

/// Extracts the mandated wait from a flood-wait error payload such as
/// `FLOOD_WAIT_30` or `A wait of 30 seconds is required`.
pub fn parse_flood_wait(payload: &str) -> Option<Duration> {
    if let Some((_, rest)) = payload.split_once("FLOOD_WAIT_") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        return digits.parse().ok().map(Duration::from_secs);
    }

    let (_, rest) = payload.split_once("A wait of ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().map(Duration::from_secs)
}
