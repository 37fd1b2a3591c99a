//! `MessageSource` backed by an HTTP/JSON gateway in front of the platform's
//! user API. The gateway owns the authenticated session; we identify ourselves
//! with the API id/hash and session name on every request.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_flood_wait, Channel, Media, MessageFeed, MessageSource, SourceError, SourceMessage};
use crate::utils::config::Credentials;

/// Used when a 429 carries neither a flood-wait payload nor `Retry-After`.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

pub struct GatewaySource {
    client: Client,
    base_url: String,
    page_size: usize,
}

#[derive(Deserialize)]
struct WireChannel {
    id: i64,
    username: Option<String>,
    title: String,
}

#[derive(Deserialize)]
struct WireMessage {
    id: i64,
    date: DateTime<Utc>,
    message: Option<String>,
    sender_id: Option<i64>,
    views: Option<i64>,
    forwards: Option<i64>,
    replies: Option<WireReplies>,
    media: Option<WireMedia>,
}

#[derive(Deserialize)]
struct WireReplies {
    replies: i64,
}

#[derive(Deserialize)]
struct WireMedia {
    #[serde(rename = "type")]
    kind: String,
    mime_type: Option<String>,
}

impl From<WireMedia> for Media {
    fn from(media: WireMedia) -> Self {
        match media.kind.as_str() {
            "photo" | "MessageMediaPhoto" => Media::Photo,
            "document" | "MessageMediaDocument" => Media::Document {
                mime_type: media.mime_type,
            },
            _ => Media::Other(media.kind),
        }
    }
}

impl GatewaySource {
    /// Builds the client and checks the session; failure here is fatal to the scrape.
    pub fn connect(
        base_url: &str,
        credentials: &Credentials,
        session_name: &str,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-api-id", credentials.api_id.as_str()),
            ("x-api-hash", credentials.api_hash.as_str()),
            ("x-session-name", session_name),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Rpc(format!("invalid {} header: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;

        let source = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
        };

        info!("Connecting to messaging gateway at {}", source.base_url);
        source.get("/v1/session", &[])?;
        info!("Connected to messaging gateway");

        Ok(source)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        check_status(response)
    }
}

/// One page of a channel's history, newest first, with ids below `max_id`.
trait PageFetch {
    fn fetch_page(
        &self,
        channel_id: i64,
        max_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError>;
}

impl PageFetch for GatewaySource {
    fn fetch_page(
        &self,
        channel_id: i64,
        max_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id.to_string()));
        }

        let values: Vec<serde_json::Value> = self
            .get(&format!("/v1/channels/{}/messages", channel_id), &query)?
            .json()
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        values.into_iter().map(decode_message).collect()
    }
}

fn decode_message(raw: serde_json::Value) -> Result<SourceMessage, SourceError> {
    let wire: WireMessage =
        serde_json::from_value(raw.clone()).map_err(|e| SourceError::Decode(e.to_string()))?;

    Ok(SourceMessage {
        id: wire.id,
        date: wire.date,
        text: wire.message,
        sender_id: wire.sender_id,
        views: wire.views,
        forwards: wire.forwards,
        replies: wire.replies.map(|r| r.replies).unwrap_or(0),
        media: wire.media.map(Media::from),
        raw,
    })
}

fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().unwrap_or_default();

    if let Some(wait) = parse_flood_wait(&body) {
        return Err(SourceError::RateLimited { wait });
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited {
            wait: retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT),
        });
    }

    Err(SourceError::Rpc(format!("{}: {}", status, body.trim())))
}

impl MessageSource for GatewaySource {
    fn resolve(&self, channel_url: &str) -> Result<Channel, SourceError> {
        let wire: WireChannel = self
            .get("/v1/channels/resolve", &[("url", channel_url.to_string())])?
            .json()
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        Ok(Channel {
            id: wire.id,
            username: wire.username,
            title: wire.title,
        })
    }

    fn paginate<'a>(
        &'a self,
        channel: &'a Channel,
        older_than: Option<i64>,
        limit: Option<usize>,
    ) -> Result<MessageFeed<'a>, SourceError> {
        Ok(Box::new(PageFeed {
            fetcher: self,
            page_size: self.page_size,
            channel_id: channel.id,
            max_id: older_than,
            remaining: limit,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn download_media(
        &self,
        channel: &Channel,
        message: &SourceMessage,
        dest: &Path,
    ) -> Result<(), SourceError> {
        let mut response = self.get(
            &format!("/v1/channels/{}/messages/{}/media", channel.id, message.id),
            &[],
        )?;

        let mut file = File::create(dest)?;
        if let Err(e) = response.copy_to(&mut file) {
            drop(file);
            let _ = std::fs::remove_file(dest);
            return Err(SourceError::Unreachable(e.to_string()));
        }
        Ok(())
    }
}

/// Walks a channel's history one page at a time, using the last yielded id as
/// the next page's upper bound.
struct PageFeed<'a, F: PageFetch + ?Sized> {
    fetcher: &'a F,
    page_size: usize,
    channel_id: i64,
    max_id: Option<i64>,
    remaining: Option<usize>,
    buffer: VecDeque<SourceMessage>,
    exhausted: bool,
}

impl<F: PageFetch + ?Sized> Iterator for PageFeed<'_, F> {
    type Item = Result<SourceMessage, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }

        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            let want = self.remaining.map_or(self.page_size, |r| r.min(self.page_size));

            match self.fetcher.fetch_page(self.channel_id, self.max_id, want) {
                Ok(page) => {
                    debug!(channel_id = self.channel_id, max_id = ?self.max_id, fetched = page.len(), "fetched page");
                    if page.len() < want {
                        self.exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                // Same page is requested again on the next pull.
                Err(e @ SourceError::RateLimited { .. }) => return Some(Err(e)),
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let message = self.buffer.pop_front()?;
        self.max_id = Some(message.id);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(message))
    }
}
