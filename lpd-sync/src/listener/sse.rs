//! Server-Sent Events transport for change notifications
//!
//! [`SseFrameParser`] turns a `text/event-stream` byte stream into frames:
//! `event:`, `data:` and `id:` fields, `:` comments, and blank-line
//! dispatch. [`SseNotifier`] maps frames named `catalog-changed` (or the
//! older `manifest-updated`) to [`ChannelEvent::CatalogChanged`].

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use super::notifier::{ChangeNotice, ChannelEvent, ChannelStream, Notifier};
use crate::error::{Result, SyncError};

/// Event names carrying a [`ChangeNotice`]
pub const CHANGE_EVENT_NAMES: [&str; 2] = ["catalog-changed", "manifest-updated"];

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the frame had no `event:` field
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last event id seen on the stream
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_event_id: Option<String>,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every frame completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_idx) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_idx).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_event_id.clone(),
        })
    }
}

/// Map a frame to a channel event; unrelated or malformed frames yield `None`
pub fn frame_to_event(frame: &SseFrame) -> Option<ChannelEvent> {
    if !CHANGE_EVENT_NAMES.contains(&frame.event.as_str()) {
        debug!(event = %frame.event, "Ignoring unrelated SSE event");
        return None;
    }
    match serde_json::from_str::<ChangeNotice>(&frame.data) {
        Ok(notice) => Some(ChannelEvent::CatalogChanged(notice)),
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Ignoring malformed change notification");
            None
        }
    }
}

/// Change notifications over an SSE endpoint
pub struct SseNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl SseNotifier {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for SseNotifier {
    async fn connect(&self) -> Result<ChannelStream> {
        debug!(url = %self.url, "Opening change stream");

        let response = self
            .http_client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport {
                status: status.as_u16(),
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            yield ChannelEvent::Open;

            let mut parser = SseFrameParser::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for frame in parser.push(&chunk) {
                            if let Some(event) = frame_to_event(&frame) {
                                yield event;
                            }
                        }
                    }
                    Err(e) => {
                        yield ChannelEvent::Error(format!("change stream read failed: {}", e));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
