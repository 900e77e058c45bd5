/// Capture requests produced by the handlers and consumed by the API client
use crate::dom::MediaInfo;
use crate::platform::Platform;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

/// Upper bound on hashtags attached to one capture.
pub const MAX_HASHTAGS: usize = 30;
/// Captions longer than this are cut before sending.
pub const MAX_CAPTION_LENGTH: usize = 2000;

/// Where the video bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaRef {
    /// A plain http(s) URL the backend can download itself.
    Url(String),
    /// A page-local `blob:` URL that must be read in the page first.
    ObjectUrl(String),
    /// Bytes already in memory (a captured frame, or a fetched object URL).
    Blob { bytes: Vec<u8>, mime: String },
}

/// One user-initiated capture. Built once, moved into the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub id: String,
    pub platform: Platform,
    /// The page (post) URL the video was found on.
    pub source_url: String,
    pub media: MediaRef,
    pub metadata: Map<String, Value>,
}

impl CaptureRequest {
    pub fn new(platform: Platform, source_url: String, media: MediaRef, metadata: Map<String, Value>) -> CaptureRequest {
        CaptureRequest {
            id: Uuid::new_v4().to_string(),
            platform,
            source_url,
            media,
            metadata,
        }
    }
}

/// How a video element's source should be captured.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Direct(String),
    ObjectUrl(String),
    FrameCapture,
}

pub fn classify_media(info: &MediaInfo) -> MediaSource {
    match info.best_source() {
        Some(src) if src.starts_with("http://") || src.starts_with("https://") => MediaSource::Direct(src.to_string()),
        Some(src) if src.starts_with("blob:") => MediaSource::ObjectUrl(src.to_string()),
        // data:, mediasource:, or nothing at all
        _ => MediaSource::FrameCapture,
    }
}

/// Metadata scraped next to a video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub hashtags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shorts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    pub timestamp: f64,
}

impl VideoMetadata {
    /// Fill `hashtags` from the caption and cap its length.
    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        if let Some(text) = caption {
            self.hashtags = extract_hashtags(&text);
            self.caption = Some(truncate_chars(&text, MAX_CAPTION_LENGTH));
        }
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").expect("valid pattern"));

/// `#tag` tokens in order of first appearance, without the `#`.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in HASHTAG.captures_iter(text) {
        let tag = caps[1].to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_HASHTAGS {
            break;
        }
    }
    tags
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
