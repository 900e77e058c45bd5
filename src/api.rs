//! HTTP client for the local analysis backend.
//!
//! All outbound calls go through a [`Transport`] so the retry and response
//! classification rules can be exercised without a network.

use crate::capture::{CaptureRequest, MediaRef};
use crate::error::{ApiError, TransportError};
use crate::platform::Platform;
use crate::retry::{execute_with_retry, RetryFailure, RetryPolicy};
use crate::scheduler::Sleeper;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const HEALTH_PATH: &str = "/health";
pub const PROCESS_VIDEO_PATH: &str = "/api/process-video";
pub const PROCESS_BLOB_PATH: &str = "/api/process-video-blob";
pub const STATS_PATH: &str = "/api/stats";
pub const VIDEOS_PATH: &str = "/api/videos";

/// Business error code the backend sends with a 409 for an already-saved URL.
///
/// Matching on this literal is fragile: a renamed code on the server turns
/// duplicates into retried HTTP errors. Keep it in sync with the backend.
pub const DUPLICATE_ERROR_CODE: &str = "DUPLICATE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        bytes: Vec<u8>,
        mime: String,
        filename: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<MultipartField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> HttpRequest {
        HttpRequest {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(url: impl Into<String>, fields: Vec<MultipartField>) -> HttpRequest {
        HttpRequest {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Multipart(fields),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON; `Null` when empty or not JSON.
    pub fn json_or_null(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// One HTTP round trip. Implemented over `fetch` in the browser.
#[async_trait(?Send)]
pub trait Transport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Success envelope returned by the processing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Where the earlier copy of a duplicate lives, exactly as the backend sent it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuplicateInfo(pub Map<String, Value>);

/// Strings as-is, numbers printed; anything else is ignored.
fn loose_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl DuplicateInfo {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Human-readable location, e.g. "TIKTOK, row 12, column B".
    pub fn location(&self) -> Option<String> {
        let parts: Vec<String> = [
            loose_text(self.get("platform")),
            loose_text(self.get("row")).map(|row| format!("row {}", row)),
            loose_text(self.get("column")).map(|column| format!("column {}", column)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// A capture the backend already has.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub success: bool,
    #[serde(rename = "isDuplicate")]
    pub is_duplicate: bool,
    pub message: String,
    pub duplicate_info: DuplicateInfo,
}

impl DuplicateReport {
    fn new(message: Option<String>, duplicate_info: DuplicateInfo) -> DuplicateReport {
        DuplicateReport {
            success: false,
            is_duplicate: true,
            message: message.unwrap_or_else(|| "This video was already saved".to_string()),
            duplicate_info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Processed(ApiEnvelope),
    Duplicate(DuplicateReport),
}

/// Retrying client for the analysis backend.
pub struct ApiClient {
    base_url: RefCell<String>,
    transport: Rc<dyn Transport>,
    sleeper: Rc<dyn Sleeper>,
    policy: RetryPolicy,
    use_ai: Cell<bool>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Rc<dyn Transport>,
        sleeper: Rc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> ApiClient {
        ApiClient {
            base_url: RefCell::new(base_url.into()),
            transport,
            sleeper,
            policy,
            use_ai: Cell::new(true),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.borrow().clone()
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        *self.base_url.borrow_mut() = base_url.into();
    }

    pub fn set_use_ai(&self, use_ai: bool) {
        self.use_ai.set(use_ai);
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.borrow().trim_end_matches('/'), path)
    }

    /// Submit a capture, retrying transient failures.
    ///
    /// A duplicate is a normal outcome, returned on the attempt that saw it.
    pub async fn send(&self, request: CaptureRequest) -> Result<SendOutcome, ApiError> {
        let CaptureRequest {
            id,
            platform,
            source_url,
            media,
            metadata,
        } = request;

        let media = match media {
            MediaRef::ObjectUrl(url) => {
                let bytes = self
                    .fetch_blob(&url)
                    .await
                    .map_err(|e| ApiError::MediaUnavailable(e.to_string()))?;
                MediaRef::Blob {
                    bytes,
                    mime: "video/mp4".to_string(),
                }
            }
            other => other,
        };

        let http_request = match media {
            MediaRef::Url(video_url) => HttpRequest::post_json(
                self.endpoint(PROCESS_VIDEO_PATH),
                json!({
                    "platform": platform,
                    "url": video_url,
                    "videoUrl": video_url,
                    "postUrl": source_url,
                    "metadata": metadata,
                    "useAI": self.use_ai.get(),
                }),
            ),
            MediaRef::Blob { bytes, mime } => HttpRequest::post_multipart(
                self.endpoint(PROCESS_BLOB_PATH),
                multipart_fields(&id, platform, &source_url, &metadata, bytes, mime),
            ),
            MediaRef::ObjectUrl(url) => return Err(ApiError::MediaUnavailable(url)),
        };

        info!("Sending capture {} ({}) to {}", id, platform, http_request.url);

        let transport = self.transport.clone();
        let result = execute_with_retry(&self.policy, self.sleeper.as_ref(), ApiError::is_retryable, |attempt| {
            let transport = transport.clone();
            let request = http_request.clone();
            debug!("Capture {} attempt {}", id, attempt.attempt_index + 1);
            async move {
                let response = transport.execute(request).await?;
                classify_response(response)
            }
        })
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(RetryFailure::Rejected(error)) => Err(error),
            Err(RetryFailure::Exhausted { attempts, last }) => Err(ApiError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Single-attempt reachability probe.
    pub async fn check_connection(&self) -> bool {
        match self.transport.execute(HttpRequest::get(self.endpoint(HEALTH_PATH))).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!("Health check returned {}", response.status);
                false
            }
            Err(e) => {
                warn!("Server connection failed: {}", e);
                false
            }
        }
    }

    pub async fn get_stats(&self) -> Result<Value, ApiError> {
        self.get_json(STATS_PATH).await
    }

    pub async fn get_videos(&self) -> Result<Value, ApiError> {
        self.get_json(VIDEOS_PATH).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let response = self.transport.execute(HttpRequest::get(self.endpoint(path))).await?;
        if !response.is_success() {
            return Err(http_error(response.status, &response.json_or_null()));
        }
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Read a page-local object URL into memory.
    pub async fn fetch_blob(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.transport.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(ApiError::MediaUnavailable(format!("{} returned {}", url, response.status)));
        }
        debug!("Fetched {} bytes from {}", response.body.len(), url);
        Ok(response.body)
    }
}

fn multipart_fields(
    id: &str,
    platform: Platform,
    source_url: &str,
    metadata: &Map<String, Value>,
    bytes: Vec<u8>,
    mime: String,
) -> Vec<MultipartField> {
    let extension = if mime.starts_with("image/") { "jpg" } else { "mp4" };
    vec![
        MultipartField::File {
            name: "video".to_string(),
            bytes,
            filename: format!("{}_video_{}.{}", platform.tag().to_lowercase(), id, extension),
            mime,
        },
        MultipartField::Text {
            name: "platform".to_string(),
            value: platform.tag().to_string(),
        },
        MultipartField::Text {
            name: "postUrl".to_string(),
            value: source_url.to_string(),
        },
        MultipartField::Text {
            name: "metadata".to_string(),
            value: Value::Object(metadata.clone()).to_string(),
        },
    ]
}

fn http_error(status: u16, body: &Value) -> ApiError {
    let message = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("HTTP error")
        .to_string();
    ApiError::Http { status, message }
}

fn duplicate_info_from(body: &Value, key: &str) -> DuplicateInfo {
    match body.get(key) {
        Some(Value::Object(info)) => DuplicateInfo(info.clone()),
        _ => DuplicateInfo::default(),
    }
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message").and_then(Value::as_str).map(str::to_string)
}

/// Turn a raw response into an outcome or a (possibly retryable) error.
fn classify_response(response: HttpResponse) -> Result<SendOutcome, ApiError> {
    let body = response.json_or_null();

    if response.status == 409 && body.get("error").and_then(Value::as_str) == Some(DUPLICATE_ERROR_CODE) {
        return Ok(SendOutcome::Duplicate(DuplicateReport::new(
            message_of(&body),
            duplicate_info_from(&body, "duplicate_info"),
        )));
    }

    if !response.is_success() {
        return Err(http_error(response.status, &body));
    }

    if body.get("isDuplicate").and_then(Value::as_bool) == Some(true) {
        let info = if body.get("duplicate_info").is_some() {
            duplicate_info_from(&body, "duplicate_info")
        } else {
            duplicate_info_from(&body, "existingVideo")
        };
        return Ok(SendOutcome::Duplicate(DuplicateReport::new(message_of(&body), info)));
    }

    serde_json::from_value::<ApiEnvelope>(body)
        .map(SendOutcome::Processed)
        .map_err(|e| ApiError::Decode(e.to_string()))
}
