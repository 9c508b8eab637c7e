use crate::display::DisplayTarget;
use crate::store::SubmissionBody;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {status}")]
    Status { status: u16, body: String },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
        }
    }
}

pub trait Transport {
    fn post_json(&self, endpoint: &Url, body: &[u8]) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post_json(&self, endpoint: &Url, body: &[u8]) -> Result<String, TransportError> {
        (**self).post_json(endpoint, body)
    }
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, endpoint: &Url, body: &[u8]) -> Result<String, TransportError> {
        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .body(body.to_vec())
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        reply_from(status, response.text().map_err(|e| e.to_string()))
    }
}

/// Once the server answered 2xx the envelope is stored, so a body that cannot
/// be read is not a reason to post it again.
fn reply_from(status: u16, body: Result<String, String>) -> Result<String, TransportError> {
    match body {
        Ok(text) if (200..300).contains(&status) => Ok(text),
        Ok(text) => Err(TransportError::Status { status, body: text }),
        Err(reason) if (200..300).contains(&status) => {
            warn!(status, error = %reason, "accepted submission but could not read the reply");
            Ok(String::new())
        }
        Err(reason) => {
            warn!(status, error = %reason, "could not read error reply");
            Err(TransportError::Status {
                status,
                body: String::new(),
            })
        }
    }
}

#[derive(Debug)]
pub struct RecordingTransport {
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    fallback: String,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub body: Vec<u8>,
}

impl RecordingTransport {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(
        fallback: impl Into<String>,
        replies: Vec<Result<String, TransportError>>,
    ) -> Self {
        let transport = Self::new(fallback);
        if let Ok(mut queue) = transport.replies.lock() {
            queue.extend(replies);
        }
        transport
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn post_json(&self, endpoint: &Url, body: &[u8]) -> Result<String, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                endpoint: endpoint.to_string(),
                body: body.to_vec(),
            });
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to serialize submission: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("submission failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: TransportError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub attempts: u32,
    pub digest: String,
}

pub const RETRY_HINT: &str =
    "Your responses have not been submitted yet. Please check your connection and press retry.";

pub struct Submitter {
    transport: Box<dyn Transport>,
    endpoint: Url,
    policy: RetryPolicy,
}

impl Submitter {
    pub fn new(transport: Box<dyn Transport>, endpoint: Url, policy: RetryPolicy) -> Self {
        Self {
            transport,
            endpoint,
            policy,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn send(
        &self,
        body: &SubmissionBody,
        display: &mut dyn DisplayTarget,
    ) -> Result<Delivery, SubmitError> {
        let total = self.policy.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(
                endpoint = %self.endpoint,
                digest = %body.digest,
                attempt,
                bytes = body.bytes.len(),
                "posting submission"
            );
            match self.transport.post_json(&self.endpoint, &body.bytes) {
                Ok(html) => {
                    display.replace_document(&html);
                    info!(digest = %body.digest, attempt, "submission accepted");
                    return Ok(Delivery {
                        attempts: attempt,
                        digest: body.digest.clone(),
                    });
                }
                Err(err) => {
                    let retry = err.is_retryable() && attempt < total;
                    warn!(
                        digest = %body.digest,
                        attempt,
                        error = %err,
                        retry,
                        "submission attempt failed"
                    );
                    if !retry {
                        display.show_error(&format!(
                            "Submission failed ({}). {}",
                            err, RETRY_HINT
                        ));
                        return Err(SubmitError::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt - 1);
                    display.show_error(&format!(
                        "Submission attempt {} of {} failed ({}). Retrying in {} ms.",
                        attempt,
                        total,
                        err,
                        delay.as_millis()
                    ));
                    thread::sleep(delay);
                }
            }
        }
    }
}
