//! Normalized provider error classification and the retry controller that
//! decides whether and how long to wait before trying again.
//!
//! Every provider adapter (`anthropic`, `openai`, `gemini`, the OpenAI-compat
//! family) funnels its vendor-specific failures through [`ProviderError`] so
//! the [`crate::llm_gateway`] can make retry/failover decisions without
//! knowing about any particular vendor's wire format.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Normalized error code. Retriable codes may be retried by
/// [`RetryController`]; non-retriable codes fail over to the next provider
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Retriable
    NetworkTimeout,
    ConnectionError,
    DnsError,
    RateLimited,
    ServerOverload,
    GatewayError,
    ProviderUnavailable,
    // Non-retriable
    InvalidRequest,
    AuthFailed,
    QuotaExceeded,
    UnsupportedModel,
    ContentFilterBlock,
    InputTooLarge,
    MalformedResponse,
}

impl ErrorCode {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::ConnectionError
                | Self::DnsError
                | Self::RateLimited
                | Self::ServerOverload
                | Self::GatewayError
                | Self::ProviderUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network_timeout",
            Self::ConnectionError => "connection_error",
            Self::DnsError => "dns_error",
            Self::RateLimited => "rate_limited",
            Self::ServerOverload => "server_overload",
            Self::GatewayError => "gateway_error",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::AuthFailed => "auth_failed",
            Self::QuotaExceeded => "quota_exceeded",
            Self::UnsupportedModel => "unsupported_model",
            Self::ContentFilterBlock => "content_filter_block",
            Self::InputTooLarge => "input_too_large",
            Self::MalformedResponse => "malformed_response",
        }
    }

    /// Classify an HTTP status code into a normalized error code. Used by
    /// provider adapters once they have a response status in hand.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthFailed,
            402 | 429 => Self::RateLimited,
            400 | 404 | 422 => Self::InvalidRequest,
            413 => Self::InputTooLarge,
            500 | 502 => Self::GatewayError,
            503 => Self::ServerOverload,
            504 => Self::NetworkTimeout,
            _ if (500..600).contains(&status) => Self::ProviderUnavailable,
            _ => Self::InvalidRequest,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized provider error carried across subsystem boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: ErrorCode,
    pub retriable: bool,
    pub status: Option<u16>,
    pub provider: Option<String>,
    pub details: String,
    pub trace_id: Option<String>,
}

impl ProviderError {
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        Self {
            retriable: code.is_retriable(),
            code,
            status: None,
            provider: None,
            details: details.into(),
            trace_id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The one-element error envelope returned to callers once all providers
    /// in a gateway priority list have been exhausted.
    pub fn envelope(&self, message: &str) -> serde_json::Value {
        serde_json::json!({
            "error": true,
            "type": "ProviderError",
            "code": self.code.as_str(),
            "message": message,
            "trace_id": self.trace_id,
            "details": {
                "provider": self.provider,
                "status": self.status,
            }
        })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, retriable={}): {}",
            self.code,
            self.provider.as_deref().unwrap_or("unknown"),
            self.retriable,
            self.details
        )
    }
}

impl std::error::Error for ProviderError {}

impl From<&reqwest::Error> for ProviderError {
    fn from(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::NetworkTimeout
        } else if err.is_connect() {
            ErrorCode::ConnectionError
        } else if err.is_request() && err.url().is_some_and(|u| u.host_str().is_none()) {
            ErrorCode::DnsError
        } else {
            ErrorCode::ProviderUnavailable
        };
        ProviderError::new(code, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// RetryController
// ---------------------------------------------------------------------------

/// Exponential-backoff-with-jitter retry policy. Stateless and reentrant —
/// safe to share a single instance across concurrent callers.
#[derive(Debug, Clone)]
pub struct RetryController {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub jitter: f64,
    pub timeout_ceiling: Duration,
}

impl Default for RetryController {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            jitter: 0.4,
            timeout_ceiling: Duration::from_secs(6),
        }
    }
}

impl RetryController {
    pub fn new(max_retries: usize, base_delay: Duration, jitter: f64, ceiling: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: jitter.clamp(0.0, 1.0),
            timeout_ceiling: ceiling,
        }
    }

    /// Delay before attempt `n` (1-based): `min(base * 2^(n-1) * (1+U[0,jitter]), ceiling)`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = 2f64.powi((attempt.saturating_sub(1)) as i32);
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..=self.jitter.max(0.0));
        let millis = self.base_delay.as_secs_f64() * exp * jitter_factor * 1000.0;
        let capped = millis.min(self.timeout_ceiling.as_secs_f64() * 1000.0);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Run `f`, retrying on retriable `ProviderError`s up to `max_retries`
    /// times. `on_retry(attempt, delay, &err)` fires before each sleep.
    pub async fn run<F, Fut, T>(
        &self,
        mut f: F,
        mut on_retry: impl FnMut(usize, Duration, &ProviderError),
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0usize;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempt += 1;
                    if !e.retriable || attempt > self.max_retries {
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    on_retry(attempt, delay, &e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
