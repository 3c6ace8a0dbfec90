//! HTTP utilities for connectors.
//!
//! JSON-over-HTTP binding shared by the decision, action and alert
//! connectors: authentication, optional client-side rate limiting, retries
//! with exponential backoff for transient failures, and status-code mapping.

use crate::traits::{AuthConfig, ConnectorConfig, ConnectorError, ConnectorResult};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Header carrying the idempotency key of an action request.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Client-side request quota.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
    /// Maximum burst size.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 5,
        }
    }
}

/// Body of a 429 answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
    retry_after_ms: Option<u64>,
}

/// HTTP client with retry and rate limiting support.
pub struct HttpClient {
    client: Client,
    config: ConnectorConfig,
    rate_limiter: Option<Arc<RateLimiterType>>,
}

impl HttpClient {
    /// Creates a new HTTP client from connector configuration.
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_rate_limit(config, None)
    }

    /// Creates a new HTTP client with a client-side quota.
    pub fn with_rate_limit(
        config: ConnectorConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> ConnectorResult<Self> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                reqwest::header::HeaderName::try_from(key.as_str()),
                reqwest::header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, val);
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(rl) => {
                let per_minute = NonZeroU32::new(rl.requests_per_minute).ok_or_else(|| {
                    ConnectorError::ConfigError("requests_per_minute must be positive".into())
                })?;
                let quota = Quota::per_minute(per_minute)
                    .allow_burst(NonZeroU32::new(rl.burst_size).unwrap_or(NonZeroU32::MIN));
                Some(Arc::new(GovernorRateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Builds a URL from a path.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Executes a GET request with query parameters and parses the JSON answer.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ConnectorResult<R> {
        let request = self.client.get(self.build_url(path)).query(query);
        let response = self.execute_with_retry(request).await?;
        parse_json_response(response).await
    }

    /// Executes a POST request and parses the JSON answer.
    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> ConnectorResult<R> {
        self.post_json_with_headers(path, body, &[]).await
    }

    /// Executes a POST request with extra headers and parses the JSON answer.
    ///
    /// Retries resend identical headers, so an idempotency key stays the same
    /// across attempts.
    pub async fn post_json_with_headers<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> ConnectorResult<R> {
        let mut request = self.client.post(self.build_url(path)).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = self.execute_with_retry(request).await?;
        parse_json_response(response).await
    }

    /// Executes a request with authentication, rate limiting, retries and
    /// error mapping.
    ///
    /// Rate-limit answers are returned immediately; the caller decides when
    /// to try again.
    async fn execute_with_retry(&self, mut request: RequestBuilder) -> ConnectorResult<Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        request = self.add_auth(request);

        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(attempt, ?delay, connector = %self.config.name, "Retrying request");
                sleep(delay).await;
                delay = std::cmp::min(delay * 2 + rand_jitter(), Duration::from_secs(5));
            }

            let request_clone = request
                .try_clone()
                .ok_or_else(|| ConnectorError::Internal("Failed to clone request".to_string()))?;

            match request_clone.send().await {
                Ok(response) => match check_status(response).await {
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                        warn!(error = %e, connector = %self.config.name, "Server error, retrying");
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    let error = if e.is_timeout() {
                        ConnectorError::Timeout(e.to_string())
                    } else if e.is_connect() {
                        ConnectorError::ConnectionFailed(e.to_string())
                    } else {
                        ConnectorError::RequestFailed(e.to_string())
                    };
                    if !error.is_transient() || attempt >= self.config.max_retries {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectorError::Internal("Unknown error".to_string())))
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::ApiKey { key, header_name } => {
                request.header(header_name.as_str(), key.expose_secret())
            }
            AuthConfig::BearerToken { token } => {
                request.header("Authorization", format!("Bearer {}", token.expose_secret()))
            }
        }
    }
}

/// Maps non-success statuses to connector errors.
async fn check_status(response: Response) -> ConnectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(retry_after_from_header);
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::RateLimited {
            retry_after_ms: retry_after_from_body(&body).or(header_ms),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(500).collect();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ConnectorError::AuthenticationFailed(format!("{}", status))
        }
        StatusCode::NOT_FOUND => ConnectorError::NotFound(snippet),
        StatusCode::CONFLICT => ConnectorError::Conflict(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ConnectorError::InvalidRequest(snippet)
        }
        s if s.is_server_error() => ConnectorError::ServiceError(format!("{}: {}", s, snippet)),
        s => ConnectorError::RequestFailed(format!("{}: {}", s, snippet)),
    })
}

/// `Retry-After` in delta-seconds, as milliseconds.
fn retry_after_from_header(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

fn retry_after_from_body(body: &str) -> Option<u64> {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.retry_after_ms)
}

async fn parse_json_response<T: DeserializeOwned>(response: Response) -> ConnectorResult<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| {
        ConnectorError::InvalidResponse(format!(
            "Failed to parse response (status {}): {}",
            status, e
        ))
    })
}

/// Small jitter for exponential backoff.
fn rand_jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let client =
            HttpClient::new(ConnectorConfig::new("decision", "http://localhost:8080/")).unwrap();
        assert_eq!(
            client.build_url("/api/triage"),
            "http://localhost:8080/api/triage"
        );
        assert_eq!(client.base_url(), "http://localhost:8080/");
    }

    #[test]
    fn test_retry_after_from_body() {
        assert_eq!(
            retry_after_from_body(r#"{"error":"Rate limit exceeded","retryAfterMs":1500}"#),
            Some(1500)
        );
        assert_eq!(retry_after_from_body(r#"{"error":"slow down"}"#), None);
        assert_eq!(retry_after_from_body("not json"), None);
    }

    #[test]
    fn test_retry_after_from_header() {
        assert_eq!(retry_after_from_header(" 2 "), Some(2000));
        assert_eq!(retry_after_from_header(&u64::MAX.to_string()), Some(u64::MAX));
        assert_eq!(
            retry_after_from_header("Wed, 21 Oct 2026 07:28:00 GMT"),
            None
        );
    }

    #[test]
    fn test_zero_quota_rejected() {
        let result = HttpClient::with_rate_limit(
            ConnectorConfig::new("decision", "http://localhost:8080"),
            Some(RateLimitConfig {
                requests_per_minute: 0,
                burst_size: 1,
            }),
        );
        assert!(matches!(result, Err(ConnectorError::ConfigError(_))));
    }

    #[test]
    fn test_jitter_bounded() {
        assert!(rand_jitter() < Duration::from_millis(100));
    }
}
