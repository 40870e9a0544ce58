//! HTTP client wrapper with rate limiting, retries, and request tracking

use crate::error::{JsProbeError, Result};
use crate::models::RunConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

const INITIAL_BACKOFF_MS: u64 = 500;

/// HTTP client wrapper with rate limiting and request counting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_count: Arc<AtomicU64>,
    rate_limiter: Option<Arc<Semaphore>>,
    rate_limit_delay: Option<Duration>,
    max_retries: u32,
}

impl HttpClient {
    /// Creates a new HttpClient from run configuration
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| JsProbeError::ConfigError(format!("Invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| JsProbeError::ConfigError(format!("Invalid value for header '{key}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .default_headers(default_headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .cookie_store(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let (rate_limiter, rate_limit_delay) = match config.rate_limit {
            Some(rps) if rps > 0 => (
                Some(Arc::new(Semaphore::new(rps as usize))),
                Some(Duration::from_millis(1000 / u64::from(rps))),
            ),
            _ => (None, None),
        };

        Ok(Self {
            client,
            request_count: Arc::new(AtomicU64::new(0)),
            rate_limiter,
            rate_limit_delay,
            max_retries: config.max_retries.max(1),
        })
    }

    /// Sends a GET request with rate limiting and retry logic
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request_with_retry(|| self.client.get(url)).await
    }

    /// Fetches `url` and returns its body; a non-success status is an error
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(JsProbeError::FetchFailed(url.to_string(), format!("HTTP {status}")));
        }
        Ok(response.text().await?)
    }

    /// Returns the total number of requests made
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Executes a request with retry logic and rate limiting
    async fn request_with_retry<F>(&self, build_request: F) -> Result<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        // Apply rate limiting via simple delay
        let _permit = match (&self.rate_limiter, self.rate_limit_delay) {
            (Some(limiter), Some(delay)) => {
                let permit = limiter
                    .acquire()
                    .await
                    .map_err(|_| JsProbeError::RateLimitExceeded)?;
                sleep(delay).await;
                Some(permit)
            }
            _ => None,
        };

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                debug!("Retry attempt {attempt}, waiting {backoff:?}");
                sleep(backoff).await;
            }

            self.request_count.fetch_add(1, Ordering::Relaxed);

            match build_request().send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!("Response: {status} for {}", response.url());

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!("Rate limited by server, backing off");
                        last_error = Some(JsProbeError::RateLimitExceeded);
                        continue;
                    }
                    if status.is_server_error() && attempt + 1 < self.max_retries {
                        warn!("Server error {status} for {}, retrying", response.url());
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    warn!("Request failed (attempt {attempt}): {e}");
                    last_error = Some(JsProbeError::HttpError(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            JsProbeError::FetchFailed("request".to_string(), "max retries exceeded".to_string())
        }))
    }
}
