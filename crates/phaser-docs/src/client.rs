//! HTTP client for documentation pages
//!
//! [`FetchClient`] owns one connection pool for the life of the process and
//! wraps every request in URL validation, retry with backoff, and response
//! guards (status, size, content type, redirect target, challenge pages).
//! The [`PageFetcher`] trait is the seam the service depends on.

use crate::config::DocsConfig;
use crate::error::DocsError;
use crate::retry::{parse_retry_after, RetryPolicy, RetryState};
use crate::types::FetchResult;
use crate::validator::UrlValidator;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, COOKIE,
    RETRY_AFTER, USER_AGENT,
};
use reqwest::redirect;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Content types accepted as documentation
const ALLOWED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

/// Page titles of bot-protection interstitials served with HTTP 200
const CHALLENGE_TITLES: &[&str] = &["Just a moment...", "Attention Required! | Cloudflare"];

/// Elements only present on interstitials; script sources are never matched
const CHALLENGE_SELECTORS: &str = "#cf-browser-verification, form#challenge-form, \
     #challenge-running, #cf-challenge-running, iframe[src*=\"captcha-delivery.com\"]";

/// Cheap pre-check before parsing a body for challenge markers
const CHALLENGE_HINTS: &[&str] = &[
    "just a moment",
    "attention required",
    "cf-browser-verification",
    "challenge-form",
    "challenge-running",
    "captcha-delivery",
];

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.5";

/// Source of raw documentation pages
///
/// Implemented by [`FetchClient`] for real network access. Tests and
/// embedders can substitute their own implementation when constructing a
/// [`DocsService`](crate::DocsService).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Validate `url` (resolving it if relative) and fetch it
    async fn fetch(&self, url: &str) -> Result<FetchResult, DocsError>;

    /// Validator used to resolve and check URLs before fetching
    fn validator(&self) -> &UrlValidator;
}

/// HTTP client with retry, domain allow-listing and response guards
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    validator: UrlValidator,
    policy: RetryPolicy,
    config: Arc<DocsConfig>,
}

impl FetchClient {
    /// Build the client and its connection pool from `config`
    pub fn new(config: Arc<DocsConfig>) -> Result<Self, DocsError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|_| {
                DocsError::InvalidArgument(format!("invalid user agent: {}", config.user_agent))
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        if let Some(cookie) = config.cookie_header() {
            let mut value = HeaderValue::from_str(&cookie).map_err(|_| {
                DocsError::InvalidArgument("cookie values must be visible ASCII".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let validator = UrlValidator::new(Arc::clone(&config))?;
        let guard = validator.clone();
        let redirect_policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match guard.check_target(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .redirect(redirect_policy)
            .build()
            .map_err(DocsError::ClientBuild)?;

        Ok(Self {
            http,
            validator,
            policy: RetryPolicy::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &DocsConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// HEAD the base URL; healthy on any 2xx or 3xx
    ///
    /// Returns the status code when healthy. Not retried.
    pub async fn health_check(&self) -> Result<u16, DocsError> {
        let url = self.validator.base().clone();
        let response = self
            .http
            .head(url.clone())
            .send()
            .await
            .map_err(map_send_error)?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            info!(url = %url, status = status.as_u16(), "Health check passed");
            Ok(status.as_u16())
        } else {
            warn!(url = %url, status = status.as_u16(), "Health check failed");
            Err(status_error(status.as_u16(), url.as_str(), None))
        }
    }

    /// Fetch an already validated URL, retrying transient failures
    async fn fetch_with_retry(&self, url: &Url) -> Result<FetchResult, DocsError> {
        let mut state = RetryState::new();
        loop {
            debug!(
                url = %url,
                attempt = state.attempt + 1,
                max_attempts = self.policy.max_attempts(),
                "Fetching page"
            );

            let err = match self.fetch_once(url).await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            match state.record_failure(&self.policy, err) {
                Some(delay) => {
                    if let Some(ref last) = state.last_error {
                        warn!(
                            url = %url,
                            attempt = state.attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying after error: {}",
                            last
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let err = state.into_error();
                    error!(url = %url, "Fetch failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    /// One request attempt with all response guards applied
    async fn fetch_once(&self, url: &Url) -> Result<FetchResult, DocsError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        if !response.status().is_success() {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(status_error(status, url.as_str(), retry_after));
        }

        // Redirects are already guarded by the client policy
        self.validator.check_target(&final_url)?;

        let max = self.config.max_response_size;
        let content_length: Option<u64> = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        if let Some(size) = content_length {
            if size > max {
                warn!(url = %url, size, max, "Response exceeds size cap");
                return Err(DocsError::ContentTooLarge { size, max });
            }
        }

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_allowed_content_type(&content_type) {
            return Err(DocsError::UnsupportedContentType(content_type));
        }

        let body = read_body_limited(response, max).await?;

        if looks_like_challenge(&content_type, &body) {
            warn!(url = %url, "Received anti-bot challenge page");
            return Err(DocsError::ChallengePage {
                url: url.to_string(),
            });
        }

        debug!(url = %url, status, bytes = body.len(), "Fetched page");

        Ok(FetchResult {
            url: url.to_string(),
            status_code: status,
            body,
            content_type,
            final_url: final_url.to_string(),
        })
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(&self, url: &str) -> Result<FetchResult, DocsError> {
        let url = self.validator.validate(url)?;
        self.fetch_with_retry(&url).await
    }

    fn validator(&self) -> &UrlValidator {
        &self.validator
    }
}

/// Map a non-success status onto the error taxonomy
fn status_error(status: u16, url: &str, retry_after: Option<Duration>) -> DocsError {
    let url = url.to_string();
    match status {
        404 => DocsError::NotFound { url },
        401 | 403 => DocsError::Forbidden { status, url },
        429 => DocsError::RateLimited { url, retry_after },
        500..=599 => DocsError::ServerError {
            status,
            url,
            retry_after,
        },
        _ => DocsError::HttpStatus { status, url },
    }
}

fn map_send_error(err: reqwest::Error) -> DocsError {
    if err.is_redirect() {
        DocsError::InvalidUrl(err.to_string())
    } else {
        DocsError::from_reqwest(err)
    }
}

/// HTML, XHTML or plain text; a missing content type is tolerated
fn is_allowed_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.is_empty() || ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
}

fn looks_like_challenge(content_type: &str, body: &[u8]) -> bool {
    if content_type.to_ascii_lowercase().starts_with("text/plain") {
        return false;
    }
    let text = String::from_utf8_lossy(body);
    let lower = text.to_lowercase();
    if !CHALLENGE_HINTS.iter().any(|hint| lower.contains(hint)) {
        return false;
    }

    let document = Html::parse_document(&text);
    let title_matches = Selector::parse("title").is_ok_and(|title| {
        document.select(&title).any(|el| {
            let title = el.text().collect::<String>();
            CHALLENGE_TITLES.contains(&title.trim())
        })
    });
    title_matches
        || Selector::parse(CHALLENGE_SELECTORS)
            .is_ok_and(|markers| document.select(&markers).next().is_some())
}

/// Stream the body, failing as soon as it exceeds `max` bytes
async fn read_body_limited(response: reqwest::Response, max: u64) -> Result<Bytes, DocsError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(DocsError::from_reqwest)?;
        let size = (body.len() + bytes.len()) as u64;
        if size > max {
            warn!(size, max, "Response body exceeded size cap while streaming");
            return Err(DocsError::ContentTooLarge { size, max });
        }
        body.extend_from_slice(&bytes);
    }

    Ok(Bytes::from(body))
}
