//! Process-wide configuration for the retrieval pipeline
//!
//! Built once at startup (usually through [`ToolBuilder`](crate::ToolBuilder))
//! and shared read-only by every component. Nothing in the library reads
//! environment variables; the binary maps flags and env vars onto this struct.

use crate::error::DocsError;
use crate::DEFAULT_USER_AGENT;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Default documentation site
pub const DEFAULT_BASE_URL: &str = "https://docs.phaser.io";

/// Hosts permitted as fetch targets by default
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["docs.phaser.io", "phaser.io", "www.phaser.io"];

/// Default request timeout (connect + read)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for a single backoff sleep
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default response size cap (1 MiB)
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Retrieval configuration
#[derive(Debug, Clone)]
pub struct DocsConfig {
    /// Base URL used to resolve relative URLs and build API page URLs
    pub base_url: String,
    /// Hostnames permitted as fetch targets
    pub allowed_domains: Vec<String>,
    /// Also accept subdomains of allowed domains (suffix match)
    pub allow_subdomains: bool,
    /// Timeout for one request attempt (connect + read)
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base delay
    pub retry_base_delay: Duration,
    /// Backoff cap; `None` disables capping
    pub retry_max_delay: Option<Duration>,
    /// Maximum response body size in bytes
    pub max_response_size: u64,
    /// User-Agent header
    pub user_agent: String,
    /// Static cookies sent with every request
    pub cookies: BTreeMap<String, String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            allow_subdomains: false,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: Some(DEFAULT_RETRY_MAX_DELAY),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: BTreeMap::new(),
        }
    }
}

impl DocsConfig {
    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), DocsError> {
        if self.timeout.is_zero() {
            return Err(DocsError::InvalidArgument(
                "timeout must be positive".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(DocsError::InvalidArgument(
                "max_response_size must be positive".to_string(),
            ));
        }
        if self.allowed_domains.is_empty() {
            return Err(DocsError::InvalidArgument(
                "allowed_domains must not be empty".to_string(),
            ));
        }

        let base = Url::parse(&self.base_url)
            .map_err(|e| DocsError::InvalidUrl(format!("base URL {}: {}", self.base_url, e)))?;
        let host = base.host_str().unwrap_or_default();
        if !self.is_allowed_host(host) {
            return Err(DocsError::InvalidUrl(format!(
                "base URL must be from allowed domains: {}",
                self.allowed_domains.join(", ")
            )));
        }

        Ok(())
    }

    /// Exact host match, or suffix match when subdomains are allowed
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.allowed_domains.iter().any(|domain| {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            host == domain
                || (self.allow_subdomains
                    && host.len() > domain.len()
                    && host.ends_with(&domain)
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    /// Value for the `Cookie` request header, if any cookies are configured
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
