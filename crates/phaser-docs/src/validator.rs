//! Pre-flight URL validation
//!
//! Every URL is checked here before the fetch client sees it: scheme, host
//! allow-list, path traversal, and a handful of injection patterns. Relative
//! URLs are resolved against the configured base URL first.

use crate::config::DocsConfig;
use crate::error::DocsError;
use std::sync::Arc;
use tracing::warn;
use url::{ParseError, Url};

/// Longest URL accepted
pub const MAX_URL_LENGTH: usize = 2048;

const SUSPICIOUS_QUERY_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file:"];
const SUSPICIOUS_FRAGMENT_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];
const ENCODED_ATTACKS: &[&str] = &["%00", "%2e%2e", "%2f%2f"];

/// Validates URLs against the configured base URL and domain allow-list
#[derive(Debug, Clone)]
pub struct UrlValidator {
    config: Arc<DocsConfig>,
    base: Url,
}

impl UrlValidator {
    /// Create a validator; fails if the configured base URL does not parse
    pub fn new(config: Arc<DocsConfig>) -> Result<Self, DocsError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| DocsError::InvalidUrl(format!("base URL {}: {}", config.base_url, e)))?;
        Ok(Self { config, base })
    }

    /// Base URL used for relative resolution
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve (if relative) and validate a URL
    pub fn validate(&self, input: &str) -> Result<Url, DocsError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(DocsError::InvalidUrl("URL cannot be empty".to_string()));
        }

        if raw.len() > MAX_URL_LENGTH {
            security_event(
                "EXCESSIVE_URL_LENGTH",
                &format!("URL too long: {} characters", raw.len()),
                raw,
            );
            return Err(DocsError::InvalidUrl(format!(
                "URL exceeds {} characters",
                MAX_URL_LENGTH
            )));
        }

        let lower = raw.to_ascii_lowercase();
        if let Some(pattern) = ENCODED_ATTACKS.iter().find(|p| lower.contains(*p)) {
            security_event(
                "ENCODED_ATTACK_ATTEMPT",
                "Potentially malicious encoded characters detected",
                raw,
            );
            return Err(DocsError::InvalidUrl(format!(
                "URL contains disallowed encoded sequence {}: {}",
                pattern, raw
            )));
        }

        let url = match Url::parse(raw) {
            Ok(url) => {
                if has_traversal_segment(raw) {
                    security_event("PATH_TRAVERSAL_ATTEMPT", "Path traversal attempt detected", raw);
                    return Err(DocsError::InvalidUrl(format!(
                        "path traversal is not allowed: {}",
                        raw
                    )));
                }
                url
            }
            Err(ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(raw)
                .map_err(|e| DocsError::InvalidUrl(format!("{}: {}", raw, e)))?,
            Err(e) => return Err(DocsError::InvalidUrl(format!("{}: {}", raw, e))),
        };

        self.check_target(&url)?;

        if let Some(query) = url.query() {
            let query = query.to_ascii_lowercase();
            if let Some(scheme) = SUSPICIOUS_QUERY_SCHEMES.iter().find(|s| query.contains(*s)) {
                security_event(
                    "SUSPICIOUS_QUERY_PARAM",
                    &format!("Suspicious query parameter: {}", scheme),
                    raw,
                );
                return Err(DocsError::InvalidUrl(format!(
                    "suspicious query parameter {}: {}",
                    scheme, raw
                )));
            }
        }

        if let Some(fragment) = url.fragment() {
            let fragment = fragment.to_ascii_lowercase();
            if let Some(scheme) = SUSPICIOUS_FRAGMENT_SCHEMES
                .iter()
                .find(|s| fragment.contains(*s))
            {
                security_event(
                    "SUSPICIOUS_FRAGMENT",
                    &format!("Suspicious fragment scheme: {}", scheme),
                    raw,
                );
                return Err(DocsError::InvalidUrl(format!(
                    "suspicious fragment {}: {}",
                    scheme, raw
                )));
            }
        }

        Ok(url)
    }

    /// Scheme and host checks, shared with the redirect guard
    pub fn check_target(&self, url: &Url) -> Result<(), DocsError> {
        if !matches!(url.scheme(), "http" | "https") {
            security_event(
                "INVALID_SCHEME",
                &format!("Invalid URL scheme: {}", url.scheme()),
                url.as_str(),
            );
            return Err(DocsError::InvalidUrl(format!(
                "must start with http:// or https://: {}",
                url
            )));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => {
                return Err(DocsError::InvalidUrl(format!("missing host: {}", url)));
            }
        };

        if !self.config.is_allowed_host(host) {
            security_event(
                "DOMAIN_VIOLATION",
                &format!("URL not from allowed domains: {}", host),
                url.as_str(),
            );
            return Err(DocsError::InvalidUrl(format!(
                "domain {} is not allowed (allowed: {})",
                host,
                self.config.allowed_domains.join(", ")
            )));
        }

        Ok(())
    }
}

/// True if the raw (unnormalized) path of an absolute URL has a `..` segment
fn has_traversal_segment(raw: &str) -> bool {
    let after_scheme = match raw.find("://") {
        Some(pos) => &raw[pos + 3..],
        None => raw.split_once(':').map(|(_, rest)| rest).unwrap_or(raw),
    };
    let path_start = after_scheme.find(['/', '\\']).unwrap_or(after_scheme.len());
    let rest = &after_scheme[path_start..];
    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());

    rest[..path_end].split(['/', '\\']).any(|segment| {
        segment == ".." || segment.eq_ignore_ascii_case(".%2e") || segment.eq_ignore_ascii_case("%2e.")
    })
}

fn security_event(event: &str, details: &str, url: &str) {
    warn!(event = event, url = url, "SECURITY_EVENT: {}", details);
}
