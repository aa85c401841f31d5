//! Core types for Phaser documentation retrieval

use bytes::Bytes;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default `max_length` for `read_documentation`
pub const DEFAULT_MAX_LENGTH: i64 = 5000;

/// Default `limit` for `search_documentation`
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

fn default_max_length() -> i64 {
    DEFAULT_MAX_LENGTH
}

fn default_search_limit() -> i64 {
    DEFAULT_SEARCH_LIMIT
}

/// Request for the `read_documentation` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReadDocumentationRequest {
    /// Documentation page URL, absolute or relative to the docs site
    pub url: String,

    /// Maximum number of characters to return
    #[serde(default = "default_max_length")]
    pub max_length: i64,

    /// Character offset to start reading from
    #[serde(default)]
    pub start_index: i64,
}

impl ReadDocumentationRequest {
    /// Create a request with default pagination
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_length: DEFAULT_MAX_LENGTH,
            start_index: 0,
        }
    }

    /// Set the maximum chunk length
    pub fn max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the starting offset
    pub fn start_index(mut self, start_index: i64) -> Self {
        self.start_index = start_index;
        self
    }
}

/// Request for the `search_documentation` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocumentationRequest {
    /// Search terms
    pub query: String,

    /// Maximum number of results (1-100)
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

impl SearchDocumentationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Request for the `get_api_reference` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiReferenceRequest {
    /// Class name, e.g. "Sprite" or "Phaser.Scene"
    pub class_name: String,
}

impl ApiReferenceRequest {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

/// Raw HTTP result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Requested (validated) URL
    pub url: String,
    pub status_code: u16,
    pub body: Bytes,
    /// Content-Type header value, empty if absent
    pub content_type: String,
    /// URL after redirects
    pub final_url: String,
}

impl FetchResult {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A retrieved and converted documentation page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub url: String,
    pub title: String,
    /// Converted markdown; empty when nothing could be extracted
    pub markdown_content: String,
    pub content_type: String,
    pub retrieved_at: DateTime<Utc>,
    /// Whitespace-separated tokens in `markdown_content`
    pub word_count: usize,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    /// 1-based rank, best first
    pub rank: u32,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Opaque relevance in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Structured content of an API reference page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiReferenceRecord {
    pub class_name: String,
    pub url: String,
    pub description: String,
    /// Method names in document order
    pub methods: Vec<String>,
    /// Property names in document order
    pub properties: Vec<String>,
    /// Example code, verbatim, in document order
    pub examples: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_defaults() {
        let req: ReadDocumentationRequest =
            serde_json::from_str(r#"{"url": "https://docs.phaser.io/phaser"}"#).unwrap();
        assert_eq!(req.max_length, 5000);
        assert_eq!(req.start_index, 0);

        let req = ReadDocumentationRequest::new("/phaser")
            .max_length(100)
            .start_index(200);
        assert_eq!(req.max_length, 100);
        assert_eq!(req.start_index, 200);
    }

    #[test]
    fn test_search_request_defaults() {
        let req: SearchDocumentationRequest =
            serde_json::from_str(r#"{"query": "sprites"}"#).unwrap();
        assert_eq!(req.limit, 10);
        assert_eq!(SearchDocumentationRequest::new("x").limit(3).limit, 3);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        assert!(serde_json::from_str::<ApiReferenceRequest>("{}").is_err());
        assert!(serde_json::from_str::<ReadDocumentationRequest>(r#"{"max_length": 5}"#).is_err());
    }

    #[test]
    fn test_search_hit_serialization() {
        let hit = SearchHit {
            rank: 1,
            url: "https://docs.phaser.io/phaser/concepts/scenes".to_string(),
            title: "Scenes".to_string(),
            snippet: None,
            relevance_score: Some(0.7),
        };
        let json = serde_json::to_string(&hit).unwrap();
        assert!(json.contains("\"rank\":1"));
        // Optional None fields should be omitted
        assert!(!json.contains("snippet"));
    }

    #[test]
    fn test_fetch_result_text_is_lossy() {
        let result = FetchResult {
            url: "https://docs.phaser.io/".to_string(),
            status_code: 200,
            body: Bytes::from_static(b"caf\xc3\xa9 \xff"),
            content_type: "text/html".to_string(),
            final_url: "https://docs.phaser.io/".to_string(),
        };
        assert_eq!(result.text(), "café \u{fffd}");
    }
}
