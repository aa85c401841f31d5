//! Phaser Docs - Phaser documentation retrieval for AI agents
//!
//! This crate fetches pages from the Phaser documentation site, strips site
//! chrome, and converts them to markdown suitable for LLM consumption.
//!
//! ## Pipeline
//!
//! Every request goes through the same stages:
//! [`UrlValidator`] → [`FetchClient`] (with [`RetryPolicy`]) → sanitizer →
//! [`MarkdownConverter`] or [`ApiExtractor`] → [`Paginator`].
//!
//! The [`DocsService`] composes the stages; [`Tool`] exposes them as the three
//! agent-facing tools `read_documentation`, `search_documentation` and
//! `get_api_reference`.

pub mod api;
pub mod client;
pub mod config;
pub mod convert;
pub mod dom;
mod error;
pub mod paginate;
pub mod retry;
pub mod sanitize;
pub mod search;
pub mod service;
mod tool;
mod types;
pub mod validator;

pub use api::{render_markdown, ApiExtractor};
pub use client::{FetchClient, PageFetcher};
pub use config::DocsConfig;
pub use convert::{html_to_markdown, MarkdownConverter};
pub use error::{DocsError, Operation, ToolError};
pub use paginate::{Chunk, Paginator};
pub use retry::{RetryPolicy, RetryState};
pub use service::{DocsService, ReadPage, Stage};
pub use tool::{
    Tool, ToolBuilder, ToolDefinition, ToolStatus, GET_API_REFERENCE, READ_DOCUMENTATION,
    SEARCH_DOCUMENTATION,
};
pub use types::{
    ApiReferenceRecord, ApiReferenceRequest, DocumentRecord, FetchResult,
    ReadDocumentationRequest, SearchDocumentationRequest, SearchHit,
};
pub use validator::UrlValidator;

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str = "PhaserDocs/1.0 (Documentation Access Bot)";

/// Title used when a page has none
pub const DEFAULT_TITLE: &str = "Phaser Documentation";

/// Description of the `read_documentation` tool
pub const READ_DOCUMENTATION_DESCRIPTION: &str = r#"Read a Phaser documentation page and convert it to markdown.

- Accepts absolute URLs on the Phaser documentation site or paths relative to it
- Strips navigation, scripts and other page chrome
- Long pages are paginated: pass the returned next start_index to continue"#;

/// Description of the `search_documentation` tool
pub const SEARCH_DOCUMENTATION_DESCRIPTION: &str = r#"Search the Phaser documentation.

- Returns ranked results with title, URL and snippet
- Matches against page titles and topic keywords"#;

/// Description of the `get_api_reference` tool
pub const API_REFERENCE_DESCRIPTION: &str = r#"Get the API reference for a Phaser class.

- Accepts a class name such as "Sprite" or "Phaser.Scene"
- Returns the class description, methods, properties and examples as markdown"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# Phaser Docs Tools

Retrieve documentation for the Phaser HTML5 game framework.

## Tools

### read_documentation
Fetch a documentation page as markdown.
- `url` (required): Page URL, absolute (https://docs.phaser.io/...) or relative to the docs site
- `max_length` (optional): Maximum characters to return (default: 5000)
- `start_index` (optional): Character offset to start from (default: 0)

When the page is longer than `max_length`, the output ends with a note
giving the `start_index` to request next.

### search_documentation
Search documentation pages by topic.
- `query` (required): Search terms, at most 200 characters
- `limit` (optional): Maximum results, 1-100 (default: 10)

Returns a JSON array of `{rank, url, title, snippet, relevance_score}` objects.

### get_api_reference
Get the API reference for a class.
- `class_name` (required): Class name, e.g. "Sprite", "Phaser.GameObjects.Sprite"

## Examples

### Read the getting started guide
```json
{"url": "https://docs.phaser.io/phaser/getting-started/what-is-phaser"}
```

### Continue reading a long page
```json
{"url": "/phaser/concepts/scenes", "max_length": 5000, "start_index": 5000}
```

### Search for physics docs
```json
{"query": "arcade physics collision", "limit": 5}
```

### Look up a class
```json
{"class_name": "Sprite"}
```

## Error Handling
- URLs outside the Phaser documentation domains are rejected
- Missing pages return "Page not found"
- Network failures are retried with exponential backoff before failing
"#;
