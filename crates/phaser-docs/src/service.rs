//! Request orchestration
//!
//! Each call runs `validate → fetch → sanitize → convert → paginate` once;
//! retries happen only inside the fetcher. The service keeps no state
//! between calls and can be shared freely across tasks.

use crate::api::{render_markdown, ApiExtractor};
use crate::client::{FetchClient, PageFetcher};
use crate::config::DocsConfig;
use crate::convert::{
    extract_title, filter_excessive_newlines, is_html, word_count, MarkdownConverter,
};
use crate::dom::parse_document;
use crate::error::{DocsError, Operation, ToolError};
use crate::paginate::Paginator;
use crate::sanitize::ContentSanitizer;
use crate::search::SearchIndex;
use crate::types::{ApiReferenceRecord, DocumentRecord, SearchHit};
use crate::DEFAULT_TITLE;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

/// Longest accepted class name, in characters
pub const MAX_CLASS_NAME_LENGTH: usize = 200;

/// Pipeline stage of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Fetching,
    Sanitizing,
    Converting,
    Paginating,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validate",
            Stage::Fetching => "fetch",
            Stage::Sanitizing => "sanitize",
            Stage::Converting => "convert",
            Stage::Paginating => "paginate",
            Stage::Done => "complete",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One paginated chunk of a documentation page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPage {
    pub url: String,
    pub title: String,
    /// Markdown chunk
    pub content: String,
    pub start_index: usize,
    pub has_more: bool,
    /// Offset to pass as `start_index` for the following chunk
    pub next_start_index: Option<usize>,
    /// Length of the whole converted page, in characters
    pub total_chars: usize,
}

impl ReadPage {
    /// Hint telling the caller how to continue, when there is more
    pub fn continuation_note(&self) -> Option<String> {
        self.next_start_index.map(|next| {
            format!(
                "[Content truncated. Use start_index={} to continue reading.]",
                next
            )
        })
    }
}

/// Orchestrates fetching, conversion, extraction and pagination
#[derive(Clone)]
pub struct DocsService {
    fetcher: Arc<dyn PageFetcher>,
    sanitizer: ContentSanitizer,
    extractor: ApiExtractor,
    index: SearchIndex,
}

impl fmt::Debug for DocsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocsService")
            .field("base", &self.fetcher.validator().base().as_str())
            .finish_non_exhaustive()
    }
}

impl DocsService {
    /// Build a service over any page source
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        let index = SearchIndex::new(fetcher.validator().base().clone());
        Self {
            fetcher,
            sanitizer: ContentSanitizer::new(),
            extractor: ApiExtractor::new(),
            index,
        }
    }

    /// Build a service backed by a [`FetchClient`]
    pub fn from_config(config: Arc<DocsConfig>) -> Result<Self, DocsError> {
        Ok(Self::new(Arc::new(FetchClient::new(config)?)))
    }

    /// Base URL relative paths are resolved against
    pub fn base_url(&self) -> &Url {
        self.fetcher.validator().base()
    }

    /// Fetch a page and convert it to Markdown
    pub async fn fetch_document(&self, url: &str) -> Result<DocumentRecord, DocsError> {
        self.fetch_document_with(url, &mut |_| {}).await
    }

    async fn fetch_document_with<F>(
        &self,
        url: &str,
        on_stage: &mut F,
    ) -> Result<DocumentRecord, DocsError>
    where
        F: FnMut(Stage) + Send,
    {
        enter(on_stage, Stage::Validating, url);
        let target = self.fetcher.validator().validate(url)?;

        enter(on_stage, Stage::Fetching, target.as_str());
        let result = self.fetcher.fetch(target.as_str()).await?;
        let body = result.text();

        let (title, markdown) = if is_html(&result.content_type, &body) {
            enter(on_stage, Stage::Sanitizing, &result.final_url);
            let document = parse_document(&body);
            let title = extract_title(&document);
            let content = self.sanitizer.sanitize(&document);

            enter(on_stage, Stage::Converting, &result.final_url);
            let converter = match Url::parse(&result.final_url) {
                Ok(base) => MarkdownConverter::with_base_url(base),
                Err(_) => MarkdownConverter::new(),
            };
            (title, converter.convert(&content))
        } else {
            enter(on_stage, Stage::Converting, &result.final_url);
            (DEFAULT_TITLE.to_string(), filter_excessive_newlines(&body))
        };

        Ok(DocumentRecord {
            url: result.final_url,
            title,
            word_count: word_count(&markdown),
            markdown_content: markdown,
            content_type: result.content_type,
            retrieved_at: Utc::now(),
        })
    }

    /// Read one chunk of a page as Markdown
    pub async fn read_documentation(
        &self,
        url: &str,
        max_length: i64,
        start_index: i64,
    ) -> Result<String, ToolError> {
        self.read_documentation_page(url, max_length, start_index)
            .await
            .map(|page| page.content)
    }

    /// Read one chunk of a page, with pagination metadata
    pub async fn read_documentation_page(
        &self,
        url: &str,
        max_length: i64,
        start_index: i64,
    ) -> Result<ReadPage, ToolError> {
        self.read_documentation_with(url, max_length, start_index, |_| {})
            .await
    }

    /// Like [`read_documentation_page`](Self::read_documentation_page), reporting
    /// each stage to `on_stage`
    pub async fn read_documentation_with<F>(
        &self,
        url: &str,
        max_length: i64,
        start_index: i64,
        mut on_stage: F,
    ) -> Result<ReadPage, ToolError>
    where
        F: FnMut(Stage) + Send,
    {
        let result = self
            .read_inner(url, max_length, start_index, &mut on_stage)
            .await;
        match result {
            Ok(page) => {
                enter(&mut on_stage, Stage::Done, &page.url);
                info!(
                    url = %page.url,
                    start_index = page.start_index,
                    chars = page.content.chars().count(),
                    has_more = page.has_more,
                    "Read documentation"
                );
                Ok(page)
            }
            Err(e) => {
                enter(&mut on_stage, Stage::Failed, url);
                error!(url = %url, error = %e, "Failed to read documentation");
                Err(ToolError::new(Operation::ReadDocumentation, e))
            }
        }
    }

    async fn read_inner<F>(
        &self,
        url: &str,
        max_length: i64,
        start_index: i64,
        on_stage: &mut F,
    ) -> Result<ReadPage, DocsError>
    where
        F: FnMut(Stage) + Send,
    {
        // Parameters are rejected before any network activity
        Paginator::check(start_index, max_length)?;

        let record = self.fetch_document_with(url, on_stage).await?;

        enter(on_stage, Stage::Paginating, &record.url);
        let chunk = Paginator::slice(&record.markdown_content, start_index, max_length)?;

        Ok(ReadPage {
            next_start_index: chunk.next_start_index(),
            url: record.url,
            title: record.title,
            content: chunk.text,
            start_index: chunk.start_index,
            has_more: chunk.has_more,
            total_chars: chunk.total_chars,
        })
    }

    /// Rank known documentation pages for `query`
    ///
    /// Never touches the network.
    pub fn search_documentation(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, ToolError> {
        self.index.search(query, limit).map_err(|e| {
            error!(error = %e, "Failed to search documentation");
            ToolError::new(Operation::SearchDocumentation, e)
        })
    }

    /// API reference for a class, rendered as Markdown
    pub async fn get_api_reference(&self, class_name: &str) -> Result<String, ToolError> {
        self.api_reference_record(class_name)
            .await
            .map(|record| render_markdown(&record))
    }

    /// API reference for a class
    ///
    /// Tries the candidate API pages in order, moving on only when a page
    /// does not exist.
    pub async fn api_reference_record(
        &self,
        class_name: &str,
    ) -> Result<ApiReferenceRecord, ToolError> {
        self.lookup_class(class_name).await.map_err(|e| {
            error!(class_name = %class_name, error = %e, "Failed to get API reference");
            ToolError::new(Operation::GetApiReference, e)
        })
    }

    async fn lookup_class(&self, class_name: &str) -> Result<ApiReferenceRecord, DocsError> {
        let name = sanitize_class_name(class_name)?;

        for candidate in candidate_paths(&name) {
            let url = self
                .base_url()
                .join(&candidate)
                .map_err(|e| DocsError::InvalidUrl(e.to_string()))?;
            debug!(class_name = %name, url = %url, "Trying API page");

            match self.fetcher.fetch(url.as_str()).await {
                Ok(result) => {
                    let document = self.sanitizer.strip_unsafe(&parse_document(&result.text()));
                    let record = self.extractor.extract(&document, &result.final_url)?;
                    info!(
                        class_name = %record.class_name,
                        url = %record.url,
                        "Retrieved API reference"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DocsError::ClassNotFound(name))
    }
}

fn enter<F: FnMut(Stage)>(on_stage: &mut F, stage: Stage, url: &str) {
    debug!(stage = %stage, url = %url, "Pipeline stage");
    on_stage(stage);
}

/// Strip control characters and check the class name's character set
pub fn sanitize_class_name(class_name: &str) -> Result<String, DocsError> {
    let cleaned: String = class_name.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(DocsError::InvalidArgument(
            "class_name cannot be empty".to_string(),
        ));
    }
    if cleaned.chars().count() > MAX_CLASS_NAME_LENGTH {
        return Err(DocsError::InvalidArgument(format!(
            "class_name must be at most {} characters",
            MAX_CLASS_NAME_LENGTH
        )));
    }
    if !cleaned
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '_')
    {
        return Err(DocsError::InvalidArgument(format!(
            "class_name may only contain letters, digits, '.' and '_': {}",
            cleaned
        )));
    }
    Ok(cleaned.to_string())
}

/// API page paths to try, most specific first
fn candidate_paths(name: &str) -> Vec<String> {
    let mut paths = vec![format!("api/{}", name)];
    if !name.starts_with("Phaser.") {
        paths.push(format!("api/Phaser.{}", name));
        paths.push(format!("api/Phaser.GameObjects.{}", name));
        paths.push(format!("api/Phaser.Scene.{}", name));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchResult;
    use crate::validator::UrlValidator;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned pages; everything else is a 404
    struct StubFetcher {
        validator: UrlValidator,
        pages: HashMap<String, (&'static str, String)>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                validator: UrlValidator::new(Arc::new(DocsConfig::default())).unwrap(),
                pages: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn page(mut self, url: &str, content_type: &'static str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), (content_type, body.into()));
            self
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResult, DocsError> {
            let url = self.validator.validate(url)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url.as_str()) {
                Some((content_type, body)) => Ok(FetchResult {
                    url: url.to_string(),
                    status_code: 200,
                    body: Bytes::from(body.clone()),
                    content_type: content_type.to_string(),
                    final_url: url.to_string(),
                }),
                None => Err(DocsError::NotFound {
                    url: url.to_string(),
                }),
            }
        }

        fn validator(&self) -> &UrlValidator {
            &self.validator
        }
    }

    fn service(stub: StubFetcher) -> (DocsService, Arc<StubFetcher>) {
        let stub = Arc::new(stub);
        (DocsService::new(stub.clone()), stub)
    }

    const SAMPLE_URL: &str = "https://docs.phaser.io/phaser/sample";

    fn sample_page() -> String {
        format!(
            "<html><head><title>Sample - Phaser</title></head><body><nav>Menu</nav><main><p>{}</p></main></body></html>",
            "abcdefghij".repeat(25)
        )
    }

    #[tokio::test]
    async fn test_read_documentation_paginates() {
        let (service, _) = service(StubFetcher::new().page(SAMPLE_URL, "text/html", sample_page()));
        let full = "abcdefghij".repeat(25);

        let first = service
            .read_documentation_page(SAMPLE_URL, 100, 0)
            .await
            .unwrap();
        assert_eq!(first.content, full[..100]);
        assert!(first.has_more);
        assert_eq!(first.next_start_index, Some(100));
        assert_eq!(first.total_chars, 250);
        assert_eq!(first.title, "Sample");

        let second = service
            .read_documentation_page(SAMPLE_URL, 100, 100)
            .await
            .unwrap();
        assert_eq!(second.content, full[100..200]);
        assert!(second.has_more);

        let third = service
            .read_documentation_page(SAMPLE_URL, 100, 200)
            .await
            .unwrap();
        assert_eq!(third.content, full[200..]);
        assert_eq!(third.content.chars().count(), 50);
        assert!(!third.has_more);
        assert_eq!(third.next_start_index, None);
        assert_eq!(third.continuation_note(), None);

        assert_eq!(
            first.continuation_note().as_deref(),
            Some("[Content truncated. Use start_index=100 to continue reading.]")
        );
    }

    #[tokio::test]
    async fn test_read_relative_url() {
        let (service, _) = service(StubFetcher::new().page(SAMPLE_URL, "text/html", sample_page()));
        let content = service
            .read_documentation("/phaser/sample", 5000, 0)
            .await
            .unwrap();
        assert_eq!(content, "abcdefghij".repeat(25));
    }

    #[tokio::test]
    async fn test_read_plain_text() {
        let (service, _) = service(StubFetcher::new().page(
            SAMPLE_URL,
            "text/plain; charset=utf-8",
            "line one\r\n\r\n\r\n\r\nline two",
        ));
        let record = service.fetch_document(SAMPLE_URL).await.unwrap();
        assert_eq!(record.markdown_content, "line one\n\nline two");
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(record.word_count, 4);
    }

    #[tokio::test]
    async fn test_read_untyped_html_fragment() {
        let (service, _) = service(StubFetcher::new().page(
            SAMPLE_URL,
            "",
            "  <div class=\"content\"><h2>Loader</h2><p>Loads <b>assets</b>.</p></div>",
        ));
        let record = service.fetch_document(SAMPLE_URL).await.unwrap();
        assert_eq!(record.markdown_content, "## Loader\n\nLoads **assets**.");
        assert_eq!(record.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_read_rejects_bad_parameters_without_fetching() {
        let (service, stub) = service(StubFetcher::new().page(SAMPLE_URL, "text/html", sample_page()));

        let err = service
            .read_documentation(SAMPLE_URL, 0, 0)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Failed to read documentation: max_length must be positive"
        );

        let err = service
            .read_documentation(SAMPLE_URL, 100, -1)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = service
            .read_documentation("https://evil.example.com/", 100, 0)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Failed to read documentation: "));

        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_missing_page_is_not_found() {
        let (service, _) = service(StubFetcher::new());
        let err = service
            .read_documentation("https://docs.phaser.io/missing", 100, 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Failed to read documentation: Page not found: https://docs.phaser.io/missing"
        );
    }

    #[tokio::test]
    async fn test_stages_reported_in_order() {
        let (service, _) = service(StubFetcher::new().page(SAMPLE_URL, "text/html", sample_page()));
        let mut stages = Vec::new();
        service
            .read_documentation_with(SAMPLE_URL, 100, 0, |stage| stages.push(stage))
            .await
            .unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::Validating,
                Stage::Fetching,
                Stage::Sanitizing,
                Stage::Converting,
                Stage::Paginating,
                Stage::Done
            ]
        );

        let mut stages = Vec::new();
        let _ = service
            .read_documentation_with("https://docs.phaser.io/missing", 100, 0, |stage| {
                stages.push(stage)
            })
            .await;
        assert_eq!(stages.last(), Some(&Stage::Failed));
    }

    #[tokio::test]
    async fn test_empty_search_fails_before_network() {
        let (service, stub) = service(StubFetcher::new());
        let err = service.search_documentation("", 10).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Failed to search documentation: Search query cannot be empty"
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_uses_base_url() {
        let (service, _) = service(StubFetcher::new());
        let hits = service.search_documentation("tilemap", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://docs.phaser.io/tilemaps");
    }

    const SPRITE_PAGE: &str = r#"<html><body>
        <h1>Phaser.GameObjects.Sprite</h1>
        <p>A Sprite Game Object.</p>
        <h2>Methods</h2>
        <h3>setTexture</h3><h3>setPosition</h3><h3>play</h3>
        </body></html>"#;

    #[tokio::test]
    async fn test_api_reference_tries_candidates_in_order() {
        let (service, stub) = service(StubFetcher::new().page(
            "https://docs.phaser.io/api/Phaser.GameObjects.Sprite",
            "text/html",
            SPRITE_PAGE,
        ));
        let record = service.api_reference_record("Sprite").await.unwrap();
        assert_eq!(record.class_name, "Phaser.GameObjects.Sprite");
        assert_eq!(record.methods, vec!["setTexture", "setPosition", "play"]);
        assert_eq!(record.url, "https://docs.phaser.io/api/Phaser.GameObjects.Sprite");
        // api/Sprite, api/Phaser.Sprite, then the hit
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);

        let markdown = service.get_api_reference("Sprite").await.unwrap();
        assert!(markdown.starts_with("# Phaser.GameObjects.Sprite"));
        assert!(markdown.contains("## Methods\n\n- setTexture\n- setPosition\n- play"));
    }

    #[tokio::test]
    async fn test_api_reference_qualified_name_single_candidate() {
        let (service, stub) = service(StubFetcher::new());
        let err = service
            .get_api_reference("Phaser.Nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Failed to get API reference: Class not found: Phaser.Nope"
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_reference_all_candidates_missing() {
        let (service, stub) = service(StubFetcher::new());
        let err = service.get_api_reference("Nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_api_reference_page_without_heading() {
        let (service, _) = service(StubFetcher::new().page(
            "https://docs.phaser.io/api/Thing",
            "text/html",
            "<html><body><p>No heading here</p></body></html>",
        ));
        let err = service.get_api_reference("Thing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_api_reference_validation() {
        let (service, stub) = service(StubFetcher::new());
        let long = "A".repeat(201);
        for name in ["", "   ", "Sprite/../../etc", "a b", long.as_str()] {
            let err = service.get_api_reference(name).await.unwrap_err();
            assert!(err.is_validation(), "{:?} should be rejected", name);
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_candidate_paths() {
        assert_eq!(
            candidate_paths("Sprite"),
            vec![
                "api/Sprite",
                "api/Phaser.Sprite",
                "api/Phaser.GameObjects.Sprite",
                "api/Phaser.Scene.Sprite"
            ]
        );
        assert_eq!(candidate_paths("Phaser.Scene"), vec!["api/Phaser.Scene"]);
    }

    #[test]
    fn test_sanitize_class_name() {
        assert_eq!(sanitize_class_name("  Sprite\u{0} ").unwrap(), "Sprite");
        assert_eq!(
            sanitize_class_name("Phaser.GameObjects.Sprite").unwrap(),
            "Phaser.GameObjects.Sprite"
        );
        assert!(sanitize_class_name("<script>").is_err());
    }
}
