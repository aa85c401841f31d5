//! Tool builder and contract for the documentation tools

use crate::client::{FetchClient, PageFetcher};
use crate::config::DocsConfig;
use crate::error::{DocsError, ToolError};
use crate::service::{DocsService, ReadPage, Stage};
use crate::types::{
    ApiReferenceRecord, ApiReferenceRequest, ReadDocumentationRequest, SearchDocumentationRequest,
    SearchHit,
};
use crate::{
    API_REFERENCE_DESCRIPTION, READ_DOCUMENTATION_DESCRIPTION, SEARCH_DOCUMENTATION_DESCRIPTION,
    TOOL_LLMTXT,
};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Tool name of [`Tool::read_documentation`]
pub const READ_DOCUMENTATION: &str = "read_documentation";
/// Tool name of [`Tool::search_documentation`]
pub const SEARCH_DOCUMENTATION: &str = "search_documentation";
/// Tool name of [`Tool::get_api_reference`]
pub const GET_API_REFERENCE: &str = "get_api_reference";

/// Status update during tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Current phase (e.g., "validate", "fetch", "convert", "paginate")
    pub phase: String,
    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Estimated completion percentage (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<f32>,
}

impl ToolStatus {
    /// Create a new status with phase
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            message: None,
            percent_complete: None,
        }
    }

    /// Set message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set completion percentage
    pub fn with_percent(mut self, percent: f32) -> Self {
        self.percent_complete = Some(percent);
        self
    }
}

impl From<Stage> for ToolStatus {
    fn from(stage: Stage) -> Self {
        let status = ToolStatus::new(stage.to_string());
        let (message, percent) = match stage {
            Stage::Validating => ("Validating URL", Some(0.0)),
            Stage::Fetching => ("Fetching page", Some(10.0)),
            Stage::Sanitizing => ("Removing page chrome", Some(50.0)),
            Stage::Converting => ("Converting to markdown", Some(70.0)),
            Stage::Paginating => ("Selecting chunk", Some(90.0)),
            Stage::Done => ("Done", Some(100.0)),
            Stage::Failed => ("Request failed", None),
        };
        let status = status.with_message(message);
        match percent {
            Some(percent) => status.with_percent(percent),
            None => status,
        }
    }
}

/// Name, description and input schema of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Builder for configuring the documentation tools
#[derive(Debug, Clone, Default)]
pub struct ToolBuilder {
    config: DocsConfig,
}

impl ToolBuilder {
    /// Create a new tool builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: DocsConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the documentation base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Replace the domain allow-list
    pub fn allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Add a domain to the allow-list
    pub fn allowed_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.allowed_domains.push(domain.into());
        self
    }

    /// Accept subdomains of allowed domains
    pub fn allow_subdomains(mut self, allow: bool) -> Self {
        self.config.allow_subdomains = allow;
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the backoff base delay
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    /// Set the backoff cap
    pub fn retry_max_delay(mut self, delay: Option<Duration>) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    /// Set the maximum response size in bytes
    pub fn max_response_size(mut self, bytes: u64) -> Self {
        self.config.max_response_size = bytes;
        self
    }

    /// Set custom User-Agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Add a cookie sent with every request
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.cookies.insert(name.into(), value.into());
        self
    }

    /// Finish building without creating a client
    pub fn into_config(self) -> DocsConfig {
        self.config
    }

    /// Build the tool and its HTTP client
    pub fn build(self) -> Result<Tool, DocsError> {
        let config = Arc::new(self.config);
        let client = FetchClient::new(Arc::clone(&config))?;
        Ok(Tool {
            service: DocsService::new(Arc::new(client.clone())),
            client: Some(client),
        })
    }
}

/// Configured documentation tools
#[derive(Debug, Clone)]
pub struct Tool {
    service: DocsService,
    client: Option<FetchClient>,
}

impl Tool {
    /// Create a new tool builder
    pub fn builder() -> ToolBuilder {
        ToolBuilder::new()
    }

    /// Tools over a custom page source; health checks are unavailable
    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            service: DocsService::new(fetcher),
            client: None,
        }
    }

    /// Underlying orchestrator
    pub fn service(&self) -> &DocsService {
        &self.service
    }

    /// Effective configuration, when backed by a [`FetchClient`]
    pub fn config(&self) -> Option<&DocsConfig> {
        self.client.as_ref().map(FetchClient::config)
    }

    /// Get system prompt (empty for these tools)
    pub fn system_prompt(&self) -> &'static str {
        ""
    }

    /// Get full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    /// Definitions of all three tools, in listing order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        [READ_DOCUMENTATION, SEARCH_DOCUMENTATION, GET_API_REFERENCE]
            .into_iter()
            .filter_map(|name| {
                Some(ToolDefinition {
                    name,
                    description: self.description(name)?,
                    input_schema: self.input_schema(name)?,
                })
            })
            .collect()
    }

    /// Description of a tool by name
    pub fn description(&self, name: &str) -> Option<&'static str> {
        match name {
            READ_DOCUMENTATION => Some(READ_DOCUMENTATION_DESCRIPTION),
            SEARCH_DOCUMENTATION => Some(SEARCH_DOCUMENTATION_DESCRIPTION),
            GET_API_REFERENCE => Some(API_REFERENCE_DESCRIPTION),
            _ => None,
        }
    }

    /// Get input schema of a tool as JSON
    pub fn input_schema(&self, name: &str) -> Option<Value> {
        let schema = match name {
            READ_DOCUMENTATION => schema_for!(ReadDocumentationRequest),
            SEARCH_DOCUMENTATION => schema_for!(SearchDocumentationRequest),
            GET_API_REFERENCE => schema_for!(ApiReferenceRequest),
            _ => return None,
        };
        Some(serde_json::to_value(schema).unwrap_or_default())
    }

    /// Get output schema of a tool as JSON
    pub fn output_schema(&self, name: &str) -> Option<Value> {
        let schema = match name {
            READ_DOCUMENTATION => schema_for!(String),
            SEARCH_DOCUMENTATION => schema_for!(Vec<SearchHit>),
            GET_API_REFERENCE => schema_for!(ApiReferenceRecord),
            _ => return None,
        };
        Some(serde_json::to_value(schema).unwrap_or_default())
    }

    /// Read one chunk of a documentation page
    pub async fn read_documentation(
        &self,
        req: ReadDocumentationRequest,
    ) -> Result<ReadPage, ToolError> {
        self.service
            .read_documentation_page(&req.url, req.max_length, req.start_index)
            .await
    }

    /// Read one chunk of a documentation page with status updates
    pub async fn read_documentation_with_status<F>(
        &self,
        req: ReadDocumentationRequest,
        mut status_callback: F,
    ) -> Result<ReadPage, ToolError>
    where
        F: FnMut(ToolStatus) + Send,
    {
        self.service
            .read_documentation_with(&req.url, req.max_length, req.start_index, |stage| {
                status_callback(ToolStatus::from(stage))
            })
            .await
    }

    /// Search the documentation
    pub fn search_documentation(
        &self,
        req: SearchDocumentationRequest,
    ) -> Result<Vec<SearchHit>, ToolError> {
        self.service.search_documentation(&req.query, req.limit)
    }

    /// API reference for a class, as Markdown
    pub async fn get_api_reference(&self, req: ApiReferenceRequest) -> Result<String, ToolError> {
        self.service.get_api_reference(&req.class_name).await
    }

    /// HEAD the documentation site; returns the status when healthy
    pub async fn health_check(&self) -> Result<u16, DocsError> {
        match self.client {
            Some(ref client) => client.health_check().await,
            None => Err(DocsError::Request(
                "health check needs an HTTP-backed tool".to_string(),
            )),
        }
    }
}
