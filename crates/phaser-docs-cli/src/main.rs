//! Phaser Docs CLI - Command-line interface and MCP server for Phaser documentation

mod mcp;

use clap::{Args, Parser, Subcommand};
use phaser_docs::{
    ApiReferenceRequest, DocsConfig, ReadDocumentationRequest, ReadPage,
    SearchDocumentationRequest, Tool, ToolBuilder, TOOL_LLMTXT,
};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Phaser Docs - AI-friendly Phaser documentation retrieval
#[derive(Parser, Debug)]
#[command(name = "phaser-docs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,

    /// Print server info and effective configuration
    #[arg(long)]
    info: bool,

    /// Check that the documentation site is reachable
    #[arg(long)]
    health_check: bool,

    #[command(flatten)]
    settings: Settings,
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
struct Settings {
    /// Log filter (e.g. "info", "phaser_docs=debug")
    #[arg(long, global = true, env = "PHASER_DOCS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "PHASER_DOCS_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Retries after the first attempt
    #[arg(long, global = true, env = "PHASER_DOCS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Maximum response size in bytes
    #[arg(
        long,
        global = true,
        env = "PHASER_DOCS_MAX_RESPONSE_SIZE",
        default_value_t = 1024 * 1024
    )]
    max_response_size: u64,

    /// Comma-separated list of allowed hostnames
    #[arg(
        long,
        global = true,
        env = "PHASER_DOCS_ALLOWED_DOMAINS",
        value_delimiter = ','
    )]
    allowed_domains: Vec<String>,

    /// Base URL of the documentation site
    #[arg(long, global = true, env = "PHASER_DOCS_BASE_URL")]
    base_url: Option<String>,

    /// Cookies sent with every request ("name=value; other=value")
    #[arg(long, global = true, env = "PHASER_DOCS_COOKIES")]
    cookies: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as MCP (Model Context Protocol) server over stdio
    Mcp,
    /// Read a documentation page as markdown with metadata frontmatter
    Read {
        /// URL or path relative to the base URL
        url: String,

        /// Maximum characters to return
        #[arg(long, default_value_t = 5000, allow_negative_numbers = true)]
        max_length: i64,

        /// Character offset to start from
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        start_index: i64,
    },
    /// Search the documentation catalogue
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, short, default_value_t = 10, allow_negative_numbers = true)]
        limit: i64,
    },
    /// Print the API reference of a class
    Api {
        /// Class name, e.g. "Sprite" or "Phaser.GameObjects.Sprite"
        class_name: String,
    },
}

impl Settings {
    /// Assemble the retrieval configuration from flags and environment
    fn to_config(&self) -> Result<DocsConfig, String> {
        let mut builder = ToolBuilder::new()
            .timeout(Duration::from_secs(self.timeout))
            .max_retries(self.max_retries)
            .max_response_size(self.max_response_size);

        if let Some(ref base_url) = self.base_url {
            builder = builder.base_url(base_url.trim());
        }

        let domains: Vec<&str> = self
            .allowed_domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect();
        if !domains.is_empty() {
            builder = builder.allowed_domains(domains);
        }

        if let Some(ref cookies) = self.cookies {
            for (name, value) in parse_cookies(cookies)? {
                builder = builder.cookie(name, value);
            }
        }

        let config = builder.into_config();
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Parse "name=value; other=value" into a cookie map
fn parse_cookies(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut cookies = BTreeMap::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid cookie (expected name=value): {}", pair))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("Invalid cookie (empty name): {}", pair));
        }
        cookies.insert(name.to_string(), value.trim().to_string());
    }
    Ok(cookies)
}

fn init_logging(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    // stdout carries MCP traffic and command output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle --llmtxt flag
    if cli.llmtxt {
        writeln_safe(TOOL_LLMTXT);
        std::process::exit(0);
    }

    init_logging(cli.settings.log_level.as_deref());

    let config = cli.settings.to_config().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    let tool = ToolBuilder::new()
        .config(config.clone())
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    if cli.info {
        writeln_safe(&format_info(&config, &tool));
        std::process::exit(0);
    }

    if cli.health_check {
        run_health_check(&tool).await;
    }

    match cli.command {
        Some(Commands::Mcp) => {
            mcp::run_server(tool).await;
        }
        Some(Commands::Read {
            url,
            max_length,
            start_index,
        }) => {
            let request = ReadDocumentationRequest::new(url)
                .max_length(max_length)
                .start_index(start_index);
            match tool.read_documentation(request).await {
                Ok(page) => writeln_safe(&format_md_with_frontmatter(&page)),
                Err(e) => fail(e),
            }
        }
        Some(Commands::Search { query, limit }) => {
            let request = SearchDocumentationRequest::new(query).limit(limit);
            match tool.search_documentation(request) {
                Ok(hits) => {
                    let json = serde_json::to_string_pretty(&hits).unwrap_or_else(|e| {
                        eprintln!("Error serializing results: {}", e);
                        std::process::exit(1);
                    });
                    writeln_safe(&json);
                }
                Err(e) => fail(e),
            }
        }
        Some(Commands::Api { class_name }) => {
            match tool
                .get_api_reference(ApiReferenceRequest::new(class_name))
                .await
            {
                Ok(markdown) => writeln_safe(&markdown),
                Err(e) => fail(e),
            }
        }
        None => {
            eprintln!("Usage: phaser-docs read <URL>");
            eprintln!("   or: phaser-docs search <QUERY>");
            eprintln!("   or: phaser-docs api <CLASS>");
            eprintln!("   or: phaser-docs mcp");
            eprintln!("   or: phaser-docs --help");
            std::process::exit(1);
        }
    }
}

async fn run_health_check(tool: &Tool) {
    match tool.health_check().await {
        Ok(status) => {
            writeln_safe(&format!("healthy (HTTP {})", status));
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("unhealthy: {}", e);
            std::process::exit(1);
        }
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

/// Format a page chunk as markdown with YAML frontmatter
fn format_md_with_frontmatter(page: &ReadPage) -> String {
    let mut output = String::new();

    output.push_str("---\n");
    output.push_str(&format!("url: {}\n", page.url));
    output.push_str(&format!("title: {}\n", page.title));
    output.push_str(&format!("start_index: {}\n", page.start_index));
    output.push_str(&format!("total_chars: {}\n", page.total_chars));
    if let Some(next) = page.next_start_index {
        output.push_str(&format!("next_start_index: {}\n", next));
    }
    output.push_str("---\n");
    output.push_str(&page.content);

    if let Some(note) = page.continuation_note() {
        output.push_str("\n\n");
        output.push_str(&note);
    }

    output
}

/// Name, version, effective configuration and tools
fn format_info(config: &DocsConfig, tool: &Tool) -> String {
    let mut output = String::new();
    output.push_str(&format!("phaser-docs {}\n", env!("CARGO_PKG_VERSION")));
    output.push_str(&format!("base_url: {}\n", config.base_url));
    output.push_str(&format!(
        "allowed_domains: {}\n",
        config.allowed_domains.join(", ")
    ));
    output.push_str(&format!("timeout: {}s\n", config.timeout.as_secs()));
    output.push_str(&format!("max_retries: {}\n", config.max_retries));
    output.push_str(&format!(
        "max_response_size: {} bytes\n",
        config.max_response_size
    ));
    if !config.cookies.is_empty() {
        let names: Vec<&str> = config.cookies.keys().map(String::as_str).collect();
        output.push_str(&format!("cookies: {}\n", names.join(", ")));
    }
    output.push_str("tools:\n");
    for definition in tool.definitions() {
        output.push_str(&format!("  - {}\n", definition.name));
    }
    output.trim_end().to_string()
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
