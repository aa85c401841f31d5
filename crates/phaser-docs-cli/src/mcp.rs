//! MCP (Model Context Protocol) server implementation

use phaser_docs::{
    ApiReferenceRequest, ReadDocumentationRequest, SearchDocumentationRequest, Tool,
    GET_API_REFERENCE, READ_DOCUMENTATION, SEARCH_DOCUMENTATION,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

/// JSON-RPC 2.0 request
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Text content items of a tool result
fn text_content(texts: impl IntoIterator<Item = String>) -> Value {
    let content: Vec<Value> = texts
        .into_iter()
        .map(|text| json!({ "type": "text", "text": text }))
        .collect();
    json!({ "content": content })
}

fn error_content(message: impl std::fmt::Display) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": format!("Error: {}", message)
        }],
        "isError": true
    })
}

/// MCP Server implementation
struct McpServer {
    tool: Tool,
}

impl McpServer {
    fn new(tool: Tool) -> Self {
        Self { tool }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            _ => JsonRpcResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "phaser-docs",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = serde_json::to_value(self.tool.definitions()).unwrap_or(json!([]));
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        debug!(tool = %tool_name, "Tool call");

        let result = match tool_name.as_str() {
            READ_DOCUMENTATION => {
                let request: ReadDocumentationRequest = match parse_arguments(arguments) {
                    Ok(req) => req,
                    Err(message) => return JsonRpcResponse::error(id, -32602, message),
                };
                match self.tool.read_documentation(request).await {
                    Ok(page) => {
                        let note = page.continuation_note();
                        text_content(std::iter::once(page.content).chain(note))
                    }
                    Err(e) => error_content(e),
                }
            }
            SEARCH_DOCUMENTATION => {
                let request: SearchDocumentationRequest = match parse_arguments(arguments) {
                    Ok(req) => req,
                    Err(message) => return JsonRpcResponse::error(id, -32602, message),
                };
                match self.tool.search_documentation(request) {
                    Ok(hits) => match serde_json::to_string_pretty(&hits) {
                        Ok(text) => text_content([text]),
                        Err(e) => error_content(e),
                    },
                    Err(e) => error_content(e),
                }
            }
            GET_API_REFERENCE => {
                let request: ApiReferenceRequest = match parse_arguments(arguments) {
                    Ok(req) => req,
                    Err(message) => return JsonRpcResponse::error(id, -32602, message),
                };
                match self.tool.get_api_reference(request).await {
                    Ok(markdown) => text_content([markdown]),
                    Err(e) => error_content(e),
                }
            }
            _ => {
                return JsonRpcResponse::error(id, -32602, format!("Unknown tool: {}", tool_name))
            }
        };

        JsonRpcResponse::success(id, result)
    }
}

fn is_notification(request: &JsonRpcRequest) -> bool {
    request.id.is_none() || request.method.starts_with("notifications/")
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|e| format!("Invalid arguments: {}", e))
}

async fn write_response(stdout: &mut io::Stdout, response: &JsonRpcResponse) {
    let mut json = serde_json::to_string(response).unwrap_or_default();
    json.push('\n');
    if let Err(e) = stdout.write_all(json.as_bytes()).await {
        error!("Error writing to stdout: {}", e);
        return;
    }
    let _ = stdout.flush().await;
}

/// Run the MCP server over stdio
pub async fn run_server(tool: Tool) {
    let server = McpServer::new(tool);
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    info!("MCP server listening on stdio");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Error reading stdin: {}", e);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e));
                write_response(&mut stdout, &response).await;
                continue;
            }
        };

        // Notifications never get a response
        if is_notification(&request) {
            debug!(method = %request.method, "Notification received");
            continue;
        }

        let response = server.handle_request(request).await;
        write_response(&mut stdout, &response).await;
    }

    info!("MCP server stdin closed, shutting down");
}
