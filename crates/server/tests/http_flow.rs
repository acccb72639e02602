//! End-to-end flow over a live HTTP listener: initialize, list, call.

use std::sync::Arc;

use serde_json::{json, Value};

use gangway_core::{HttpConfig, McpConfig, TransportConfig};
use gangway_protocol::ToolSchema;
use gangway_protocol::{CallToolResult, ToolInfo};
use gangway_server::{McpServer, ToolError, ToolHandler};

struct AddTool;

#[async_trait::async_trait]
impl ToolHandler for AddTool {
    fn definition(&self) -> ToolInfo {
        ToolInfo {
            name: "add".to_string(),
            description: "Add two integers".to_string(),
            input_schema: ToolSchema::object()
                .property("a", "integer", "left operand")
                .property("b", "integer", "right operand")
                .required("a")
                .required("b")
                .to_value(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let a = arguments.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = arguments.get("b").and_then(Value::as_i64).unwrap_or(0);
        Ok(CallToolResult::text((a + b).to_string()))
    }
}

fn http_server(auth_token: Option<&str>) -> Arc<McpServer> {
    let config = McpConfig {
        transport: TransportConfig::Http(HttpConfig {
            port: 0,
            auth_token: auth_token.map(str::to_string),
            ..HttpConfig::default()
        }),
        ..McpConfig::default()
    };
    let server = Arc::new(McpServer::new(config));
    server.register_tool(Arc::new(AddTool)).unwrap();
    server
}

async fn rpc(client: &reqwest::Client, url: &str, body: Value) -> Value {
    let text = client
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let server = http_server(None);
    server.start().await.unwrap();
    let addr = server.http_addr().await.unwrap();
    let url = format!("http://{addr}/mcp");
    let client = reqwest::Client::new();

    let reply = rpc(
        &client,
        &url,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "itest"}
            }
        }),
    )
    .await;
    assert_eq!(reply["result"]["serverInfo"]["name"], "gangway");
    assert!(reply["result"]["capabilities"]["tools"].is_object());

    let reply = rpc(
        &client,
        &url,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "add"));

    let reply = rpc(
        &client,
        &url,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 5, "b": 3}}
        }),
    )
    .await;
    assert_eq!(reply["result"]["content"][0]["text"], "8");

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_http_auth_status_codes() {
    let server = http_server(Some("s3cret"));
    server.start().await.unwrap();
    let addr = server.http_addr().await.unwrap();
    let url = format!("http://{addr}/");
    let client = reqwest::Client::new();
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string();

    let missing = client.post(&url).body(body.clone()).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 401);

    let wrong = client
        .post(&url)
        .bearer_auth("not-the-token")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 403);

    let correct = client
        .post(&url)
        .bearer_auth("s3cret")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(correct.status().as_u16(), 200);

    // Health stays open without credentials.
    let health = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status().as_u16(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_notification_over_http_gets_empty_body() {
    let server = http_server(None);
    server.start().await.unwrap();
    let addr = server.http_addr().await.unwrap();
    let client = reqwest::Client::new();

    let reply = client
        .post(format!("http://{addr}/"))
        .body(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status().as_u16(), 200);
    assert!(reply.text().await.unwrap().is_empty());

    server.stop().await;
}
