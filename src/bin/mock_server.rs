// src/bin/mock_server.rs
//! A local tool service for trying the bridge by hand.
//!
//! Speaks `tools/list` and `tools/call` over HTTP POST and frames every answer
//! as a single `event: message` server-sent event.

use aether_bridge::logging;
use aether_bridge::protocol::frame::encode_frame;
use anyhow::{Context, Result};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init(false);

    let addr = std::env::var("AETHER_MOCK_ADDR").unwrap_or_else(|_| "127.0.0.1:7777".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind {addr}"))?;
    info!(%addr, "Mock tool service listening");

    let router = Router::new().route("/", post(rpc));
    axum::serve(listener, router).await?;
    Ok(())
}

async fn rpc(Json(request): Json<Value>) -> impl IntoResponse {
    let reply = answer(&request);
    ([(header::CONTENT_TYPE, "text/event-stream")], encode_frame(&reply))
}

fn answer(request: &Value) -> Value {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or("");
    info!(method, %id, "Request");

    match method {
        // 1. LIST TOOLS
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [
                    {
                        "name": "calculate_sum",
                        "description": "Adds two numbers together\n",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "a": { "type": "number" },
                                "b": { "type": "number" }
                            },
                            "required": ["a", "b"],
                            "additionalProperties": false,
                            "$schema": "http://json-schema.org/draft-07/schema#"
                        }
                    },
                    {
                        "name": "get_weather",
                        "description": "Current weather for a city",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "city": { "default": "Paris" }
                            }
                        }
                    }
                ]
            }
        }),
        // 2. CALL TOOL
        "tools/call" => {
            let params = &request["params"];
            let args = &params["arguments"];
            match params["name"].as_str().unwrap_or("") {
                "calculate_sum" => {
                    let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
                    text_result(id, format!("The sum is {sum}"))
                }
                "get_weather" => {
                    let city = args["city"].as_str().unwrap_or("Paris");
                    text_result(id, format!("18C, sunny in {city}"))
                }
                other => error_result(id, -32602, &format!("Unknown tool: {other}")),
            }
        }
        _ => error_result(id, -32601, "Method not found"),
    }
}

fn text_result(id: Value, text: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": { "content": [{ "type": "text", "text": text }] }
    })
}

fn error_result(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
