// src/client.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ProtocolError, RpcError, TransportError};
use crate::protocol::{
    parse_frame, CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RpcMethod, ToolDescriptor,
};

/// Moves one request body to the tool service and hands back the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: String) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: String) -> Result<String, TransportError> {
        let failed = |e: reqwest::Error| TransportError {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let res = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json,text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(failed)?;

        // The body decides validity, the framing check reports what went wrong.
        if !res.status().is_success() {
            warn!(url, status = %res.status(), "Tool service answered with a non-success status");
        }

        res.text().await.map_err(failed)
    }
}

pub type ErrorHook = Arc<dyn Fn(&RpcError) + Send + Sync>;

/// A request that has been sent and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: RpcMethod,
    pub url: String,
}

type PendingTable = Mutex<HashMap<String, PendingRequest>>;

/// Removes its id from the pending table however the exchange ends.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct RpcClient {
    transport: Arc<dyn Transport>,
    request_id_counter: AtomicU64,
    pending: PendingTable,
    on_error: Option<ErrorHook>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_id_counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            on_error: None,
        }
    }

    /// A client speaking plain HTTP through reqwest.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Called with every transport failure, before the error is returned.
    pub fn with_error_hook(mut self, hook: impl Fn(&RpcError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Number of requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.lock_pending().len()
    }

    // Helper to generate IDs
    fn next_id(&self) -> String {
        (self.request_id_counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one JSON-RPC request and return its `result` member.
    pub async fn call(&self, url: &str, method: RpcMethod, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(method, params, id.clone());
        let body = serde_json::to_string(&request).map_err(ProtocolError::InvalidJson)?;

        self.lock_pending().insert(
            id.clone(),
            PendingRequest {
                method,
                url: url.to_string(),
            },
        );
        let _guard = PendingGuard {
            table: &self.pending,
            id: id.clone(),
        };

        debug!(url, method = method.as_str(), id = %id, "Sending request");
        let outcome = self.exchange(url, &id, body).await;

        if let (Err(err @ RpcError::Transport(_)), Some(hook)) = (&outcome, &self.on_error) {
            hook(err);
        }
        outcome
    }

    async fn exchange(&self, url: &str, id: &str, body: String) -> Result<Value, RpcError> {
        let text = self.transport.post(url, body).await?;
        debug!(bytes = text.len(), "Received response");

        let payload = parse_frame(&text)?;
        let response: JsonRpcResponse = serde_json::from_value(payload)
            .map_err(|e| ProtocolError::InvalidResult(e.to_string()))?;

        // An id-less answer can only belong to the request on this exchange.
        let answered = response.id_string().unwrap_or_else(|| id.to_string());
        match self.lock_pending().get(&answered) {
            Some(request) if answered == id => {
                debug!(id, method = request.method.as_str(), "Response matched");
            }
            Some(request) => warn!(
                id,
                answered = %answered,
                method = request.method.as_str(),
                url = %request.url,
                "Response answers a different pending request"
            ),
            None => warn!(id, answered = %answered, "Response id matches no pending request"),
        }
        if answered != id {
            return Err(ProtocolError::UnexpectedId {
                expected: id.to_string(),
                got: answered,
            }
            .into());
        }

        if let Some(err) = response.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            });
        }

        response.result.ok_or_else(|| {
            ProtocolError::InvalidResult("response carries neither result nor error".into()).into()
        })
    }

    pub async fn call_tool(
        &self,
        url: &str,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, RpcError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(ProtocolError::InvalidJson)?;
        let result = self.call(url, RpcMethod::ToolsCall, params).await?;

        serde_json::from_value(result)
            .map_err(|e| ProtocolError::InvalidResult(format!("tools/call: {e}")).into())
    }

    pub async fn list_tools(&self, url: &str) -> Result<Vec<ToolDescriptor>, RpcError> {
        let result = self.call(url, RpcMethod::ToolsList, json!({})).await?;
        let listing: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ProtocolError::InvalidResult(format!("tools/list: {e}")))?;
        Ok(listing.tools)
    }
}
