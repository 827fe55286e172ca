#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use aether_bridge::bridge::Bridge;
use aether_bridge::client::{RpcClient, Transport};
use aether_bridge::error::TransportError;
use aether_bridge::host::SyntheticDocument;
use aether_bridge::injector::SubmitTiming;
use aether_bridge::protocol::frame::encode_frame;
use aether_bridge::settings::{MemorySettings, Settings};
use async_trait::async_trait;
use serde_json::{json, Value};

type Reply = dyn Fn(&Value) -> Result<String, TransportError> + Send + Sync;

/// Answers each request with a reply computed from it, and keeps every request.
pub struct FakeService {
    reply: Box<Reply>,
    pub requests: Mutex<Vec<(String, Value)>>,
}

impl FakeService {
    pub fn new(reply: impl Fn(&Value) -> Result<String, TransportError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request gets the same framed `result`, echoing the request id.
    pub fn answering(result: Value) -> Arc<Self> {
        Self::new(move |request| {
            Ok(encode_frame(&json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": result,
            })))
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Self::new(|_| {
            Err(TransportError {
                url: "http://localhost:7777".into(),
                reason: "connection refused".into(),
            })
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn post(&self, url: &str, body: String) -> Result<String, TransportError> {
        let request: Value = serde_json::from_str(&body).unwrap();
        self.requests.lock().unwrap().push((url.to_string(), request.clone()));
        (self.reply)(&request)
    }
}

pub struct Harness {
    pub doc: Arc<SyntheticDocument>,
    pub service: Arc<FakeService>,
    pub settings: Settings,
    pub bridge: Arc<Bridge>,
}

pub fn harness(service: Arc<FakeService>) -> Harness {
    harness_with_timing(service, SubmitTiming::default())
}

pub fn harness_with_timing(service: Arc<FakeService>, timing: SubmitTiming) -> Harness {
    let doc = Arc::new(SyntheticDocument::new());
    let settings = Settings::new(Arc::new(MemorySettings::new()));
    let client = Arc::new(RpcClient::new(service.clone()));
    let bridge = Arc::new(Bridge::new(
        doc.clone(),
        settings.clone(),
        client,
        timing,
    ));
    Harness {
        doc,
        service,
        settings,
        bridge,
    }
}
