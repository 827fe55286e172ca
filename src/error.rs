// src/error.rs
use std::time::Duration;

use thiserror::Error;

use crate::host::Field;

/// Everything that can abort handling of a single record or dialog.
/// None of these stop the watcher.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host node is missing its {0} element")]
    MissingElement(Field),

    #[error("tool call arguments are not valid JSON: {0}")]
    MalformedArguments(#[source] serde_json::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("submit control did not become actionable within {0:?}")]
    SubmitTimeout(Duration),

    #[error("failed to render tool declarations: {0}")]
    Render(#[source] serde_json::Error),

    #[error("settings store failure: {0:#}")]
    Settings(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server returned error {code}: {message}")]
    Remote { code: i64, message: String },
}

#[derive(Debug, Error)]
#[error("request to '{url}' failed: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected message event, got '{0}'")]
    UnexpectedEvent(String),

    #[error("expected message to have two lines, got {0}")]
    LineCount(usize),

    #[error("expected 'data: ' prefix, got '{0}'")]
    MissingDataPrefix(String),

    #[error("message data is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("response id '{got}' does not match request id '{expected}'")]
    UnexpectedId { expected: String, got: String },

    #[error("unexpected result shape: {0}")]
    InvalidResult(String),
}
