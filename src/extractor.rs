// src/extractor.rs
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::BridgeError;
use crate::host::{Field, HostDocument, Marker, NodeId, SubmitState};

/// One pending tool invocation found in the host document.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub node: NodeId,
}

pub struct ToolCallExtractor {
    host: Arc<dyn HostDocument>,
}

impl ToolCallExtractor {
    pub fn new(host: Arc<dyn HostDocument>) -> Self {
        Self { host }
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.host.is_marked(node, Marker::Processing)
    }

    /// Claim `node` and read its call.
    ///
    /// Returns `Ok(None)` when the record was claimed before or the host has
    /// already consumed its submit button. The claim is a marker on the host
    /// node, taken before any field is read and never released, so a record
    /// that fails here is not retried on later notifications.
    pub fn extract(&self, node: NodeId) -> Result<Option<ToolCallRecord>, BridgeError> {
        if self.host.submit_state(node) == SubmitState::Missing {
            debug!(%node, "Function call already answered, skipping");
            return Ok(None);
        }

        if !self.host.mark(node, Marker::Processing) {
            debug!(%node, "Function call already being processed, skipping");
            return Ok(None);
        }

        let name = self.required(node, Field::Name)?.trim().to_string();
        let raw = self.required(node, Field::Arguments)?;
        let arguments = serde_json::from_str(raw.trim()).map_err(BridgeError::MalformedArguments)?;

        Ok(Some(ToolCallRecord {
            name,
            arguments,
            node,
        }))
    }

    fn required(&self, node: NodeId, field: Field) -> Result<String, BridgeError> {
        self.host
            .read_field(node, field)
            .ok_or(BridgeError::MissingElement(field))
    }
}
