// src/bridge.rs
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::RpcClient;
use crate::error::{BridgeError, ProtocolError, RpcError};
use crate::extractor::ToolCallExtractor;
use crate::host::{HostDocument, Marker, NodeId};
use crate::importer::DeclarationImporter;
use crate::injector::{ResultInjector, SubmitOutcome, SubmitTiming};
use crate::settings::Settings;

/// What became of one function-call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Already handled, or already answered by the host.
    Skipped,
    /// Result written; auto-submit is off.
    Written,
    /// Result written and the response submitted.
    Submitted,
    /// Result written; another auto-submit loop owns the record.
    AlreadyPolling,
}

/// Wires the engine together: extract, call, write back, submit.
pub struct Bridge {
    host: Arc<dyn HostDocument>,
    settings: Settings,
    client: Arc<RpcClient>,
    extractor: ToolCallExtractor,
    injector: ResultInjector,
    importer: DeclarationImporter,
}

impl Bridge {
    pub fn new(
        host: Arc<dyn HostDocument>,
        settings: Settings,
        client: Arc<RpcClient>,
        timing: SubmitTiming,
    ) -> Self {
        Self {
            extractor: ToolCallExtractor::new(Arc::clone(&host)),
            injector: ResultInjector::new(Arc::clone(&host), timing),
            importer: DeclarationImporter::new(Arc::clone(&host), Arc::clone(&client), settings.clone()),
            host,
            settings,
            client,
        }
    }

    pub fn host(&self) -> &Arc<dyn HostDocument> {
        &self.host
    }

    /// Handle one function-call record end to end.
    ///
    /// The record is claimed before the first suspension point, so concurrent
    /// notifications for the same node dispatch it at most once.
    pub async fn handle_function_call(&self, node: NodeId) -> Result<CallOutcome, BridgeError> {
        let Some(record) = self.extractor.extract(node)? else {
            return Ok(CallOutcome::Skipped);
        };

        let url = self.settings.server_url().await.map_err(BridgeError::Settings)?;
        info!(%node, tool = %record.name, arguments = %record.arguments, "Calling tool");

        let result = self
            .client
            .call_tool(&url, &record.name, record.arguments.clone())
            .await?;
        if result.is_error == Some(true) {
            warn!(%node, tool = %record.name, "Tool reported an error result");
        }

        let text = result.joined_text().ok_or_else(|| {
            BridgeError::Rpc(RpcError::Protocol(ProtocolError::InvalidResult(
                "tools/call result has no text content".into(),
            )))
        })?;
        self.injector.write(node, &text)?;

        if !self.settings.auto_submit().await.map_err(BridgeError::Settings)? {
            return Ok(CallOutcome::Written);
        }
        Ok(match self.injector.submit_when_ready(node).await? {
            SubmitOutcome::Submitted => CallOutcome::Submitted,
            SubmitOutcome::AlreadyPolling => CallOutcome::AlreadyPolling,
        })
    }

    /// Install import controls the first time a dialog is seen.
    /// Returns `false` for a dialog that was already attached.
    pub async fn attach_dialog(&self, dialog: NodeId) -> Result<bool, BridgeError> {
        if !self.host.mark(dialog, Marker::ControlsAttached) {
            debug!(%dialog, "Dialog already has import controls");
            return Ok(false);
        }
        self.importer.attach(dialog).await?;
        Ok(true)
    }

    pub async fn import_declarations(&self, dialog: NodeId, url: &str) -> Result<usize, BridgeError> {
        self.importer.import(dialog, url).await
    }

    pub async fn set_auto_submit(&self, enabled: bool) -> Result<(), BridgeError> {
        self.settings
            .set_auto_submit(enabled)
            .await
            .map_err(BridgeError::Settings)?;
        info!(enabled, "Changed auto-submit");
        Ok(())
    }
}
