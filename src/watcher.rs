// src/watcher.rs
//! Turns host events into bridge work.
//!
//! The feed listener only forwards events into a channel, so the host is never
//! blocked. A dispatcher task drains the channel in arrival order and spawns
//! one independent task per record, dialog or trigger.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::host::{ChangeFeed, HostEvent, NodeId, NodeRole, Subscription};

pub struct WatcherHandle {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop observing, then wait for every queued event and spawned handler to finish.
    pub async fn shutdown(self) {
        let WatcherHandle { subscription, task } = self;
        subscription.unsubscribe();
        if let Err(e) = task.await {
            error!(error = %e, "Watcher task ended abnormally");
        }
    }
}

pub struct ChangeWatcher;

impl ChangeWatcher {
    pub fn start(bridge: Arc<Bridge>, feed: &dyn ChangeFeed) -> WatcherHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<HostEvent>();

        let subscription = feed.subscribe(Box::new(move |event: HostEvent| {
            // Closed only while shutting down; late events are dropped.
            let _ = tx.send(event);
        }));

        let task = tokio::spawn(async move {
            let mut handlers = JoinSet::new();
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => dispatch(&bridge, event, &mut handlers),
                        None => break,
                    },
                    Some(joined) = handlers.join_next(), if !handlers.is_empty() => reap(joined),
                }
            }
            while let Some(joined) = handlers.join_next().await {
                reap(joined);
            }
            debug!("Watcher stopped");
        });

        WatcherHandle { subscription, task }
    }
}

fn dispatch(bridge: &Arc<Bridge>, event: HostEvent, handlers: &mut JoinSet<()>) {
    match event {
        HostEvent::Inserted(nodes) => {
            for node in nodes {
                on_inserted(bridge, node, handlers);
            }
        }
        HostEvent::ImportRequested { dialog, url } => {
            let bridge = Arc::clone(bridge);
            handlers.spawn(async move {
                if let Err(e) = bridge.import_declarations(dialog, &url).await {
                    report(dialog, &e);
                }
            });
        }
        HostEvent::AutoSubmitToggled(enabled) => {
            let bridge = Arc::clone(bridge);
            handlers.spawn(async move {
                if let Err(e) = bridge.set_auto_submit(enabled).await {
                    error!(error = %e, "Failed to persist auto-submit");
                }
            });
        }
    }
}

fn on_inserted(bridge: &Arc<Bridge>, node: NodeId, handlers: &mut JoinSet<()>) {
    let host = bridge.host();
    let role = host.role(node);

    if role == NodeRole::DeclarationsDialog {
        let bridge = Arc::clone(bridge);
        handlers.spawn(async move {
            if let Err(e) = bridge.attach_dialog(node).await {
                report(node, &e);
            }
        });
        return;
    }

    let mut calls = host.descendants(node, NodeRole::FunctionCall);
    if role == NodeRole::FunctionCall {
        calls.insert(0, node);
    }
    if role == NodeRole::ChatTurn || !calls.is_empty() {
        debug!(%node, ?role, calls = calls.len(), "Inserted node scanned");
    }

    for call in calls {
        let bridge = Arc::clone(bridge);
        handlers.spawn(async move {
            match bridge.handle_function_call(call).await {
                Ok(outcome) => debug!(node = %call, ?outcome, "Function call handled"),
                Err(e) => report(call, &e),
            }
        });
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Handler task ended abnormally");
    }
}

fn report(node: NodeId, err: &BridgeError) {
    match err {
        BridgeError::SubmitTimeout(_) => warn!(%node, error = %err, "Failed to auto-submit response"),
        _ => error!(%node, error = %err, "Failed to handle node"),
    }
}
