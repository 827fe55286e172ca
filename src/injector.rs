// src/injector.rs
//! Writing tool results back into the host and pressing its submit button.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::host::{Field, HostDocument, NodeId, SubmitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitTiming {
    /// How often the submit button is checked.
    pub poll_interval: Duration,
    /// Give up when the button is still disabled after this long.
    pub timeout: Duration,
    /// Wait between seeing the button enabled and clicking it. The host
    /// updates some state after the field write that it does not expose.
    pub settle_delay: Duration,
}

impl Default for SubmitTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    /// Another loop is already waiting on this record.
    AlreadyPolling,
}

pub struct ResultInjector {
    host: Arc<dyn HostDocument>,
    timing: SubmitTiming,
    polling: Mutex<HashSet<NodeId>>,
}

/// Releases a record's polling slot when the loop ends, however it ends.
struct PollingSlot<'a> {
    polling: &'a Mutex<HashSet<NodeId>>,
    node: NodeId,
}

impl Drop for PollingSlot<'_> {
    fn drop(&mut self) {
        self.polling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.node);
    }
}

impl ResultInjector {
    pub fn new(host: Arc<dyn HostDocument>, timing: SubmitTiming) -> Self {
        Self {
            host,
            timing,
            polling: Mutex::new(HashSet::new()),
        }
    }

    /// Put `text` into the record's response field and fire its change notification.
    pub fn write(&self, node: NodeId, text: &str) -> Result<(), BridgeError> {
        if !self.host.write_field(node, Field::Response, text) {
            return Err(BridgeError::MissingElement(Field::Response));
        }
        self.host.notify_changed(node, Field::Response);
        debug!(%node, bytes = text.len(), "Response written");
        Ok(())
    }

    /// Wait for the record's submit button to be enabled, let the host settle,
    /// then click it once.
    pub async fn submit_when_ready(&self, node: NodeId) -> Result<SubmitOutcome, BridgeError> {
        let Some(_slot) = self.claim_slot(node) else {
            debug!(%node, "Auto-submit already pending, ignoring");
            return Ok(SubmitOutcome::AlreadyPolling);
        };

        self.wait_until_actionable(node).await?;
        time::sleep(self.timing.settle_delay).await;

        info!(%node, "Submitting response");
        self.host.click_submit(node);
        Ok(SubmitOutcome::Submitted)
    }

    fn claim_slot(&self, node: NodeId) -> Option<PollingSlot<'_>> {
        let fresh = self
            .polling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node);
        // Lazily: a slot built and dropped here would free the running loop's claim.
        fresh.then(|| PollingSlot {
            polling: &self.polling,
            node,
        })
    }

    async fn wait_until_actionable(&self, node: NodeId) -> Result<(), BridgeError> {
        let start = Instant::now();
        let mut ticker = time::interval_at(start + self.timing.poll_interval, self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.host.submit_state(node) == SubmitState::Actionable {
                return Ok(());
            }
            // A poll landing exactly on the budget is not yet a timeout.
            if start.elapsed() > self.timing.timeout {
                return Err(BridgeError::SubmitTimeout(self.timing.timeout));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SyntheticDocument;

    fn setup() -> (Arc<SyntheticDocument>, Arc<ResultInjector>, NodeId) {
        let doc = Arc::new(SyntheticDocument::new());
        let call = doc.add_function_call(None, "get_weather", "{}");
        let injector = Arc::new(ResultInjector::new(doc.clone(), SubmitTiming::default()));
        (doc, injector, call)
    }

    #[test]
    fn write_fills_the_field_and_notifies() {
        let (doc, injector, call) = setup();
        injector.write(call, "18C, sunny").unwrap();

        assert_eq!(doc.field(call, Field::Response).as_deref(), Some("18C, sunny"));
        assert_eq!(doc.change_notifications(call), vec![Field::Response]);
    }

    #[test]
    fn write_without_response_field_fails() {
        let (doc, injector, call) = setup();
        doc.remove_field(call, Field::Response);

        let err = injector.write(call, "text").unwrap_err();
        assert!(matches!(err, BridgeError::MissingElement(Field::Response)));
        assert!(doc.change_notifications(call).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_once_after_the_settle_delay() {
        let (doc, injector, call) = setup();
        doc.set_submit_state(call, SubmitState::Disabled);

        let host = doc.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(250)).await;
            host.set_submit_state(call, SubmitState::Actionable);
        });

        let started = Instant::now();
        let outcome = injector.submit_when_ready(call).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::Submitted);
        assert_eq!(doc.clicks(call), 1);
        // First actionable poll at 300ms, then the 500ms settle.
        assert!(started.elapsed() >= Duration::from_millis(800));
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_clicking() {
        let (doc, injector, call) = setup();
        doc.set_submit_state(call, SubmitState::Disabled);

        let started = Instant::now();
        let err = injector.submit_when_ready(call).await.unwrap_err();

        assert!(matches!(err, BridgeError::SubmitTimeout(t) if t == Duration::from_millis(1000)));
        assert_eq!(doc.clicks(call), 0);
        // The last poll is the first one strictly past the budget.
        assert!(started.elapsed() >= Duration::from_millis(1100));
        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_after_the_budget_can_still_submit() {
        let (doc, injector, call) = setup();
        doc.set_submit_state(call, SubmitState::Disabled);

        let host = doc.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(1050)).await;
            host.set_submit_state(call, SubmitState::Actionable);
        });

        assert_eq!(
            injector.submit_when_ready(call).await.unwrap(),
            SubmitOutcome::Submitted
        );
        assert_eq!(doc.clicks(call), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_calls_are_discarded() {
        let (doc, injector, call) = setup();
        doc.set_submit_state(call, SubmitState::Disabled);

        let first = {
            let injector = Arc::clone(&injector);
            tokio::spawn(async move { injector.submit_when_ready(call).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(
            injector.submit_when_ready(call).await.unwrap(),
            SubmitOutcome::AlreadyPolling
        );

        doc.set_submit_state(call, SubmitState::Actionable);
        assert_eq!(first.await.unwrap().unwrap(), SubmitOutcome::Submitted);
        assert_eq!(doc.clicks(call), 1);

        // The slot is free again once the loop has finished.
        doc.set_submit_state(call, SubmitState::Actionable);
        assert_eq!(
            injector.submit_when_ready(call).await.unwrap(),
            SubmitOutcome::Submitted
        );
    }
}
