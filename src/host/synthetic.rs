// src/host/synthetic.rs
//! In-memory host document.
//!
//! Nodes are created with the host's tag names and classified through
//! [`NodeRole::from_tag`], the same way a real page adapter would. Events are
//! only delivered when the caller publishes them, which lets tests and the
//! `demo` command replay any sequence of mutation batches.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    ChangeFeed, Field, HostDocument, HostEvent, ImportControls, Listener, Marker, NodeId,
    NodeRole, SubmitState, Subscription,
};

pub const CHAT_TURN_TAG: &str = "ms-chat-turn";
pub const FUNCTION_CALL_TAG: &str = "ms-function-call-chunk";
pub const DECLARATIONS_DIALOG_TAG: &str = "ms-edit-function-declarations-dialog";

type Listeners = Arc<Mutex<Vec<(u64, Arc<Listener>)>>>;

#[derive(Debug)]
struct SyntheticNode {
    tag: String,
    children: Vec<NodeId>,
    fields: HashMap<Field, String>,
    markers: HashSet<Marker>,
    submit: SubmitState,
    clicks: usize,
    changes: Vec<Field>,
    controls_area: bool,
    controls: Option<ImportControls>,
}

impl SyntheticNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            children: Vec::new(),
            fields: HashMap::new(),
            markers: HashSet::new(),
            submit: SubmitState::Missing,
            clicks: 0,
            changes: Vec::new(),
            controls_area: false,
            controls: None,
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    next_id: u64,
    nodes: HashMap<NodeId, SyntheticNode>,
}

#[derive(Default)]
pub struct SyntheticDocument {
    tree: Mutex<Tree>,
    alerts: Mutex<Vec<String>>,
    listeners: Listeners,
    next_listener: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyntheticDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node under `parent` (or detached when `None`). No event is published.
    pub fn insert(&self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let mut tree = lock(&self.tree);
        tree.next_id += 1;
        let id = NodeId(tree.next_id);
        tree.nodes.insert(id, SyntheticNode::new(tag));
        if let Some(parent) = parent {
            if let Some(node) = tree.nodes.get_mut(&parent) {
                node.children.push(id);
            }
        }
        id
    }

    /// Detach `node` and drop it with its whole subtree, markers included.
    pub fn remove(&self, node: NodeId) {
        let mut tree = lock(&self.tree);
        for parent in tree.nodes.values_mut() {
            parent.children.retain(|child| *child != node);
        }
        let mut doomed = vec![node];
        while let Some(id) = doomed.pop() {
            if let Some(n) = tree.nodes.remove(&id) {
                doomed.extend(n.children);
            }
        }
    }

    pub fn add_chat_turn(&self) -> NodeId {
        self.insert(None, CHAT_TURN_TAG)
    }

    /// A complete function-call record: name, raw arguments, an empty
    /// response field and an actionable submit button.
    pub fn add_function_call(&self, parent: Option<NodeId>, name: &str, arguments: &str) -> NodeId {
        let id = self.insert(parent, FUNCTION_CALL_TAG);
        self.set_field(id, Field::Name, name);
        self.set_field(id, Field::Arguments, arguments);
        self.set_field(id, Field::Response, "");
        self.set_submit_state(id, SubmitState::Actionable);
        id
    }

    pub fn add_declarations_dialog(&self) -> NodeId {
        let id = self.insert(None, DECLARATIONS_DIALOG_TAG);
        self.set_field(id, Field::DeclarationsTarget, "");
        self.with_node(id, |node| node.controls_area = true);
        id
    }

    /// Expose a field without firing a change notification.
    pub fn set_field(&self, node: NodeId, field: Field, value: &str) {
        self.with_node(node, |n| {
            n.fields.insert(field, value.to_string());
        });
    }

    pub fn remove_field(&self, node: NodeId, field: Field) {
        self.with_node(node, |n| {
            n.fields.remove(&field);
        });
    }

    pub fn set_submit_state(&self, node: NodeId, state: SubmitState) {
        self.with_node(node, |n| n.submit = state);
    }

    /// Deliver an event to every current subscriber, in subscription order.
    pub fn publish(&self, event: HostEvent) {
        let listeners: Vec<Arc<Listener>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            (*listener)(event.clone());
        }
    }

    pub fn field(&self, node: NodeId, field: Field) -> Option<String> {
        lock(&self.tree)
            .nodes
            .get(&node)
            .and_then(|n| n.fields.get(&field).cloned())
    }

    pub fn clicks(&self, node: NodeId) -> usize {
        lock(&self.tree).nodes.get(&node).map_or(0, |n| n.clicks)
    }

    /// Fields whose change notification fired, in firing order.
    pub fn change_notifications(&self, node: NodeId) -> Vec<Field> {
        lock(&self.tree)
            .nodes
            .get(&node)
            .map(|n| n.changes.clone())
            .unwrap_or_default()
    }

    pub fn controls(&self, dialog: NodeId) -> Option<ImportControls> {
        lock(&self.tree)
            .nodes
            .get(&dialog)
            .and_then(|n| n.controls.clone())
    }

    pub fn alerts(&self) -> Vec<String> {
        lock(&self.alerts).clone()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn with_node(&self, node: NodeId, f: impl FnOnce(&mut SyntheticNode)) {
        if let Some(n) = lock(&self.tree).nodes.get_mut(&node) {
            f(n);
        }
    }
}

impl HostDocument for SyntheticDocument {
    fn role(&self, node: NodeId) -> NodeRole {
        lock(&self.tree)
            .nodes
            .get(&node)
            .map_or(NodeRole::Other, |n| NodeRole::from_tag(&n.tag))
    }

    fn descendants(&self, node: NodeId, role: NodeRole) -> Vec<NodeId> {
        let tree = lock(&self.tree);
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = match tree.nodes.get(&node) {
            Some(n) => n.children.iter().rev().copied().collect(),
            None => return found,
        };
        // Pre-order walk keeps document order.
        while let Some(id) = stack.pop() {
            if let Some(n) = tree.nodes.get(&id) {
                if NodeRole::from_tag(&n.tag) == role {
                    found.push(id);
                }
                stack.extend(n.children.iter().rev().copied());
            }
        }
        found
    }

    fn read_field(&self, node: NodeId, field: Field) -> Option<String> {
        self.field(node, field)
    }

    fn write_field(&self, node: NodeId, field: Field, value: &str) -> bool {
        let mut tree = lock(&self.tree);
        match tree.nodes.get_mut(&node).and_then(|n| n.fields.get_mut(&field)) {
            Some(slot) => {
                *slot = value.to_string();
                true
            }
            None => false,
        }
    }

    fn notify_changed(&self, node: NodeId, field: Field) {
        self.with_node(node, |n| n.changes.push(field));
    }

    fn submit_state(&self, node: NodeId) -> SubmitState {
        lock(&self.tree)
            .nodes
            .get(&node)
            .map_or(SubmitState::Missing, |n| n.submit)
    }

    fn click_submit(&self, node: NodeId) {
        // Submitting consumes the record: the host removes the button.
        self.with_node(node, |n| {
            n.clicks += 1;
            n.submit = SubmitState::Missing;
        });
    }

    fn mark(&self, node: NodeId, marker: Marker) -> bool {
        lock(&self.tree)
            .nodes
            .get_mut(&node)
            .is_some_and(|n| n.markers.insert(marker))
    }

    fn is_marked(&self, node: NodeId, marker: Marker) -> bool {
        lock(&self.tree)
            .nodes
            .get(&node)
            .is_some_and(|n| n.markers.contains(&marker))
    }

    fn install_controls(&self, dialog: NodeId, controls: &ImportControls) -> bool {
        let mut tree = lock(&self.tree);
        match tree.nodes.get_mut(&dialog) {
            Some(n) if n.controls_area => {
                n.controls = Some(controls.clone());
                true
            }
            _ => false,
        }
    }

    fn alert(&self, message: &str) {
        lock(&self.alerts).push(message.to_string());
    }
}

impl ChangeFeed for SyntheticDocument {
    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            lock(&listeners).retain(|(other, _)| *other != id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_are_found_in_document_order() {
        let doc = SyntheticDocument::new();
        let turn = doc.add_chat_turn();
        let wrapper = doc.insert(Some(turn), "div");
        let first = doc.add_function_call(Some(wrapper), "a", "{}");
        let second = doc.add_function_call(Some(turn), "b", "{}");

        assert_eq!(
            doc.descendants(turn, NodeRole::FunctionCall),
            vec![first, second]
        );
        assert!(doc.descendants(first, NodeRole::FunctionCall).is_empty());
    }

    #[test]
    fn write_field_requires_an_exposed_field() {
        let doc = SyntheticDocument::new();
        let call = doc.add_function_call(None, "a", "{}");
        assert!(doc.write_field(call, Field::Response, "done"));
        assert!(!doc.write_field(call, Field::DeclarationsTarget, "nope"));
        assert_eq!(doc.field(call, Field::Response).as_deref(), Some("done"));
    }

    #[test]
    fn click_consumes_the_submit_affordance() {
        let doc = SyntheticDocument::new();
        let call = doc.add_function_call(None, "a", "{}");
        doc.click_submit(call);
        assert_eq!(doc.clicks(call), 1);
        assert_eq!(doc.submit_state(call), SubmitState::Missing);
    }

    #[test]
    fn markers_are_exclusive_and_vanish_with_the_node() {
        let doc = SyntheticDocument::new();
        let turn = doc.add_chat_turn();
        let call = doc.add_function_call(Some(turn), "a", "{}");

        assert!(doc.mark(call, Marker::Processing));
        assert!(!doc.mark(call, Marker::Processing));
        assert!(!doc.is_marked(call, Marker::ControlsAttached));

        doc.remove(turn);
        assert!(!doc.is_marked(call, Marker::Processing));
        assert!(!doc.mark(call, Marker::Processing));
        assert_eq!(doc.role(call), NodeRole::Other);
    }

    #[test]
    fn unsubscribed_listeners_stop_receiving_events() {
        use std::sync::atomic::AtomicUsize;

        let doc = SyntheticDocument::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sub = doc.subscribe(Box::new(move |_: HostEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        doc.publish(HostEvent::AutoSubmitToggled(true));
        drop(sub);
        doc.publish(HostEvent::AutoSubmitToggled(false));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(doc.listener_count(), 0);
    }
}
