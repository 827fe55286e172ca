// src/host/mod.rs
//! The live document the bridge observes and writes into.
//!
//! Everything the engine needs from the chat UI goes through two seams:
//! [`HostDocument`] for reading and mutating nodes, and [`ChangeFeed`] for
//! learning about insertions and user triggers. Tag strings never leave this
//! module: adapters classify nodes once via [`NodeRole::from_tag`] and the rest
//! of the crate only ever sees the closed [`NodeRole`] enum.

pub mod synthetic;

use std::fmt;

pub use synthetic::SyntheticDocument;

/// Opaque handle to a node in the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// 1. Node Roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    ChatTurn,
    FunctionCall,
    DeclarationsDialog,
    Other,
}

impl NodeRole {
    /// Map a host element tag to its role. Unknown tags are `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "ms-chat-turn" => NodeRole::ChatTurn,
            "ms-function-call-chunk" => NodeRole::FunctionCall,
            "ms-edit-function-declarations-dialog" => NodeRole::DeclarationsDialog,
            _ => NodeRole::Other,
        }
    }
}

// 2. Fields a node can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Tool name of a function-call record.
    Name,
    /// Raw JSON arguments of a function-call record.
    Arguments,
    /// Text area the tool result is written into.
    Response,
    /// Text area of the declarations dialog.
    DeclarationsTarget,
    /// Area of the declarations dialog the import controls go into.
    ActionArea,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Name => "name",
            Field::Arguments => "arguments",
            Field::Response => "response",
            Field::DeclarationsTarget => "declarations target",
            Field::ActionArea => "action area",
        };
        f.write_str(name)
    }
}

/// State of a record's submit affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    /// The affordance is gone: the host already consumed this record.
    Missing,
    Disabled,
    Actionable,
}

/// Flags the bridge leaves on host nodes. They live and die with the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// A function-call record has been claimed for dispatch.
    Processing,
    /// A declarations dialog has its import controls.
    ControlsAttached,
}

/// Initial values for the import controls placed in a declarations dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportControls {
    pub server_url: String,
    pub auto_submit: bool,
}

pub trait HostDocument: Send + Sync {
    fn role(&self, node: NodeId) -> NodeRole;

    /// All nodes below `node` (not `node` itself) carrying `role`, in document order.
    fn descendants(&self, node: NodeId, role: NodeRole) -> Vec<NodeId>;

    /// Text of a field, or `None` when the node does not expose it.
    fn read_field(&self, node: NodeId, field: Field) -> Option<String>;

    /// Replace a field's value. Returns `false` when the node does not expose it.
    fn write_field(&self, node: NodeId, field: Field, value: &str) -> bool;

    /// Fire the field's native "changed" notification so host listeners see a write.
    fn notify_changed(&self, node: NodeId, field: Field);

    fn submit_state(&self, node: NodeId) -> SubmitState;

    fn click_submit(&self, node: NodeId);

    /// Set `marker` on `node`. Returns `false` when it was already set or the
    /// node is gone; a `true` result is the caller's exclusive claim.
    fn mark(&self, node: NodeId, marker: Marker) -> bool;

    fn is_marked(&self, node: NodeId, marker: Marker) -> bool;

    /// Place the import controls into a dialog. Returns `false` if the dialog
    /// lacks the area the controls go into.
    fn install_controls(&self, dialog: NodeId, controls: &ImportControls) -> bool;

    /// Blocking, user-visible alert.
    fn alert(&self, message: &str);
}

// 3. Change Feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// One mutation batch: the top-level nodes inserted into the document.
    Inserted(Vec<NodeId>),
    /// The user asked a dialog to load the tool catalog from `url`.
    ImportRequested { dialog: NodeId, url: String },
    AutoSubmitToggled(bool),
}

pub type Listener = Box<dyn Fn(HostEvent) + Send + Sync>;

pub trait ChangeFeed: Send + Sync {
    /// Register `listener` for every future event. Events stop once the
    /// returned handle is dropped.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
