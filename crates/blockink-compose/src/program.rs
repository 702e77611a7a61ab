//! Program descriptors: the static shape of a composable mini-program.
//!
//! A program is written against its own local state only. Everything it can
//! do is declared up front on its [`ProgramDescriptor`]: a name, an initial
//! state, a map of named actions, a set of subscriptions and the connection
//! slots it exposes toward peers. The composition host lifts instances of
//! these descriptors into the global block tree without the program ever
//! learning where it is mounted.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use blockink_core::BlockId;
use thiserror::Error;

/// A program's local state. Opaque to the host; programs interpret it.
pub type LocalState = serde_json::Value;

/// Payload carried by a dispatched action.
pub type Payload = serde_json::Value;

/// Error raised inside a program's action handler.
///
/// Contained at the instance boundary: the owning instance is marked
/// errored and keeps its last good state, nothing else is affected.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Action failed: {0}")]
    Failed(String),
    #[error("Bad payload: {0}")]
    BadPayload(String),
}

/// What an action handler produced.
///
/// Handlers never mutate in place; they return the next state (plus any
/// effects) or redirect to another action of the same program.
pub enum ActionOutcome {
    /// Replace the local state.
    Replace(LocalState),
    /// Replace the local state and schedule effects to run after the next
    /// render.
    WithEffects(LocalState, Vec<Effect>),
    /// Re-enter the dispatch loop as a different action of this program.
    Redirect(String, Payload),
}

/// A named action handler: pure from `(state, payload)` to an outcome.
pub type ActionFn = Rc<dyn Fn(&LocalState, &Payload) -> Result<ActionOutcome, ProgramError>>;

/// Deferred work scheduled by an action.
///
/// Effects run after the state change has settled and rendered. They
/// receive a [`Dispatch`] handle bound to the instance that scheduled them
/// so any follow-up lands back in the same block's state slice.
pub struct Effect {
    run: Rc<dyn Fn(&Dispatch, &[Payload])>,
    args: Vec<Payload>,
}

impl Effect {
    /// Create an effect with no arguments.
    pub fn new(run: impl Fn(&Dispatch, &[Payload]) + 'static) -> Self {
        Self {
            run: Rc::new(run),
            args: Vec::new(),
        }
    }

    /// Create an effect carrying arguments captured at schedule time.
    pub fn with_args(run: impl Fn(&Dispatch, &[Payload]) + 'static, args: Vec<Payload>) -> Self {
        Self {
            run: Rc::new(run),
            args,
        }
    }

    pub(crate) fn invoke(&self, dispatch: &Dispatch) {
        (self.run)(dispatch, &self.args);
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect").field("args", &self.args).finish()
    }
}

/// A dispatch queued from an effect, subscription or peer handler.
#[derive(Debug, Clone)]
pub(crate) struct QueuedDispatch {
    pub block: BlockId,
    pub action: String,
    pub payload: Payload,
}

pub(crate) type DispatchQueue = Rc<RefCell<VecDeque<QueuedDispatch>>>;

/// Handle through which asynchronous code re-enters the dispatch loop.
///
/// Bound to one block: everything dispatched through it targets the
/// instance it was handed out for. If that block is gone by the time the
/// dispatch drains, the dispatch is dropped.
#[derive(Clone)]
pub struct Dispatch {
    block: BlockId,
    queue: DispatchQueue,
}

impl Dispatch {
    pub(crate) fn new(block: BlockId, queue: DispatchQueue) -> Self {
        Self { block, queue }
    }

    /// The block this handle is bound to.
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Queue an action against the bound instance.
    pub fn call(&self, action: impl Into<String>, payload: Payload) {
        self.queue.borrow_mut().push_back(QueuedDispatch {
            block: self.block,
            action: action.into(),
            payload,
        });
    }
}

/// Teardown callback returned by a subscription.
pub type Cleanup = Box<dyn FnOnce()>;

/// Subscription installed at mount time; returns its cleanup.
pub type SubscribeFn = Rc<dyn Fn(Dispatch) -> Cleanup>;

/// Handler invoked when a connected peer's state changes.
///
/// Receives a dispatch handle bound to the observing instance and the
/// peer's new state.
pub type PeerHandler = Rc<dyn Fn(&Dispatch, &LocalState)>;

/// A connection slot a program exposes toward peers.
pub struct ConnectSlot {
    /// Program names this slot accepts as a peer.
    pub allowed: Vec<String>,
    /// Called with the peer's state after each of the peer's dispatches.
    pub on_peer_state: PeerHandler,
}

/// The static description of a program: everything the host needs to
/// mount, drive and connect instances of it.
pub struct ProgramDescriptor {
    /// Unique program name; blocks reference programs by this name.
    pub name: String,
    /// Produces the initial local state for a fresh instance.
    pub init: Rc<dyn Fn() -> LocalState>,
    /// Named action handlers. The only way state changes.
    pub actions: HashMap<String, ActionFn>,
    /// Subscriptions installed at mount, cleaned up at teardown.
    pub subscriptions: Vec<SubscribeFn>,
    /// Connection slots, keyed by slot name.
    pub connect_slots: HashMap<String, ConnectSlot>,
}

impl ProgramDescriptor {
    /// Start a descriptor with a name and an initial-state function.
    pub fn new(name: impl Into<String>, init: impl Fn() -> LocalState + 'static) -> Self {
        Self {
            name: name.into(),
            init: Rc::new(init),
            actions: HashMap::new(),
            subscriptions: Vec::new(),
            connect_slots: HashMap::new(),
        }
    }

    /// Declare a named action.
    pub fn with_action(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&LocalState, &Payload) -> Result<ActionOutcome, ProgramError> + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(action));
        self
    }

    /// Install a subscription.
    pub fn with_subscription(mut self, subscribe: impl Fn(Dispatch) -> Cleanup + 'static) -> Self {
        self.subscriptions.push(Rc::new(subscribe));
        self
    }

    /// Expose a connection slot with its peer allow-list.
    pub fn with_slot(
        mut self,
        name: impl Into<String>,
        allowed: Vec<String>,
        on_peer_state: impl Fn(&Dispatch, &LocalState) + 'static,
    ) -> Self {
        self.connect_slots.insert(
            name.into(),
            ConnectSlot {
                allowed,
                on_peer_state: Rc::new(on_peer_state),
            },
        );
        self
    }

    /// Look up a connection slot.
    pub fn slot(&self, name: &str) -> Option<&ConnectSlot> {
        self.connect_slots.get(name)
    }
}

impl std::fmt::Debug for ProgramDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramDescriptor")
            .field("name", &self.name)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.len())
            .field("connect_slots", &self.connect_slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_builder() {
        let program = ProgramDescriptor::new("counter", || json!({"count": 0}))
            .with_action("increment", |state, _| {
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(ActionOutcome::Replace(json!({"count": count + 1})))
            })
            .with_slot("feed", vec!["counter".into()], |_, _| {});

        assert_eq!(program.name, "counter");
        assert!(program.actions.contains_key("increment"));
        assert!(program.slot("feed").is_some());
        assert!(program.slot("other").is_none());
        assert_eq!((program.init)(), json!({"count": 0}));
    }

    #[test]
    fn test_dispatch_queues_against_bound_block() {
        let queue: DispatchQueue = Rc::new(RefCell::new(VecDeque::new()));
        let dispatch = Dispatch::new(BlockId(7), queue.clone());
        dispatch.call("tick", json!(null));
        dispatch.call("tock", json!(1));

        let queued: Vec<QueuedDispatch> = queue.borrow_mut().drain(..).collect();
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|q| q.block == BlockId(7)));
        assert_eq!(queued[0].action, "tick");
        assert_eq!(queued[1].payload, json!(1));
    }
}
