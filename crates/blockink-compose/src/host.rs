//! The composition host.
//!
//! Lifts independent program instances into the block tree: mounts an
//! instance for every block whose program is registered, tears instances
//! down when their block disappears, wires peer connections against the
//! source program's allow-list, and mirrors each instance's state into its
//! block's state slice once per render cycle.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use blockink_core::{BlockId, Board, Connection};

use crate::instance::{Instance, Phase};
use crate::program::{
    ActionOutcome, Dispatch, DispatchQueue, Effect, LocalState, Payload, QueuedDispatch,
};
use crate::registry::ProgramRegistry;

/// Maximum redirect hops a single dispatch may take before the instance is
/// marked errored.
pub const REDIRECT_LIMIT: usize = 32;

/// What the host holds for a mounted block.
enum MountSlot {
    Live(Instance),
    /// Program lookup failed. An inert error marker; retried only when the
    /// block's program name changes.
    Failed { name: String },
}

/// Mounts, drives and connects program instances over a [`Board`].
///
/// The host owns the registry and all mounted instances; programs never
/// see it. All dispatching is synchronous and single-threaded; deferred
/// work re-enters through [`Dispatch`] handles and is drained by
/// [`CompositionHost::run_pending`].
pub struct CompositionHost {
    registry: ProgramRegistry,
    slots: HashMap<BlockId, MountSlot>,
    /// Observers per target block: (source block, slot name). Rebuilt from
    /// the board's connections on every reconcile pass.
    observers: HashMap<BlockId, Vec<(BlockId, String)>>,
    queue: DispatchQueue,
    pending_effects: Vec<(BlockId, Effect)>,
}

impl CompositionHost {
    /// Create a host over a registry of programs.
    pub fn new(registry: ProgramRegistry) -> Self {
        Self {
            registry,
            slots: HashMap::new(),
            observers: HashMap::new(),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            pending_effects: Vec::new(),
        }
    }

    /// The program registry.
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// Register a program after construction.
    pub fn register(&mut self, descriptor: crate::program::ProgramDescriptor) {
        self.registry.register(descriptor);
    }

    /// Whether the block's instance is live and running.
    pub fn is_running(&self, block: BlockId) -> bool {
        matches!(self.slots.get(&block), Some(MountSlot::Live(i)) if i.is_running())
    }

    /// The instance's lifecycle phase, if one is mounted.
    pub fn phase(&self, block: BlockId) -> Option<Phase> {
        match self.slots.get(&block) {
            Some(MountSlot::Live(i)) => Some(i.phase),
            _ => None,
        }
    }

    /// The error marker text shown on a block, if any.
    ///
    /// Covers both a failed program lookup and an errored instance.
    pub fn mount_error(&self, block: BlockId) -> Option<String> {
        match self.slots.get(&block) {
            Some(MountSlot::Failed { name }) => Some(format!("Unknown program '{}'", name)),
            Some(MountSlot::Live(i)) => i.error.clone(),
            None => None,
        }
    }

    /// The authoritative local state of a mounted instance.
    pub fn state(&self, block: BlockId) -> Option<&LocalState> {
        match self.slots.get(&block) {
            Some(MountSlot::Live(i)) => Some(&i.state),
            _ => None,
        }
    }

    /// Number of mounted slots (live and failed).
    pub fn mounted(&self) -> usize {
        self.slots.len()
    }

    /// Bring the mounted instances in line with the board.
    ///
    /// One pass per render cycle: prunes dangling connections, tears down
    /// instances whose block is gone, mounts instances for new blocks,
    /// rewires peer observers from the surviving connections, and mirrors
    /// every running instance's state into its block's state slice.
    pub fn reconcile(&mut self, board: &mut Board) {
        board.reconcile_connections();

        let live: HashMap<BlockId, (String, LocalState)> = board
            .pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .map(|b| (b.id, (b.program.name.clone(), b.program.state.clone())))
            .collect();

        // Teardown first so cleanups never observe the new tree.
        let gone: Vec<BlockId> = self
            .slots
            .keys()
            .filter(|id| !live.contains_key(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(MountSlot::Live(mut instance)) = self.slots.remove(&id) {
                instance.teardown();
            }
        }

        for (&id, (name, state)) in &live {
            let remount = match self.slots.get(&id) {
                None => true,
                Some(MountSlot::Failed { name: failed }) => failed != name,
                Some(MountSlot::Live(i)) => &i.program.name != name,
            };
            if !remount {
                continue;
            }
            if let Some(MountSlot::Live(mut old)) = self.slots.remove(&id) {
                old.teardown();
            }
            self.mount(id, name, state);
        }

        self.rewire(board);
        self.mirror(board);
    }

    fn mount(&mut self, block: BlockId, name: &str, slice: &LocalState) {
        match self.registry.lookup(name) {
            Some(program) => {
                let state = if slice.is_null() {
                    (program.init)()
                } else {
                    slice.clone()
                };
                let mut instance = Instance::new(block, program, state);
                instance.start(self.queue.clone());
                self.slots.insert(block, MountSlot::Live(instance));
            }
            None => {
                log::warn!("No program '{}' registered for {}", name, block);
                self.slots.insert(
                    block,
                    MountSlot::Failed {
                        name: name.to_string(),
                    },
                );
            }
        }
    }

    /// Rebuild the observer table from the board's connections.
    ///
    /// A connection only becomes an observer entry while both endpoint
    /// instances are running and the slot still allows the target's
    /// program; otherwise it stays inert until conditions hold again.
    fn rewire(&mut self, board: &Board) {
        self.observers.clear();
        for page in &board.pages {
            for connection in &page.connections {
                if self.connection_is_wirable(connection) {
                    self.observers
                        .entry(connection.target)
                        .or_default()
                        .push((connection.source, connection.name.clone()));
                }
            }
        }
    }

    fn connection_is_wirable(&self, connection: &Connection) -> bool {
        let (Some(MountSlot::Live(source)), Some(MountSlot::Live(target))) = (
            self.slots.get(&connection.source),
            self.slots.get(&connection.target),
        ) else {
            return false;
        };
        if !source.is_running() || !target.is_running() {
            return false;
        }
        let Some(slot) = source.program.slot(&connection.name) else {
            return false;
        };
        slot.allowed.contains(&target.program.name)
    }

    fn mirror(&self, board: &mut Board) {
        for (&id, slot) in &self.slots {
            if let MountSlot::Live(instance) = slot {
                if instance.is_running() {
                    if let Some(block) = board.block_mut(id) {
                        block.program.state = instance.state.clone();
                    }
                }
            }
        }
    }

    /// Adopt the board's state slices as the instances' states.
    ///
    /// Called after a history jump or a document load, where the block
    /// tree, not the instances, holds the authoritative state.
    pub fn sync_from_board(&mut self, board: &Board) {
        for (&id, slot) in &mut self.slots {
            if let MountSlot::Live(instance) = slot {
                if let Some(block) = board.block(id) {
                    if !block.program.state.is_null() {
                        instance.state = block.program.state.clone();
                    }
                }
            }
        }
    }

    /// Dispatch a named action against the instance mounted in `block`.
    ///
    /// The state mutation is fully applied before this returns: the
    /// instance's state is replaced, the block's state slice is written,
    /// and direct peer observers are notified. Effects are only queued;
    /// they run in [`CompositionHost::run_pending`] after the next render.
    ///
    /// A handler error or an unknown action marks the instance errored and
    /// leaves its last good state in place. Dispatches against a missing
    /// or non-running instance are dropped.
    ///
    /// Returns true if the state changed.
    pub fn dispatch(
        &mut self,
        board: &mut Board,
        block: BlockId,
        action: &str,
        payload: Payload,
    ) -> bool {
        let (program, state) = match self.slots.get(&block) {
            Some(MountSlot::Live(i)) if i.is_running() => (i.program.clone(), i.state.clone()),
            _ => {
                log::debug!("Dropping dispatch '{}' to non-running {}", action, block);
                return false;
            }
        };

        // Trampoline: follow redirects without recursion, bounded by
        // REDIRECT_LIMIT hops.
        let mut action = action.to_string();
        let mut payload = payload;
        let mut effects = Vec::new();
        let mut hops = 0;
        let result = loop {
            let Some(handler) = program.actions.get(&action) else {
                break Err(format!("Unknown action '{}'", action));
            };
            match handler(&state, &payload) {
                Ok(ActionOutcome::Replace(next)) => break Ok(next),
                Ok(ActionOutcome::WithEffects(next, mut scheduled)) => {
                    effects.append(&mut scheduled);
                    break Ok(next);
                }
                Ok(ActionOutcome::Redirect(next_action, next_payload)) => {
                    hops += 1;
                    if hops >= REDIRECT_LIMIT {
                        break Err(format!(
                            "Redirect limit ({}) exceeded at '{}'",
                            REDIRECT_LIMIT, next_action
                        ));
                    }
                    action = next_action;
                    payload = next_payload;
                }
                Err(e) => break Err(e.to_string()),
            }
        };

        let Some(MountSlot::Live(instance)) = self.slots.get_mut(&block) else {
            return false;
        };
        let next = match result {
            Ok(next) => next,
            Err(cause) => {
                instance.fail(cause);
                return false;
            }
        };
        instance.state = next.clone();

        // The dispatch writes only the owning block's slice.
        if let Some(slice) = board.block_mut(block) {
            slice.program.state = next.clone();
        }
        for effect in effects {
            self.pending_effects.push((block, effect));
        }
        self.notify_observers(block, &next);
        true
    }

    /// Notify every instance observing `block` of its new state.
    ///
    /// Handlers run synchronously but can only queue dispatches; the queue
    /// drains in [`CompositionHost::run_pending`].
    fn notify_observers(&self, block: BlockId, state: &LocalState) {
        let Some(observers) = self.observers.get(&block) else {
            return;
        };
        for (source, slot_name) in observers {
            let Some(MountSlot::Live(observer)) = self.slots.get(source) else {
                continue;
            };
            if !observer.is_running() {
                continue;
            }
            if let Some(slot) = observer.program.slot(slot_name) {
                let dispatch = Dispatch::new(*source, self.queue.clone());
                (slot.on_peer_state)(&dispatch, state);
            }
        }
    }

    /// Run queued effects and drain the dispatch queue until quiescent.
    ///
    /// Effects whose block has been deleted since they were scheduled are
    /// dropped, as are queued dispatches against deleted blocks.
    pub fn run_pending(&mut self, board: &mut Board) {
        loop {
            if self.pending_effects.is_empty() && self.queue.borrow().is_empty() {
                break;
            }

            let effects = std::mem::take(&mut self.pending_effects);
            for (block, effect) in effects {
                if !self.is_running(block) || board.block(block).is_none() {
                    log::debug!("Dropping stale effect for {}", block);
                    continue;
                }
                let dispatch = Dispatch::new(block, self.queue.clone());
                effect.invoke(&dispatch);
            }

            let queued: Vec<QueuedDispatch> = self.queue.borrow_mut().drain(..).collect();
            for item in queued {
                if board.block(item.block).is_none() {
                    log::debug!("Dropping stale dispatch '{}' for {}", item.action, item.block);
                    continue;
                }
                self.dispatch(board, item.block, &item.action, item.payload);
            }
        }
    }

    /// Create a connection from `source`'s named slot to `target`.
    ///
    /// Validated against the slot's peer allow-list: a self-loop, an
    /// unknown slot, a non-running endpoint or a disallowed peer program
    /// is a silent no-op. Returns true if the connection was created (or
    /// already existed).
    pub fn connect(
        &mut self,
        board: &mut Board,
        slot: &str,
        source: BlockId,
        target: BlockId,
    ) -> bool {
        if source == target {
            log::debug!("Refusing self-connection on {}", source);
            return false;
        }
        let connection = Connection {
            name: slot.to_string(),
            source,
            target,
        };
        if !self.connection_is_wirable(&connection) {
            log::debug!(
                "Connection '{}' {} -> {} rejected by allow-list",
                slot,
                source,
                target
            );
            return false;
        }
        let Some(page) = board.page_of_block_mut(source) else {
            return false;
        };
        if page.block(target).is_none() {
            log::debug!("Connection endpoints are on different pages");
            return false;
        }
        if !page.connections.contains(&connection) {
            page.connections.push(connection);
            self.observers
                .entry(target)
                .or_default()
                .push((source, slot.to_string()));
        }
        true
    }
}

impl std::fmt::Debug for CompositionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionHost")
            .field("mounted", &self.slots.len())
            .field("observed_targets", &self.observers.len())
            .field("pending_effects", &self.pending_effects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ActionOutcome, Effect, ProgramDescriptor, ProgramError};
    use kurbo::Size;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    const VIEWPORT: Size = Size::new(800.0, 600.0);

    fn counter() -> ProgramDescriptor {
        ProgramDescriptor::new("counter", || json!({"count": 0}))
            .with_action("add", |state, payload| {
                let count = state["count"].as_i64().unwrap_or(0);
                let by = payload.as_i64().unwrap_or(1);
                Ok(ActionOutcome::Replace(json!({"count": count + by})))
            })
            .with_action("double", |_, payload| {
                let by = payload.as_i64().unwrap_or(1);
                Ok(ActionOutcome::Redirect("add".into(), json!(by * 2)))
            })
            .with_action("loop", |_, _| {
                Ok(ActionOutcome::Redirect("loop".into(), json!(null)))
            })
            .with_action("explode", |_, _| {
                Err(ProgramError::Failed("deliberate".into()))
            })
    }

    fn host_with(programs: Vec<ProgramDescriptor>) -> CompositionHost {
        let mut registry = ProgramRegistry::new();
        for program in programs {
            registry.register(program);
        }
        CompositionHost::new(registry)
    }

    fn add(board: &mut Board, program: &str) -> BlockId {
        board.add_block(program, None, None, None, VIEWPORT)
    }

    #[test]
    fn test_reconcile_mounts_and_initializes() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = add(&mut board, "counter");

        host.reconcile(&mut board);
        assert!(host.is_running(id));
        // Initial state is mirrored into the block's slice.
        assert_eq!(board.block(id).unwrap().program.state, json!({"count": 0}));
    }

    #[test]
    fn test_unknown_program_is_inert_marker_until_renamed() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = add(&mut board, "nonexistent");

        host.reconcile(&mut board);
        assert!(!host.is_running(id));
        assert!(host.mount_error(id).unwrap().contains("nonexistent"));

        // Stays failed across cycles; no retry storm.
        host.reconcile(&mut board);
        assert!(!host.is_running(id));

        // Changing the program name retries the mount.
        board.block_mut(id).unwrap().program.name = "counter".into();
        host.reconcile(&mut board);
        assert!(host.is_running(id));
    }

    #[test]
    fn test_dispatch_applies_and_mirrors() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = add(&mut board, "counter");
        host.reconcile(&mut board);

        assert!(host.dispatch(&mut board, id, "add", json!(5)));
        assert_eq!(host.state(id), Some(&json!({"count": 5})));
        // The slice is written synchronously, before any render.
        assert_eq!(board.block(id).unwrap().program.state, json!({"count": 5}));
    }

    #[test]
    fn test_redirect_trampolines_to_target_action() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = add(&mut board, "counter");
        host.reconcile(&mut board);

        host.dispatch(&mut board, id, "double", json!(3));
        assert_eq!(host.state(id), Some(&json!({"count": 6})));
    }

    #[test]
    fn test_redirect_cycle_errors_out() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = add(&mut board, "counter");
        host.reconcile(&mut board);

        assert!(!host.dispatch(&mut board, id, "loop", json!(null)));
        assert_eq!(host.phase(id), Some(Phase::Errored));
        assert!(host.mount_error(id).unwrap().contains("Redirect limit"));
    }

    #[test]
    fn test_handler_error_is_contained() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let a = add(&mut board, "counter");
        let b = add(&mut board, "counter");
        host.reconcile(&mut board);
        host.dispatch(&mut board, a, "add", json!(2));

        assert!(!host.dispatch(&mut board, a, "explode", json!(null)));
        // Last good state kept; the sibling instance is untouched.
        assert_eq!(host.phase(a), Some(Phase::Errored));
        assert_eq!(host.state(a), Some(&json!({"count": 2})));
        assert!(host.is_running(b));

        // Further dispatches to the errored instance are dropped.
        assert!(!host.dispatch(&mut board, a, "add", json!(1)));
        assert_eq!(host.state(a), Some(&json!({"count": 2})));
    }

    #[test]
    fn test_effects_run_after_commit_and_target_own_slice() {
        let ticker = ProgramDescriptor::new("ticker", || json!({"ticks": 0}))
            .with_action("tick", |state, _| {
                let ticks = state["ticks"].as_i64().unwrap_or(0);
                Ok(ActionOutcome::Replace(json!({"ticks": ticks + 1})))
            })
            .with_action("start", |state, _| {
                let effect = Effect::new(|dispatch, _| dispatch.call("tick", json!(null)));
                Ok(ActionOutcome::WithEffects(state.clone(), vec![effect]))
            });

        let mut board = Board::new();
        let mut host = host_with(vec![ticker]);
        let a = add(&mut board, "ticker");
        let b = add(&mut board, "ticker");
        host.reconcile(&mut board);

        host.dispatch(&mut board, a, "start", json!(null));
        // Nothing ran yet; effects wait for the drain.
        assert_eq!(host.state(a), Some(&json!({"ticks": 0})));

        host.run_pending(&mut board);
        assert_eq!(host.state(a), Some(&json!({"ticks": 1})));
        // The lifted effect only touched the instance that scheduled it.
        assert_eq!(host.state(b), Some(&json!({"ticks": 0})));
    }

    #[test]
    fn test_stale_effect_is_dropped_after_delete() {
        let ticker = ProgramDescriptor::new("ticker", || json!({"ticks": 0}))
            .with_action("tick", |state, _| {
                let ticks = state["ticks"].as_i64().unwrap_or(0);
                Ok(ActionOutcome::Replace(json!({"ticks": ticks + 1})))
            })
            .with_action("start", |state, _| {
                let effect = Effect::new(|dispatch, _| dispatch.call("tick", json!(null)));
                Ok(ActionOutcome::WithEffects(state.clone(), vec![effect]))
            });

        let mut board = Board::new();
        let mut host = host_with(vec![ticker]);
        let id = add(&mut board, "ticker");
        host.reconcile(&mut board);

        host.dispatch(&mut board, id, "start", json!(null));
        board.delete_block(id);
        host.reconcile(&mut board);

        // The queued effect's target is gone; draining is a no-op.
        host.run_pending(&mut board);
        assert_eq!(host.mounted(), 0);
    }

    #[test]
    fn test_teardown_runs_cleanups_on_delete() {
        let torn = Rc::new(RefCell::new(false));
        let observed = torn.clone();
        let ticker =
            ProgramDescriptor::new("ticker", || json!(null)).with_subscription(move |_| {
                let torn = observed.clone();
                Box::new(move || *torn.borrow_mut() = true)
            });

        let mut board = Board::new();
        let mut host = host_with(vec![ticker]);
        let id = add(&mut board, "ticker");
        host.reconcile(&mut board);
        assert!(!*torn.borrow());

        board.delete_block(id);
        host.reconcile(&mut board);
        assert!(*torn.borrow());
    }

    fn display_and_counter() -> Vec<ProgramDescriptor> {
        let display = ProgramDescriptor::new("display", || json!({"shown": null}))
            .with_action("show", |_, payload| {
                Ok(ActionOutcome::Replace(json!({"shown": payload})))
            })
            .with_slot("feed", vec!["counter".into()], |dispatch, peer_state| {
                dispatch.call("show", peer_state["count"].clone());
            });
        vec![display, counter()]
    }

    #[test]
    fn test_connect_allowed_peer_observes_state() {
        let mut board = Board::new();
        let mut host = host_with(display_and_counter());
        let display = add(&mut board, "display");
        let source = add(&mut board, "counter");
        host.reconcile(&mut board);

        assert!(host.connect(&mut board, "feed", display, source));
        host.dispatch(&mut board, source, "add", json!(4));
        host.run_pending(&mut board);

        assert_eq!(host.state(display), Some(&json!({"shown": 4})));
    }

    #[test]
    fn test_connect_disallowed_peer_is_silent_noop() {
        let mut board = Board::new();
        let mut host = host_with(display_and_counter());
        let display_a = add(&mut board, "display");
        let display_b = add(&mut board, "display");
        host.reconcile(&mut board);

        // "feed" only allows counters; no connection, no error.
        assert!(!host.connect(&mut board, "feed", display_a, display_b));
        assert!(board.current_page().connections.is_empty());
    }

    #[test]
    fn test_connect_self_loop_refused() {
        let mut board = Board::new();
        let mut host = host_with(display_and_counter());
        let display = add(&mut board, "display");
        host.reconcile(&mut board);

        assert!(!host.connect(&mut board, "feed", display, display));
        assert!(board.current_page().connections.is_empty());
    }

    #[test]
    fn test_deleted_endpoint_unwires_observer_next_cycle() {
        let mut board = Board::new();
        let mut host = host_with(display_and_counter());
        let display = add(&mut board, "display");
        let source = add(&mut board, "counter");
        host.reconcile(&mut board);
        host.connect(&mut board, "feed", display, source);

        board.delete_block(display);
        host.reconcile(&mut board);

        // Connection pruned, observer gone; dispatching the ex-peer is safe.
        assert!(board.current_page().connections.is_empty());
        host.dispatch(&mut board, source, "add", json!(1));
        host.run_pending(&mut board);
        assert_eq!(host.state(source), Some(&json!({"count": 1})));
    }

    #[test]
    fn test_loaded_slice_seeds_instance_state() {
        let mut board = Board::new();
        let mut host = host_with(vec![counter()]);
        let id = board.add_block("counter", Some(json!({"count": 42})), None, None, VIEWPORT);

        host.reconcile(&mut board);
        assert_eq!(host.state(id), Some(&json!({"count": 42})));
    }
}
