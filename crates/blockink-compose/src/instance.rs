//! A mounted program instance and its lifecycle.

use std::rc::Rc;

use blockink_core::BlockId;

use crate::program::{Cleanup, Dispatch, DispatchQueue, LocalState, ProgramDescriptor};

/// Lifecycle phase of a mounted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, subscriptions not yet installed.
    Mounting,
    /// Live: dispatches apply, peers are notified.
    Running,
    /// A handler failed. Last good state is kept, further dispatches are
    /// dropped until the instance is torn down.
    Errored,
    /// Cleanups have run; terminal.
    TornDown,
}

/// One program instance mounted into a block.
pub struct Instance {
    /// The block this instance lives in.
    pub block: BlockId,
    /// The program being run.
    pub program: Rc<ProgramDescriptor>,
    /// Current local state (the authoritative copy; mirrored into the
    /// block's state slice each render cycle).
    pub state: LocalState,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Human-readable cause when `phase` is [`Phase::Errored`].
    pub error: Option<String>,
    cleanups: Vec<Cleanup>,
}

impl Instance {
    /// Create an instance in the mounting phase with the given state.
    pub fn new(block: BlockId, program: Rc<ProgramDescriptor>, state: LocalState) -> Self {
        Self {
            block,
            program,
            state,
            phase: Phase::Mounting,
            error: None,
            cleanups: Vec::new(),
        }
    }

    /// Install the program's subscriptions and transition to running.
    pub fn start(&mut self, queue: DispatchQueue) {
        debug_assert_eq!(self.phase, Phase::Mounting);
        let program = self.program.clone();
        for subscribe in &program.subscriptions {
            let dispatch = Dispatch::new(self.block, queue.clone());
            self.cleanups.push(subscribe(dispatch));
        }
        self.phase = Phase::Running;
        log::debug!("Mounted '{}' into {}", self.program.name, self.block);
    }

    /// Mark the instance errored, keeping its last good state.
    pub fn fail(&mut self, cause: impl Into<String>) {
        let cause = cause.into();
        log::warn!(
            "Program '{}' on {} errored: {}",
            self.program.name,
            self.block,
            cause
        );
        self.error = Some(cause);
        self.phase = Phase::Errored;
    }

    /// Run all cleanups and transition to the terminal phase.
    pub fn teardown(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
        self.phase = Phase::TornDown;
        log::debug!("Tore down '{}' from {}", self.program.name, self.block);
    }

    /// Whether dispatches currently apply to this instance.
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.phase != Phase::TornDown {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("block", &self.block)
            .field("program", &self.program.name)
            .field("phase", &self.phase)
            .field("error", &self.error)
            .finish()
    }
}
