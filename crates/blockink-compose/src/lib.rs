//! BlockInk Program Composition
//!
//! Lifts independent reactive mini-programs into the shared block tree.
//! Programs are written against their own local state; the composition
//! host mounts one instance per block, routes named actions through a
//! redirect trampoline, defers effects until after each render, and
//! notifies connected peers through declared, allow-listed slots.

pub mod host;
pub mod instance;
pub mod program;
pub mod registry;
pub mod session;

pub use host::{CompositionHost, REDIRECT_LIMIT};
pub use instance::{Instance, Phase};
pub use program::{
    ActionFn, ActionOutcome, Cleanup, ConnectSlot, Dispatch, Effect, LocalState, Payload,
    PeerHandler, ProgramDescriptor, ProgramError, SubscribeFn,
};
pub use registry::ProgramRegistry;
pub use session::Session;
