//! BlockInk Core Library
//!
//! Canonical data model and manipulation logic for the BlockInk infinite
//! canvas: pages of blocks, memento undo/redo, pan/zoom camera and the
//! drag/resize/connect gesture engine.

pub mod block;
pub mod board;
pub mod camera;
pub mod history;
pub mod input;
pub mod manipulation;
pub mod page;
pub mod platform;
pub mod storage;

pub use block::{Block, BlockId, ProgramCell, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use board::{Board, StoreRequest, PASTE_OFFSET};
pub use camera::{Camera, ScrollIntent};
pub use history::{History, Memento, GESTURE_EPSILON, MAX_UNDO_HISTORY};
pub use input::{InputState, Modifiers, MouseButton, PointerEvent};
pub use manipulation::{
    hit_test_handles, hits_selection, resize, resize_locked, resolve_connect_click,
    selection_bounds, DragGesture, GestureAction, ResizeGesture, ResizeHandle,
};
pub use page::{Connection, InteractionState, Page, PageId};
pub use platform::{MemoryPlatform, NullPlatform, Platform, PlatformError, Theme};
pub use storage::{
    load_or_default, FileStorage, MemoryStorage, PersistedDocument, Storage, StorageError,
};
