//! Pages, connections and per-page interaction state.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{Block, BlockId};
use crate::camera::Camera;
use crate::manipulation::{DragGesture, ResizeGesture};

/// Unique identifier for a page.
pub type PageId = Uuid;

/// A named, directed edge between two blocks' program instances.
///
/// Connections are validated against the source program's peer allow-list
/// when created, and pruned by id membership on each reconcile pass after
/// an endpoint block is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection slot name declared by the source program.
    pub name: String,
    /// Block whose program observes the target.
    pub source: BlockId,
    /// Block whose program state changes are observed.
    pub target: BlockId,
}

/// Transient and selection state for one page.
///
/// Gesture bookkeeping is never persisted and never snapshotted as a
/// meaningful mutation; it is reset unconditionally after a history jump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionState {
    /// Currently selected block ids (always a subset of the page's blocks).
    pub selected: Vec<BlockId>,
    /// Block in edit mode, if any. Mutually exclusive with `connecting`.
    pub editing: Option<BlockId>,
    /// Block the pointer is hovering, if any.
    #[serde(skip)]
    pub hovering: Option<BlockId>,
    /// Block that initiated connect mode, if any. Mutually exclusive with
    /// `editing`.
    #[serde(skip)]
    pub connecting: Option<BlockId>,
    /// Active resize gesture, if any.
    #[serde(skip)]
    pub resizing: Option<ResizeGesture>,
    /// Active drag gesture, if any.
    #[serde(skip)]
    pub dragging: Option<DragGesture>,
    /// Blocks highlighted by an in-progress marquee selection.
    #[serde(skip)]
    pub preview_selected: Vec<BlockId>,
}

impl InteractionState {
    /// Reset all transient gesture flags, keeping the selection.
    ///
    /// Called after undo/redo so a history jump can never leave a stuck
    /// drag, resize or connect gesture behind.
    pub fn reset_transient(&mut self) {
        self.hovering = None;
        self.connecting = None;
        self.resizing = None;
        self.dragging = None;
        self.preview_selected.clear();
    }
}

/// A page: a set of blocks with connections, its own camera and its own
/// interaction state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Unique page identifier.
    pub id: PageId,
    /// User-visible page name.
    pub name: String,
    /// All blocks on this page.
    pub blocks: Vec<Block>,
    /// Directed connections between blocks on this page.
    pub connections: Vec<Connection>,
    /// Pan/zoom state for this page.
    pub camera: Camera,
    /// Selection and gesture state.
    #[serde(default)]
    pub interaction: InteractionState,
}

impl Page {
    /// Create a new empty page with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            blocks: Vec::new(),
            connections: Vec::new(),
            camera: Camera::new(),
            interaction: InteractionState::default(),
        }
    }

    /// Get a block by id.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Get a mutable block by id.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Remove a block, clearing any interaction state that pointed at it.
    pub fn remove_block(&mut self, id: BlockId) -> Option<Block> {
        let idx = self.blocks.iter().position(|b| b.id == id)?;
        let block = self.blocks.remove(idx);
        self.interaction.selected.retain(|&s| s != id);
        self.interaction.preview_selected.retain(|&s| s != id);
        if self.interaction.editing == Some(id) {
            self.interaction.editing = None;
        }
        if self.interaction.hovering == Some(id) {
            self.interaction.hovering = None;
        }
        if self.interaction.connecting == Some(id) {
            self.interaction.connecting = None;
        }
        Some(block)
    }

    /// Blocks in paint order (back to front).
    pub fn blocks_ordered(&self) -> Vec<&Block> {
        let mut ordered: Vec<&Block> = self.blocks.iter().collect();
        ordered.sort_by_key(|b| b.z_order);
        ordered
    }

    /// Find blocks under a canvas point, front to back.
    pub fn blocks_at_point(&self, point: Point) -> Vec<BlockId> {
        let mut hits: Vec<&Block> = self.blocks.iter().filter(|b| b.contains(point)).collect();
        hits.sort_by_key(|b| std::cmp::Reverse(b.z_order));
        hits.iter().map(|b| b.id).collect()
    }

    /// The topmost block under a canvas point, if any.
    pub fn top_block_at(&self, point: Point) -> Option<BlockId> {
        self.blocks_at_point(point).into_iter().next()
    }

    /// Select a single block (clears previous selection).
    pub fn select(&mut self, id: BlockId) {
        self.interaction.selected.clear();
        self.add_to_selection(id);
    }

    /// Add a block to the selection.
    pub fn add_to_selection(&mut self, id: BlockId) {
        if self.block(id).is_some() && !self.interaction.selected.contains(&id) {
            self.interaction.selected.push(id);
        }
    }

    /// Remove a block from the selection.
    pub fn deselect(&mut self, id: BlockId) {
        self.interaction.selected.retain(|&s| s != id);
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        self.interaction.selected.clear();
    }

    /// Select every block on the page.
    pub fn select_all(&mut self) {
        self.interaction.selected = self.blocks.iter().map(|b| b.id).collect();
    }

    /// Check if a block is selected.
    pub fn is_selected(&self, id: BlockId) -> bool {
        self.interaction.selected.contains(&id)
    }

    /// Enter edit mode for a block. Exits connect mode: the two are
    /// mutually exclusive.
    pub fn enter_edit(&mut self, id: BlockId) {
        if self.block(id).is_some() {
            self.interaction.connecting = None;
            self.interaction.editing = Some(id);
        }
    }

    /// Exit edit mode.
    pub fn exit_edit(&mut self) {
        self.interaction.editing = None;
    }

    /// Enter connect mode originating at a block. Exits edit mode.
    pub fn enter_connect(&mut self, id: BlockId) {
        if self.block(id).is_some() {
            self.interaction.editing = None;
            self.interaction.connecting = Some(id);
        }
    }

    /// Exit connect mode.
    pub fn exit_connect(&mut self) {
        self.interaction.connecting = None;
    }

    /// Set the hovered block.
    pub fn set_hovering(&mut self, id: Option<BlockId>) {
        self.interaction.hovering = id;
    }

    /// Drop connections whose endpoints no longer exist on this page.
    ///
    /// Deletion is decoupled from validity checking: this runs once per
    /// render cycle rather than synchronously at delete time.
    pub fn prune_connections(&mut self) {
        let live: std::collections::HashSet<BlockId> =
            self.blocks.iter().map(|b| b.id).collect();
        self.connections
            .retain(|c| live.contains(&c.source) && live.contains(&c.target));
    }
}
