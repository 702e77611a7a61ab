//! The page/block store: canonical document state plus its history.

use kurbo::{Point, Rect, Size, Vec2};

use crate::block::{Block, BlockId, ProgramCell, DEFAULT_BLOCK_SIZE};
use crate::history::{History, Memento, GESTURE_EPSILON};
use crate::page::{Page, PageId};

/// Canvas-space offset applied to pasted blocks.
pub const PASTE_OFFSET: Vec2 = Vec2::new(16.0, 16.0);

/// A side effect the store asks its host to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRequest {
    /// Clear the host text clipboard so block data does not leak into
    /// system clipboard text.
    ClearHostClipboard,
}

/// The canonical data model: pages of blocks, the block clipboard and the
/// undo/redo history.
///
/// Every externally meaningful mutation snapshots the pre-mutation state
/// into the history first. Mutations are copy-and-replace over cloned
/// pages, never exposed mid-edit.
#[derive(Debug, Clone)]
pub struct Board {
    /// All pages, in user order.
    pub pages: Vec<Page>,
    /// The page currently shown.
    pub current_page_id: PageId,
    /// Block clipboard; the snapshot is tagged with the sentinel id and is
    /// not a real block.
    clipboard: Option<Block>,
    /// Undo/redo history.
    pub history: History,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create a board with a single empty page.
    pub fn new() -> Self {
        let page = Page::new("Page 1");
        let current_page_id = page.id;
        Self {
            pages: vec![page],
            current_page_id,
            clipboard: None,
            history: History::new(),
        }
    }

    /// Rebuild a board from loaded pages.
    ///
    /// Falls back to a fresh single-page board when `pages` is empty or
    /// `current_page_id` does not name one of them.
    pub fn from_parts(pages: Vec<Page>, current_page_id: PageId) -> Self {
        if pages.is_empty() {
            return Self::new();
        }
        let current_page_id = if pages.iter().any(|p| p.id == current_page_id) {
            current_page_id
        } else {
            pages[0].id
        };
        Self {
            pages,
            current_page_id,
            clipboard: None,
            history: History::new(),
        }
    }

    /// The current page.
    pub fn current_page(&self) -> &Page {
        self.pages
            .iter()
            .find(|p| p.id == self.current_page_id)
            .unwrap_or(&self.pages[0])
    }

    /// The current page, mutably.
    pub fn current_page_mut(&mut self) -> &mut Page {
        let id = self.current_page_id;
        let idx = self
            .pages
            .iter()
            .position(|p| p.id == id)
            .unwrap_or(0);
        &mut self.pages[idx]
    }

    /// Get a page by id.
    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    /// Get a mutable page by id.
    pub fn page_mut(&mut self, id: PageId) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.id == id)
    }

    /// Find the page containing a block.
    pub fn page_of_block(&self, id: BlockId) -> Option<&Page> {
        self.pages.iter().find(|p| p.block(id).is_some())
    }

    /// Find the page containing a block, mutably.
    pub fn page_of_block_mut(&mut self, id: BlockId) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.block(id).is_some())
    }

    /// Get a block by id, searching all pages.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.pages.iter().find_map(|p| p.block(id))
    }

    /// Get a mutable block by id, searching all pages.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.pages.iter_mut().find_map(|p| p.block_mut(id))
    }

    /// Next globally unique block id (current global max + 1).
    fn next_block_id(&self) -> BlockId {
        let max = self
            .pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .map(|b| b.id.0)
            .max()
            .unwrap_or(0);
        BlockId(max + 1)
    }

    /// Next z-order value (current global max + 1; 1 on an empty board,
    /// like the id allocator).
    fn next_z(&self) -> i64 {
        self.pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .map(|b| b.z_order)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Z-order value below everything (current global min − 1).
    fn back_z(&self) -> i64 {
        self.pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .map(|b| b.z_order)
            .min()
            .unwrap_or(0)
            - 1
    }

    /// Deep copy of the canvas-level state.
    pub fn snapshot(&self) -> Memento {
        Memento {
            pages: self.pages.clone(),
            current_page_id: self.current_page_id,
        }
    }

    /// Push the pre-mutation state to the history (call before mutating).
    fn record(&mut self) {
        let memento = self.snapshot();
        self.history.push(memento);
    }

    fn restore(&mut self, memento: Memento) {
        self.pages = memento.pages;
        self.current_page_id = memento.current_page_id;
        // A history jump must never leave a stuck gesture behind.
        for page in &mut self.pages {
            page.interaction.reset_transient();
        }
    }

    /// Undo the last mutation. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(memento) => {
                self.restore(memento);
                true
            }
            None => false,
        }
    }

    /// Redo the last undone mutation. Returns false if there was nothing
    /// to redo.
    pub fn redo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(memento) => {
                self.restore(memento);
                true
            }
            None => false,
        }
    }

    /// Add a block hosting the named program to the current page.
    ///
    /// An explicit position is the stored top-left corner; when omitted
    /// the block is centered on the viewport. Size defaults to
    /// [`DEFAULT_BLOCK_SIZE`] square. The new block gets the next global
    /// id, lands on top of everything, and becomes the sole selection.
    pub fn add_block(
        &mut self,
        program_name: &str,
        initial_state: Option<serde_json::Value>,
        position: Option<Point>,
        size: Option<Size>,
        viewport: Size,
    ) -> BlockId {
        self.record();

        let id = self.next_block_id();
        let z_order = self.next_z();
        let size = size.unwrap_or(Size::new(DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE));
        let page = self.current_page_mut();
        let (x, y) = match position {
            Some(p) => (p.x, p.y),
            None => {
                let center = page.camera.viewport_center(viewport);
                (center.x - size.width / 2.0, center.y - size.height / 2.0)
            }
        };

        let program = match initial_state {
            Some(state) => ProgramCell::with_state(program_name, state),
            None => ProgramCell::new(program_name),
        };
        page.blocks.push(Block {
            id,
            x,
            y,
            width: size.width,
            height: size.height,
            z_order,
            program,
        });
        page.select(id);
        id
    }

    /// Delete a block from whichever page holds it.
    ///
    /// Connections referencing the block are pruned on the next reconcile
    /// pass, not here.
    pub fn delete_block(&mut self, id: BlockId) -> bool {
        if self.page_of_block(id).is_none() {
            return false;
        }
        self.record();
        self.page_of_block_mut(id)
            .and_then(|p| p.remove_block(id))
            .is_some()
    }

    /// Raise a block above every other block (global max + 1).
    ///
    /// Relative only: no other block's z-order changes, values are never
    /// compacted.
    pub fn send_to_front(&mut self, id: BlockId) {
        if self.block(id).is_none() {
            return;
        }
        self.record();
        let z = self.next_z();
        if let Some(block) = self.block_mut(id) {
            block.z_order = z;
        }
    }

    /// Lower a block below every other block (global min − 1).
    pub fn send_to_back(&mut self, id: BlockId) {
        if self.block(id).is_none() {
            return;
        }
        self.record();
        let z = self.back_z();
        if let Some(block) = self.block_mut(id) {
            block.z_order = z;
        }
    }

    /// Copy the first selected block on the current page to the block
    /// clipboard. Not a tree mutation; nothing is snapshotted.
    pub fn copy_selected_block(&mut self) -> bool {
        let page = self.current_page();
        let Some(&selected) = page.interaction.selected.first() else {
            return false;
        };
        let Some(block) = page.block(selected) else {
            return false;
        };
        let mut snapshot = block.clone();
        snapshot.id = BlockId::CLIPBOARD;
        self.clipboard = Some(snapshot);
        true
    }

    /// Paste the clipboard block onto the current page.
    ///
    /// The paste allocates a fresh id, offsets the position by
    /// [`PASTE_OFFSET`], selects the clone, and asks the host to clear its
    /// text clipboard.
    pub fn paste_block(&mut self) -> Option<(BlockId, StoreRequest)> {
        let template = self.clipboard.clone()?;
        self.record();

        let id = self.next_block_id();
        let z_order = self.next_z();
        let mut block = template;
        block.id = id;
        block.x += PASTE_OFFSET.x;
        block.y += PASTE_OFFSET.y;
        block.z_order = z_order;

        let page = self.current_page_mut();
        page.blocks.push(block);
        page.select(id);
        Some((id, StoreRequest::ClearHostClipboard))
    }

    /// Whether the block clipboard holds a snapshot.
    pub fn has_clipboard(&self) -> bool {
        self.clipboard.is_some()
    }

    /// Add a new page and make it current.
    pub fn add_page(&mut self, name: impl Into<String>) -> PageId {
        self.record();
        let page = Page::new(name);
        let id = page.id;
        self.pages.push(page);
        self.current_page_id = id;
        id
    }

    /// Delete a page. The last remaining page cannot be deleted.
    pub fn delete_page(&mut self, id: PageId) -> bool {
        if self.pages.len() <= 1 || self.page(id).is_none() {
            return false;
        }
        self.record();
        self.pages.retain(|p| p.id != id);
        if self.current_page_id == id {
            self.current_page_id = self.pages[0].id;
        }
        true
    }

    /// Rename a page.
    pub fn rename_page(&mut self, id: PageId, name: impl Into<String>) -> bool {
        if self.page(id).is_none() {
            return false;
        }
        self.record();
        if let Some(page) = self.page_mut(id) {
            page.name = name.into();
        }
        true
    }

    /// Switch the current page. Pure navigation; not snapshotted.
    pub fn set_current_page(&mut self, id: PageId) -> bool {
        if self.page(id).is_some() {
            self.current_page_id = id;
            true
        } else {
            false
        }
    }

    /// Prune connections with dead endpoints on every page. Runs once per
    /// render cycle.
    pub fn reconcile_connections(&mut self) {
        for page in &mut self.pages {
            page.prune_connections();
        }
    }

    /// Commit a finished drag gesture as a single undo step.
    ///
    /// The "before" snapshot is synthesized by subtracting the net delta
    /// from the post-gesture geometry, so one continuous gesture is exactly
    /// one undo entry. A gesture with no net movement commits nothing.
    pub fn commit_drag(&mut self, moved: &[BlockId], total: Vec2) {
        if total.x.abs() < GESTURE_EPSILON && total.y.abs() < GESTURE_EPSILON {
            return;
        }
        let mut before = self.snapshot();
        for page in &mut before.pages {
            for block in &mut page.blocks {
                if moved.contains(&block.id) {
                    block.x -= total.x;
                    block.y -= total.y;
                }
            }
        }
        self.history.push(before);
    }

    /// Commit a finished resize gesture as a single undo step.
    ///
    /// Synthesized like [`Board::commit_drag`]: the net geometry delta is
    /// subtracted from the post-gesture rect.
    pub fn commit_resize(&mut self, id: BlockId, start_rect: Rect) {
        let Some(block) = self.block(id) else {
            return;
        };
        let current = block.rect();
        let dx = current.x0 - start_rect.x0;
        let dy = current.y0 - start_rect.y0;
        let dw = current.width() - start_rect.width();
        let dh = current.height() - start_rect.height();
        if dx.abs() < GESTURE_EPSILON
            && dy.abs() < GESTURE_EPSILON
            && dw.abs() < GESTURE_EPSILON
            && dh.abs() < GESTURE_EPSILON
        {
            return;
        }
        let mut before = self.snapshot();
        for page in &mut before.pages {
            if let Some(block) = page.block_mut(id) {
                block.x -= dx;
                block.y -= dy;
                block.width -= dw;
                block.height -= dh;
            }
        }
        self.history.push(before);
    }
}
