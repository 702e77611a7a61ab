//! A live editing session: one board, one host, one storage backend.
//!
//! The session owns the synchronous pipeline: dispatch applies and settles,
//! a render cycle reconciles instances and mirrors state, then queued
//! effects drain. Persistence failures surface as user notices and never
//! roll the in-memory state back.

use blockink_core::{
    resolve_connect_click, BlockId, Board, GestureAction, PersistedDocument, Platform, Storage,
    StoreRequest,
};

use crate::host::CompositionHost;
use crate::program::Payload;
use crate::registry::ProgramRegistry;

/// A session over a board with mounted programs and persistence.
pub struct Session {
    /// The canonical document state.
    pub board: Board,
    /// The composition host driving program instances.
    pub host: CompositionHost,
    storage: Box<dyn Storage>,
    platform: Box<dyn Platform>,
    notices: Vec<String>,
}

impl Session {
    /// Create a session over a fresh single-page board.
    pub fn new(
        registry: ProgramRegistry,
        storage: Box<dyn Storage>,
        platform: Box<dyn Platform>,
    ) -> Self {
        Self {
            board: Board::new(),
            host: CompositionHost::new(registry),
            storage,
            platform,
            notices: Vec::new(),
        }
    }

    /// Run one render cycle: reconcile instances against the board, then
    /// drain queued effects and dispatches until quiescent.
    pub fn update(&mut self) {
        self.host.reconcile(&mut self.board);
        self.host.run_pending(&mut self.board);
    }

    /// Dispatch an action against a block's instance.
    ///
    /// The state mutation settles synchronously, then a render cycle runs
    /// and effects drain. Returns true if the state changed.
    pub fn dispatch(&mut self, block: BlockId, action: &str, payload: Payload) -> bool {
        let changed = self.host.dispatch(&mut self.board, block, action, payload);
        self.update();
        changed
    }

    /// Create a validated connection from `source`'s named slot to `target`.
    pub fn connect(&mut self, slot: &str, source: BlockId, target: BlockId) -> bool {
        self.host.connect(&mut self.board, slot, source, target)
    }

    /// Resolve a click on `clicked` while the current page is in connect
    /// mode, creating the connection if the slot's allow-list admits it.
    pub fn connect_click(&mut self, slot: &str, clicked: BlockId) -> bool {
        match resolve_connect_click(self.board.current_page_mut(), clicked) {
            GestureAction::ConnectRequested { source, target } => {
                self.host.connect(&mut self.board, slot, source, target)
            }
            GestureAction::None => false,
        }
    }

    /// Undo the last board mutation and remount/adopt as needed.
    pub fn undo(&mut self) -> bool {
        if !self.board.undo() {
            return false;
        }
        // The restored tree is authoritative; surviving instances adopt
        // their slices, vanished ones remount from them.
        self.host.sync_from_board(&self.board);
        self.update();
        true
    }

    /// Redo the last undone board mutation.
    pub fn redo(&mut self) -> bool {
        if !self.board.redo() {
            return false;
        }
        self.host.sync_from_board(&self.board);
        self.update();
        true
    }

    /// Paste the block clipboard, clearing the host text clipboard as the
    /// store requests. Returns the pasted block's id.
    pub async fn paste(&mut self) -> Option<BlockId> {
        let (id, request) = self.board.paste_block()?;
        match request {
            StoreRequest::ClearHostClipboard => {
                if let Err(e) = self.platform.write_clipboard("").await {
                    log::debug!("Could not clear host clipboard: {}", e);
                }
            }
        }
        self.update();
        Some(id)
    }

    /// Persist the document under `id`.
    ///
    /// On failure the in-memory state stays exactly as it was; the failure
    /// is recorded as a notice. Returns true on success.
    pub async fn save(&mut self, id: &str) -> bool {
        // Mirror once more so the persisted slices are current.
        self.host.reconcile(&mut self.board);
        let document = PersistedDocument::from_board(&self.board);
        match self.storage.save(id, &document).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Save of '{}' failed: {}", id, e);
                self.notices.push(format!("Could not save document: {}", e));
                false
            }
        }
    }

    /// Load the document stored under `id`, replacing the board.
    ///
    /// A failed load falls back to a fresh single-page board and records
    /// a notice. Returns true on success.
    pub async fn load(&mut self, id: &str) -> bool {
        let loaded = match self.storage.load(id).await {
            Ok(document) => {
                self.board = document.into_board();
                true
            }
            Err(e) => {
                log::warn!("Load of '{}' failed: {}", id, e);
                self.notices.push(format!("Could not load document: {}", e));
                self.board = Board::new();
                false
            }
        };
        self.host.sync_from_board(&self.board);
        self.update();
        loaded
    }

    /// User-facing notices accumulated since the last take.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Drain the accumulated notices.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}
