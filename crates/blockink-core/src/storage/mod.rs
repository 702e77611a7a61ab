//! Storage abstraction for persistence.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::board::Board;
use crate::page::{Page, PageId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// The structured document the core emits and consumes.
///
/// Block program state is already serialized inline; media is referenced
/// by relative path, never embedded. Interaction gesture state and history
/// are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedDocument {
    /// All pages.
    pub pages: Vec<Page>,
    /// The page that was current when saved.
    pub current_page_id: PageId,
}

impl PersistedDocument {
    /// Capture the persistable parts of a board.
    pub fn from_board(board: &Board) -> Self {
        Self {
            pages: board.pages.clone(),
            current_page_id: board.current_page_id,
        }
    }

    /// Rebuild a board (with empty history) from this document.
    pub fn into_board(self) -> Board {
        Board::from_parts(self.pages, self.current_page_id)
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Trait for document storage backends.
///
/// Implementations can store documents in memory or on the filesystem;
/// the core only ever calls this abstract read/write contract.
pub trait Storage: Send + Sync {
    /// Save a document.
    fn save(&self, id: &str, document: &PersistedDocument) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a document.
    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<PersistedDocument>>;

    /// Delete a document.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all document IDs.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a document exists.
    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

/// Load a document, falling back to an empty default page set when the
/// load fails. The failure is logged, not propagated; in-memory state must
/// never be lost to a persistence error.
pub async fn load_or_default(storage: &dyn Storage, id: &str) -> Board {
    match storage.load(id).await {
        Ok(document) => document.into_board(),
        Err(err) => {
            log::warn!("failed to load document '{id}', starting empty: {err}");
            Board::new()
        }
    }
}

#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(f: F) -> F::Output {
    // Simple blocking executor for tests.
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        match f.as_mut().poll(&mut cx) {
            Poll::Ready(result) => return result,
            Poll::Pending => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_json_roundtrip() {
        let board = Board::new();
        let doc = PersistedDocument::from_board(&board);
        let json = doc.to_json().unwrap();
        let restored = PersistedDocument::from_json(&json).unwrap();
        assert_eq!(restored.current_page_id, board.current_page_id);
        assert_eq!(restored.pages.len(), 1);
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let storage = MemoryStorage::new();
        let board = block_on(load_or_default(&storage, "missing"));
        assert_eq!(board.pages.len(), 1);
        assert!(board.current_page().blocks.is_empty());
    }
}
