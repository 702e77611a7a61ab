//! In-memory storage implementation.

use super::{BoxFuture, PersistedDocument, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, PersistedDocument>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, document: &PersistedDocument) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        let document = document.clone();
        Box::pin(async move {
            let mut docs = self
                .documents
                .write()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            docs.insert(id, document);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<PersistedDocument>> {
        let id = id.to_string();
        Box::pin(async move {
            let docs = self
                .documents
                .read()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            docs.get(&id)
                .cloned()
                .ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut docs = self
                .documents
                .write()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            docs.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let docs = self
                .documents
                .read()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            Ok(docs.keys().cloned().collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let docs = self
                .documents
                .read()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            Ok(docs.contains_key(&id))
        })
    }
}
