//! Host capability surface: theme, system clipboard, directory listing.
//!
//! The core consumes these as fallible async calls and never touches the
//! host environment directly. Results arrive outside the synchronous
//! dispatch pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::storage::BoxFuture;

/// Platform capability errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    #[error("Platform error: {0}")]
    Other(String),
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Host theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Capabilities provided by the embedding host.
pub trait Platform: Send + Sync {
    /// Read the host theme preference.
    fn theme(&self) -> BoxFuture<'_, PlatformResult<Theme>>;

    /// Read the system text clipboard.
    fn read_clipboard(&self) -> BoxFuture<'_, PlatformResult<String>>;

    /// Write the system text clipboard.
    fn write_clipboard(&self, text: &str) -> BoxFuture<'_, PlatformResult<()>>;

    /// List the entries of a directory.
    fn list_dir(&self, path: &Path) -> BoxFuture<'_, PlatformResult<Vec<PathBuf>>>;
}

/// A platform that provides nothing; every call fails as unavailable.
#[derive(Debug, Default)]
pub struct NullPlatform;

impl Platform for NullPlatform {
    fn theme(&self) -> BoxFuture<'_, PlatformResult<Theme>> {
        Box::pin(async { Err(PlatformError::Unavailable("theme".into())) })
    }

    fn read_clipboard(&self) -> BoxFuture<'_, PlatformResult<String>> {
        Box::pin(async { Err(PlatformError::Unavailable("clipboard".into())) })
    }

    fn write_clipboard(&self, _text: &str) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async { Err(PlatformError::Unavailable("clipboard".into())) })
    }

    fn list_dir(&self, _path: &Path) -> BoxFuture<'_, PlatformResult<Vec<PathBuf>>> {
        Box::pin(async { Err(PlatformError::Unavailable("list_dir".into())) })
    }
}

/// In-memory platform for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    theme: Theme,
    clipboard: RwLock<String>,
    directories: RwLock<HashMap<PathBuf, Vec<PathBuf>>>,
}

impl MemoryPlatform {
    /// Create an in-memory platform with the given theme.
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            ..Self::default()
        }
    }

    /// Seed a directory listing.
    pub fn set_dir(&self, path: impl Into<PathBuf>, entries: Vec<PathBuf>) {
        if let Ok(mut dirs) = self.directories.write() {
            dirs.insert(path.into(), entries);
        }
    }

    /// Current clipboard contents (test inspection).
    pub fn clipboard_contents(&self) -> String {
        self.clipboard.read().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Platform for MemoryPlatform {
    fn theme(&self) -> BoxFuture<'_, PlatformResult<Theme>> {
        let theme = self.theme;
        Box::pin(async move { Ok(theme) })
    }

    fn read_clipboard(&self) -> BoxFuture<'_, PlatformResult<String>> {
        Box::pin(async move {
            self.clipboard
                .read()
                .map(|c| c.clone())
                .map_err(|e| PlatformError::Other(format!("Lock error: {}", e)))
        })
    }

    fn write_clipboard(&self, text: &str) -> BoxFuture<'_, PlatformResult<()>> {
        let text = text.to_string();
        Box::pin(async move {
            let mut clipboard = self
                .clipboard
                .write()
                .map_err(|e| PlatformError::Other(format!("Lock error: {}", e)))?;
            *clipboard = text;
            Ok(())
        })
    }

    fn list_dir(&self, path: &Path) -> BoxFuture<'_, PlatformResult<Vec<PathBuf>>> {
        let path = path.to_path_buf();
        Box::pin(async move {
            let dirs = self
                .directories
                .read()
                .map_err(|e| PlatformError::Other(format!("Lock error: {}", e)))?;
            dirs.get(&path)
                .cloned()
                .ok_or_else(|| PlatformError::Unavailable(format!("{}", path.display())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;

    #[test]
    fn test_memory_platform_clipboard_roundtrip() {
        let platform = MemoryPlatform::new(Theme::Dark);
        block_on(platform.write_clipboard("hello")).unwrap();
        assert_eq!(block_on(platform.read_clipboard()).unwrap(), "hello");
        assert_eq!(block_on(platform.theme()).unwrap(), Theme::Dark);
    }

    #[test]
    fn test_memory_platform_list_dir() {
        let platform = MemoryPlatform::default();
        platform.set_dir("/programs", vec![PathBuf::from("/programs/note")]);
        let entries = block_on(platform.list_dir(Path::new("/programs"))).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(block_on(platform.list_dir(Path::new("/missing"))).is_err());
    }

    #[test]
    fn test_null_platform_is_unavailable() {
        let platform = NullPlatform;
        assert!(block_on(platform.theme()).is_err());
        assert!(block_on(platform.read_clipboard()).is_err());
    }
}
