//! Remote object store collaborators
//!
//! ## Responsibilities
//!
//! - Define the flat-namespace store seam the archiver and pruner share
//! - Dropbox-backed implementation for production
//! - In-memory implementation for tests

use crate::error::Result;
use async_trait::async_trait;

mod dropbox;
mod memory;

pub use dropbox::{AccountInfo, DropboxStore};
pub use memory::MemoryStore;

/// One entry in the store's root namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object name (no path separators at the root)
    pub name: String,
    /// True when the entry is a folder rather than a blob
    pub is_folder: bool,
}

/// One page of a listing plus the cursor to continue from, if any
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Present while more pages remain
    pub cursor: Option<String>,
}

/// Remote object store as the agent sees it: a flat namespace of named blobs
/// at the root, listed in pages.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `name` at the store root
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// List one page of the root namespace. Pass `None` for the first page,
    /// then the previous page's cursor until no cursor is returned.
    async fn list_page(&self, cursor: Option<&str>) -> Result<ListPage>;

    /// Delete one object by name
    async fn delete(&self, name: &str) -> Result<()>;
}
