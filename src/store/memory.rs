//! In-memory object store for tests
//!
//! Pages its listing at a configurable size so pagination handling can be
//! exercised, records deletions for assertions, and supports injected
//! failures for every operation.

use crate::error::{Error, Result};
use crate::store::{ListPage, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Shared-state fake store. Clones observe the same namespace.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
    page_size: usize,
}

#[derive(Default)]
struct MemoryState {
    /// Root namespace in listing order (insertion order)
    entries: Vec<ObjectEntry>,
    /// Uploaded blob bodies by name
    blobs: HashMap<String, Vec<u8>>,
    /// Names deleted so far, in deletion order
    deleted: Vec<String>,
    /// Pages served so far across all listings
    pages_served: usize,
    /// Fail any listing once this many pages have been served
    fail_listing_after: Option<usize>,
    /// Fail every put
    fail_puts: bool,
    /// Names whose deletion fails
    fail_delete_names: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Store that lists at most `page_size` entries per page
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            inner: Arc::new(Mutex::new(MemoryState::default())),
            page_size,
        }
    }

    /// Seed one entry without going through `put`
    pub fn seed(&self, name: &str, is_folder: bool) {
        let mut state = self.lock();
        state.entries.push(ObjectEntry {
            name: name.to_string(),
            is_folder,
        });
        if !is_folder {
            state.blobs.insert(name.to_string(), Vec::new());
        }
    }

    /// Current names in listing order
    pub fn names(&self) -> Vec<String> {
        self.lock().entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Names deleted so far, in deletion order
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Body uploaded under `name`, if present
    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(name).cloned()
    }

    /// Let the first `pages` listing pages succeed, then fail the rest
    pub fn fail_listing_after(&self, pages: usize) {
        self.lock().fail_listing_after = Some(pages);
    }

    /// Make every upload fail
    pub fn fail_puts(&self) {
        self.lock().fail_puts = true;
    }

    /// Make deletion of `name` fail (the entry stays listed)
    pub fn fail_delete_of(&self, name: &str) {
        self.lock().fail_delete_names.insert(name.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().expect("memory store lock")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        if state.fail_puts {
            return Err(Error::Store("injected upload failure".to_string()));
        }
        if !state.entries.iter().any(|e| e.name == name) {
            state.entries.push(ObjectEntry {
                name: name.to_string(),
                is_folder: false,
            });
        }
        state.blobs.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<ListPage> {
        let mut state = self.lock();

        if let Some(limit) = state.fail_listing_after {
            if state.pages_served >= limit {
                return Err(Error::Listing("injected listing failure".to_string()));
            }
        }
        state.pages_served += 1;

        let offset = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| Error::Listing(format!("unknown cursor: {c}")))?,
        };

        let end = (offset + self.page_size).min(state.entries.len());
        let entries = state.entries[offset..end].to_vec();
        let cursor = (end < state.entries.len()).then(|| end.to_string());

        Ok(ListPage { entries, cursor })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_delete_names.contains(name) {
            return Err(Error::Delete {
                name: name.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        state.entries.retain(|e| e.name != name);
        state.blobs.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }
}
