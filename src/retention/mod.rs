//! Retention pruner
//!
//! ## Responsibilities
//!
//! - Fold the store's paginated listing into one complete candidate set
//! - Keep the most recent session archives, delete the rest best-effort
//! - Ignore anything that is not a `<unix seconds>.zip` session archive
//!
//! A listing failure aborts the whole pass with nothing deleted: deletions
//! only ever run against a complete view of the namespace.

use crate::archive::ARCHIVE_EXT;
use crate::error::Result;
use crate::store::{ObjectEntry, ObjectStore};
use chrono::{DateTime, Utc};
use regex::Regex;

/// One remote session archive, recognized by its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSessionEntry {
    /// Object name in the store, e.g. `1724568000.zip`
    pub name: String,
    /// Upload instant parsed from the name
    pub uploaded_at: DateTime<Utc>,
}

/// Result of one prune pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    /// Session archives found remote before deleting
    pub detected: usize,
    /// Archives the retention policy kept
    pub kept: usize,
    /// Archives actually deleted this pass
    pub deleted: usize,
}

/// Applies the retention policy against a store
pub struct RetentionPruner<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> RetentionPruner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// One pass: list everything, keep the `retain` most recently uploaded
    /// session archives, delete the rest.
    ///
    /// Individual delete failures are logged and skipped; the pass still
    /// reports success so the next cycle retries them. A listing failure
    /// aborts the pass before any deletion.
    pub async fn prune(&self, retain: usize) -> Result<PruneOutcome> {
        let listing = self.list_all().await?;

        let mut sessions = session_entries(&listing);
        let detected = sessions.len();
        // Stable: archives uploaded in the same second keep listing order
        sessions.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        let mut deleted = 0usize;
        for entry in sessions.iter().skip(retain) {
            match self.store.delete(&entry.name).await {
                Ok(()) => {
                    deleted += 1;
                    tracing::debug!(name = %entry.name, "Deleted expired session archive");
                }
                Err(e) => {
                    tracing::warn!(
                        name = %entry.name,
                        error = %e,
                        "Failed to delete expired session archive, skipping"
                    );
                }
            }
        }

        let outcome = PruneOutcome {
            detected,
            kept: detected.min(retain),
            deleted,
        };
        tracing::info!(
            detected = outcome.detected,
            kept = outcome.kept,
            deleted = outcome.deleted,
            "Retention pass complete"
        );
        Ok(outcome)
    }

    /// Fold every listing page into one vector. Errors propagate before any
    /// caller-visible side effect.
    async fn list_all(&self) -> Result<Vec<ObjectEntry>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.store.list_page(cursor.as_deref()).await?;
            all.extend(page.entries);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}

/// Filter a raw listing down to session archives: plain files whose name is
/// an integer second count plus the archive extension. Folders, foreign
/// files and malformed names are left alone, never counted and never deleted.
fn session_entries(listing: &[ObjectEntry]) -> Vec<RemoteSessionEntry> {
    let pattern =
        Regex::new(&format!(r"^(\d+)\.{ARCHIVE_EXT}$")).expect("static archive name pattern");

    listing
        .iter()
        .filter(|entry| !entry.is_folder)
        .filter_map(|entry| {
            let captures = pattern.captures(&entry.name)?;
            let seconds: i64 = captures[1].parse().ok()?;
            let uploaded_at = DateTime::from_timestamp(seconds, 0)?;
            Some(RemoteSessionEntry {
                name: entry.name.clone(),
                uploaded_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn entry(name: &str) -> ObjectEntry {
        ObjectEntry {
            name: name.to_string(),
            is_folder: false,
        }
    }

    fn seeded_store(names: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for name in names {
            store.seed(name, false);
        }
        store
    }

    #[test]
    fn test_session_entries_accepts_only_timestamp_zips() {
        let listing = vec![
            entry("100.zip"),
            entry("not-a-number.zip"),
            entry("150.txt"),
            entry("2.5.zip"),
            entry("200.zip"),
        ];
        let sessions = session_entries(&listing);
        let names: Vec<_> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["100.zip", "200.zip"]);
    }

    #[test]
    fn test_session_entries_skips_folders_even_with_valid_names() {
        let listing = vec![
            ObjectEntry {
                name: "100.zip".to_string(),
                is_folder: true,
            },
            entry("200.zip"),
        ];
        let sessions = session_entries(&listing);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "200.zip");
    }

    #[test]
    fn test_session_entries_skips_out_of_range_stems() {
        // Larger than i64 seconds, and larger than chrono's calendar range
        let listing = vec![
            entry("99999999999999999999.zip"),
            entry("9999999999999999.zip"),
            entry("100.zip"),
        ];
        let sessions = session_entries(&listing);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "100.zip");
    }

    #[tokio::test]
    async fn test_prune_keeps_the_most_recent() {
        let store = seeded_store(&["100.zip", "200.zip", "300.zip", "400.zip"]);
        let outcome = RetentionPruner::new(store.clone()).prune(2).await.unwrap();

        assert_eq!(
            outcome,
            PruneOutcome {
                detected: 4,
                kept: 2,
                deleted: 2
            }
        );
        assert_eq!(store.names(), vec!["300.zip", "400.zip"]);
        assert_eq!(store.deleted(), vec!["200.zip", "100.zip"]);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let store = seeded_store(&["100.zip", "200.zip", "300.zip", "400.zip"]);
        let pruner = RetentionPruner::new(store.clone());

        pruner.prune(2).await.unwrap();
        let second = pruner.prune(2).await.unwrap();

        assert_eq!(
            second,
            PruneOutcome {
                detected: 2,
                kept: 2,
                deleted: 0
            }
        );
        assert_eq!(store.names(), vec!["300.zip", "400.zip"]);
    }

    #[tokio::test]
    async fn test_prune_under_capacity_deletes_nothing() {
        let store = seeded_store(&["100.zip", "200.zip"]);
        let outcome = RetentionPruner::new(store.clone()).prune(10).await.unwrap();

        assert_eq!(
            outcome,
            PruneOutcome {
                detected: 2,
                kept: 2,
                deleted: 0
            }
        );
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_prune_retain_zero_deletes_all_sessions() {
        let store = seeded_store(&["100.zip", "200.zip"]);
        let outcome = RetentionPruner::new(store.clone()).prune(0).await.unwrap();

        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.kept, 0);
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn test_prune_never_touches_foreign_objects() {
        let store = seeded_store(&["100.zip", "200.zip", "notes.txt", "misc.zip"]);
        store.seed("folder.zip", true);

        let outcome = RetentionPruner::new(store.clone()).prune(1).await.unwrap();

        assert_eq!(outcome.detected, 2);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(store.deleted(), vec!["100.zip"]);
        let names = store.names();
        assert!(names.contains(&"notes.txt".to_string()));
        assert!(names.contains(&"misc.zip".to_string()));
        assert!(names.contains(&"folder.zip".to_string()));
    }

    #[tokio::test]
    async fn test_prune_same_outcome_across_page_sizes() {
        let names = ["100.zip", "200.zip", "300.zip", "400.zip", "500.zip"];

        let one_page = seeded_store(&names);
        let three_pages = {
            let store = MemoryStore::with_page_size(2);
            for name in names {
                store.seed(name, false);
            }
            store
        };

        let a = RetentionPruner::new(one_page.clone()).prune(2).await.unwrap();
        let b = RetentionPruner::new(three_pages.clone())
            .prune(2)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(one_page.names(), three_pages.names());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_with_no_deletions() {
        let store = MemoryStore::with_page_size(1);
        for name in ["100.zip", "200.zip", "300.zip"] {
            store.seed(name, false);
        }
        store.fail_listing_after(1);

        let err = RetentionPruner::new(store.clone()).prune(0).await.unwrap_err();
        assert!(err.to_string().contains("Listing"));
        assert!(store.deleted().is_empty(), "no deletes on aborted pass");
    }

    #[tokio::test]
    async fn test_delete_failure_is_skipped_not_fatal() {
        let store = seeded_store(&["100.zip", "200.zip", "300.zip"]);
        store.fail_delete_of("100.zip");

        let outcome = RetentionPruner::new(store.clone()).prune(1).await.unwrap();

        assert_eq!(outcome.detected, 3);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(store.deleted(), vec!["200.zip"]);
        let names = store.names();
        assert!(names.contains(&"100.zip".to_string()), "failed delete stays");
        assert!(names.contains(&"300.zip".to_string()));
    }
}
