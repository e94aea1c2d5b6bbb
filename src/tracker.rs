//! Per-file completion markers
//!
//! A file is done when a sidecar marker (`<name><suffix>`) exists next to it.
//! Workers must hold a [`FileClaim`] to process a file, so two workers never
//! ingest the same file at the same time.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Durable "fully ingested" markers plus in-flight claims
#[derive(Debug)]
pub struct CompletionTracker {
    suffix: String,
    claims: Mutex<HashSet<PathBuf>>,
}

/// Exclusive right to process one file; released on drop
#[derive(Debug)]
pub struct FileClaim {
    tracker: Arc<CompletionTracker>,
    path: PathBuf,
}

impl CompletionTracker {
    pub fn new(suffix: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            suffix: suffix.into(),
            claims: Mutex::new(HashSet::new()),
        })
    }

    /// Path of the marker for `file`
    pub fn marker_path(&self, file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_os_string();
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    pub fn is_done(&self, file: &Path) -> bool {
        self.marker_path(file).exists()
    }

    fn claims(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `file` for processing.
    ///
    /// Returns `None` when the file is already done or another worker holds it.
    /// The marker check and the claim happen under one lock.
    pub fn try_claim(self: &Arc<Self>, file: &Path) -> Option<FileClaim> {
        let mut claims = self.claims();
        if claims.contains(file) || self.is_done(file) {
            return None;
        }
        claims.insert(file.to_path_buf());
        debug!(path = %file.display(), "Claimed file");
        Some(FileClaim {
            tracker: Arc::clone(self),
            path: file.to_path_buf(),
        })
    }

    /// Write the marker for a claimed file. Call only after its last batch was submitted.
    pub fn mark_done(&self, claim: FileClaim) -> Result<()> {
        let marker = self.marker_path(&claim.path);
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to write marker {}: {}", marker.display(), e),
                )))
            }
        }
        debug!(path = %claim.path.display(), "Marked done");
        Ok(())
    }
}

impl Drop for FileClaim {
    fn drop(&mut self) {
        self.tracker.claims().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_path_appends_suffix() {
        let tracker = CompletionTracker::new(".processed");
        assert_eq!(
            tracker.marker_path(Path::new("/out/a.csv")),
            PathBuf::from("/out/a.csv.processed")
        );
    }

    #[test]
    fn test_claim_and_mark_done() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.csv");
        std::fs::write(&file, "x\n1\n").unwrap();
        let tracker = CompletionTracker::new(".processed");

        assert!(!tracker.is_done(&file));
        let claim = tracker.try_claim(&file).unwrap();
        assert!(tracker.try_claim(&file).is_none());

        tracker.mark_done(claim).unwrap();
        assert!(tracker.is_done(&file));
        assert!(tracker.claims().is_empty());
        assert!(tracker.try_claim(&file).is_none());
    }

    #[test]
    fn test_second_claim_rejected_until_released() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.csv");
        let tracker = CompletionTracker::new(".processed");

        let first = tracker.try_claim(&file).unwrap();
        assert!(tracker.try_claim(&file).is_none());

        drop(first);
        assert!(!tracker.is_done(&file));
        assert!(tracker.try_claim(&file).is_some());
    }

    #[test]
    fn test_mark_done_tolerates_existing_marker() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.csv");
        let tracker = CompletionTracker::new(".processed");

        let claim = tracker.try_claim(&file).unwrap();
        std::fs::write(tracker.marker_path(&file), b"").unwrap();
        assert!(tracker.mark_done(claim).is_ok());
    }

    #[test]
    fn test_deleting_marker_allows_reprocessing() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.csv");
        let tracker = CompletionTracker::new(".processed");

        let claim = tracker.try_claim(&file).unwrap();
        tracker.mark_done(claim).unwrap();
        std::fs::remove_file(tracker.marker_path(&file)).unwrap();

        assert!(tracker.try_claim(&file).is_some());
    }

    #[test]
    fn test_concurrent_claims_grant_one_winner() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.csv");
        let tracker = CompletionTracker::new(".processed");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let file = file.clone();
                std::thread::spawn(move || tracker.try_claim(&file).map(std::mem::forget).is_some())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
