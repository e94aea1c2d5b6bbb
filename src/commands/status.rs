//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::locate::{discover, FileFormat};
use crate::tracker::CompletionTracker;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Completion state of a watched directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderStatus {
    pub directory: String,
    pub store_url: String,
    pub index: String,
    pub marker_suffix: String,
    pub total_files: usize,
    pub done_files: usize,
    pub pending: Vec<String>,
}

/// Count done and pending files under `dir`; reads markers only
pub fn cmd_status(config: &Config, dir: &Path) -> Result<FolderStatus> {
    info!("Getting status of {}", dir.display());

    let tracker = CompletionTracker::new(config.pipeline.marker_suffix.clone());
    let files = discover(dir, &FileFormat::ALL)?;
    let pending: Vec<String> = files
        .iter()
        .filter(|f| !tracker.is_done(&f.path))
        .map(|f| f.path.display().to_string())
        .collect();

    Ok(FolderStatus {
        directory: dir.display().to_string(),
        store_url: config.store.url.clone(),
        index: config.store.index.clone(),
        marker_suffix: config.pipeline.marker_suffix.clone(),
        total_files: files.len(),
        done_files: files.len() - pending.len(),
        pending,
    })
}

/// Print folder status to console
pub fn print_status(status: &FolderStatus) {
    println!("\n📊 mai-streaming Status\n");
    println!("Directory: {}", status.directory);
    println!("\nStore:");
    println!("  URL: {}", status.store_url);
    println!("  Index: {}", status.index);
    println!("\nFiles:");
    println!("  Total: {}", status.total_files);
    println!("  Done: {}", status.done_files);
    println!("  Pending: {}", status.pending.len());

    if !status.pending.is_empty() {
        println!();
        for path in &status.pending {
            println!("  • {}", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counts_done_and_pending() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.csv"), "sip\n").unwrap();
        std::fs::write(tmp.path().join("a.csv.processed"), "").unwrap();
        std::fs::write(tmp.path().join("b.orc"), "").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "").unwrap();

        let status = cmd_status(&Config::default(), tmp.path()).unwrap();

        assert_eq!(status.total_files, 2);
        assert_eq!(status.done_files, 1);
        assert_eq!(status.pending.len(), 1);
        assert!(status.pending[0].ends_with("b.orc"));
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(cmd_status(&Config::default(), &tmp.path().join("gone")).is_err());
    }
}
