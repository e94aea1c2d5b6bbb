//! Attack-traffic command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locate::{discover, FileFormat};
use crate::pipeline::{FolderIngestor, IngestContext, RunSummary};
use crate::store::BulkStore;
use crate::transform::Profile;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ingest windowed attack-traffic files of one format, once
pub async fn cmd_ddos(
    config: &Config,
    store: Arc<dyn BulkStore>,
    input_dir: &Path,
    format: FileFormat,
    show_progress: bool,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let files = discover(input_dir, &[format])?;
    if files.is_empty() {
        return Err(Error::InvalidPath(format!(
            "no .{} files found in {}",
            format,
            input_dir.display()
        )));
    }
    info!("Found {} .{} files in {}", files.len(), format, input_dir.display());

    let ctx = IngestContext::new(config, store, Profile::AttackTraffic).with_formats(vec![format]);
    FolderIngestor::new(ctx)
        .with_progress(show_progress)
        .run_once(input_dir, cancel)
        .await
}
