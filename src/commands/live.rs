//! Live command implementation

use crate::capture::{Classifier, LiveCapture};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{FolderIngestor, IngestContext, RunSummary};
use crate::store::BulkStore;
use crate::transform::Profile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What a live run watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSource {
    /// Directory filled by some other producer
    Directory(PathBuf),
    /// Interface captured by the classifier into `output_dir`
    Interface { name: String, output_dir: PathBuf },
}

impl LiveSource {
    /// An existing directory is watched as-is; anything else names an interface
    pub fn resolve(target: &str, output_dir: Option<&Path>, config: &Config) -> Self {
        let path = Path::new(target);
        if path.is_dir() {
            return LiveSource::Directory(path.to_path_buf());
        }
        LiveSource::Interface {
            name: target.to_string(),
            output_dir: output_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.default_output_dir()),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        match self {
            LiveSource::Directory(dir) => dir,
            LiveSource::Interface { output_dir, .. } => output_dir,
        }
    }
}

/// Watch a directory (starting capture first if needed) until `cancel` fires
pub async fn cmd_live(
    config: &Config,
    store: Arc<dyn BulkStore>,
    source: LiveSource,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let capture: Option<LiveCapture> = match &source {
        LiveSource::Directory(dir) => {
            info!("Watching existing directory {}", dir.display());
            None
        }
        LiveSource::Interface { name, output_dir } => {
            Some(Classifier::new(config.capture.clone()).start_live(name, output_dir)?)
        }
    };

    let ingestor = FolderIngestor::new(IngestContext::new(config, store, Profile::GeneralTraffic));
    let result = ingestor.run_live(source.watch_dir(), cancel).await;

    if let Some(capture) = capture {
        if let Err(e) = capture.stop().await {
            warn!("Failed to stop live capture: {}", e);
        }
    }
    result
}
