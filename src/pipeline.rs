//! Folder ingestion orchestrator
//!
//! For every discovered file that is not done yet:
//! claim → read batches → transform → submit → mark done.
//!
//! Files run concurrently on a bounded pool; batches within a file run in
//! order, and the marker is only written after the last batch's bulk call
//! returned. Per-file errors are logged and never stop other files.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locate::{discover, FileFormat, SourceFile};
use crate::progress::add_progress_bar;
use crate::reader::{BatchIter, ReaderRegistry};
use crate::record::RowBatch;
use crate::store::{BulkStore, BulkWriter, IngestionOutcome};
use crate::tracker::{CompletionTracker, FileClaim};
use crate::transform::Profile;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Target collection (index)
    pub collection: String,
    pub batch_size: usize,
    pub workers: usize,
    pub poll_interval: Duration,
    /// Live scans skip files modified more recently than this
    pub settle: Duration,
    /// Formats to look for; `None` means every registered reader
    pub formats: Option<Vec<FileFormat>>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.store.index.clone(),
            batch_size: config.pipeline.batch_size,
            workers: config.pipeline.workers.max(1),
            poll_interval: config.pipeline.poll_interval(),
            settle: config.pipeline.settle(),
            formats: None,
        }
    }
}

/// Everything a worker needs, passed explicitly
pub struct IngestContext {
    pub registry: ReaderRegistry,
    pub tracker: Arc<CompletionTracker>,
    pub writer: BulkWriter,
    pub profile: Profile,
    pub settings: PipelineSettings,
}

impl IngestContext {
    pub fn new(config: &Config, store: Arc<dyn BulkStore>, profile: Profile) -> Self {
        Self {
            registry: ReaderRegistry::with_defaults(),
            tracker: CompletionTracker::new(config.pipeline.marker_suffix.clone()),
            writer: BulkWriter::new(store, config.store.chunk_size, config.store.stable_ids),
            profile,
            settings: PipelineSettings::from_config(config),
        }
    }

    /// Restrict discovery to the given formats
    pub fn with_formats(mut self, formats: Vec<FileFormat>) -> Self {
        self.settings.formats = Some(formats);
        self
    }

    fn formats(&self) -> Vec<FileFormat> {
        self.settings
            .formats
            .clone()
            .unwrap_or_else(|| self.registry.formats())
    }
}

/// What happened to one file during a scan
#[derive(Debug)]
pub enum FileOutcome {
    /// All batches submitted and the marker written
    Ingested(IngestionOutcome),
    /// Already done, or another worker owns it
    Skipped,
    /// Still being written; left for the next scan
    Deferred,
    /// Stopped between batches by cancellation; not marked done
    Interrupted,
    /// Not marked done; retried on the next scan or run
    Failed(Error),
}

/// Totals for one scan or a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub files_skipped: usize,
    pub files_deferred: usize,
    pub files_ingested: usize,
    pub files_failed: usize,
    pub files_interrupted: usize,
    pub documents_submitted: usize,
    pub documents_failed: usize,
    pub failures: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, file: &Path, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Ingested(o) => {
                self.files_ingested += 1;
                self.documents_submitted += o.submitted;
                self.documents_failed += o.failed;
            }
            FileOutcome::Skipped => self.files_skipped += 1,
            FileOutcome::Deferred => self.files_deferred += 1,
            FileOutcome::Interrupted => self.files_interrupted += 1,
            FileOutcome::Failed(e) => {
                self.files_failed += 1;
                self.failures.push(format!("{}: {}", file.display(), e));
            }
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.files_discovered += other.files_discovered;
        self.files_skipped += other.files_skipped;
        self.files_deferred += other.files_deferred;
        self.files_ingested += other.files_ingested;
        self.files_failed += other.files_failed;
        self.files_interrupted += other.files_interrupted;
        self.documents_submitted += other.documents_submitted;
        self.documents_failed += other.documents_failed;
        self.failures.extend(other.failures);
    }

    /// Files that were actually read during the run
    pub fn files_attempted(&self) -> usize {
        self.files_ingested + self.files_failed + self.files_interrupted
    }

    /// A run fails only when files were attempted and none succeeded
    pub fn is_success(&self) -> bool {
        self.files_ingested > 0 || self.files_attempted() == 0
    }
}

/// Runs the ingestion pipeline over a directory
#[derive(Clone)]
pub struct FolderIngestor {
    ctx: Arc<IngestContext>,
    show_progress: bool,
}

impl FolderIngestor {
    pub fn new(ctx: IngestContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            show_progress: false,
        }
    }

    /// Draw a progress bar during offline scans
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Offline mode: process the current file set once
    pub async fn run_once(&self, root: &Path, cancel: &CancellationToken) -> Result<RunSummary> {
        info!(
            "Ingesting {} ({}) into '{}'",
            root.display(),
            self.ctx.profile,
            self.ctx.settings.collection
        );
        let summary = self.scan(root, cancel, None).await?;
        info!(
            ingested = summary.files_ingested,
            failed = summary.files_failed,
            skipped = summary.files_skipped,
            documents = summary.documents_submitted,
            "Ingestion run complete"
        );
        Ok(summary)
    }

    /// Live mode: rescan until `cancel` fires.
    ///
    /// Cancellation stops the loop at the next scan boundary or polling sleep;
    /// in-flight bulk calls are allowed to finish.
    pub async fn run_live(&self, root: &Path, cancel: CancellationToken) -> Result<RunSummary> {
        info!(
            "Watching {} (poll every {:?}) into '{}'",
            root.display(),
            self.ctx.settings.poll_interval,
            self.ctx.settings.collection
        );

        let mut total = RunSummary::default();
        while !cancel.is_cancelled() {
            let summary = self.scan(root, &cancel, Some(self.ctx.settings.settle)).await?;
            if summary.files_attempted() > 0 {
                info!(
                    ingested = summary.files_ingested,
                    failed = summary.files_failed,
                    documents = summary.documents_submitted,
                    "Live scan complete"
                );
            }
            total.merge(summary);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.settings.poll_interval) => {}
            }
        }

        info!(
            ingested = total.files_ingested,
            failed = total.files_failed,
            "Live ingestion stopped"
        );
        Ok(total)
    }

    /// Discover and process every pending file once
    async fn scan(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        settle: Option<Duration>,
    ) -> Result<RunSummary> {
        let files = discover(root, &self.ctx.formats())?;
        let mut summary = RunSummary {
            files_discovered: files.len(),
            ..Default::default()
        };

        let progress = self
            .show_progress
            .then(|| add_progress_bar(files.len() as u64, "Ingesting files"));

        let results: Vec<(SourceFile, FileOutcome)> = stream::iter(files)
            .map(|file| {
                let progress = progress.clone();
                async move {
                    let outcome = self.process_file(&file, cancel, settle).await;
                    if let Some(bar) = &progress {
                        bar.inc(1);
                    }
                    (file, outcome)
                }
            })
            .buffer_unordered(self.ctx.settings.workers)
            .collect()
            .await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        for (file, outcome) in results {
            summary.record(&file.path, outcome);
        }
        Ok(summary)
    }

    /// Process one file end to end; never returns an error
    pub async fn process_file(
        &self,
        file: &SourceFile,
        cancel: &CancellationToken,
        settle: Option<Duration>,
    ) -> FileOutcome {
        if self.ctx.tracker.is_done(&file.path) {
            return FileOutcome::Skipped;
        }
        if let Some(settle) = settle {
            if !is_settled(&file.path, settle) {
                debug!(path = %file.path.display(), "File still changing, deferring");
                return FileOutcome::Deferred;
            }
        }
        let Some(claim) = self.ctx.tracker.try_claim(&file.path) else {
            return FileOutcome::Skipped;
        };

        let span = info_span!("file", path = %file.path.display());
        match self.ingest_claimed(file, claim, cancel).instrument(span).await {
            Ok(outcome) => {
                info!(
                    path = %file.path.display(),
                    submitted = outcome.submitted,
                    failed = outcome.failed,
                    "Completed file"
                );
                FileOutcome::Ingested(outcome)
            }
            Err(Error::Cancelled) => {
                info!(path = %file.path.display(), "Interrupted; will resume on next run");
                FileOutcome::Interrupted
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(path = %file.path.display(), "Failed to ingest, will retry: {}", e);
                } else {
                    error!(path = %file.path.display(), "Failed to ingest: {}", e);
                }
                FileOutcome::Failed(e)
            }
        }
    }

    async fn ingest_claimed(
        &self,
        file: &SourceFile,
        claim: FileClaim,
        cancel: &CancellationToken,
    ) -> Result<IngestionOutcome> {
        let reader = self.ctx.registry.reader_for(file)?;
        let allowlist = self.ctx.profile.allowlist();
        let batch_size = self.ctx.settings.batch_size;
        let path = file.path.clone();

        let mut batches = tokio::task::spawn_blocking(move || {
            reader.open_batches(&path, allowlist.as_deref(), Some(batch_size))
        })
        .await??;

        let mut total = IngestionOutcome::default();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let (returned, next) = next_batch(batches).await?;
            batches = returned;
            let Some(batch) = next.transpose()? else {
                break;
            };

            debug!(offset = batch.offset, rows = batch.len(), "Read batch");
            let batch = self.ctx.profile.transform(batch, Utc::now());
            let outcome = self
                .ctx
                .writer
                .submit(batch, &self.ctx.settings.collection)
                .await?;
            total.merge(outcome);
        }

        self.ctx.tracker.mark_done(claim)?;
        Ok(total)
    }
}

/// Pull the next batch on the blocking pool, handing the iterator back
async fn next_batch(mut batches: BatchIter) -> Result<(BatchIter, Option<Result<RowBatch>>)> {
    Ok(tokio::task::spawn_blocking(move || {
        let next = batches.next();
        (batches, next)
    })
    .await?)
}

/// Whether `path` has not been modified for at least `settle`
fn is_settled(path: &Path, settle: Duration) -> bool {
    if settle.is_zero() {
        return true;
    }
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age >= settle)
        .unwrap_or(false)
}
