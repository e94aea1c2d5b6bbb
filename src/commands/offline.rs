//! Offline command implementation

use crate::capture::{ensure_output_dir, find_captures, Classifier, ExtractionSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{FolderIngestor, IngestContext, RunSummary};
use crate::store::BulkStore;
use crate::transform::Profile;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of an offline run
#[derive(Debug, Clone, Serialize)]
pub struct OfflineReport {
    /// Present when captures were extracted first
    pub extraction: Option<ExtractionSummary>,
    pub ingested_dir: PathBuf,
    pub index: String,
    pub run: RunSummary,
}

/// Extract captures found under `input_dir` (if any), then ingest once
pub async fn cmd_offline(
    config: &Config,
    store: Arc<dyn BulkStore>,
    input_dir: &Path,
    output_dir: Option<&Path>,
    show_progress: bool,
    cancel: &CancellationToken,
) -> Result<OfflineReport> {
    if !input_dir.is_dir() {
        return Err(Error::InvalidPath(format!(
            "input directory does not exist: {}",
            input_dir.display()
        )));
    }

    let (extraction, ingested_dir) = if find_captures(input_dir).is_empty() {
        if let Some(dir) = output_dir {
            ensure_output_dir(dir)?;
        }
        info!("No captures under {}, ingesting it directly", input_dir.display());
        (None, input_dir.to_path_buf())
    } else {
        let out = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.default_output_dir());
        let summary = Classifier::new(config.capture.clone())
            .extract_folder(input_dir, &out)
            .await?;
        (Some(summary), out)
    };

    let ingestor = FolderIngestor::new(IngestContext::new(config, store, Profile::GeneralTraffic))
        .with_progress(show_progress);
    let run = ingestor.run_once(&ingested_dir, cancel).await?;

    Ok(OfflineReport {
        extraction,
        ingested_dir,
        index: config.store.index.clone(),
        run,
    })
}

/// Print an offline report to console
pub fn print_offline_report(report: &OfflineReport) {
    if let Some(extraction) = &report.extraction {
        println!("\n✓ Capture extraction complete");
        println!("  Captures found: {}", extraction.captures_found);
        println!("  Extracted: {}", extraction.captures_extracted);
        println!("  Failed: {}", extraction.captures_failed);
    }
    println!("\n✓ Ingested {} into '{}'", report.ingested_dir.display(), report.index);
    print_run_summary(&report.run);
}

/// Print per-run totals and failures
pub fn print_run_summary(run: &RunSummary) {
    println!("  Files found: {}", run.files_discovered);
    println!("  Files ingested: {}", run.files_ingested);
    println!("  Files skipped (already done): {}", run.files_skipped);
    if run.files_deferred > 0 {
        println!("  Files deferred: {}", run.files_deferred);
    }
    if run.files_interrupted > 0 {
        println!("  Files interrupted: {}", run.files_interrupted);
    }
    println!("  Documents submitted: {}", run.documents_submitted);
    println!("  Documents rejected: {}", run.documents_failed);
    if !run.failures.is_empty() {
        println!("\n✗ {} files failed (will be retried):", run.files_failed);
        for failure in &run.failures {
            println!("  • {}", failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::RecordingStore;
    use tempfile::TempDir;

    const HEADER: &str = "sip,sport,dip,dport,proto,first_timestamp,total_time,sni,vpn,dd,default_vpn,dn,dns,ds,application,traffic_type";

    fn write_csv(dir: &Path, name: &str, rows: usize) {
        let mut content = format!("{}\n", HEADER);
        for i in 0..rows {
            content.push_str(&format!(
                "10.0.0.{i},4000{i},10.0.1.1,53,17,1700000000000,0.1,,0,,,,,,dns,dns\n"
            ));
        }
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_ingests_directory_without_captures() {
        let tmp = TempDir::new().unwrap();
        write_csv(tmp.path(), "flows.csv", 3);
        let store = Arc::new(RecordingStore::default());

        let report = cmd_offline(
            &Config::default(),
            store.clone(),
            tmp.path(),
            None,
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.extraction.is_none());
        assert_eq!(report.ingested_dir, tmp.path());
        assert_eq!(report.run.documents_submitted, 3);
        assert!(report.run.is_success());
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_captures_are_extracted_into_output_dir() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("pcaps");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("trace.pcap"), b"").unwrap();
        let output = tmp.path().join("out");

        let mut config = Config::default();
        config.capture.binary = "definitely-not-a-classifier".to_string();

        let report = cmd_offline(
            &config,
            Arc::new(RecordingStore::default()),
            &input,
            Some(&output),
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let extraction = report.extraction.unwrap();
        assert_eq!(extraction.captures_failed, 1);
        assert_eq!(report.ingested_dir, output);
        assert!(output.is_dir());
        assert_eq!(report.run.files_discovered, 0);
    }

    #[tokio::test]
    async fn test_missing_input_dir() {
        let tmp = TempDir::new().unwrap();
        let result = cmd_offline(
            &Config::default(),
            Arc::new(RecordingStore::default()),
            &tmp.path().join("nope"),
            None,
            false,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }
}
