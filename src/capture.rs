//! Launcher for the external traffic classifier
//!
//! The classifier turns packet captures (or a live interface) into flow CSV
//! files inside an output directory, which the pipeline then ingests.

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PCAP_EXTENSION: &str = "pcap";

/// Totals for one offline extraction pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionSummary {
    pub captures_found: usize,
    pub captures_extracted: usize,
    pub captures_failed: usize,
}

/// Builds and runs classifier command lines
#[derive(Debug, Clone)]
pub struct Classifier {
    config: CaptureConfig,
}

impl Classifier {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Arguments for extracting one capture file
    pub fn extract_args(&self, output_dir: &Path, pcap: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["extract", "-f", "csv", "--notimestamp"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push("--max-flow-packets".into());
        args.push(self.config.max_flow_packets.to_string().into());
        args.push("--min-flow-packets".into());
        args.push(self.config.min_flow_packets.to_string().into());
        args.push("-o".into());
        args.push(output_dir.into());
        args.push(pcap.into());
        args
    }

    /// Arguments for continuous capture on a network interface
    pub fn live_args(&self, output_dir: &Path, interface: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["extract", "--mode", "live", "-f", "csv", "--notimestamp"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push("--min-flow-packets".into());
        args.push(self.config.min_flow_packets.to_string().into());
        args.push("--export-duration".into());
        args.push(self.config.export_duration_secs.to_string().into());
        args.push("-o".into());
        args.push(output_dir.into());
        args.push(interface.into());
        args
    }

    /// Run the extractor over every capture under `pcap_dir`.
    ///
    /// A failing capture is logged and the pass continues.
    pub async fn extract_folder(&self, pcap_dir: &Path, output_dir: &Path) -> Result<ExtractionSummary> {
        ensure_output_dir(output_dir)?;
        let captures = find_captures(pcap_dir);
        let mut summary = ExtractionSummary {
            captures_found: captures.len(),
            ..Default::default()
        };
        info!(
            "Extracting {} captures from {} into {}",
            captures.len(),
            pcap_dir.display(),
            output_dir.display()
        );

        for (idx, pcap) in captures.iter().enumerate() {
            info!("[{}/{}] Extracting {}", idx + 1, captures.len(), pcap.display());
            match self.extract_one(output_dir, pcap).await {
                Ok(()) => summary.captures_extracted += 1,
                Err(e) => {
                    warn!(path = %pcap.display(), "Extraction failed: {}", e);
                    summary.captures_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn extract_one(&self, output_dir: &Path, pcap: &Path) -> Result<()> {
        let status = Command::new(&self.config.binary)
            .args(self.extract_args(output_dir, pcap))
            .status()
            .await
            .map_err(|e| Error::Capture(format!("failed to run {}: {}", self.config.binary, e)))?;
        if !status.success() {
            return Err(Error::Capture(format!(
                "{} exited with {}",
                self.config.binary, status
            )));
        }
        Ok(())
    }

    /// Start continuous capture into `output_dir`
    pub fn start_live(&self, interface: &str, output_dir: &Path) -> Result<LiveCapture> {
        ensure_output_dir(output_dir)?;
        info!("Starting live capture on {}", interface);
        let child = Command::new(&self.config.binary)
            .args(self.live_args(output_dir, interface))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to start {}: {}", self.config.binary, e)))?;
        Ok(LiveCapture {
            child,
            interface: interface.to_string(),
        })
    }
}

/// Running live-capture process; killed when stopped or dropped
pub struct LiveCapture {
    child: Child,
    interface: String,
}

impl LiveCapture {
    /// Terminate the capture process and reap it
    pub async fn stop(mut self) -> Result<()> {
        info!("Terminating live capture on {}", self.interface);
        if self.child.try_wait()?.is_none() {
            self.child.kill().await?;
        }
        Ok(())
    }
}

/// Every `*.pcap` under `root`, sorted; unreadable entries are skipped
pub fn find_captures(root: &Path) -> Vec<PathBuf> {
    let mut captures: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case(PCAP_EXTENSION))
        })
        .collect();
    captures.sort();
    captures
}

/// Create `dir` and its parents if missing
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir)?;
        info!("Created output directory {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classifier(binary: &str) -> Classifier {
        Classifier::new(CaptureConfig {
            binary: binary.to_string(),
            ..CaptureConfig::default()
        })
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_extract_args() {
        let args = classifier("twc").extract_args(Path::new("/out"), Path::new("/caps/a.pcap"));
        assert_eq!(
            strings(args),
            vec![
                "extract",
                "-f",
                "csv",
                "--notimestamp",
                "--max-flow-packets",
                "500",
                "--min-flow-packets",
                "1",
                "-o",
                "/out",
                "/caps/a.pcap"
            ]
        );
    }

    #[test]
    fn test_live_args() {
        let args = classifier("twc").live_args(Path::new("/out"), "eth0");
        assert_eq!(
            strings(args),
            vec![
                "extract",
                "--mode",
                "live",
                "-f",
                "csv",
                "--notimestamp",
                "--min-flow-packets",
                "1",
                "--export-duration",
                "1",
                "-o",
                "/out",
                "eth0"
            ]
        );
    }

    #[test]
    fn test_find_captures_recursively() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("day1")).unwrap();
        std::fs::write(tmp.path().join("day1/b.pcap"), b"").unwrap();
        std::fs::write(tmp.path().join("a.PCAP"), b"").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"").unwrap();

        let found = find_captures(tmp.path());
        assert_eq!(found.len(), 2);
        assert!(found[1].ends_with("day1/b.pcap"));
    }

    #[test]
    fn test_missing_classifier_is_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pcap"), b"").unwrap();
        std::fs::write(tmp.path().join("b.pcap"), b"").unwrap();
        let out = tmp.path().join("out/nested");

        let summary = tokio_test::block_on(
            classifier("definitely-not-a-classifier").extract_folder(tmp.path(), &out),
        )
        .unwrap();

        assert_eq!(summary.captures_found, 2);
        assert_eq!(summary.captures_failed, 2);
        assert!(out.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_extraction() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pcap"), b"").unwrap();

        let summary = classifier("true")
            .extract_folder(tmp.path(), &tmp.path().join("out"))
            .await
            .unwrap();
        assert_eq!(summary.captures_extracted, 1);
    }

    #[tokio::test]
    async fn test_start_live_reports_missing_binary() {
        let tmp = TempDir::new().unwrap();
        let result = classifier("definitely-not-a-classifier").start_live("eth0", tmp.path());
        assert!(matches!(result, Err(Error::Capture(_))));
    }
}
