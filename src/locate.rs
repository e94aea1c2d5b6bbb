//! Discovery of flow-record files under a root directory

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Delimited text with a header row (`.csv`)
    TabularText,
    /// Columnar binary (`.orc`)
    ColumnarBinary,
}

impl FileFormat {
    pub const ALL: [FileFormat; 2] = [FileFormat::TabularText, FileFormat::ColumnarBinary];

    /// File extension recognized for this format (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::TabularText => "csv",
            FileFormat::ColumnarBinary => "orc",
        }
    }

    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::TabularText),
            "orc" => Ok(FileFormat::ColumnarBinary),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A discovered input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: FileFormat,
}

impl SourceFile {
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

/// Recursively find files under `root` whose extension matches one of `formats`.
///
/// Results are sorted by path. Unreadable entries below the root are logged
/// and skipped; a missing or unreadable root is an error.
pub fn discover(root: &Path, formats: &[FileFormat]) -> Result<Vec<SourceFile>> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(e
                        .into_io_error()
                        .map(Error::Io)
                        .unwrap_or_else(|| Error::InvalidPath(root.display().to_string())));
                }
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(format) = FileFormat::from_path(entry.path()) {
            if formats.contains(&format) {
                files.push(SourceFile {
                    path: entry.into_path(),
                    format,
                });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} files under {}", files.len(), root.display());
    Ok(files)
}
