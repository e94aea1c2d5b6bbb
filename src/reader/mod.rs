//! Format-aware batch readers
//!
//! This module provides:
//! - The [`BatchReader`] capability, one implementation per file format
//! - A registry that selects the reader by file extension
//!
//! Both readers yield rows in file order as a lazy, finite sequence of
//! [`RowBatch`]es. A sequence cannot be restarted; open the file again to re-read it.

pub mod columnar;
pub mod tabular;

pub use columnar::*;
pub use tabular::*;

use crate::error::{Error, Result};
use crate::locate::{FileFormat, SourceFile};
use crate::record::RowBatch;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Lazy sequence of batches from one file
pub type BatchIter = Box<dyn Iterator<Item = Result<RowBatch>> + Send>;

/// Reads one file format into row batches
pub trait BatchReader: Send + Sync {
    /// Format handled by this reader
    fn format(&self) -> FileFormat;

    /// Open `path` and return its rows in batches of `batch_size` (whole file when `None`).
    ///
    /// When `allowlist` is given only those columns are kept, and a missing
    /// column fails with [`Error::Schema`].
    fn open_batches(
        &self,
        path: &Path,
        allowlist: Option<&[String]>,
        batch_size: Option<usize>,
    ) -> Result<BatchIter>;
}

/// Readers keyed by file extension
#[derive(Clone, Default)]
pub struct ReaderRegistry {
    readers: HashMap<&'static str, Arc<dyn BatchReader>>,
}

impl ReaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the CSV and ORC readers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TabularReader::default()));
        registry.register(Arc::new(ColumnarReader));
        registry
    }

    /// Add or replace the reader for its format's extension
    pub fn register(&mut self, reader: Arc<dyn BatchReader>) {
        self.readers.insert(reader.format().extension(), reader);
    }

    /// Reader for a discovered file
    pub fn reader_for(&self, file: &SourceFile) -> Result<Arc<dyn BatchReader>> {
        self.readers
            .get(file.extension())
            .cloned()
            .ok_or_else(|| Error::UnsupportedFormat(file.extension().to_string()))
    }

    /// Formats that have a registered reader
    pub fn formats(&self) -> Vec<FileFormat> {
        let mut formats: Vec<FileFormat> = self.readers.values().map(|r| r.format()).collect();
        formats.sort_by_key(|f| f.extension());
        formats
    }
}

/// Positions of `allowlist` columns within `columns`, or a schema error naming the first missing one
pub(crate) fn project_columns(
    path: &Path,
    columns: &[String],
    allowlist: Option<&[String]>,
) -> Result<Vec<(String, usize)>> {
    match allowlist {
        None => Ok(columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect()),
        Some(wanted) => wanted
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .position(|c| c == name)
                    .map(|idx| (name.clone(), idx))
                    .ok_or_else(|| Error::Schema {
                        path: path.to_path_buf(),
                        field: name.clone(),
                    })
            })
            .collect(),
    }
}

/// Effective batch size; `None` or zero means "everything in one batch"
pub(crate) fn effective_batch_size(batch_size: Option<usize>) -> usize {
    match batch_size {
        Some(n) if n > 0 => n,
        _ => usize::MAX,
    }
}
