//! Streaming CSV reader

use super::{effective_batch_size, project_columns, BatchIter, BatchReader};
use crate::error::{Error, Result};
use crate::locate::FileFormat;
use crate::record::{FieldValue, Record, RowBatch};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::{Path, PathBuf};

/// CSV reader; rows are streamed, never loading the whole file
#[derive(Debug, Clone)]
pub struct TabularReader {
    delimiter: u8,
}

impl Default for TabularReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl BatchReader for TabularReader {
    fn format(&self) -> FileFormat {
        FileFormat::TabularText
    }

    fn open_batches(
        &self,
        path: &Path,
        allowlist: Option<&[String]>,
        batch_size: Option<usize>,
    ) -> Result<BatchIter> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .trim(Trim::Headers)
            .from_path(path)
            .map_err(|e| read_error(path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| read_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();
        let columns = project_columns(path, &headers, allowlist)?;

        Ok(Box::new(TabularBatches {
            reader,
            path: path.to_path_buf(),
            columns,
            batch_size: effective_batch_size(batch_size),
            offset: 0,
            finished: false,
        }))
    }
}

fn read_error(path: &Path, err: csv::Error) -> Error {
    match err.kind() {
        csv::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: {}", path.display(), e),
            ))
        }
        _ => Error::Read {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}

struct TabularBatches {
    reader: csv::Reader<File>,
    path: PathBuf,
    columns: Vec<(String, usize)>,
    batch_size: usize,
    offset: usize,
    finished: bool,
}

impl TabularBatches {
    fn to_record(&self, row: &StringRecord) -> Record {
        Record::from_columns(self.columns.iter().map(|(name, idx)| {
            let value = row.get(*idx).map(FieldValue::infer).unwrap_or(FieldValue::Null);
            (name.clone(), value)
        }))
    }
}

impl Iterator for TabularBatches {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut rows = Vec::new();
        let mut row = StringRecord::new();
        while rows.len() < self.batch_size {
            match self.reader.read_record(&mut row) {
                Ok(true) => rows.push(self.to_record(&row)),
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(read_error(&self.path, e)));
                }
            }
        }

        if rows.is_empty() {
            return None;
        }

        let batch = RowBatch::new(&self.path, self.offset, rows);
        self.offset += batch.len();
        Some(Ok(batch))
    }
}
