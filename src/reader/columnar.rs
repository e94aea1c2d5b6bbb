//! ORC reader
//!
//! Columnar files are assumed to fit in memory: the whole file is decoded,
//! optionally projected, then partitioned into fixed-size batches.

use super::{effective_batch_size, project_columns, BatchIter, BatchReader};
use crate::error::{Error, Result};
use crate::locate::FileFormat;
use crate::record::{FieldValue, Record, RowBatch};
use arrow::json::ArrayWriter;
use arrow::datatypes::Schema;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use orc_rust::ArrowReaderBuilder;
use serde_json::{Map, Value};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// ORC reader backed by `orc-rust`
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarReader;

impl BatchReader for ColumnarReader {
    fn format(&self) -> FileFormat {
        FileFormat::ColumnarBinary
    }

    fn open_batches(
        &self,
        path: &Path,
        allowlist: Option<&[String]>,
        batch_size: Option<usize>,
    ) -> Result<BatchIter> {
        let rows = read_all_rows(path, allowlist)?;
        debug!(path = %path.display(), rows = rows.len(), "Decoded ORC file");

        let size = effective_batch_size(batch_size);
        let mut batches = Vec::new();
        let mut offset = 0;
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Record> = rows.by_ref().take(size).collect();
            let len = chunk.len();
            batches.push(Ok(RowBatch::new(path, offset, chunk)));
            offset += len;
        }

        Ok(Box::new(batches.into_iter()))
    }
}

fn read_all_rows(path: &Path, allowlist: Option<&[String]>) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    let reader = ArrowReaderBuilder::try_new(file)
        .map_err(|e| Error::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .build();

    // Checked against the file schema so files without any stripes fail too
    let projection = match allowlist {
        Some(_) => Some(projection(path, &reader.schema(), allowlist)?),
        None => None,
    };

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| Error::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let batch = match &projection {
            Some(indices) => batch.project(indices)?,
            None => batch,
        };
        rows.extend(batch_to_records(&batch)?);
    }
    Ok(rows)
}

fn projection(path: &Path, schema: &Schema, allowlist: Option<&[String]>) -> Result<Vec<usize>> {
    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    Ok(project_columns(path, &names, allowlist)?
        .into_iter()
        .map(|(_, idx)| idx)
        .collect())
}

/// Render an Arrow batch as rows; nulls are left out by the JSON writer
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }

    let mut writer = ArrayWriter::new(Vec::new());
    writer.write_batches(&[batch])?;
    writer.finish()?;
    let buf = writer.into_inner();

    let objects: Vec<Map<String, Value>> = serde_json::from_slice(&buf)?;
    Ok(objects
        .into_iter()
        .map(|obj| {
            Record::from_columns(
                obj.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v))),
            )
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use orc_rust::ArrowWriterBuilder;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Write a small ORC file with an int column and a nullable string column
    pub(crate) fn write_orc(path: &Path, ids: Vec<i64>, labels: Vec<Option<&str>>) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("label", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(labels)),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

        let file = File::create(path).unwrap();
        let mut writer = ArrowWriterBuilder::new(file, schema).try_build().unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn fixture(dir: &TempDir, rows: i64) -> PathBuf {
        let path = dir.path().join("flows.orc");
        let ids: Vec<i64> = (0..rows).collect();
        let labels: Vec<Option<&str>> = (0..rows)
            .map(|i| if i % 2 == 0 { Some("even") } else { None })
            .collect();
        write_orc(&path, ids, labels);
        path
    }

    #[test]
    fn test_partition_into_ceiling_batches() {
        let tmp = TempDir::new().unwrap();
        let path = fixture(&tmp, 7);

        let batches: Vec<RowBatch> = ColumnarReader
            .open_batches(&path, None, Some(3))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            batches.iter().map(RowBatch::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        let ids: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.rows.iter())
            .map(|r| r.get("id").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
        assert_eq!(batches[1].offset, 3);
    }

    #[test]
    fn test_unset_batch_size_yields_whole_file() {
        let tmp = TempDir::new().unwrap();
        let path = fixture(&tmp, 5);
        let batches: Vec<_> = ColumnarReader.open_batches(&path, None, None).unwrap().collect();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_null_cells_are_absent() {
        let tmp = TempDir::new().unwrap();
        let path = fixture(&tmp, 2);
        let batch = ColumnarReader
            .open_batches(&path, None, None)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.rows[0].get("label"), Some(FieldValue::from("even")));
        assert!(batch.rows[1].get("label").is_none());
    }

    #[test]
    fn test_projection_and_missing_field() {
        let tmp = TempDir::new().unwrap();
        let path = fixture(&tmp, 2);

        let allow = vec!["id".to_string()];
        let batch = ColumnarReader
            .open_batches(&path, Some(&allow), None)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert!(!batch.rows[0].contains("label"));

        let allow = vec!["window_id".to_string()];
        assert!(matches!(
            ColumnarReader.open_batches(&path, Some(&allow), None),
            Err(Error::Schema { .. })
        ));
    }

    #[test]
    fn test_empty_file_is_checked_against_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.orc");
        let schema = Arc::new(Schema::new(vec![Field::new(
            "unrelated",
            DataType::Utf8,
            true,
        )]));
        let file = File::create(&path).unwrap();
        ArrowWriterBuilder::new(file, schema)
            .try_build()
            .unwrap()
            .close()
            .unwrap();

        let allow = vec!["first_timestamp".to_string()];
        match ColumnarReader.open_batches(&path, Some(&allow), None) {
            Err(Error::Schema { field, .. }) => assert_eq!(field, "first_timestamp"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected schema error"),
        }

        let allow = vec!["unrelated".to_string()];
        let batches: Vec<_> = ColumnarReader
            .open_batches(&path, Some(&allow), None)
            .unwrap()
            .collect();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_flow_columns_become_typed_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flows.orc");
        let schema = Arc::new(Schema::new(vec![
            Field::new("sip", DataType::Utf8, false),
            Field::new("sport", DataType::Int64, false),
            Field::new("dip", DataType::Utf8, false),
            Field::new("dport", DataType::Int64, false),
            Field::new("proto", DataType::Int64, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["10.0.0.1"])),
            Arc::new(Int64Array::from(vec![51000])),
            Arc::new(StringArray::from(vec!["1.1.1.1"])),
            Arc::new(Int64Array::from(vec![53])),
            Arc::new(Int64Array::from(vec![17])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriterBuilder::new(file, schema).try_build().unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let batch = ColumnarReader
            .open_batches(&path, None, None)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let key = batch.rows[0].flow().unwrap();
        assert_eq!(key.to_string(), "10.0.0.1:51000 -> 1.1.1.1:53 (17)");
    }

    #[test]
    fn test_garbage_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.orc");
        std::fs::write(&path, b"definitely not orc").unwrap();
        assert!(matches!(
            ColumnarReader.open_batches(&path, None, None),
            Err(Error::Read { .. })
        ));
    }
}
