//! Source batch reader
//!
//! Fetches the dated source object and decodes it into a [`RecordBatch`].
//! Column types are inferred unless the expected schema declares one, in
//! which case every cell must parse as the declared type.

use crate::batch::{Column, DataType, ExpectedSchema, RecordBatch, Value};
use crate::error::{IngestError, Result};
use crate::partition::SourceObject;
use crate::storage::{bounded, ObjectStore, StoreError};
use chrono::{DateTime, Utc};
use partload_common::checksum::ContentDigest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A decoded source object plus what the archiver needs to verify its copy
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub batch: RecordBatch,
    pub size_bytes: u64,
    pub checksum: ContentDigest,
}

pub struct SourceReader {
    store: Arc<dyn ObjectStore>,
    call_timeout: Duration,
}

impl SourceReader {
    pub fn new(store: Arc<dyn ObjectStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    #[instrument(skip(self, source), fields(uri = %source.uri()))]
    pub async fn read(&self, source: &SourceObject) -> Result<LoadedSource> {
        let bytes = bounded(
            self.call_timeout,
            self.store.get_object(&source.bucket, &source.key),
        )
        .await
        .map_err(|e| match e {
            StoreError::NotFound { bucket, key } => IngestError::NotFound { bucket, key },
            other => IngestError::SourceUnavailable(other.to_string()),
        })?;

        let batch = decode_csv(&bytes, &source.expected_schema, Utc::now())?;
        info!(
            rows = batch.num_rows(),
            columns = batch.columns().len(),
            bytes = bytes.len(),
            "Read source batch"
        );

        Ok(LoadedSource {
            batch,
            size_bytes: bytes.len() as u64,
            checksum: ContentDigest::of(&bytes),
        })
    }
}

/// Decode a headed CSV body, validate it against `schema` and stamp
/// `processed_at`.
///
/// A zero-byte body yields an empty batch without schema checks; a
/// header-only body yields an empty batch whose header must still carry the
/// required columns.
pub fn decode_csv(
    bytes: &[u8],
    schema: &ExpectedSchema,
    processed_at: DateTime<Utc>,
) -> Result<RecordBatch> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        debug!("Source object is empty");
        let mut batch = RecordBatch::default();
        batch.stamp_processed_at(processed_at)?;
        return Ok(batch);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Parse(format!("invalid header row: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if let Some(position) = headers.iter().position(|h| h.is_empty()) {
        return Err(IngestError::Parse(format!(
            "empty column name at position {}",
            position + 1
        )));
    }

    check_required_columns(&headers, schema)?;

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| IngestError::Parse(format!("record {}: {}", line + 1, e)))?;
        for (index, field) in record.iter().enumerate() {
            cells[index].push(if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            });
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| build_column(name, raw, schema))
        .collect::<Result<Vec<_>>>()?;

    let mut batch = RecordBatch::new(columns)?;
    batch.stamp_processed_at(processed_at)?;
    Ok(batch)
}

fn check_required_columns(headers: &[String], schema: &ExpectedSchema) -> Result<()> {
    let missing: Vec<&str> = schema
        .required_columns()
        .filter(|spec| !headers.iter().any(|h| h.eq_ignore_ascii_case(&spec.name)))
        .map(|spec| spec.name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::SchemaMismatch(format!(
            "missing required columns: {}",
            missing.join(", ")
        )))
    }
}

fn build_column(name: String, raw: Vec<Option<String>>, schema: &ExpectedSchema) -> Result<Column> {
    let spec = schema.spec(&name);

    let data_type = match spec.and_then(|s| s.data_type) {
        Some(declared) => declared,
        None => raw
            .iter()
            .flatten()
            .map(|cell| DataType::infer(cell))
            .reduce(DataType::widen)
            .unwrap_or(DataType::Varchar),
    };

    let mut values = Vec::with_capacity(raw.len());
    for (row, cell) in raw.into_iter().enumerate() {
        let value = match cell {
            None => Value::Null,
            Some(cell) => data_type.parse_cell(&cell).ok_or_else(|| {
                IngestError::SchemaMismatch(format!(
                    "column '{}' row {}: '{}' is not {}",
                    name,
                    row + 1,
                    cell,
                    data_type
                ))
            })?,
        };
        if value.is_null() && spec.is_some_and(|s| !s.nullable) {
            return Err(IngestError::SchemaMismatch(format!(
                "column '{}' row {} is NULL but the column is required",
                name,
                row + 1
            )));
        }
        values.push(value);
    }

    Ok(Column::new(name, data_type, values))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::{ColumnSpec, PROCESSED_AT_COLUMN};
    use crate::error::ErrorKind;
    use crate::storage::{MemoryObjectStore, StoreOp};
    use chrono::NaiveDate;

    fn schema() -> ExpectedSchema {
        ExpectedSchema::new("order_date")
            .with_column(ColumnSpec::required("order_id"))
            .with_column(ColumnSpec::required("amount").with_type(DataType::Double))
            .with_column(ColumnSpec::optional("note"))
    }

    #[test]
    fn test_decode_infers_types_and_stamps_rows() {
        let body = b"order_id,amount,order_date,note\n1,10,2024-03-10,\n2,12.5,2024-03-10,gift\n";
        let now = Utc::now();
        let batch = decode_csv(body, &schema(), now).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(
            batch.column_names(),
            vec!["order_id", "amount", "order_date", "note", PROCESSED_AT_COLUMN]
        );
        assert_eq!(batch.column("order_id").unwrap().data_type, DataType::BigInt);
        // declared DOUBLE wins over the inferred BIGINT of "10"
        assert_eq!(
            batch.column("amount").unwrap().values,
            vec![Value::Double(10.0), Value::Double(12.5)]
        );
        assert_eq!(
            batch.column("order_date").unwrap().values[0],
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
        );
        assert_eq!(batch.column("note").unwrap().values[0], Value::Null);
        let stamped = batch.column(PROCESSED_AT_COLUMN).unwrap();
        assert!(stamped
            .values
            .iter()
            .all(|v| *v == Value::Timestamp(now.naive_utc())));
    }

    #[test]
    fn test_missing_required_column_is_schema_mismatch() {
        let err = decode_csv(b"order_id,note\n1,x\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_empty_and_header_only_bodies() {
        let empty = decode_csv(b"", &schema(), Utc::now()).unwrap();
        assert!(empty.is_empty());

        let header_only = decode_csv(b"order_id,amount\n", &schema(), Utc::now()).unwrap();
        assert!(header_only.is_empty());
        assert_eq!(header_only.columns().len(), 3);

        let bad_header = decode_csv(b"order_id\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(bad_header.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_undecodable_bodies_are_parse_errors() {
        let ragged = decode_csv(b"order_id,amount\n1,2,3\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(ragged.kind(), ErrorKind::ParseError);

        let binary = decode_csv(b"order_id,amount\n1,\xff\xfe\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(binary.kind(), ErrorKind::ParseError);

        let unnamed = decode_csv(b"order_id,,amount\n1,2,3\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(unnamed.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_declared_type_and_nullability_enforced() {
        let wrong_type =
            decode_csv(b"order_id,amount\n1,ten\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(wrong_type.kind(), ErrorKind::SchemaMismatch);

        let null_required =
            decode_csv(b"order_id,amount\n,1.0\n", &schema(), Utc::now()).unwrap_err();
        assert_eq!(null_required.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_bom_is_ignored() {
        let batch = decode_csv(b"\xEF\xBB\xBForder_id,amount\n1,2\n", &schema(), Utc::now()).unwrap();
        assert!(batch.column("order_id").is_some());
    }

    #[tokio::test]
    async fn test_read_maps_store_errors() {
        let store = Arc::new(MemoryObjectStore::new());
        let reader = SourceReader::new(store.clone(), Duration::from_secs(1));
        let source = SourceObject {
            bucket: "raw".into(),
            key: "orders/orders_2024-03-10.csv".into(),
            expected_schema: schema(),
        };

        let err = reader.read(&source).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.insert("raw", &source.key, "order_id,amount\n1,2\n");
        let loaded = reader.read(&source).await.unwrap();
        assert_eq!(loaded.batch.num_rows(), 1);
        assert_eq!(loaded.size_bytes, 20);

        store.fail(StoreOp::Get);
        let err = reader.read(&source).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_is_source_unavailable() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("raw", "k.csv", "order_id,amount\n1,2\n");
        store.delay(StoreOp::Get, Duration::from_secs(60));
        let reader = SourceReader::new(store, Duration::from_secs(5));
        let source = SourceObject {
            bucket: "raw".into(),
            key: "k.csv".into(),
            expected_schema: schema(),
        };

        let err = reader.read(&source).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert!(err.to_string().contains("timed out"));
    }
}
