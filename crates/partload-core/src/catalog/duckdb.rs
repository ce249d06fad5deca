//! DuckDB-backed catalog
//!
//! One in-process DuckDB instance per [`DuckDbCatalog`]. The target table
//! lives in a database attached under the [`CatalogRef`] name: a local file,
//! an in-memory database, or a Glue-backed Iceberg catalog. Sessions are
//! cloned connections to the same instance, so every session sees the same
//! attachments.

use super::{Catalog, CatalogError, CatalogRef, CatalogResult, CatalogSession, Statement};
use crate::batch::{DataType, RecordBatch, Value};
use crate::partition::{quote_ident, validate_identifier, PartitionKey};
use ::duckdb::{params, params_from_iter, types::Value as DuckValue, Connection};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

const S3_SECRET_NAME: &str = "partload_s3";

/// Where the attached catalog's data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuckDbTarget {
    Memory,
    File(PathBuf),
    /// Glue Data Catalog of the given AWS account, read through the Iceberg
    /// extension. `None` means the account could not be resolved.
    Iceberg { account_id: Option<String> },
}

pub struct DuckDbCatalog {
    base: Arc<Mutex<Connection>>,
    target: DuckDbTarget,
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn engine_error(e: ::duckdb::Error) -> String {
    e.to_string()
}

impl DuckDbCatalog {
    /// Open the engine. `home_dir` redirects DuckDB's home and extension
    /// directories, needed where `$HOME` is read-only.
    pub fn open(target: DuckDbTarget, home_dir: Option<&Path>) -> CatalogResult<Self> {
        let fail = |reason: String| CatalogError::Attach {
            catalog: "duckdb".to_string(),
            reason,
        };

        let conn = Connection::open_in_memory().map_err(|e| fail(engine_error(e)))?;
        if let Some(home) = home_dir {
            let home = home.to_string_lossy();
            let extensions = format!("{}/duckdb_extensions", home.trim_end_matches('/'));
            conn.execute_batch(&format!(
                "SET home_directory={}; SET extension_directory={};",
                quote_literal(&home),
                quote_literal(&extensions)
            ))
            .map_err(|e| fail(engine_error(e)))?;
        }

        info!(mode = ?target, "DuckDB catalog engine opened");

        Ok(Self {
            base: Arc::new(Mutex::new(conn)),
            target,
        })
    }

    pub fn in_memory() -> CatalogResult<Self> {
        Self::open(DuckDbTarget::Memory, None)
    }

    /// Attach `catalog` and run `ddl` against it, for local setups that
    /// need the target schema and table to exist.
    pub fn bootstrap(&self, catalog: &CatalogRef, ddl: &str) -> CatalogResult<()> {
        let conn = attach_blocking(&self.base, &self.target, catalog)?;
        conn.execute_batch(ddl)
            .map_err(|e| CatalogError::Statement {
                statement: "bootstrap".to_string(),
                reason: engine_error(e),
            })
    }
}

#[async_trait]
impl Catalog for DuckDbCatalog {
    #[instrument(skip(self), fields(catalog = %catalog))]
    async fn attach(&self, catalog: &CatalogRef) -> CatalogResult<Box<dyn CatalogSession>> {
        let base = Arc::clone(&self.base);
        let target = self.target.clone();
        let catalog = catalog.clone();
        let name = catalog.name.clone();

        // attaching may download extensions; keep it off the async workers
        let conn = tokio::task::spawn_blocking(move || attach_blocking(&base, &target, &catalog))
            .await
            .map_err(|e| CatalogError::Attach {
                catalog: name,
                reason: format!("worker task failed: {}", e),
            })??;

        debug!("Catalog session attached");
        Ok(Box::new(DuckDbSession {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

/// Statements that make `catalog` visible to every connection.
fn attach_script(target: &DuckDbTarget, catalog: &CatalogRef) -> CatalogResult<String> {
    validate_identifier("catalog", &catalog.name).map_err(|e| CatalogError::Attach {
        catalog: catalog.name.clone(),
        reason: e.to_string(),
    })?;
    let alias = quote_ident(&catalog.name);

    Ok(match target {
        DuckDbTarget::Memory => format!("ATTACH IF NOT EXISTS ':memory:' AS {};", alias),
        DuckDbTarget::File(path) => format!(
            "ATTACH IF NOT EXISTS {} AS {};",
            quote_literal(&path.to_string_lossy()),
            alias
        ),
        DuckDbTarget::Iceberg { account_id } => {
            let account_id = account_id.as_deref().ok_or_else(|| CatalogError::Attach {
                catalog: catalog.name.clone(),
                reason: "AWS account identity could not be resolved".to_string(),
            })?;
            format!(
                "INSTALL aws; LOAD aws; INSTALL iceberg; LOAD iceberg; \
                 CREATE SECRET IF NOT EXISTS {} (TYPE S3, PROVIDER CREDENTIAL_CHAIN); \
                 ATTACH IF NOT EXISTS {} AS {} (TYPE iceberg, ENDPOINT_TYPE 'glue');",
                S3_SECRET_NAME,
                quote_literal(account_id),
                alias
            )
        }
    })
}

fn attach_blocking(
    base: &Mutex<Connection>,
    target: &DuckDbTarget,
    catalog: &CatalogRef,
) -> CatalogResult<Connection> {
    let script = attach_script(target, catalog)?;
    let fail = |reason: String| CatalogError::Attach {
        catalog: catalog.name.clone(),
        reason,
    };

    let conn = base
        .lock()
        .map_err(|_| fail("connection lock poisoned".to_string()))?
        .try_clone()
        .map_err(|e| fail(engine_error(e)))?;

    conn.execute_batch(&script).map_err(|e| fail(engine_error(e)))?;
    Ok(conn)
}

struct DuckDbSession {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl CatalogSession for DuckDbSession {
    async fn execute(&mut self, statement: &Statement) -> CatalogResult<u64> {
        let conn = Arc::clone(&self.conn);
        let statement = statement.clone();
        let name = statement.name();
        let fail = move |reason: String| CatalogError::Statement {
            statement: name.to_string(),
            reason,
        };

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| fail("connection lock poisoned".to_string()))?;
            run_statement(&mut conn, &statement).map_err(|e| fail(engine_error(e)))
        })
        .await
        .map_err(|e| fail(format!("worker task failed: {}", e)))?
    }

    async fn close(self: Box<Self>) -> CatalogResult<()> {
        // the connection is released when the last handle drops
        drop(self);
        Ok(())
    }
}

fn partition_predicate(key: &PartitionKey) -> String {
    format!("{} = CAST(? AS DATE)", quote_ident(&key.column))
}

fn run_statement(conn: &mut Connection, statement: &Statement) -> ::duckdb::Result<u64> {
    match statement {
        Statement::DeletePartition(key) => {
            let sql = format!(
                "DELETE FROM {} WHERE {}",
                key.table.quoted(),
                partition_predicate(key)
            );
            let deleted = conn.execute(&sql, params![key.value_string()])?;
            Ok(deleted as u64)
        }
        Statement::CountPartition(key) => {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                key.table.quoted(),
                partition_predicate(key)
            );
            let count: i64 = conn.query_row(&sql, params![key.value_string()], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        }
        Statement::InsertBatch { key, batch } => insert_batch(conn, key, batch),
    }
}

fn placeholder(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Date => "CAST(? AS DATE)",
        DataType::Timestamp => "CAST(? AS TIMESTAMP)",
        _ => "?",
    }
}

fn to_duck(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Boolean(v) => DuckValue::Boolean(*v),
        Value::BigInt(v) => DuckValue::BigInt(*v),
        Value::Double(v) => DuckValue::Double(*v),
        Value::Date(_) | Value::Timestamp(_) => DuckValue::Text(value.to_string()),
        Value::Varchar(v) => DuckValue::Text(v.clone()),
    }
}

/// All rows in one transaction, so the insert on its own is all-or-nothing.
fn insert_batch(conn: &mut Connection, key: &PartitionKey, batch: &RecordBatch) -> ::duckdb::Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let columns: Vec<String> = batch.columns().iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders: Vec<&str> = batch
        .columns()
        .iter()
        .map(|c| placeholder(c.data_type))
        .collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        key.table.quoted(),
        columns.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    let mut inserted = 0u64;
    {
        let mut stmt = tx.prepare(&sql)?;
        for row in 0..batch.num_rows() {
            let values: Vec<DuckValue> = batch
                .columns()
                .iter()
                .map(|c| to_duck(&c.values[row]))
                .collect();
            inserted += stmt.execute(params_from_iter(values))? as u64;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::Column;
    use crate::partition::TableId;
    use chrono::NaiveDate;

    const DDL: &str = r#"
        CREATE SCHEMA IF NOT EXISTS "glue_catalog"."sales";
        CREATE TABLE IF NOT EXISTS "glue_catalog"."sales"."orders" (
            order_id BIGINT,
            amount DOUBLE,
            order_date DATE,
            processed_at TIMESTAMP
        );
    "#;

    fn key(day: u32) -> PartitionKey {
        PartitionKey::new(
            TableId::new("glue_catalog", "sales", "orders").unwrap(),
            "order_date",
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        )
        .unwrap()
    }

    fn batch(day: u32, ids: &[i64]) -> Arc<RecordBatch> {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let ts = date.and_hms_opt(6, 0, 0).unwrap();
        Arc::new(
            RecordBatch::new(vec![
                Column::new(
                    "order_id",
                    DataType::BigInt,
                    ids.iter().map(|i| Value::BigInt(*i)).collect(),
                ),
                Column::new(
                    "amount",
                    DataType::Double,
                    ids.iter().map(|_| Value::Null).collect(),
                ),
                Column::new("order_date", DataType::Date, vec![Value::Date(date); ids.len()]),
                Column::new("processed_at", DataType::Timestamp, vec![Value::Timestamp(ts); ids.len()]),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_delete_insert_count_are_partition_scoped() {
        let catalog = DuckDbCatalog::in_memory().unwrap();
        let catalog_ref = CatalogRef::new("glue_catalog");
        catalog.bootstrap(&catalog_ref, DDL).unwrap();

        let mut session = catalog.attach(&catalog_ref).await.unwrap();
        let inserted = session
            .execute(&Statement::InsertBatch {
                key: key(9),
                batch: batch(9, &[1, 2]),
            })
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        session
            .execute(&Statement::InsertBatch {
                key: key(10),
                batch: batch(10, &[3, 4, 5]),
            })
            .await
            .unwrap();

        assert_eq!(session.execute(&Statement::DeletePartition(key(10))).await.unwrap(), 3);
        assert_eq!(session.execute(&Statement::CountPartition(key(10))).await.unwrap(), 0);
        assert_eq!(session.execute(&Statement::CountPartition(key(9))).await.unwrap(), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_into_missing_table_fails() {
        let catalog = DuckDbCatalog::in_memory().unwrap();
        let mut session = catalog.attach(&CatalogRef::new("glue_catalog")).await.unwrap();
        let err = session
            .execute(&Statement::InsertBatch {
                key: key(10),
                batch: batch(10, &[1]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Statement { .. }));
    }

    #[tokio::test]
    async fn test_iceberg_without_identity_fails_to_attach() {
        let catalog = DuckDbCatalog::open(DuckDbTarget::Iceberg { account_id: None }, None).unwrap();
        let err = catalog
            .attach(&CatalogRef::new("glue_catalog"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CatalogError::Attach { .. }));
    }

    #[test]
    fn test_attach_script_quotes_paths() {
        let catalog = DuckDbCatalog::open(DuckDbTarget::File(PathBuf::from("/tmp/o'brien.duckdb")), None)
            .unwrap();
        let script = attach_script(&catalog.target, &CatalogRef::new("local")).unwrap();
        assert_eq!(script, r#"ATTACH IF NOT EXISTS '/tmp/o''brien.duckdb' AS "local";"#);
        assert!(attach_script(&catalog.target, &CatalogRef::new("bad name")).is_err());
    }
}
