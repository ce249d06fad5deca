//! Partition keys and source path resolution
//!
//! A target date is the only caller-controlled input that ends up in object
//! keys and catalog predicates, so it is validated here before anything else
//! touches the network.

use crate::batch::ExpectedSchema;
use crate::error::{IngestError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const DATE_FORMAT: &str = "%Y-%m-%d";

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static DATE_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(DATE_PATTERN));
static IDENTIFIER_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN));

fn matches(
    re: &LazyLock<std::result::Result<Regex, regex::Error>>,
    value: &str,
) -> Result<bool> {
    match &**re {
        Ok(re) => Ok(re.is_match(value)),
        Err(e) => Err(IngestError::InvalidArgument(format!("invalid pattern: {}", e))),
    }
}

/// Parse a `YYYY-MM-DD` target date.
///
/// Both the shape and the calendar are checked: `2024-02-30` is rejected.
pub fn parse_target_date(raw: &str) -> Result<NaiveDate> {
    if !matches(&DATE_RE, raw)? {
        return Err(IngestError::InvalidArgument(format!(
            "target date '{}' does not match YYYY-MM-DD",
            raw
        )));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        IngestError::InvalidArgument(format!("target date '{}' is not a calendar date: {}", raw, e))
    })
}

/// Check that `name` is a plain SQL identifier.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if matches(&IDENTIFIER_RE, name)? {
        Ok(())
    } else {
        Err(IngestError::InvalidArgument(format!(
            "{} '{}' is not a valid identifier",
            kind, name
        )))
    }
}

/// Double-quote an identifier for use in a statement.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualified target table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    catalog: String,
    database: String,
    table: String,
}

impl TableId {
    pub fn new(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            catalog: catalog.into(),
            database: database.into(),
            table: table.into(),
        };
        validate_identifier("catalog", &id.catalog)?;
        validate_identifier("database", &id.database)?;
        validate_identifier("table", &id.table)?;
        Ok(id)
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"catalog"."database"."table"`
    pub fn quoted(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.catalog),
            quote_ident(&self.database),
            quote_ident(&self.table)
        )
    }

    /// `database.table`, as reported to invokers.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.database, self.table)
    }
}

/// One replaceable unit of the target table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub table: TableId,
    pub column: String,
    pub value: NaiveDate,
}

impl PartitionKey {
    pub fn new(table: TableId, column: impl Into<String>, value: NaiveDate) -> Result<Self> {
        let column = column.into();
        validate_identifier("partition column", &column)?;
        Ok(Self {
            table,
            column,
            value,
        })
    }

    pub fn value_string(&self) -> String {
        self.value.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}={}]", self.table, self.column, self.value_string())
    }
}

/// The batch to ingest for one target date
#[derive(Debug, Clone, PartialEq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
    pub expected_schema: ExpectedSchema,
}

impl SourceObject {
    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Derives source keys and partition keys from target dates
#[derive(Debug, Clone)]
pub struct SourcePathResolver {
    bucket: String,
    prefix: String,
    file_prefix: String,
    extension: String,
    table: TableId,
    schema: ExpectedSchema,
}

impl SourcePathResolver {
    pub fn new(
        bucket: impl Into<String>,
        prefix: &str,
        file_prefix: impl Into<String>,
        extension: &str,
        table: TableId,
        schema: ExpectedSchema,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "source bucket must not be empty".to_string(),
            ));
        }
        validate_identifier("partition column", schema.partition_column())?;
        Ok(Self {
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
            file_prefix: file_prefix.into(),
            extension: extension.trim_start_matches('.').to_string(),
            table,
            schema,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    /// Prefix under which all source objects live, with a trailing `/`
    /// unless the prefix is empty.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    pub fn source_key(&self, date: NaiveDate) -> String {
        format!(
            "{}{}_{}.{}",
            self.list_prefix(),
            self.file_prefix,
            date.format(DATE_FORMAT),
            self.extension
        )
    }

    pub fn resolve(&self, target_date: &str) -> Result<(SourceObject, PartitionKey)> {
        let date = parse_target_date(target_date)?;
        let source = SourceObject {
            bucket: self.bucket.clone(),
            key: self.source_key(date),
            expected_schema: self.schema.clone(),
        };
        let key = PartitionKey::new(
            self.table.clone(),
            self.schema.partition_column().to_string(),
            date,
        )?;
        Ok((source, key))
    }

    /// Recover the target date from a key produced by [`Self::source_key`].
    pub fn date_from_key(&self, key: &str) -> Option<NaiveDate> {
        let rest = key.strip_prefix(&self.list_prefix())?;
        let rest = rest.strip_prefix(&self.file_prefix)?.strip_prefix('_')?;
        let date = rest.strip_suffix(&self.extension)?.strip_suffix('.')?;
        parse_target_date(date).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn resolver(prefix: &str) -> SourcePathResolver {
        let table = TableId::new("glue_catalog", "sales", "orders").unwrap();
        SourcePathResolver::new(
            "raw-bucket",
            prefix,
            "orders",
            "csv",
            table,
            ExpectedSchema::new("order_date"),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_builds_key_and_partition() {
        let (source, key) = resolver("orders/").resolve("2024-03-10").unwrap();
        assert_eq!(source.bucket, "raw-bucket");
        assert_eq!(source.key, "orders/orders_2024-03-10.csv");
        assert_eq!(source.file_name(), "orders_2024-03-10.csv");
        assert_eq!(key.column, "order_date");
        assert_eq!(key.value_string(), "2024-03-10");
        assert_eq!(key.table.quoted(), r#""glue_catalog"."sales"."orders""#);
    }

    #[test]
    fn test_empty_prefix() {
        let (source, _) = resolver("").resolve("2024-03-10").unwrap();
        assert_eq!(source.key, "orders_2024-03-10.csv");
    }

    #[test]
    fn test_rejects_malformed_dates() {
        let r = resolver("orders");
        for bad in [
            "2024-3-10",
            "20240310",
            "2024-03-10'; DROP TABLE orders; --",
            "2024-02-30",
            "",
            " 2024-03-10",
        ] {
            let err = r.resolve(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "input {:?}", bad);
        }
    }

    #[test]
    fn test_date_from_key_inverts_layout() {
        let r = resolver("orders");
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(r.date_from_key(&r.source_key(date)), Some(date));
        assert_eq!(r.date_from_key("orders/orders_latest.csv"), None);
        assert_eq!(r.date_from_key("orders/other_2024-03-10.csv"), None);
        assert_eq!(r.date_from_key("archive/orders_2024-03-10.csv"), None);
        assert_eq!(r.date_from_key("orders/orders_2024-03-10.csv.bak"), None);
    }

    #[test]
    fn test_patterns_compile_once_and_stay_usable() {
        assert!(DATE_RE.as_ref().is_ok());
        assert!(IDENTIFIER_RE.as_ref().is_ok());
        for _ in 0..3 {
            assert!(parse_target_date("2024-03-10").is_ok());
            assert!(validate_identifier("table", "orders").is_ok());
            assert!(validate_identifier("table", "1orders").is_err());
        }
    }

    #[test]
    fn test_table_id_rejects_non_identifiers() {
        assert!(TableId::new("glue_catalog", "sales", "orders; DROP").is_err());
        assert!(TableId::new("glue_catalog", "1sales", "orders").is_err());
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
