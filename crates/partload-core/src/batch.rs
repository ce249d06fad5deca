//! In-memory columnar record batches
//!
//! A [`RecordBatch`] is what the source reader produces and the catalog
//! writer consumes. Column types are inferred from text cells; see
//! [`DataType::infer`].

use crate::error::{IngestError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the column stamped onto every batch at read time.
pub const PROCESSED_AT_COLUMN: &str = "processed_at";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    BigInt,
    Double,
    Date,
    Timestamp,
    Varchar,
}

impl DataType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::BigInt => "BIGINT",
            DataType::Double => "DOUBLE",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Varchar => "VARCHAR",
        }
    }

    /// Narrowest type a single non-empty cell parses as.
    pub fn infer(cell: &str) -> DataType {
        if parse_bool(cell).is_some() {
            DataType::Boolean
        } else if cell.parse::<i64>().is_ok() {
            DataType::BigInt
        } else if parse_double(cell).is_some() {
            DataType::Double
        } else if NaiveDate::parse_from_str(cell, DATE_FORMAT).is_ok() {
            DataType::Date
        } else if parse_timestamp(cell).is_some() {
            DataType::Timestamp
        } else {
            DataType::Varchar
        }
    }

    /// Smallest type both `self` and `other` widen to.
    pub fn widen(self, other: DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, Double) | (Double, BigInt) => Double,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Varchar,
        }
    }

    /// Parse one non-empty cell as this type.
    pub fn parse_cell(&self, cell: &str) -> Option<Value> {
        match self {
            DataType::Boolean => parse_bool(cell).map(Value::Boolean),
            DataType::BigInt => cell.parse().ok().map(Value::BigInt),
            DataType::Double => parse_double(cell).map(Value::Double),
            DataType::Date => NaiveDate::parse_from_str(cell, DATE_FORMAT)
                .ok()
                .map(Value::Date),
            DataType::Timestamp => parse_timestamp(cell).map(Value::Timestamp),
            DataType::Varchar => Some(Value::Varchar(cell.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(DataType::Boolean),
            "int" | "integer" | "bigint" | "long" => Ok(DataType::BigInt),
            "double" | "float" | "decimal" => Ok(DataType::Double),
            "date" => Ok(DataType::Date),
            "timestamp" | "datetime" => Ok(DataType::Timestamp),
            "varchar" | "string" | "text" => Ok(DataType::Varchar),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_double(cell: &str) -> Option<f64> {
    // Rust accepts "inf" and "NaN"; a CSV column of those is text.
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(cell) {
        return Some(ts.with_timezone(&Utc).naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
        .or_else(|| {
            // a bare date widens to midnight
            NaiveDate::parse_from_str(cell, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Date(NaiveDate),
    /// UTC wall clock
    Timestamp(NaiveDateTime),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.6f")),
            Value::Varchar(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// Columnar table with a fixed, ordered set of named, typed columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordBatch {
    columns: Vec<Column>,
    num_rows: usize,
}

impl RecordBatch {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for column in &columns {
            if column.values.len() != num_rows {
                return Err(IngestError::Parse(format!(
                    "column '{}' has {} values, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(IngestError::Parse(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case-insensitive lookup, matching how the catalog resolves names.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Cells of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.num_rows {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Append a column holding `ts` for every row.
    pub fn stamp_processed_at(&mut self, ts: DateTime<Utc>) -> Result<()> {
        if self.column(PROCESSED_AT_COLUMN).is_some() {
            return Err(IngestError::SchemaMismatch(format!(
                "source already contains reserved column '{}'",
                PROCESSED_AT_COLUMN
            )));
        }
        self.columns.push(Column::new(
            PROCESSED_AT_COLUMN,
            DataType::Timestamp,
            vec![Value::Timestamp(ts.naive_utc()); self.num_rows],
        ));
        Ok(())
    }

    /// Make every row belong to the partition `date` of `column`.
    ///
    /// NULL cells are filled with `date`; any other value is a
    /// `SchemaMismatch`. A batch without the column gets one.
    pub fn conform_partition(&mut self, column: &str, date: NaiveDate) -> Result<()> {
        let Some(index) = self.column_index(column) else {
            let values = vec![Value::Date(date); self.num_rows];
            let position = self
                .column_index(PROCESSED_AT_COLUMN)
                .unwrap_or(self.columns.len());
            self.columns
                .insert(position, Column::new(column, DataType::Date, values));
            return Ok(());
        };

        let target = &mut self.columns[index];
        let mut conformed = Vec::with_capacity(target.values.len());
        for (row, value) in target.values.iter().enumerate() {
            match value {
                Value::Null => conformed.push(Value::Date(date)),
                Value::Date(d) if *d == date => conformed.push(Value::Date(*d)),
                other => {
                    return Err(IngestError::SchemaMismatch(format!(
                        "row {} has {} = '{}' outside partition {}",
                        row + 1,
                        target.name,
                        other,
                        date.format(DATE_FORMAT)
                    )))
                }
            }
        }
        target.values = conformed;
        target.data_type = DataType::Date;
        Ok(())
    }
}

/// One declared column of the source layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub nullable: bool,
    pub data_type: Option<DataType>,
}

impl ColumnSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            data_type: None,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            data_type: None,
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Parse `name` or `name:type`.
    pub fn parse(raw: &str, nullable: bool) -> std::result::Result<Self, String> {
        let (name, data_type) = match raw.split_once(':') {
            Some((name, ty)) => (name.trim(), Some(ty.parse::<DataType>()?)),
            None => (raw.trim(), None),
        };
        if name.is_empty() {
            return Err(format!("empty column name in '{}'", raw));
        }
        Ok(Self {
            name: name.to_string(),
            nullable,
            data_type,
        })
    }
}

/// Columns the source must provide, plus the partition column name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSchema {
    columns: Vec<ColumnSpec>,
    partition_column: String,
}

impl ExpectedSchema {
    pub fn new(partition_column: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            partition_column: partition_column.into(),
        }
    }

    pub fn with_column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn partition_column(&self) -> &str {
        &self.partition_column
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.nullable)
    }
}
