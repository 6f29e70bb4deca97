//! Core data models for rows, schemas and query results.
//!
//! Cells are typed [`SqlValue`]s rather than dynamically typed objects. A
//! [`DataTable`] pairs an explicit [`TableSchema`] with rows whose width is
//! checked on every insertion, and [`ParamDef`] carries the (name, driver
//! type, length) triple used to bind a column.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::BatchSqlError;

/// A single-row write: column name to value.
pub type RowMap = BTreeMap<String, SqlValue>;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`
    Null,
    /// `BOOL` / `TINYINT(1)`
    Bool(bool),
    /// Any signed integer column
    Int(i64),
    /// `BIGINT UNSIGNED` and other unsigned columns
    UInt(u64),
    /// `FLOAT` / `DOUBLE`
    Float(f64),
    /// Character data, also used for `DECIMAL`
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// `DATE`
    Date(NaiveDate),
    /// `TIME`
    Time(NaiveTime),
    /// `DATETIME` / `TIMESTAMP`, without zone
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Whether this is SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value for literal-mode SQL.
    ///
    /// Everything except `NULL` is wrapped in single quotes. Text is inlined
    /// as-is: quoting or escaping embedded quotes is the caller's job.
    pub fn render_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                format!("X'{}'", hex)
            }
            other => format!("'{}'", other),
        }
    }
}

/// Plain textual form; `NULL` renders as the empty string.
impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::UInt(u) => write!(f, "{}", u),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

impl_from_value!(
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
);

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Driver-side column type used when binding a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    /// `BOOL`
    Bool,
    /// `TINYINT`, 8-bit signed
    TinyInt,
    /// `SMALLINT`, 16-bit signed
    SmallInt,
    /// `INT` / `MEDIUMINT`, 32-bit signed
    Int,
    /// `BIGINT`, 64-bit signed
    BigInt,
    /// `BIGINT UNSIGNED`
    UnsignedBigInt,
    /// `FLOAT`
    Float,
    /// `DOUBLE`
    Double,
    /// `DECIMAL` / `NUMERIC`, bound as text
    Decimal,
    /// `CHAR`
    Char,
    /// `VARCHAR`
    VarChar,
    /// `TEXT` and unrecognized types
    Text,
    /// `BLOB` / `BINARY` / `VARBINARY`
    Blob,
    /// `DATE`
    Date,
    /// `TIME`
    Time,
    /// `DATETIME`
    DateTime,
    /// `TIMESTAMP`
    Timestamp,
}

impl ColumnType {
    /// Maps a MySQL type name to a column type.
    ///
    /// Unknown names map to `Text`, which the server converts on insert.
    pub fn from_sql_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        let unsigned = lower.contains("unsigned");
        let base = lower
            .replace("unsigned", "")
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        match base.as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "tinyint" => ColumnType::TinyInt,
            "smallint" => ColumnType::SmallInt,
            "mediumint" | "int" | "integer" => ColumnType::Int,
            "bigint" if unsigned => ColumnType::UnsignedBigInt,
            "bigint" => ColumnType::BigInt,
            "float" => ColumnType::Float,
            "double" | "real" => ColumnType::Double,
            "decimal" | "numeric" => ColumnType::Decimal,
            "char" => ColumnType::Char,
            "varchar" => ColumnType::VarChar,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                ColumnType::Blob
            }
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }

    fn is_textual(self) -> bool {
        matches!(self, ColumnType::Char | ColumnType::VarChar | ColumnType::Text)
    }

    /// Converts `value` into the representation bound for this column type.
    ///
    /// # Errors
    /// Returns an input error when the value cannot be represented, or when
    /// text/binary exceeds `max_length`.
    pub fn coerce(self, value: &SqlValue, max_length: Option<u32>) -> crate::Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        let mismatch = || {
            BatchSqlError::input(format!("cannot convert value '{}' to {:?}", value, self))
        };

        let coerced = match self {
            t if t.is_textual() => match value {
                SqlValue::Text(s) => SqlValue::Text(s.clone()),
                other => SqlValue::Text(other.to_string()),
            },
            ColumnType::Bool => match value {
                SqlValue::Bool(b) => SqlValue::Bool(*b),
                SqlValue::Int(0) | SqlValue::UInt(0) => SqlValue::Bool(false),
                SqlValue::Int(1) | SqlValue::UInt(1) => SqlValue::Bool(true),
                SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" => SqlValue::Bool(true),
                    "0" | "false" => SqlValue::Bool(false),
                    _ => return Err(mismatch()),
                },
                _ => return Err(mismatch()),
            },
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int | ColumnType::BigInt => {
                let n = match value {
                    SqlValue::Int(i) => *i,
                    SqlValue::UInt(u) => i64::try_from(*u).map_err(|_| mismatch())?,
                    SqlValue::Bool(b) => i64::from(*b),
                    SqlValue::Float(x) if x.fract() == 0.0 && x.is_finite() => {
                        float_to_i64(*x).ok_or_else(|| {
                            BatchSqlError::input(format!(
                                "value {} out of range for {:?}",
                                x, self
                            ))
                        })?
                    }
                    SqlValue::Text(s) => s.trim().parse::<i64>().map_err(|_| mismatch())?,
                    _ => return Err(mismatch()),
                };
                let (min, max) = match self {
                    ColumnType::TinyInt => (i64::from(i8::MIN), i64::from(i8::MAX)),
                    ColumnType::SmallInt => (i64::from(i16::MIN), i64::from(i16::MAX)),
                    ColumnType::Int => (i64::from(i32::MIN), i64::from(i32::MAX)),
                    _ => (i64::MIN, i64::MAX),
                };
                if n < min || n > max {
                    return Err(BatchSqlError::input(format!(
                        "value {} out of range for {:?}",
                        n, self
                    )));
                }
                SqlValue::Int(n)
            }
            ColumnType::UnsignedBigInt => match value {
                SqlValue::UInt(u) => SqlValue::UInt(*u),
                SqlValue::Int(i) => SqlValue::UInt(u64::try_from(*i).map_err(|_| mismatch())?),
                SqlValue::Bool(b) => SqlValue::UInt(u64::from(*b)),
                SqlValue::Text(s) => {
                    SqlValue::UInt(s.trim().parse::<u64>().map_err(|_| mismatch())?)
                }
                _ => return Err(mismatch()),
            },
            ColumnType::Float | ColumnType::Double => match value {
                SqlValue::Float(x) => SqlValue::Float(*x),
                SqlValue::Int(i) => SqlValue::Float(*i as f64),
                SqlValue::UInt(u) => SqlValue::Float(*u as f64),
                SqlValue::Text(s) => {
                    SqlValue::Float(s.trim().parse::<f64>().map_err(|_| mismatch())?)
                }
                _ => return Err(mismatch()),
            },
            // Decimals travel as text so no precision is lost client-side.
            ColumnType::Decimal => match value {
                SqlValue::Int(_) | SqlValue::UInt(_) | SqlValue::Float(_) => {
                    SqlValue::Text(value.to_string())
                }
                SqlValue::Text(s) => {
                    let trimmed = s.trim();
                    trimmed.parse::<f64>().map_err(|_| mismatch())?;
                    SqlValue::Text(trimmed.to_string())
                }
                _ => return Err(mismatch()),
            },
            ColumnType::Blob => match value {
                SqlValue::Bytes(b) => SqlValue::Bytes(b.clone()),
                SqlValue::Text(s) => SqlValue::Bytes(s.as_bytes().to_vec()),
                _ => return Err(mismatch()),
            },
            ColumnType::Date => match value {
                SqlValue::Date(d) => SqlValue::Date(*d),
                SqlValue::DateTime(dt) => SqlValue::Date(dt.date()),
                SqlValue::Text(s) => SqlValue::Date(
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| mismatch())?,
                ),
                _ => return Err(mismatch()),
            },
            ColumnType::Time => match value {
                SqlValue::Time(t) => SqlValue::Time(*t),
                SqlValue::DateTime(dt) => SqlValue::Time(dt.time()),
                SqlValue::Text(s) => SqlValue::Time(
                    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").map_err(|_| mismatch())?,
                ),
                _ => return Err(mismatch()),
            },
            ColumnType::DateTime | ColumnType::Timestamp => match value {
                SqlValue::DateTime(dt) => SqlValue::DateTime(*dt),
                SqlValue::Date(d) => SqlValue::DateTime(d.and_time(NaiveTime::MIN)),
                SqlValue::Text(s) => SqlValue::DateTime(parse_datetime(s).ok_or_else(mismatch)?),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        };

        if let Some(limit) = max_length.filter(|l| *l > 0) {
            let length = match &coerced {
                SqlValue::Text(s) => s.chars().count(),
                SqlValue::Bytes(b) => b.len(),
                _ => 0,
            };
            if length > limit as usize {
                return Err(BatchSqlError::input(format!(
                    "value of length {} exceeds declared length {}",
                    length, limit
                )));
            }
        }

        Ok(coerced)
    }
}

/// Whole floats in `[-2^63, 2^63)` convert exactly; anything else would saturate.
#[allow(clippy::cast_possible_truncation)]
fn float_to_i64(x: f64) -> Option<i64> {
    const LOWER: f64 = -9_223_372_036_854_775_808.0;
    const UPPER: f64 = 9_223_372_036_854_775_808.0;
    (LOWER..UPPER).contains(&x).then_some(x as i64)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Binding definition for one column: name, driver type and maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDef {
    /// Column name, also the source column in a [`DataTable`]
    pub name: String,
    /// Type the cell is coerced to before binding
    pub column_type: ColumnType,
    /// Maximum length in characters (text) or bytes (binary); `None` is unbounded
    pub length: Option<u32>,
}

impl ParamDef {
    /// Creates an unbounded parameter definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
        }
    }

    /// Builder method to set the maximum length.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Coerces a cell into the value bound for this parameter.
    pub fn bind_value(&self, value: &SqlValue) -> crate::Result<SqlValue> {
        self.column_type
            .coerce(value, self.length)
            .map_err(|e| BatchSqlError::input(format!("column '{}': {}", self.name, e)))
    }
}

/// Declared column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
}

impl ColumnDef {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Target table name plus ordered column definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// Target table name
    pub name: String,
    /// Columns in row order
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Creates a schema, rejecting empty or duplicate column names.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BatchSqlError::InvalidArgument {
                name: "table name".to_string(),
            });
        }
        if columns.is_empty() {
            return Err(BatchSqlError::input(format!("table '{}' has no columns", name)));
        }
        ensure_unique(columns.iter().map(|c| c.name.as_str()))?;
        Ok(Self { name, columns })
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Parameter definitions derived from the declared columns.
    pub fn param_defs(&self) -> Vec<ParamDef> {
        self.columns
            .iter()
            .map(|c| ParamDef::new(c.name.clone(), c.column_type))
            .collect()
    }
}

/// Rejects the first name that appears twice.
pub(crate) fn ensure_unique<'a>(names: impl IntoIterator<Item = &'a str>) -> crate::Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BatchSqlError::input(format!(
                "column '{}' appears more than once",
                name
            )));
        }
    }
    Ok(())
}

/// Schema plus rows, every row exactly as wide as the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTable {
    /// Name and columns the rows conform to
    pub schema: TableSchema,
    rows: Vec<Vec<SqlValue>>,
}

impl DataTable {
    /// Creates an empty table for `schema`.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Creates a table and validates every row.
    pub fn with_rows(schema: TableSchema, rows: Vec<Vec<SqlValue>>) -> crate::Result<Self> {
        let mut table = Self::new(schema);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Appends a row.
    ///
    /// # Errors
    /// Returns an input error if the row width differs from the schema.
    pub fn push_row(&mut self, row: Vec<SqlValue>) -> crate::Result<()> {
        if row.len() != self.schema.columns.len() {
            return Err(BatchSqlError::input(format!(
                "row {} has {} values, table '{}' has {} columns",
                self.rows.len().saturating_add(1),
                row.len(),
                self.schema.name,
                self.schema.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rows returned by a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    /// Column labels in select-list order
    pub columns: Vec<String>,
    /// Decoded rows
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultTable {
    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Each row as a JSON object keyed by column name.
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| {
                        (
                            name.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}
