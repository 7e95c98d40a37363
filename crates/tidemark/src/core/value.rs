//! SQL value types produced by seed-data coercion.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A typed value destined for a SQL literal.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    /// Serialized JSON document text.
    Json(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Plain-text rendering, used when propagating keys and for diagnostics.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(v) => Some(v.to_string()),
            SqlValue::I64(v) => Some(v.to_string()),
            SqlValue::F64(v) => Some(v.to_string()),
            SqlValue::Decimal(v) => Some(v.to_string()),
            SqlValue::Text(v) | SqlValue::Json(v) => Some(v.clone()),
            SqlValue::Uuid(v) => Some(v.to_string()),
            SqlValue::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => Some(v.format("%H:%M:%S%.f").to_string()),
            SqlValue::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            SqlValue::DateTimeOffset(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// Broad family of a declared column type, used to pick a coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTypeCategory {
    Bool,
    Integer,
    Decimal,
    Float,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Json,
    Text,
    Binary,
    Other,
}

impl SqlTypeCategory {
    /// Categorize a PostgreSQL or SQL Server type name.
    pub fn of(sql_type: &str) -> Self {
        let t = sql_type.to_lowercase();
        let base = t.split('(').next().unwrap_or("").trim();
        match base {
            "bit" | "bool" | "boolean" => SqlTypeCategory::Bool,
            "tinyint" | "smallint" | "int" | "integer" | "bigint" | "int2" | "int4" | "int8"
            | "serial" | "bigserial" | "smallserial" => SqlTypeCategory::Integer,
            "decimal" | "numeric" | "money" | "smallmoney" => SqlTypeCategory::Decimal,
            "real" | "float" | "float4" | "float8" | "double precision" => SqlTypeCategory::Float,
            "uuid" | "uniqueidentifier" => SqlTypeCategory::Uuid,
            "date" => SqlTypeCategory::Date,
            "time" | "time without time zone" => SqlTypeCategory::Time,
            "datetime" | "datetime2" | "smalldatetime" | "timestamp"
            | "timestamp without time zone" => SqlTypeCategory::DateTime,
            "datetimeoffset" | "timestamptz" | "timestamp with time zone" => {
                SqlTypeCategory::DateTimeOffset
            }
            "json" | "jsonb" => SqlTypeCategory::Json,
            "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "character"
            | "character varying" | "citext" | "xml" | "sysname" => SqlTypeCategory::Text,
            "binary" | "varbinary" | "image" | "bytea" | "rowversion" => SqlTypeCategory::Binary,
            _ => SqlTypeCategory::Other,
        }
    }
}
