//! Document value to [`SqlValue`] coercion by declared column type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use super::runtime::runtime_token;
use super::DataValue;
use crate::core::schema::DbColumnSchema;
use crate::core::value::{SqlTypeCategory, SqlValue};

/// Coerce one scalar (or JSON document) for `column`.
///
/// Errors are plain messages; the caller adds the document and table.
pub(crate) fn coerce(column: &DbColumnSchema, value: &Value) -> Result<DataValue, String> {
    if let Value::String(s) = value {
        if let Some(name) = runtime_token(s) {
            return Ok(DataValue::Runtime(name.to_string()));
        }
    }
    if value.is_null() {
        return Ok(DataValue::Value(SqlValue::Null));
    }

    let category = column.category();
    if category == SqlTypeCategory::Json {
        let text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).map_err(|e| e.to_string())?,
        };
        return Ok(DataValue::Value(SqlValue::Json(text)));
    }
    if value.is_object() || value.is_array() {
        return Err(format!(
            "column '{}' ({}) does not accept a structured value",
            column.name, column.sql_type
        ));
    }

    let mismatch = || {
        format!(
            "value {} is not valid for column '{}' ({})",
            value, column.name, column.sql_type
        )
    };
    let text = scalar_text(value);

    let coerced = match category {
        SqlTypeCategory::Bool => match value {
            Value::Bool(b) => SqlValue::Bool(*b),
            _ => match text.trim().to_lowercase().as_str() {
                "true" | "1" => SqlValue::Bool(true),
                "false" | "0" => SqlValue::Bool(false),
                _ => return Err(mismatch()),
            },
        },
        SqlTypeCategory::Integer => match value {
            Value::Number(n) if n.is_i64() => SqlValue::I64(n.as_i64().unwrap_or_default()),
            Value::Bool(b) => SqlValue::I64(i64::from(*b)),
            _ => SqlValue::I64(text.trim().parse().map_err(|_| mismatch())?),
        },
        SqlTypeCategory::Decimal => {
            let parsed = match value {
                Value::Number(n) if n.is_f64() => n.as_f64().and_then(Decimal::from_f64),
                _ => Decimal::from_str(text.trim())
                    .or_else(|_| Decimal::from_scientific(text.trim()))
                    .ok(),
            };
            SqlValue::Decimal(parsed.ok_or_else(mismatch)?)
        }
        SqlTypeCategory::Float => match value {
            Value::Number(n) => SqlValue::F64(n.as_f64().ok_or_else(mismatch)?),
            _ => SqlValue::F64(text.trim().parse().map_err(|_| mismatch())?),
        },
        SqlTypeCategory::Uuid => SqlValue::Uuid(Uuid::parse_str(text.trim()).map_err(|_| mismatch())?),
        SqlTypeCategory::Date => SqlValue::Date(parse_date(&text).ok_or_else(mismatch)?),
        SqlTypeCategory::Time => SqlValue::Time(parse_time(&text).ok_or_else(mismatch)?),
        SqlTypeCategory::DateTime => SqlValue::DateTime(parse_datetime(&text).ok_or_else(mismatch)?),
        SqlTypeCategory::DateTimeOffset => {
            let trimmed = text.trim();
            let parsed = DateTime::parse_from_rfc3339(trimmed).ok().or_else(|| {
                parse_datetime(trimmed).map(|naive| naive.and_utc().fixed_offset())
            });
            SqlValue::DateTimeOffset(parsed.ok_or_else(mismatch)?)
        }
        SqlTypeCategory::Binary => return Err(mismatch()),
        SqlTypeCategory::Text | SqlTypeCategory::Other | SqlTypeCategory::Json => {
            SqlValue::Text(text)
        }
    };
    Ok(DataValue::Value(coerced))
}

/// Text form of a scalar document value.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let t = text.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let t = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| parse_date(t).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(sql_type: &str) -> DbColumnSchema {
        DbColumnSchema::new("C", sql_type)
    }

    fn value(column: &DbColumnSchema, v: Value) -> SqlValue {
        match coerce(column, &v).unwrap() {
            DataValue::Value(v) => v,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_boolean_accepts_numbers_and_strings() {
        let bit = col("bit");
        assert_eq!(value(&bit, json!(0)), SqlValue::Bool(false));
        assert_eq!(value(&bit, json!(1)), SqlValue::Bool(true));
        assert_eq!(value(&bit, json!("true")), SqlValue::Bool(true));
        assert_eq!(value(&bit, json!("false")), SqlValue::Bool(false));
        assert_eq!(value(&bit, json!(true)), SqlValue::Bool(true));
        assert!(coerce(&bit, &json!("maybe")).is_err());
    }

    #[test]
    fn test_json_column_keeps_serialized_document() {
        let mut column = col("nvarchar");
        column.is_json = true;
        assert_eq!(
            value(&column, json!({"a": [1, 2], "b": "x"})),
            SqlValue::Json(r#"{"a":[1,2],"b":"x"}"#.into())
        );
    }

    #[test]
    fn test_structured_value_on_plain_column_is_error() {
        let err = coerce(&col("nvarchar"), &json!({"a": 1})).unwrap_err();
        assert!(err.contains("structured"));
    }

    #[test]
    fn test_runtime_token_is_deferred() {
        assert_eq!(
            coerce(&col("int"), &json!("^(TenantNo)")).unwrap(),
            DataValue::Runtime("TenantNo".into())
        );
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(value(&col("int"), json!("42")), SqlValue::I64(42));
        assert_eq!(
            value(&col("decimal(10,2)"), json!("12.50")),
            SqlValue::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            value(&col("date"), json!("2024-02-29")),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(matches!(value(&col("datetime2"), json!("2024-02-29 10:30:00")), SqlValue::DateTime(_)));
        assert!(matches!(value(&col("datetime2"), json!("2024-02-29")), SqlValue::DateTime(_)));
        assert!(matches!(
            value(&col("datetimeoffset"), json!("2024-02-29T10:30:00+02:00")),
            SqlValue::DateTimeOffset(_)
        ));
        assert_eq!(value(&col("nvarchar"), json!(12)), SqlValue::Text("12".into()));
        assert!(coerce(&col("uniqueidentifier"), &json!("nope")).is_err());
        assert_eq!(value(&col("int"), Value::Null), SqlValue::Null);
    }
}
