//! Row decoding into JSON.
//!
//! Column values are decoded in two steps: [`categorize_type`] maps the
//! driver's type name to a [`TypeCategory`], then the row implementation
//! tries the Rust types that category can hold, in order, until one decodes.

use crate::models::{ColumnMetadata, DatabaseType};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Temporal,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked before floats since "numeric" would otherwise be ambiguous
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is stored as a float
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("date") || lower.contains("time") {
        return TypeCategory::Temporal;
    }

    TypeCategory::Text
}

/// DECIMAL/NUMERIC read as its exact textual representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary column values are returned base64 encoded.
pub fn encode_binary(bytes: Vec<u8>) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn decimal_string(v: RawDecimal) -> JsonValue {
    JsonValue::String(v.0)
}

fn display_string<T: ToString>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

/// JSON stored as text is returned parsed when it parses.
fn json_text(v: String) -> JsonValue {
    serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

/// Try each candidate type in order, converting the first that decodes.
/// SQL NULL and undecodable values both produce JSON null.
macro_rules! decode_first {
    ($row:expr, $idx:expr, $($ty:ty => $convert:expr),+ $(,)?) => {{
        let mut value = JsonValue::Null;
        $(
            if value.is_null() {
                if let Ok(Some(v)) = $row.try_get::<Option<$ty>, _>($idx) {
                    value = $convert(v);
                }
            }
        )+
        value
    }};
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, |$r:ident, $idx:ident, $category:ident| $decode:block) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .map(|col| {
                        let $r = self;
                        let $idx = col.ordinal();
                        let $category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decode)
                    })
                    .collect()
            }

            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, |row, idx, category| {
    match category {
        TypeCategory::Integer => decode_first!(row, idx,
            i64 => JsonValue::from,
            u64 => JsonValue::from,
        ),
        TypeCategory::Float => decode_first!(row, idx,
            f64 => JsonValue::from,
            f32 => JsonValue::from,
        ),
        TypeCategory::Decimal => decode_first!(row, idx, RawDecimal => decimal_string),
        TypeCategory::Boolean => decode_first!(row, idx,
            bool => JsonValue::from,
            i64 => JsonValue::from,
        ),
        TypeCategory::Binary => decode_first!(row, idx, Vec<u8> => encode_binary),
        TypeCategory::Json => decode_first!(row, idx,
            JsonValue => JsonValue::from,
            String => json_text,
        ),
        TypeCategory::Temporal => decode_first!(row, idx,
            chrono::NaiveDateTime => display_string,
            chrono::DateTime<chrono::Utc> => display_string,
            chrono::NaiveDate => display_string,
            chrono::NaiveTime => display_string,
            String => JsonValue::from,
        ),
        TypeCategory::Text => decode_first!(row, idx,
            String => JsonValue::from,
            Vec<u8> => encode_binary,
        ),
    }
});

impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, |row, idx, category| {
    match category {
        TypeCategory::Integer => decode_first!(row, idx,
            i64 => JsonValue::from,
            i32 => JsonValue::from,
            i16 => JsonValue::from,
        ),
        TypeCategory::Float => decode_first!(row, idx,
            f64 => JsonValue::from,
            f32 => JsonValue::from,
        ),
        TypeCategory::Decimal => decode_first!(row, idx, RawDecimal => decimal_string),
        TypeCategory::Boolean => decode_first!(row, idx, bool => JsonValue::from),
        TypeCategory::Binary => decode_first!(row, idx, Vec<u8> => encode_binary),
        TypeCategory::Json => decode_first!(row, idx, JsonValue => JsonValue::from),
        TypeCategory::Temporal => decode_first!(row, idx,
            chrono::NaiveDateTime => display_string,
            chrono::DateTime<chrono::Utc> => display_string,
            chrono::NaiveDate => display_string,
            chrono::NaiveTime => display_string,
        ),
        TypeCategory::Text => decode_first!(row, idx, String => JsonValue::from),
    }
});

// SQLite values carry their storage class rather than the declared type, so
// every category falls back to the looser representations.
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, |row, idx, category| {
    match category {
        TypeCategory::Integer | TypeCategory::Boolean => decode_first!(row, idx,
            i64 => JsonValue::from,
            f64 => JsonValue::from,
            String => JsonValue::from,
        ),
        TypeCategory::Float | TypeCategory::Decimal => decode_first!(row, idx,
            f64 => JsonValue::from,
            String => JsonValue::from,
        ),
        TypeCategory::Binary => decode_first!(row, idx, Vec<u8> => encode_binary),
        TypeCategory::Json => decode_first!(row, idx, String => json_text),
        TypeCategory::Temporal => decode_first!(row, idx,
            String => JsonValue::from,
            i64 => JsonValue::from,
        ),
        TypeCategory::Text => decode_first!(row, idx,
            String => JsonValue::from,
            i64 => JsonValue::from,
            f64 => JsonValue::from,
            Vec<u8> => encode_binary,
        ),
    }
});
