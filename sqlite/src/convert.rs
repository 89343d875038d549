//! Bidirectional conversion between entities and SQLite rows.
//!
//! Entities are any `serde` types that serialize to a JSON object. The codec
//! works on that object form ([`Record`]) and walks the config's declared
//! columns, never the record's own keys, so statement shape is fixed by the
//! [`EntityConfig`].
//!
//! # Special columns
//!
//! Most columns store their value as-is. Three data types differ between
//! memory and storage:
//!
//! - `date`: RFC 3339 string in memory, ISO-8601 UTC text with millisecond
//!   precision in storage (`2024-05-01T10:00:00.000Z`).
//! - `json`: any JSON value in memory, serialized JSON text in storage.
//! - `boolean`: `true`/`false` in memory, `1`/`0` in storage. Non-boolean
//!   values are stored by truthiness.
//!
//! `null` is stored as SQL `NULL` for every type and read back as `null`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use sqlcon_core::{ColumnMeta, DataType, EntityConfig, EntityId, IdentityPolicy};

use crate::error::{Result, SqlConError};
use crate::schema::quote_identifier;

/// An entity in its JSON object form, keyed by column name.
pub type Record = Map<String, Value>;

/// A raw row as read from storage, in select-list order.
pub type StoredRow = Vec<(String, SqlValue)>;

/// Column names, placeholders, and bound values of an INSERT or UPDATE.
///
/// All three sequences have the same length. Placeholders are `?` for
/// inserts and `"<column>"=?` for updates; field names are unquoted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Encoded {
    pub fields: Vec<String>,
    pub placeholders: Vec<String>,
    pub params: Vec<SqlValue>,
}

impl Encoded {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Converts an in-memory value into the value bound for a column.
///
/// # Errors
///
/// Returns [`SqlConError::ConversionError`] if the value cannot be stored in
/// the column, e.g. an unparseable date or a JSON object in a text column.
///
/// # Examples
///
/// ```
/// use rusqlite::types::Value as SqlValue;
/// use serde_json::json;
/// use sqlcon_core::{ColumnMeta, DataType};
/// use sqlcon_sqlite::to_storage;
///
/// let date = ColumnMeta::new(DataType::Date);
/// assert_eq!(
///     to_storage(&date, &json!("2024-05-01T12:00:00+02:00")).unwrap(),
///     SqlValue::Text("2024-05-01T10:00:00.000Z".into())
/// );
///
/// let flag = ColumnMeta::new(DataType::Boolean);
/// assert_eq!(to_storage(&flag, &json!(true)).unwrap(), SqlValue::Integer(1));
/// ```
pub fn to_storage(meta: &ColumnMeta, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match meta.data_type {
        DataType::Date => date_to_storage(value),
        DataType::Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
        DataType::Boolean => Ok(SqlValue::Integer(i64::from(is_truthy(value)))),
        DataType::Blob => blob_to_storage(value),
        _ => plain_to_storage(value),
    }
}

/// Converts a stored column value back into its in-memory form.
///
/// # Errors
///
/// Returns [`SqlConError::ConversionError`] if a date, JSON, or boolean
/// column holds something that cannot be read as one, and
/// [`SqlConError::JsonError`] for malformed JSON text.
pub fn from_storage(meta: &ColumnMeta, stored: SqlValue) -> Result<Value> {
    match (meta.data_type, stored) {
        (_, SqlValue::Null) => Ok(Value::Null),
        (DataType::Date, SqlValue::Text(text)) => {
            Ok(Value::String(format_date(parse_date(&text)?)))
        }
        (DataType::Date, SqlValue::Integer(millis)) => Ok(Value::String(format_date(
            DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                SqlConError::ConversionError(format!("timestamp out of range: {millis}"))
            })?,
        ))),
        (DataType::Json, SqlValue::Text(text)) => Ok(serde_json::from_str(&text)?),
        (DataType::Json, SqlValue::Blob(bytes)) => Ok(serde_json::from_slice(&bytes)?),
        (DataType::Boolean, SqlValue::Integer(i)) => Ok(Value::Bool(i != 0)),
        (DataType::Boolean, SqlValue::Real(r)) => Ok(Value::Bool(r != 0.0)),
        (data_type @ (DataType::Date | DataType::Json | DataType::Boolean), other) => {
            Err(SqlConError::ConversionError(format!(
                "cannot read {data_type} column from {}",
                stored_kind(&other)
            )))
        }
        (_, other) => Ok(plain_from_storage(other)),
    }
}

/// Serializes an entity into its [`Record`] form.
///
/// # Errors
///
/// Returns [`SqlConError::ConversionError`] if the entity does not serialize
/// to a JSON object.
pub fn to_record<T: Serialize + ?Sized>(entity: &T) -> Result<Record> {
    match serde_json::to_value(entity)? {
        Value::Object(record) => Ok(record),
        other => Err(SqlConError::ConversionError(format!(
            "entity must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Deserializes a decoded [`Record`] into a typed entity.
pub fn from_record<E: DeserializeOwned>(record: Record) -> Result<E> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Encodes a record into the columns, placeholders, and values of an INSERT
/// (`update == false`) or the assignments of an UPDATE (`update == true`).
///
/// Columns absent from the record are skipped. Updates never assign the
/// primary key. Inserts skip a `null` identity under the surrogate policy
/// and `null` serial columns, leaving them to the storage engine.
///
/// # Errors
///
/// Returns [`SqlConError::MetadataMissing`] if the record has a field the
/// config does not declare.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sqlcon_core::{ColumnMeta, DataType, EntityConfig};
/// use sqlcon_sqlite::encode;
///
/// let config = EntityConfig::new("Person")
///     .with_column("e_id", ColumnMeta::serial())
///     .with_column("name", ColumnMeta::new(DataType::Text))
///     .with_column("age", ColumnMeta::new(DataType::Int));
/// let record = json!({"age": 30, "name": "Ann", "e_id": 4});
///
/// let insert = encode(record.as_object().unwrap(), &config, false).unwrap();
/// assert_eq!(insert.fields, ["e_id", "name", "age"]);
/// assert_eq!(insert.placeholders, ["?", "?", "?"]);
///
/// let update = encode(record.as_object().unwrap(), &config, true).unwrap();
/// assert_eq!(update.placeholders, [r#""name"=?"#, r#""age"=?"#]);
/// ```
pub fn encode(record: &Record, config: &EntityConfig, update: bool) -> Result<Encoded> {
    if let Some(field) = record.keys().find(|field| config.meta(field).is_none()) {
        return Err(SqlConError::MetadataMissing {
            entity: config.name.clone(),
            field: field.clone(),
        });
    }

    let mut encoded = Encoded::default();
    for (name, meta) in &config.columns {
        let Some(value) = record.get(name) else {
            continue;
        };
        if update && (meta.primary_key || config.is_key(name)) {
            continue;
        }
        if !update && value.is_null() && is_generated(config, name, meta) {
            continue;
        }

        encoded.params.push(to_storage(meta, value)?);
        encoded.placeholders.push(if update {
            format!("{}=?", quote_identifier(name))
        } else {
            "?".to_string()
        });
        encoded.fields.push(name.clone());
    }

    if encoded.fields.len() != encoded.placeholders.len()
        || encoded.placeholders.len() != encoded.params.len()
    {
        return Err(SqlConError::ConsistencyViolation(format!(
            "{} fields, {} placeholders, {} params",
            encoded.fields.len(),
            encoded.placeholders.len(),
            encoded.params.len()
        )));
    }
    Ok(encoded)
}

/// Decodes a stored row into a [`Record`], converting special columns.
///
/// Columns without metadata pass through with their natural JSON form.
pub fn decode(config: &EntityConfig, row: StoredRow) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());
    for (name, stored) in row {
        let value = match config.meta(&name) {
            Some(meta) => from_storage(meta, stored)?,
            None => plain_from_storage(stored),
        };
        record.insert(name, value);
    }
    Ok(record)
}

/// Decodes rows in order.
pub fn decode_many(config: &EntityConfig, rows: Vec<StoredRow>) -> Result<Vec<Record>> {
    rows.into_iter().map(|row| decode(config, row)).collect()
}

/// Reads the named columns of a result row.
pub(crate) fn read_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<StoredRow> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| Ok((name.clone(), row.get::<_, SqlValue>(idx)?)))
        .collect()
}

/// Binds an identity value, checking it against the identity policy.
pub(crate) fn id_to_storage(config: &EntityConfig, id: &EntityId) -> Result<SqlValue> {
    match (config.identity, id) {
        (IdentityPolicy::Surrogate, EntityId::Int(id)) => Ok(SqlValue::Integer(*id)),
        (IdentityPolicy::External, EntityId::Text(id)) => Ok(SqlValue::Text(id.clone())),
        (expected, found) => Err(SqlConError::IdentityMismatch {
            entity: config.name.clone(),
            expected,
            found: found.to_string(),
        }),
    }
}

/// Reads the identity value carried by a record, if any.
pub(crate) fn record_identity(config: &EntityConfig, record: &Record) -> Option<EntityId> {
    match record.get(&config.key)? {
        Value::Number(n) => n.as_i64().map(EntityId::Int),
        Value::String(s) => Some(EntityId::Text(s.clone())),
        _ => None,
    }
}

/// Converts a value with no special handling.
pub(crate) fn plain_to_storage(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(SqlValue::Integer(i)),
            (None, Some(f)) => Ok(SqlValue::Real(f)),
            (None, None) => Err(SqlConError::ConversionError(format!(
                "number out of range: {n}"
            ))),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(SqlConError::ConversionError(format!(
            "cannot store {} in a scalar column",
            json_kind(other)
        ))),
    }
}

fn plain_from_storage(stored: SqlValue) -> Value {
    match stored {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
    }
}

fn is_generated(config: &EntityConfig, name: &str, meta: &ColumnMeta) -> bool {
    meta.data_type == DataType::Serial
        || (config.is_key(name) && config.identity == IdentityPolicy::Surrogate)
}

fn date_to_storage(value: &Value) -> Result<SqlValue> {
    let date = match value {
        Value::String(text) => parse_date(text)?,
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| SqlConError::ConversionError(format!("invalid timestamp: {n}")))?,
        other => {
            return Err(SqlConError::ConversionError(format!(
                "cannot store {} in a date column",
                json_kind(other)
            )));
        }
    };
    Ok(SqlValue::Text(format_date(date)))
}

fn blob_to_storage(value: &Value) -> Result<SqlValue> {
    let Value::Array(items) = value else {
        return Err(SqlConError::ConversionError(format!(
            "cannot store {} in a blob column",
            json_kind(value)
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| SqlConError::ConversionError(format!("not a byte: {item}")))
        })
        .collect::<Result<Vec<u8>>>()
        .map(SqlValue::Blob)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.with_timezone(&Utc));
    }
    // SQLite's own datetime() format, taken as UTC
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| SqlConError::ConversionError(format!("invalid date '{text}': {e}")))
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn stored_kind(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "NULL",
        SqlValue::Integer(_) => "INTEGER",
        SqlValue::Real(_) => "REAL",
        SqlValue::Text(_) => "TEXT",
        SqlValue::Blob(_) => "BLOB",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn profile() -> EntityConfig {
        EntityConfig::new("Profile")
            .with_column("e_id", ColumnMeta::serial())
            .with_column("name", ColumnMeta::new(DataType::String))
            .with_column("score", ColumnMeta::new(DataType::Double).nullable())
            .with_column("born", ColumnMeta::new(DataType::Date).nullable())
            .with_column("settings", ColumnMeta::new(DataType::Json).nullable())
            .with_column("active", ColumnMeta::new(DataType::Boolean))
            .with_column("avatar", ColumnMeta::new(DataType::Blob).nullable())
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        e_id: Option<i64>,
        name: String,
        score: Option<f64>,
        born: Option<DateTime<Utc>>,
        settings: Option<Value>,
        active: bool,
        avatar: Option<Vec<u8>>,
    }

    fn sample() -> Profile {
        Profile {
            e_id: Some(9),
            name: "Ann".into(),
            score: Some(4.5),
            born: Some(Utc.with_ymd_and_hms(1990, 3, 14, 15, 9, 26).unwrap()),
            settings: Some(json!({"theme": "dark", "sizes": [1, 2]})),
            active: true,
            avatar: Some(vec![0, 127, 255]),
        }
    }

    /// Stores a record the way an INSERT would and reads it back.
    fn store_and_load(config: &EntityConfig, record: &Record) -> Record {
        let encoded = encode(record, config, false).unwrap();
        let row: StoredRow = encoded.fields.into_iter().zip(encoded.params).collect();
        decode(config, row).unwrap()
    }

    #[test]
    fn test_date_to_storage_normalizes_to_utc_millis() {
        let meta = ColumnMeta::new(DataType::Date);
        assert_eq!(
            to_storage(&meta, &json!("2024-01-02T03:04:05Z")).unwrap(),
            SqlValue::Text("2024-01-02T03:04:05.000Z".into())
        );
        assert_eq!(
            to_storage(&meta, &json!(0)).unwrap(),
            SqlValue::Text("1970-01-01T00:00:00.000Z".into())
        );
        assert_eq!(to_storage(&meta, &Value::Null).unwrap(), SqlValue::Null);
        assert!(to_storage(&meta, &json!("yesterday")).is_err());
    }

    #[test]
    fn test_date_from_storage() {
        let meta = ColumnMeta::new(DataType::Date);
        assert_eq!(
            from_storage(&meta, SqlValue::Text("2024-01-02 03:04:05".into())).unwrap(),
            json!("2024-01-02T03:04:05.000Z")
        );
        assert_eq!(from_storage(&meta, SqlValue::Null).unwrap(), Value::Null);
        assert!(from_storage(&meta, SqlValue::Blob(vec![1])).is_err());
    }

    #[test]
    fn test_json_conversion() {
        let meta = ColumnMeta::new(DataType::Json);
        let value = json!({"a": [1, 2, {"b": null}]});
        let stored = to_storage(&meta, &value).unwrap();
        assert_eq!(stored, SqlValue::Text(r#"{"a":[1,2,{"b":null}]}"#.into()));
        assert_eq!(from_storage(&meta, stored).unwrap(), value);

        // Scalars are JSON too
        let stored = to_storage(&meta, &json!("plain")).unwrap();
        assert_eq!(stored, SqlValue::Text("\"plain\"".into()));
        assert!(matches!(
            from_storage(&meta, SqlValue::Text("{broken".into())),
            Err(SqlConError::JsonError(_))
        ));
    }

    #[test]
    fn test_boolean_conversion_is_symmetric() {
        let meta = ColumnMeta::new(DataType::Boolean);
        assert_eq!(to_storage(&meta, &json!(false)).unwrap(), SqlValue::Integer(0));
        assert_eq!(to_storage(&meta, &json!(2)).unwrap(), SqlValue::Integer(1));
        assert_eq!(to_storage(&meta, &json!("")).unwrap(), SqlValue::Integer(0));
        assert_eq!(from_storage(&meta, SqlValue::Integer(1)).unwrap(), json!(true));
        assert_eq!(from_storage(&meta, SqlValue::Integer(0)).unwrap(), json!(false));
    }

    #[test]
    fn test_plain_columns_pass_through() {
        let meta = ColumnMeta::new(DataType::Text);
        assert_eq!(to_storage(&meta, &json!("x")).unwrap(), SqlValue::Text("x".into()));
        assert!(to_storage(&meta, &json!({"nested": 1})).is_err());

        let meta = ColumnMeta::new(DataType::Float);
        assert_eq!(to_storage(&meta, &json!(1.25)).unwrap(), SqlValue::Real(1.25));
        assert_eq!(from_storage(&meta, SqlValue::Real(1.25)).unwrap(), json!(1.25));
    }

    #[test]
    fn test_blob_conversion() {
        let meta = ColumnMeta::new(DataType::Blob);
        assert_eq!(
            to_storage(&meta, &json!([1, 2, 255])).unwrap(),
            SqlValue::Blob(vec![1, 2, 255])
        );
        assert!(to_storage(&meta, &json!([256])).is_err());
        assert_eq!(
            from_storage(&meta, SqlValue::Blob(vec![7, 8])).unwrap(),
            json!([7, 8])
        );
    }

    #[test]
    fn test_typed_entity_round_trip() {
        let config = profile();
        let original = sample();
        let loaded = store_and_load(&config, &to_record(&original).unwrap());
        assert_eq!(from_record::<Profile>(loaded).unwrap(), original);
    }

    #[test]
    fn test_round_trip_with_nulls() {
        let config = profile();
        let original = Profile {
            score: None,
            born: None,
            settings: None,
            avatar: None,
            active: false,
            ..sample()
        };
        let loaded = store_and_load(&config, &to_record(&original).unwrap());
        assert_eq!(from_record::<Profile>(loaded).unwrap(), original);
    }

    #[test]
    fn test_encode_insert_skips_generated_identity() {
        let config = profile();
        let record = to_record(&Profile { e_id: None, ..sample() }).unwrap();
        let encoded = encode(&record, &config, false).unwrap();
        assert_eq!(
            encoded.fields,
            ["name", "score", "born", "settings", "active", "avatar"]
        );
        assert!(encoded.placeholders.iter().all(|p| p == "?"));
        assert_eq!(encoded.params.len(), 6);
    }

    #[test]
    fn test_encode_follows_config_order() {
        let config = profile();
        let record = json!({"active": true, "name": "Bo"});
        let encoded = encode(record.as_object().unwrap(), &config, false).unwrap();
        assert_eq!(encoded.fields, ["name", "active"]);
        assert_eq!(
            encoded.params,
            vec![SqlValue::Text("Bo".into()), SqlValue::Integer(1)]
        );
    }

    #[test]
    fn test_encode_update_skips_primary_key() {
        let config = profile();
        let record = json!({"e_id": 3, "name": "Cy", "score": null});
        let encoded = encode(record.as_object().unwrap(), &config, true).unwrap();
        assert_eq!(encoded.fields, ["name", "score"]);
        assert_eq!(encoded.placeholders, [r#""name"=?"#, r#""score"=?"#]);
        assert_eq!(
            encoded.params,
            vec![SqlValue::Text("Cy".into()), SqlValue::Null]
        );
    }

    #[test]
    fn test_encode_missing_meta() {
        let config = profile();
        let record = json!({"name": "Ann", "nickname": "A"});
        match encode(record.as_object().unwrap(), &config, false) {
            Err(SqlConError::MetadataMissing { entity, field }) => {
                assert_eq!(entity, "Profile");
                assert_eq!(field, "nickname");
            }
            other => panic!("expected MetadataMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_to_record_requires_object() {
        assert!(matches!(
            to_record(&vec![1, 2]),
            Err(SqlConError::ConversionError(_))
        ));
    }

    #[test]
    fn test_decode_many_preserves_order() {
        let config = profile();
        let rows: Vec<StoredRow> = (1..=3)
            .map(|i| {
                vec![
                    ("e_id".to_string(), SqlValue::Integer(i)),
                    ("active".to_string(), SqlValue::Integer(i % 2)),
                ]
            })
            .collect();
        let records = decode_many(&config, rows).unwrap();
        let ids: Vec<&Value> = records.iter().map(|r| &r["e_id"]).collect();
        assert_eq!(ids, [&json!(1), &json!(2), &json!(3)]);
        assert_eq!(records[1]["active"], json!(false));
    }

    #[test]
    fn test_decode_passes_unknown_columns() {
        let config = profile();
        let row = vec![("extra".to_string(), SqlValue::Text("x".into()))];
        assert_eq!(decode(&config, row).unwrap()["extra"], json!("x"));
    }

    #[test]
    fn test_id_to_storage_checks_policy() {
        let config = profile();
        assert_eq!(
            id_to_storage(&config, &EntityId::Int(5)).unwrap(),
            SqlValue::Integer(5)
        );
        assert!(matches!(
            id_to_storage(&config, &EntityId::from("abc")),
            Err(SqlConError::IdentityMismatch { .. })
        ));
    }
}
