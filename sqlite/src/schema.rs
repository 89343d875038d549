//! SQL schema generation from entity metadata.
//!
//! Resolves logical [`DataType`] tags to SQLite column types and compiles
//! each [`ColumnMeta`] into a column definition for `CREATE TABLE`. Every
//! name spliced into SQL text passes [`validate_identifier`] first and is
//! then double-quoted, so keywords such as `order` or `group` work as column
//! and table names. Values are never spliced, only bound as parameters.
//!
//! # Column rules
//!
//! In priority order:
//!
//! 1. The identity column becomes `"<name>" INTEGER PRIMARY KEY` (surrogate
//!    policy, plus `AUTOINCREMENT` when declared serial) or
//!    `"<name>" TEXT PRIMARY KEY` (external policy).
//! 2. Any other serial column becomes an auto-incrementing integer key.
//! 3. Everything else resolves its native type and appends `NOT NULL`,
//!    `PRIMARY KEY`, `UNIQUE`, and same-schema `REFERENCES` fragments.

use serde_json::{Map, Value};
use sqlcon_core::{ColumnMeta, DataType, EntityConfig, IdentityPolicy, validate_entity_config};

use crate::error::{Result, SqlConError};

/// Name of the reserved key/value table.
pub const CONFIG_TABLE: &str = "config";

/// Validates that a name is a plain SQL identifier.
///
/// Accepts ASCII letters, digits, and underscores, not starting with a digit.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SqlConError::InvalidIdentifier(ident.to_string()))
    }
}

/// Validates every identifier of an entity config and its structure.
///
/// # Errors
///
/// Returns [`SqlConError::InvalidIdentifier`] for a table, column, or
/// reference name that is not a plain identifier, and
/// [`SqlConError::InvalidEntityConfig`] for structural problems.
pub fn ensure_valid(config: &EntityConfig) -> Result<()> {
    validate_identifier(&config.name)?;
    validate_identifier(&config.key)?;
    for (name, meta) in &config.columns {
        validate_identifier(name)?;
        if let Some(fk) = &meta.foreign_key {
            validate_identifier(&fk.relation)?;
            validate_identifier(&fk.key)?;
        }
    }

    let errors = validate_entity_config(config);
    if errors.is_empty() {
        return Ok(());
    }
    Err(SqlConError::InvalidEntityConfig {
        entity: config.name.clone(),
        reason: errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    })
}

/// Quotes a name that already passed [`validate_identifier`].
///
/// ```
/// use sqlcon_sqlite::quote_identifier;
///
/// assert_eq!(quote_identifier("order"), "\"order\"");
/// ```
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{ident}\"")
}

/// Returns `"<schema>"."<table>"` for names that already passed validation.
pub(crate) fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Resolves a logical data type to its SQLite column type keyword.
///
/// # Errors
///
/// Returns [`SqlConError::TypeNotSupported`] for [`DataType::Serial`], which
/// only the column compiler knows how to emit.
///
/// # Examples
///
/// ```
/// use sqlcon_core::DataType;
/// use sqlcon_sqlite::resolve_db_type;
///
/// assert_eq!(resolve_db_type(DataType::Boolean).unwrap(), "INTEGER");
/// assert_eq!(resolve_db_type(DataType::Date).unwrap(), "TIMESTAMP");
/// assert!(resolve_db_type(DataType::Serial).is_err());
/// ```
pub fn resolve_db_type(data_type: DataType) -> Result<&'static str> {
    match data_type {
        DataType::Int => Ok("INTEGER"),
        DataType::Double | DataType::Float => Ok("REAL"),
        DataType::Blob => Ok("BLOB"),
        DataType::String | DataType::Uuid | DataType::Text => Ok("TEXT"),
        DataType::Boolean => Ok("INTEGER"),
        DataType::Date => Ok("TIMESTAMP"),
        DataType::Json => Ok("TEXT"),
        DataType::Serial => Err(SqlConError::TypeNotSupported(data_type.to_string())),
    }
}

/// Compiles one column of `config` into its `CREATE TABLE` fragment.
///
/// `schema` is the schema the table is created in; foreign keys into any
/// other schema are left out of the fragment.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{ColumnMeta, DataType, EntityConfig, ForeignKey};
/// use sqlcon_sqlite::compile_column;
///
/// let config = EntityConfig::new("Pet").with_column("e_id", ColumnMeta::serial());
/// let owner = ColumnMeta::new(DataType::Int).references(ForeignKey::new("Person", "e_id"));
///
/// assert_eq!(
///     compile_column(&config, "main", "owner", &owner).unwrap(),
///     r#""owner" INTEGER NOT NULL REFERENCES "Person"("e_id")"#
/// );
/// ```
pub fn compile_column(
    config: &EntityConfig,
    schema: &str,
    name: &str,
    meta: &ColumnMeta,
) -> Result<String> {
    let quoted = quote_identifier(name);
    if config.is_key(name) {
        return Ok(match config.identity {
            IdentityPolicy::Surrogate if meta.data_type == DataType::Serial => {
                format!("{quoted} INTEGER PRIMARY KEY AUTOINCREMENT")
            }
            IdentityPolicy::Surrogate => format!("{quoted} INTEGER PRIMARY KEY"),
            IdentityPolicy::External => format!("{quoted} TEXT PRIMARY KEY"),
        });
    }

    // SQLite only accepts AUTOINCREMENT directly on an INTEGER PRIMARY KEY
    if meta.data_type == DataType::Serial {
        return Ok(format!("{quoted} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"));
    }

    let mut fragment = format!("{quoted} {}", resolve_db_type(meta.data_type)?);
    if meta.primary_key {
        fragment.push_str(" NOT NULL PRIMARY KEY");
    } else if !meta.can_be_null {
        fragment.push_str(" NOT NULL");
    }
    if meta.unique {
        fragment.push_str(" UNIQUE");
    }
    if let Some(fk) = meta.foreign_key.as_ref().filter(|fk| !fk.crosses_schema(schema)) {
        fragment.push_str(&format!(
            " REFERENCES {}({})",
            quote_identifier(&fk.relation),
            quote_identifier(&fk.key)
        ));
    }
    Ok(fragment)
}

/// Generates the `CREATE TABLE` statement for an entity.
///
/// Uses `CREATE TABLE IF NOT EXISTS` so initializing an entity twice is
/// harmless.
///
/// # Errors
///
/// Returns an error if the config fails [`ensure_valid`] or a column type
/// cannot be resolved.
pub fn create_table_sql(schema: &str, config: &EntityConfig) -> Result<String> {
    validate_identifier(schema)?;
    ensure_valid(config)?;

    let columns = config
        .columns
        .iter()
        .map(|(name, meta)| compile_column(config, schema, name, meta))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        qualified(schema, &config.name),
        columns.join(",\n    ")
    ))
}

/// Compiles a column from the runtime kind of a sample value.
///
/// Compatibility path for entities without column metadata. Numbers become
/// `INTEGER NOT NULL`, RFC 3339 timestamp strings `TIMESTAMP`, other strings
/// `TEXT NOT NULL`. The identity column follows `identity` as in
/// [`compile_column`].
///
/// # Errors
///
/// Returns [`SqlConError::TypeNotSupported`] for any other value kind.
pub fn compile_inferred_column(
    key: &str,
    identity: IdentityPolicy,
    name: &str,
    value: &Value,
) -> Result<String> {
    validate_identifier(name)?;
    let quoted = quote_identifier(name);
    if name == key {
        return Ok(match identity {
            IdentityPolicy::Surrogate => format!("{quoted} INTEGER PRIMARY KEY"),
            IdentityPolicy::External => format!("{quoted} TEXT PRIMARY KEY"),
        });
    }
    match value {
        Value::Number(_) => Ok(format!("{quoted} INTEGER NOT NULL")),
        Value::String(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => {
            Ok(format!("{quoted} TIMESTAMP"))
        }
        Value::String(_) => Ok(format!("{quoted} TEXT NOT NULL")),
        other => Err(SqlConError::TypeNotSupported(format!(
            "{name}: {}",
            value_kind(other)
        ))),
    }
}

/// Generates a `CREATE TABLE` statement from a sample record's value kinds.
///
/// See [`compile_inferred_column`] for the inference rules.
pub fn create_table_sql_inferred(
    schema: &str,
    table: &str,
    key: &str,
    identity: IdentityPolicy,
    sample: &Map<String, Value>,
) -> Result<String> {
    validate_identifier(schema)?;
    validate_identifier(table)?;

    let columns = sample
        .iter()
        .map(|(name, value)| compile_inferred_column(key, identity, name, value))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        qualified(schema, table),
        columns.join(",\n    ")
    ))
}

/// Generates the reserved config table definition.
pub(crate) fn config_table_sql(schema: &str) -> String {
    format!(
        "CREATE TABLE {} (c_key TEXT NOT NULL, c_value TEXT, PRIMARY KEY (c_key))",
        qualified(schema, CONFIG_TABLE)
    )
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlcon_core::ForeignKey;

    fn person() -> EntityConfig {
        EntityConfig::new("Person")
            .with_key("id")
            .with_column("id", ColumnMeta::serial())
            .with_column("name", ColumnMeta::new(DataType::Text))
            .with_column("age", ColumnMeta::new(DataType::Int))
    }

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("Person").is_ok());
        assert!(validate_identifier("_hidden").is_ok());
        assert!(validate_identifier("e_id2").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop;--").is_err());
        assert!(validate_identifier("a b").is_err());
        assert!(validate_identifier("naïve").is_err());
    }

    #[test]
    fn test_resolve_db_type_mapping() {
        let expected = [
            (DataType::Int, "INTEGER"),
            (DataType::Double, "REAL"),
            (DataType::Float, "REAL"),
            (DataType::Blob, "BLOB"),
            (DataType::String, "TEXT"),
            (DataType::Uuid, "TEXT"),
            (DataType::Text, "TEXT"),
            (DataType::Boolean, "INTEGER"),
            (DataType::Date, "TIMESTAMP"),
            (DataType::Json, "TEXT"),
        ];
        for (dt, native) in expected {
            assert_eq!(resolve_db_type(dt).unwrap(), native, "{dt}");
        }
    }

    #[test]
    fn test_identity_column_fragments() {
        let config = person();
        let id = config.meta("id").unwrap();
        assert_eq!(
            compile_column(&config, "main", "id", id).unwrap(),
            r#""id" INTEGER PRIMARY KEY AUTOINCREMENT"#
        );

        let plain = EntityConfig::new("T").with_column("e_id", ColumnMeta::new(DataType::Int));
        assert_eq!(
            compile_column(&plain, "main", "e_id", &ColumnMeta::new(DataType::Int)).unwrap(),
            r#""e_id" INTEGER PRIMARY KEY"#
        );

        let external = EntityConfig::new("T").with_identity(IdentityPolicy::External);
        assert_eq!(
            compile_column(&external, "main", "e_id", &ColumnMeta::new(DataType::Uuid)).unwrap(),
            r#""e_id" TEXT PRIMARY KEY"#
        );
    }

    #[test]
    fn test_serial_column_is_autoincrement_integer() {
        let config = person();
        let fragment = compile_column(&config, "main", "seq", &ColumnMeta::serial()).unwrap();
        assert_eq!(fragment, r#""seq" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"#);
    }

    #[test]
    fn test_primary_key_overrides_nullability() {
        let config = person();
        let meta = ColumnMeta::new(DataType::String).nullable().primary_key();
        assert_eq!(
            compile_column(&config, "main", "code", &meta).unwrap(),
            r#""code" TEXT NOT NULL PRIMARY KEY"#
        );
    }

    #[test]
    fn test_nullable_unique_column() {
        let config = person();
        let meta = ColumnMeta::new(DataType::String).nullable().unique();
        assert_eq!(
            compile_column(&config, "main", "email", &meta).unwrap(),
            r#""email" TEXT UNIQUE"#
        );
    }

    #[test]
    fn test_cross_schema_foreign_key_omitted() {
        let config = person();
        let meta = ColumnMeta::new(DataType::Int)
            .references(ForeignKey::new("Account", "e_id").in_schema("billing"));
        assert_eq!(
            compile_column(&config, "main", "account", &meta).unwrap(),
            r#""account" INTEGER NOT NULL"#
        );

        let meta = ColumnMeta::new(DataType::Int)
            .references(ForeignKey::new("Account", "e_id").in_schema("main"));
        assert_eq!(
            compile_column(&config, "main", "account", &meta).unwrap(),
            r#""account" INTEGER NOT NULL REFERENCES "Account"("e_id")"#
        );
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("main", &person()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"main\".\"Person\" (\n    \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
             \"name\" TEXT NOT NULL,\n    \
             \"age\" INTEGER NOT NULL\n)"
        );
    }

    #[test]
    fn test_keyword_names_are_quoted() {
        let config = EntityConfig::new("Group")
            .with_column("e_id", ColumnMeta::serial())
            .with_column("order", ColumnMeta::new(DataType::Int))
            .with_column(
                "select",
                ColumnMeta::new(DataType::Int).references(ForeignKey::new("Group", "e_id")),
            );
        let sql = create_table_sql("main", &config).unwrap();
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "main"."Group" ("#));
        assert!(sql.contains(r#""order" INTEGER NOT NULL"#));
        assert!(sql.contains(r#"REFERENCES "Group"("e_id")"#));

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&sql).unwrap();
    }

    #[test]
    fn test_create_table_sql_executes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let config = person()
            .with_column("born", ColumnMeta::new(DataType::Date).nullable())
            .with_column("tags", ColumnMeta::new(DataType::Json).nullable())
            .with_column("active", ColumnMeta::new(DataType::Boolean))
            .with_column("avatar", ColumnMeta::new(DataType::Blob).nullable());
        conn.execute_batch(&create_table_sql("main", &config).unwrap()).unwrap();
        conn.execute_batch(&create_table_sql("main", &config).unwrap()).unwrap();
    }

    #[test]
    fn test_create_table_rejects_bad_names() {
        let config = person().with_column("x; DROP TABLE Person", ColumnMeta::new(DataType::Int));
        assert!(matches!(
            create_table_sql("main", &config),
            Err(SqlConError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            create_table_sql("main; --", &person()),
            Err(SqlConError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_create_table_rejects_invalid_structure() {
        let config = person().with_key("e_id");
        assert!(matches!(
            create_table_sql("main", &config),
            Err(SqlConError::InvalidEntityConfig { .. })
        ));
    }

    #[test]
    fn test_inferred_columns() {
        let infer = |name: &str, value: Value| {
            compile_inferred_column("e_id", IdentityPolicy::Surrogate, name, &value)
        };
        assert_eq!(infer("e_id", json!(1)).unwrap(), r#""e_id" INTEGER PRIMARY KEY"#);
        assert_eq!(infer("age", json!(3)).unwrap(), r#""age" INTEGER NOT NULL"#);
        assert_eq!(infer("name", json!("Ann")).unwrap(), r#""name" TEXT NOT NULL"#);
        assert_eq!(
            infer("at", json!("2024-05-01T10:00:00Z")).unwrap(),
            r#""at" TIMESTAMP"#
        );
        assert!(matches!(
            infer("flag", json!(true)),
            Err(SqlConError::TypeNotSupported(_))
        ));
    }

    #[test]
    fn test_create_table_sql_inferred() {
        let sample = json!({"e_id": "k1", "title": "x", "count": 2});
        let sql = create_table_sql_inferred(
            "main",
            "Item",
            "e_id",
            IdentityPolicy::External,
            sample.as_object().unwrap(),
        )
        .unwrap();
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "main"."Item" ("#));
        assert!(sql.contains(r#""e_id" TEXT PRIMARY KEY"#));
        assert!(sql.contains(r#""title" TEXT NOT NULL"#));
        assert!(sql.contains(r#""count" INTEGER NOT NULL"#));
    }
}
