//! Entity metadata definitions.
//!
//! This module defines the descriptors used to map a typed entity onto a
//! single table: the per-column [`ColumnMeta`] and the per-entity
//! [`EntityConfig`]. The types are serializable with [`serde`] so entity
//! descriptors can be kept next to application configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Name of the identity column used when an [`EntityConfig`] does not
/// override it.
pub const DEFAULT_IDENTITY_FIELD: &str = "e_id";

/// Logical data type of a column.
///
/// The tag is storage-agnostic; the storage backend resolves it to a native
/// column type. Tags parse from and render to their lowercase names.
///
/// # Examples
///
/// ```
/// use sqlcon_core::DataType;
///
/// let dt: DataType = "json".parse().unwrap();
/// assert_eq!(dt, DataType::Json);
/// assert!(dt.needs_conversion());
/// assert!("decimal".parse::<DataType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer.
    Int,
    /// Double precision floating point.
    Double,
    /// Floating point (stored with the same precision as `Double`).
    Float,
    /// Raw bytes.
    Blob,
    /// Short text.
    String,
    /// Externally generated unique identifier, stored as text.
    Uuid,
    /// Long text.
    Text,
    /// Boolean, stored as 0/1.
    Boolean,
    /// Point in time, stored as an ISO-8601 string.
    Date,
    /// Arbitrary structured value, stored as serialized JSON text.
    Json,
    /// Auto-incrementing integer primary key.
    Serial,
}

impl DataType {
    /// All supported tags, in declaration order.
    pub const ALL: [DataType; 11] = [
        DataType::Int,
        DataType::Double,
        DataType::Float,
        DataType::Blob,
        DataType::String,
        DataType::Uuid,
        DataType::Text,
        DataType::Boolean,
        DataType::Date,
        DataType::Json,
        DataType::Serial,
    ];

    /// Returns the lowercase tag name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Double => "double",
            DataType::Float => "float",
            DataType::Blob => "blob",
            DataType::String => "string",
            DataType::Uuid => "uuid",
            DataType::Text => "text",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Json => "json",
            DataType::Serial => "serial",
        }
    }

    /// Returns `true` for tags whose in-memory and stored forms differ.
    pub fn needs_conversion(&self) -> bool {
        matches!(self, DataType::Date | DataType::Json | DataType::Boolean)
    }

    /// Returns `true` for tags stored as integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int | DataType::Serial)
    }

    /// Returns `true` for tags stored as text.
    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::String | DataType::Uuid | DataType::Text)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| ParseError::UnknownDataType(s.to_string()))
    }
}

/// Foreign-key reference from one column to a key of another relation.
///
/// A reference into another schema is kept as metadata but never emitted in
/// table DDL, since the storage engine cannot enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Target relation (table) name.
    pub relation: String,
    /// Target column in the relation.
    pub key: String,
    /// Schema holding the relation, when different from the entity's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ForeignKey {
    /// Creates a same-schema reference to `relation(key)`.
    pub fn new(relation: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            key: key.into(),
            schema: None,
        }
    }

    /// Places the referenced relation in `schema`.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Returns `true` if the reference points outside `schema`.
    pub fn crosses_schema(&self, schema: &str) -> bool {
        self.schema.as_deref().is_some_and(|s| s != schema)
    }
}

/// Type and constraint descriptor for one column.
///
/// Use [`ColumnMeta::new`] or [`ColumnMeta::serial`] and chain the builder
/// methods to add constraints.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{ColumnMeta, DataType, ForeignKey};
///
/// let owner = ColumnMeta::new(DataType::Int)
///     .nullable()
///     .references(ForeignKey::new("Person", "e_id"));
/// assert!(owner.can_be_null);
/// assert_eq!(owner.foreign_key.unwrap().relation, "Person");
///
/// let id = ColumnMeta::serial();
/// assert!(id.primary_key);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    /// Logical data type.
    pub data_type: DataType,
    /// Whether the column accepts `NULL`.
    #[serde(default)]
    pub can_be_null: bool,
    /// Whether values must be unique across rows.
    #[serde(default)]
    pub unique: bool,
    /// Whether the column is the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Optional reference to another relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnMeta {
    /// Creates a non-null, non-unique column of the given type.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            can_be_null: false,
            unique: false,
            primary_key: false,
            foreign_key: None,
        }
    }

    /// Creates an auto-incrementing integer primary key column.
    pub fn serial() -> Self {
        Self::new(DataType::Serial).primary_key()
    }

    /// Allows `NULL` values.
    pub fn nullable(mut self) -> Self {
        self.can_be_null = true;
        self
    }

    /// Adds a uniqueness constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Adds a foreign-key reference.
    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }
}

/// How the identity column of an entity is typed and assigned.
///
/// A deployment picks one policy per entity; identity values passed to
/// storage operations must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Integer key assigned by the storage engine (the default).
    #[default]
    Surrogate,
    /// Text key assigned by the caller before insert.
    External,
}

impl IdentityPolicy {
    /// Returns `true` if `data_type` can hold identities under this policy.
    pub fn accepts(&self, data_type: DataType) -> bool {
        match self {
            IdentityPolicy::Surrogate => data_type.is_integer(),
            IdentityPolicy::External => data_type.is_textual(),
        }
    }
}

/// Identity value of a stored entity.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{EntityId, IdentityPolicy};
///
/// assert_eq!(EntityId::from(7_i64).policy(), IdentityPolicy::Surrogate);
/// assert_eq!(EntityId::from("a1b2").policy(), IdentityPolicy::External);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Surrogate integer key.
    Int(i64),
    /// Externally assigned text key.
    Text(String),
}

impl EntityId {
    /// Returns the identity policy this value belongs to.
    pub fn policy(&self) -> IdentityPolicy {
        match self {
            EntityId::Int(_) => IdentityPolicy::Surrogate,
            EntityId::Text(_) => IdentityPolicy::External,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{id}"),
            EntityId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

/// Static descriptor of an entity: its table name, identity column, and
/// the ordered column metadata.
///
/// Column order is significant: it fixes the column order of generated DDL
/// and of every encoded statement.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{ColumnMeta, DataType, EntityConfig};
///
/// let config = EntityConfig::new("Person")
///     .with_key("id")
///     .with_column("id", ColumnMeta::serial())
///     .with_column("name", ColumnMeta::new(DataType::Text))
///     .with_column("age", ColumnMeta::new(DataType::Int));
///
/// assert_eq!(config.column_names().collect::<Vec<_>>(), ["id", "name", "age"]);
/// assert!(config.meta("age").is_some());
/// assert!(config.meta("email").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity (and table) name.
    pub name: String,
    /// Name of the identity column.
    #[serde(default = "default_key")]
    pub key: String,
    /// Identity typing policy.
    #[serde(default)]
    pub identity: IdentityPolicy,
    /// Ordered column metadata.
    #[serde(default)]
    pub columns: Vec<(String, ColumnMeta)>,
}

fn default_key() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

impl EntityConfig {
    /// Creates a config with the default identity column and no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: default_key(),
            identity: IdentityPolicy::default(),
            columns: Vec::new(),
        }
    }

    /// Overrides the identity column name.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the identity policy.
    pub fn with_identity(mut self, identity: IdentityPolicy) -> Self {
        self.identity = identity;
        self
    }

    /// Appends a column.
    pub fn with_column(mut self, name: impl Into<String>, meta: ColumnMeta) -> Self {
        self.columns.push((name.into(), meta));
        self
    }

    /// Looks up the metadata for a column.
    pub fn meta(&self, column: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, meta)| meta)
    }

    /// Metadata of the identity column, if declared.
    pub fn key_meta(&self) -> Option<&ColumnMeta> {
        self.meta(&self.key)
    }

    /// Returns `true` if `column` is the identity column.
    pub fn is_key(&self, column: &str) -> bool {
        self.key == column
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse_round_trip() {
        for dt in DataType::ALL {
            assert_eq!(dt.as_str().parse::<DataType>().unwrap(), dt);
        }
    }

    #[test]
    fn test_data_type_unknown_tag() {
        let err = "money".parse::<DataType>().unwrap_err();
        assert_eq!(err, ParseError::UnknownDataType("money".to_string()));
    }

    #[test]
    fn test_data_type_serde_uses_lowercase_tags() {
        let json = serde_json::to_string(&DataType::Boolean).unwrap();
        assert_eq!(json, "\"boolean\"");
        let dt: DataType = serde_json::from_str("\"uuid\"").unwrap();
        assert_eq!(dt, DataType::Uuid);
    }

    #[test]
    fn test_column_meta_deserializes_with_defaults() {
        let meta: ColumnMeta =
            serde_json::from_str(r#"{"dataType":"date","canBeNull":true}"#).unwrap();
        assert_eq!(meta.data_type, DataType::Date);
        assert!(meta.can_be_null);
        assert!(!meta.unique);
        assert!(!meta.primary_key);
        assert!(meta.foreign_key.is_none());
    }

    #[test]
    fn test_foreign_key_crosses_schema() {
        let local = ForeignKey::new("Person", "e_id");
        assert!(!local.crosses_schema("main"));
        assert!(!local.clone().in_schema("main").crosses_schema("main"));
        assert!(local.in_schema("archive").crosses_schema("main"));
    }

    #[test]
    fn test_identity_policy_accepts() {
        assert!(IdentityPolicy::Surrogate.accepts(DataType::Serial));
        assert!(IdentityPolicy::Surrogate.accepts(DataType::Int));
        assert!(!IdentityPolicy::Surrogate.accepts(DataType::Uuid));
        assert!(IdentityPolicy::External.accepts(DataType::Uuid));
        assert!(!IdentityPolicy::External.accepts(DataType::Int));
    }

    #[test]
    fn test_entity_config_defaults() {
        let config = EntityConfig::new("Note");
        assert_eq!(config.key, DEFAULT_IDENTITY_FIELD);
        assert_eq!(config.identity, IdentityPolicy::Surrogate);
        assert!(config.key_meta().is_none());
    }

    #[test]
    fn test_entity_id_untagged_serde() {
        let ids: Vec<EntityId> = serde_json::from_str(r#"[3, "abc"]"#).unwrap();
        assert_eq!(ids, vec![EntityId::Int(3), EntityId::Text("abc".into())]);
    }
}
