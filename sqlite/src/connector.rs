//! Module-scoped SQLite connector.
//!
//! [`Connector`] owns the database file of one host module and exposes the
//! entity operations (create, read, update, delete, list, search) plus a
//! reserved key/value `config` table. Each operation composes one
//! parameterized statement from the entity codec or the search builder,
//! runs it, and decodes the result.
//!
//! The connector is synchronous and holds a single connection. It opens no
//! transactions of its own; wrap calls in one through
//! [`connection`](Connector::connection) when several statements must apply
//! atomically.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use sqlcon_core::{ColumnMeta, DataType, EntityConfig};
//! use sqlcon_sqlite::{Connector, ModuleConfig};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     id: Option<i64>,
//!     name: String,
//!     age: i64,
//! }
//!
//! let module = ModuleConfig::new("people").with_value("GLOBAL_PATH_DB", "data");
//! let mut db = Connector::new(&module, "1").unwrap();
//! db.connect().unwrap();
//!
//! let config = EntityConfig::new("Person")
//!     .with_key("id")
//!     .with_column("id", ColumnMeta::serial())
//!     .with_column("name", ColumnMeta::new(DataType::Text))
//!     .with_column("age", ColumnMeta::new(DataType::Int));
//! db.init_entity(&config).unwrap();
//!
//! let ann = db
//!     .create_entity(&config, &Person { id: None, name: "Ann".into(), age: 30 })
//!     .unwrap();
//! let loaded: Option<Person> = db.get_entity_by_id(&config, ann.id.unwrap()).unwrap();
//! assert_eq!(loaded.unwrap().name, "Ann");
//!
//! db.disconnect().unwrap();
//! ```

use std::path::{Path, PathBuf};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlcon_core::{EntityConfig, EntityId, IdentityPolicy, ListQuery, SearchSpec};
use tracing::{debug, info, warn};

use crate::config::{HostModule, resolve_db_path};
use crate::convert::{self, Record};
use crate::error::{Result, SqlConError};
use crate::schema::{
    CONFIG_TABLE, config_table_sql, create_table_sql, ensure_valid, qualified, quote_identifier,
};
use crate::search::build_search;

/// Schema every table is created in.
pub const DEFAULT_SCHEMA: &str = "main";

/// Config key of the database version record.
pub const DB_VERSION_KEY: &str = "dbversion";

/// One statement of a batch passed to [`Connector::exec_scripts`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl RawQuery {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Sets the positional parameters.
    pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    /// Rows inserted, updated, or deleted.
    pub changes: usize,
    /// Row id of the most recent successful insert on the connection.
    pub last_insert_id: i64,
}

/// A row of the reserved `config` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub c_key: String,
    pub c_value: Option<String>,
}

/// Connector between typed entities and one SQLite database file.
///
/// Starts disconnected; [`connect`](Self::connect) opens the file and
/// [`disconnect`](Self::disconnect) releases it. Every other operation
/// returns [`SqlConError::NotConnected`] while disconnected.
#[derive(Debug)]
pub struct Connector {
    path: PathBuf,
    db_version: String,
    schema: String,
    conn: Option<Connection>,
    new_db: bool,
}

impl Connector {
    /// Creates a connector for a host module's database,
    /// `<GLOBAL_PATH_DB>/<module name>.db`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlConError::ConfigurationMissing`] if the host has no
    /// database directory configured.
    pub fn new(host: &dyn HostModule, db_version: impl Into<String>) -> Result<Self> {
        let path = resolve_db_path(host)?;
        Ok(Self::with_path(path, db_version))
    }

    /// Creates a connector for an explicit database path.
    ///
    /// `":memory:"` opens a private in-memory database on connect.
    pub fn with_path(path: impl Into<PathBuf>, db_version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            db_version: db_version.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            conn: None,
            new_db: false,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version string written to new databases.
    pub fn db_version(&self) -> &str {
        &self.db_version
    }

    /// Schema name tables are qualified with.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    /// Whether the last [`connect`](Self::connect) initialized a new database.
    pub fn is_new(&self) -> bool {
        self.new_db
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The open connection, if connected.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Opens the database and checks for a version record.
    ///
    /// If the `config` table cannot be read, the database is treated as new:
    /// the table is created, a `dbversion` record holding
    /// [`db_version`](Self::db_version) is inserted, and
    /// [`is_new`](Self::is_new) turns `true`.
    ///
    /// Returns `true` if a version record is present after connecting.
    /// Connecting while connected reopens the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a new database
    /// cannot be initialized.
    pub fn connect(&mut self) -> Result<bool> {
        self.disconnect()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.conn = Some(Connection::open(&self.path)?);
        self.new_db = false;

        let probe = format!(
            "SELECT c_key, c_value FROM {}",
            qualified(&self.schema, CONFIG_TABLE)
        );
        match self.query_config(&probe, &[]) {
            Ok(records) => Ok(records.iter().any(|r| r.c_key == DB_VERSION_KEY)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config table not readable");
                info!(
                    path = %self.path.display(),
                    version = %self.db_version,
                    "Creating new database"
                );
                let initialized = self.exec_scripts(&[
                    RawQuery::new(config_table_sql(&self.schema)),
                    RawQuery::new(format!(
                        "INSERT INTO {} (c_key, c_value) VALUES (?, ?)",
                        qualified(&self.schema, CONFIG_TABLE)
                    ))
                    .with_params(vec![
                        SqlValue::Text(DB_VERSION_KEY.to_string()),
                        SqlValue::Text(self.db_version.clone()),
                    ]),
                ]);
                if let Err(e) = initialized {
                    // Dropping the handle closes it
                    self.conn = None;
                    return Err(e);
                }
                self.new_db = true;
                Ok(true)
            }
        }
    }

    /// Version recorded in the database's `dbversion` config record.
    pub fn stored_db_version(&self) -> Result<Option<String>> {
        Ok(self.get_config(DB_VERSION_KEY)?.and_then(|r| r.c_value))
    }

    /// Closes the connection. Safe to call when already disconnected.
    pub fn disconnect(&mut self) -> Result<bool> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
            info!(path = %self.path.display(), "Disconnected");
        }
        Ok(true)
    }

    /// Executes statements in order, returning one result per statement.
    ///
    /// Stops at the first failing statement; earlier statements stay applied.
    pub fn exec_scripts(&self, scripts: &[RawQuery]) -> Result<Vec<RunResult>> {
        let conn = self.conn()?;
        let mut results = Vec::with_capacity(scripts.len());
        for script in scripts {
            debug!(sql = %script.sql, params = script.params.len(), "Executing statement");
            let mut stmt = conn.prepare(&script.sql)?;
            let changes = stmt.execute(params_from_iter(script.params.iter()))?;
            results.push(RunResult {
                changes,
                last_insert_id: conn.last_insert_rowid(),
            });
        }
        Ok(results)
    }

    /// Creates the table for an entity if it does not exist.
    pub fn init_entity(&self, config: &EntityConfig) -> Result<bool> {
        let sql = create_table_sql(&self.schema, config)?;
        self.exec_scripts(&[RawQuery::new(sql)])?;
        Ok(true)
    }

    /// Inserts an entity and returns it as stored.
    ///
    /// Under the surrogate identity policy a `null` identity is assigned by
    /// the database; under the external policy the entity must carry its
    /// text key.
    ///
    /// # Errors
    ///
    /// Returns [`SqlConError::EntityCreateFailed`] if the inserted row cannot
    /// be read back, and [`SqlConError::IdentityMismatch`] if an external
    /// key is missing.
    pub fn create_entity<E>(&self, config: &EntityConfig, entity: &E) -> Result<E>
    where
        E: Serialize + DeserializeOwned,
    {
        ensure_valid(config)?;
        let record = convert::to_record(entity)?;
        let supplied = convert::record_identity(config, &record);
        match &supplied {
            Some(id) => {
                convert::id_to_storage(config, id)?;
            }
            None if config.identity == IdentityPolicy::External => {
                return Err(SqlConError::IdentityMismatch {
                    entity: config.name.clone(),
                    expected: IdentityPolicy::External,
                    found: record
                        .get(&config.key)
                        .map_or_else(|| "nothing".to_string(), ToString::to_string),
                });
            }
            None => {}
        }

        let encoded = convert::encode(&record, config, false)?;
        let table = self.table(config);
        let sql = if encoded.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                encoded
                    .fields
                    .iter()
                    .map(|f| quote_identifier(f))
                    .collect::<Vec<_>>()
                    .join(", "),
                encoded.placeholders.join(", ")
            )
        };
        let results = self.exec_scripts(&[RawQuery::new(sql).with_params(encoded.params)])?;
        let inserted = results.first().filter(|r| r.changes > 0).ok_or_else(|| {
            SqlConError::EntityCreateFailed(format!(
                "insert into {} changed no rows",
                config.name
            ))
        })?;

        let id = supplied.unwrap_or(EntityId::Int(inserted.last_insert_id));
        self.get_entity_by_id(config, id.clone())?.ok_or_else(|| {
            SqlConError::EntityCreateFailed(format!("{} {id} not found after insert", config.name))
        })
    }

    /// Applies the fields of `changes` to the entity with the given identity.
    ///
    /// `changes` may be a full entity or any serializable subset of its
    /// columns; the identity column is never reassigned. Returns `true` if a
    /// row changed.
    pub fn update_entity<U>(
        &self,
        config: &EntityConfig,
        id: impl Into<EntityId>,
        changes: &U,
    ) -> Result<bool>
    where
        U: Serialize + ?Sized,
    {
        self.update_where_ids(config, &[id.into()], changes)
    }

    /// Applies the fields of `changes` to every entity in `ids`.
    ///
    /// Returns `false` without touching storage if `ids` is empty.
    pub fn update_bulk_entity<U>(
        &self,
        config: &EntityConfig,
        ids: &[EntityId],
        changes: &U,
    ) -> Result<bool>
    where
        U: Serialize + ?Sized,
    {
        if ids.is_empty() {
            return Ok(false);
        }
        self.update_where_ids(config, ids, changes)
    }

    /// Loads one entity by identity.
    pub fn get_entity_by_id<E>(
        &self,
        config: &EntityConfig,
        id: impl Into<EntityId>,
    ) -> Result<Option<E>>
    where
        E: DeserializeOwned,
    {
        ensure_valid(config)?;
        let (filter, params) = self.id_filter(config, &[id.into()])?;
        let sql = format!("{}{filter}", self.select(config));
        first_entity(self.query_records(config, &sql, &params)?)
    }

    /// Loads every entity whose identity is in `ids`, in storage order.
    ///
    /// Returns an empty list without touching storage if `ids` is empty.
    pub fn get_entity_bulk_by_id<E>(
        &self,
        config: &EntityConfig,
        ids: &[EntityId],
    ) -> Result<Vec<E>>
    where
        E: DeserializeOwned,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        ensure_valid(config)?;
        let (filter, params) = self.id_filter(config, ids)?;
        let sql = format!("{}{filter}", self.select(config));
        into_entities(self.query_records(config, &sql, &params)?)
    }

    /// Returns the first entity, in storage order, matching `search`.
    pub fn find_entity<E>(&self, config: &EntityConfig, search: &SearchSpec) -> Result<Option<E>>
    where
        E: DeserializeOwned,
    {
        ensure_valid(config)?;
        let clause = build_search(config, search)?;
        let sql = format!("{}{} LIMIT 1", self.select(config), clause.sql);
        first_entity(self.query_records(config, &sql, &clause.params)?)
    }

    /// Lists entities matching a filter, sorted and paged.
    ///
    /// A limit of zero returns an empty list without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`SqlConError::MetadataMissing`] if the search or the order
    /// names an undeclared column.
    pub fn get_entity_list<E>(&self, config: &EntityConfig, query: &ListQuery) -> Result<Vec<E>>
    where
        E: DeserializeOwned,
    {
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }
        ensure_valid(config)?;

        let clause = build_search(config, &query.search)?;
        let mut sql = format!("{}{}", self.select(config), clause.sql);
        let mut params = clause.params;

        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| {
                    config
                        .meta(&o.key)
                        .map(|_| format!("{} {}", quote_identifier(&o.key), o.direction.as_sql()))
                        .ok_or_else(|| SqlConError::MetadataMissing {
                            entity: config.name.clone(),
                            field: o.key.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(i64::from(limit)));
                params.push(SqlValue::Integer(i64::from(offset)));
            }
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                params.push(SqlValue::Integer(i64::from(limit)));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(SqlValue::Integer(i64::from(offset)));
            }
            (None, None) => {}
        }

        into_entities(self.query_records(config, &sql, &params)?)
    }

    /// Deletes one entity. Returns `true` if it existed.
    pub fn delete_entity_by_id(
        &self,
        config: &EntityConfig,
        id: impl Into<EntityId>,
    ) -> Result<bool> {
        ensure_valid(config)?;
        let (filter, params) = self.id_filter(config, &[id.into()])?;
        let sql = format!("DELETE FROM {}{filter}", self.table(config));
        let results = self.exec_scripts(&[RawQuery::new(sql).with_params(params)])?;
        Ok(results.first().is_some_and(|r| r.changes == 1))
    }

    /// Deletes every entity in `ids`. Returns `true` if any row was removed.
    ///
    /// Returns `false` without touching storage if `ids` is empty.
    pub fn delete_entity_bulk_by_id(
        &self,
        config: &EntityConfig,
        ids: &[EntityId],
    ) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        ensure_valid(config)?;
        let (filter, params) = self.id_filter(config, ids)?;
        let sql = format!("DELETE FROM {}{filter}", self.table(config));
        let results = self.exec_scripts(&[RawQuery::new(sql).with_params(params)])?;
        Ok(results.first().is_some_and(|r| r.changes > 0))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_config(&self, key: &str, value: &str) -> Result<bool> {
        let sql = format!(
            "REPLACE INTO {} (c_key, c_value) VALUES (?, ?)",
            qualified(&self.schema, CONFIG_TABLE)
        );
        self.exec_scripts(&[RawQuery::new(sql).with_params(vec![
            SqlValue::Text(key.to_string()),
            SqlValue::Text(value.to_string()),
        ])])?;
        Ok(true)
    }

    /// Loads the config record stored under `key`.
    pub fn get_config(&self, key: &str) -> Result<Option<ConfigRecord>> {
        let sql = format!(
            "SELECT c_key, c_value FROM {} WHERE c_key = ?",
            qualified(&self.schema, CONFIG_TABLE)
        );
        Ok(self.query_config(&sql, &[SqlValue::Text(key.to_string())])?.into_iter().next())
    }

    /// Returns `true` if a config record exists under `key`.
    pub fn config_exist(&self, key: &str) -> Result<bool> {
        Ok(self.get_config(key)?.is_some())
    }

    /// Removes the config record under `key`. Returns `true` if it existed.
    pub fn remove_config(&self, key: &str) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE c_key = ?",
            qualified(&self.schema, CONFIG_TABLE)
        );
        let results = self.exec_scripts(&[
            RawQuery::new(sql).with_params(vec![SqlValue::Text(key.to_string())])
        ])?;
        Ok(results.first().is_some_and(|r| r.changes > 0))
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(SqlConError::NotConnected)
    }

    fn table(&self, config: &EntityConfig) -> String {
        qualified(&self.schema, &config.name)
    }

    fn select(&self, config: &EntityConfig) -> String {
        format!(
            "SELECT {} FROM {}",
            config
                .column_names()
                .map(quote_identifier)
                .collect::<Vec<_>>()
                .join(", "),
            self.table(config)
        )
    }

    /// Builds ` WHERE "<key>" = ?` or ` WHERE "<key>" IN (?, ...)` for `ids`.
    fn id_filter(
        &self,
        config: &EntityConfig,
        ids: &[EntityId],
    ) -> Result<(String, Vec<SqlValue>)> {
        let params = ids
            .iter()
            .map(|id| convert::id_to_storage(config, id))
            .collect::<Result<Vec<_>>>()?;
        let key = quote_identifier(&config.key);
        let filter = if params.len() == 1 {
            format!(" WHERE {key} = ?")
        } else {
            format!(" WHERE {key} IN ({})", vec!["?"; params.len()].join(", "))
        };
        Ok((filter, params))
    }

    fn update_where_ids<U>(
        &self,
        config: &EntityConfig,
        ids: &[EntityId],
        changes: &U,
    ) -> Result<bool>
    where
        U: Serialize + ?Sized,
    {
        ensure_valid(config)?;
        let record = convert::to_record(changes)?;
        let encoded = convert::encode(&record, config, true)?;
        if encoded.is_empty() {
            debug!(entity = %config.name, "Update without assignable fields");
            return Ok(false);
        }

        let (filter, id_params) = self.id_filter(config, ids)?;
        let sql = format!(
            "UPDATE {} SET {}{filter}",
            self.table(config),
            encoded.placeholders.join(", ")
        );
        let mut params = encoded.params;
        params.extend(id_params);
        let results = self.exec_scripts(&[RawQuery::new(sql).with_params(params)])?;
        Ok(results.first().is_some_and(|r| r.changes > 0))
    }

    fn query_records(
        &self,
        config: &EntityConfig,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        debug!(sql = %sql, params = params.len(), "Executing query");
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| convert::read_row(row, &names))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        convert::decode_many(config, rows)
    }

    fn query_config(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<ConfigRecord>> {
        let conn = self.conn()?;
        debug!(sql = %sql, params = params.len(), "Executing query");
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(ConfigRecord {
                    c_key: row.get(0)?,
                    c_value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn first_entity<E: DeserializeOwned>(records: Vec<Record>) -> Result<Option<E>> {
    records.into_iter().next().map(convert::from_record).transpose()
}

fn into_entities<E: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<E>> {
    records.into_iter().map(convert::from_record).collect()
}
