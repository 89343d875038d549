//! `WHERE` clause construction from search specifications.
//!
//! Every term of a [`SearchSpec`] becomes one or more fragments, each with a
//! single `?` placeholder, AND-combined in the order the terms were added.
//! Operands go through the column's storage conversion, so a date range
//! compares ISO-8601 text and a boolean compares `0`/`1`.
//!
//! | Term | Fragment |
//! |------|----------|
//! | literal | `"col" = ?` (`"col" IS ?` for `null`) |
//! | `equals` | `"col" = ?` (`"col" IS ?` for `null`) |
//! | `not` | `"col" != ?` (`"col" IS NOT ?` for `null`) |
//! | `like` | `"col" LIKE '%' \|\| ? \|\| '%'` |
//! | `smallerThan` | `"col" < ?` |
//! | `greaterThan` | `"col" > ?` |

use rusqlite::types::Value as SqlValue;
use sqlcon_core::{ColumnMeta, Condition, EntityConfig, SearchMode, SearchSpec, SearchTerm};

use crate::convert::{plain_to_storage, to_storage};
use crate::error::{Result, SqlConError};
use crate::schema::quote_identifier;

/// A `WHERE` clause and its bound values.
///
/// `sql` is either empty or starts with ` WHERE `, so it can be appended to
/// a statement as-is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Builds the `WHERE` clause for a search against `config`.
///
/// # Errors
///
/// Returns [`SqlConError::MetadataMissing`] if the search names a column the
/// config does not declare, or a conversion error for an operand the column
/// cannot store.
///
/// # Examples
///
/// ```
/// use sqlcon_core::{ColumnMeta, Condition, DataType, EntityConfig, SearchSpec};
/// use sqlcon_sqlite::build_search;
///
/// let config = EntityConfig::new("Person")
///     .with_column("e_id", ColumnMeta::serial())
///     .with_column("name", ColumnMeta::new(DataType::Text))
///     .with_column("age", ColumnMeta::new(DataType::Int));
///
/// let spec = SearchSpec::new()
///     .with_conditions("age", vec![Condition::greater_than(17), Condition::smaller_than(30)])
///     .with_condition("name", Condition::like("an"));
/// let clause = build_search(&config, &spec).unwrap();
///
/// assert_eq!(
///     clause.sql,
///     r#" WHERE "age" > ? AND "age" < ? AND "name" LIKE '%' || ? || '%'"#
/// );
/// assert_eq!(clause.params.len(), 3);
/// ```
pub fn build_search(config: &EntityConfig, spec: &SearchSpec) -> Result<WhereClause> {
    let mut filters = Vec::new();
    let mut params = Vec::new();

    for (field, term) in spec.iter() {
        let meta = config.meta(field).ok_or_else(|| SqlConError::MetadataMissing {
            entity: config.name.clone(),
            field: field.to_string(),
        })?;

        match term {
            SearchTerm::Value(value) => {
                let column = quote_identifier(field);
                filters.push(if value.is_null() {
                    format!("{column} IS ?")
                } else {
                    format!("{column} = ?")
                });
                params.push(to_storage(meta, value)?);
            }
            SearchTerm::Condition(condition) => {
                filters.push(condition_fragment(field, condition));
                params.push(condition_param(meta, condition)?);
            }
            SearchTerm::Conditions(conditions) => {
                for condition in conditions {
                    filters.push(condition_fragment(field, condition));
                    params.push(condition_param(meta, condition)?);
                }
            }
        }
    }

    if filters.is_empty() {
        return Ok(WhereClause::default());
    }
    Ok(WhereClause {
        sql: format!(" WHERE {}", filters.join(" AND ")),
        params,
    })
}

fn condition_fragment(field: &str, condition: &Condition) -> String {
    let column = quote_identifier(field);
    let null = condition.value.is_null();
    match condition.mode {
        SearchMode::Equals if null => format!("{column} IS ?"),
        SearchMode::Equals => format!("{column} = ?"),
        SearchMode::Not if null => format!("{column} IS NOT ?"),
        SearchMode::Not => format!("{column} != ?"),
        SearchMode::Like => format!("{column} LIKE '%' || ? || '%'"),
        SearchMode::SmallerThan => format!("{column} < ?"),
        SearchMode::GreaterThan => format!("{column} > ?"),
    }
}

fn condition_param(meta: &ColumnMeta, condition: &Condition) -> Result<SqlValue> {
    match condition.mode {
        // Substring terms match against stored text
        SearchMode::Like => plain_to_storage(&condition.value),
        _ => to_storage(meta, &condition.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use sqlcon_core::DataType;

    fn event() -> EntityConfig {
        EntityConfig::new("Event")
            .with_column("e_id", ColumnMeta::serial())
            .with_column("title", ColumnMeta::new(DataType::Text))
            .with_column("at", ColumnMeta::new(DataType::Date))
            .with_column("done", ColumnMeta::new(DataType::Boolean))
            .with_column("owner", ColumnMeta::new(DataType::Int).nullable())
    }

    #[test]
    fn test_empty_spec_builds_empty_clause() {
        let clause = build_search(&event(), &SearchSpec::new()).unwrap();
        assert!(clause.is_empty());
        assert_eq!(clause.sql, "");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_literal_terms() {
        let spec = SearchSpec::new().with_value("title", "Launch").with_value("owner", Value::Null);
        let clause = build_search(&event(), &spec).unwrap();
        assert_eq!(clause.sql, r#" WHERE "title" = ? AND "owner" IS ?"#);
        assert_eq!(
            clause.params,
            vec![SqlValue::Text("Launch".into()), SqlValue::Null]
        );
    }

    #[test]
    fn test_null_conditions_use_is() {
        let spec = SearchSpec::new()
            .with_condition("owner", Condition::equals(Value::Null))
            .with_condition("title", Condition::not(Value::Null));
        let clause = build_search(&event(), &spec).unwrap();
        assert_eq!(clause.sql, r#" WHERE "owner" IS ? AND "title" IS NOT ?"#);
    }

    #[test]
    fn test_every_mode() {
        let spec = SearchSpec::new().with_conditions(
            "owner",
            vec![
                Condition::equals(1),
                Condition::not(2),
                Condition::like("3"),
                Condition::smaller_than(4),
                Condition::greater_than(5),
            ],
        );
        let clause = build_search(&event(), &spec).unwrap();
        assert_eq!(
            clause.sql,
            concat!(
                r#" WHERE "owner" = ? AND "owner" != ? AND "owner" LIKE '%' || ? || '%'"#,
                r#" AND "owner" < ? AND "owner" > ?"#
            )
        );
        assert_eq!(clause.params[2], SqlValue::Text("3".into()));
        assert_eq!(clause.params[4], SqlValue::Integer(5));
    }

    #[test]
    fn test_operands_are_converted() {
        let spec = SearchSpec::new()
            .with_conditions(
                "at",
                vec![
                    Condition::greater_than("2024-01-01T00:00:00Z"),
                    Condition::smaller_than("2024-02-01T00:00:00+01:00"),
                ],
            )
            .with_value("done", true);
        let clause = build_search(&event(), &spec).unwrap();
        assert_eq!(clause.sql, r#" WHERE "at" > ? AND "at" < ? AND "done" = ?"#);
        assert_eq!(
            clause.params,
            vec![
                SqlValue::Text("2024-01-01T00:00:00.000Z".into()),
                SqlValue::Text("2024-01-31T23:00:00.000Z".into()),
                SqlValue::Integer(1),
            ]
        );
    }

    #[test]
    fn test_unknown_field() {
        let spec = SearchSpec::new().with_value("location", "Berlin");
        assert!(matches!(
            build_search(&event(), &spec),
            Err(SqlConError::MetadataMissing { field, .. }) if field == "location"
        ));
    }

    #[test]
    fn test_parsed_spec_with_unknown_mode_converts_error() {
        let err = SearchSpec::from_json(&json!({"title": {"mode": "startsWith", "value": "a"}}))
            .map_err(SqlConError::from)
            .unwrap_err();
        assert!(matches!(err, SqlConError::UnknownSearchMode(mode) if mode == "startsWith"));
    }

    #[test]
    fn test_like_matches_substring() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Event (
                 e_id INTEGER PRIMARY KEY, title TEXT, at TEXT, done INTEGER, owner INTEGER
             );
             INSERT INTO Event (title, at, done)
                 VALUES ('Product launch', '', 0), ('Retro', '', 1);",
        )
        .unwrap();

        let spec = SearchSpec::new().with_condition("title", Condition::like("launch"));
        let clause = build_search(&event(), &spec).unwrap();
        let sql = format!("SELECT title FROM Event{}", clause.sql);
        let mut stmt = conn.prepare(&sql).unwrap();
        let titles: Vec<String> = stmt
            .query_map(rusqlite::params_from_iter(clause.params.iter()), |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(titles, ["Product launch"]);
    }
}
