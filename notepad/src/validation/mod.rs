use crate::error::{Result, StoreError};
use crate::record::NoteValues;
use crate::schema::{self, columns, ColumnType, Writability, DEFAULT_CATEGORY};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// Which mutation a field set is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
}

/// Validated column values, ready to bind. Keys are internal column names.
pub type PreparedValues = BTreeMap<&'static str, SqlValue>;

/// Check every field against its column definition and convert it to a
/// SQLite value. Rejects unknown columns, wrong types, and writes to columns
/// that are not writable for this kind of mutation.
pub fn validate_values(values: &NoteValues, kind: MutationKind) -> Result<PreparedValues> {
    let mut prepared = PreparedValues::new();

    for (name, value) in values.iter() {
        let definition = schema::column(name).ok_or_else(|| StoreError::InvalidValue {
            column: name.to_string(),
            reason: "unknown column".into(),
        })?;

        match (definition.writability, kind) {
            (Writability::Never, _) | (Writability::InsertOnly, MutationKind::Update) => {
                return Err(StoreError::ImmutableField(name.to_string()));
            }
            _ => {}
        }

        let sql_value = match (definition.column_type, value) {
            (_, Value::Null) if definition.nullable => SqlValue::Null,
            (_, Value::Null) => {
                return Err(StoreError::InvalidValue {
                    column: name.to_string(),
                    reason: "may not be null".into(),
                });
            }
            (ColumnType::Integer, v) => match v.as_i64() {
                Some(n) => SqlValue::Integer(n),
                None => {
                    return Err(StoreError::InvalidValue {
                        column: name.to_string(),
                        reason: format!("expected an integer, got {v}"),
                    });
                }
            },
            (ColumnType::Text, Value::String(s)) => SqlValue::Text(s.clone()),
            (ColumnType::Text, v) => {
                return Err(StoreError::InvalidValue {
                    column: name.to_string(),
                    reason: format!("expected text, got {v}"),
                });
            }
        };

        prepared.insert(definition.name, sql_value);
    }

    Ok(prepared)
}

/// Fill every column the caller left out of an insert with its default, and
/// keep `modified >= created`.
pub fn apply_insert_defaults(prepared: &mut PreparedValues, untitled: &str, now: i64) {
    prepared
        .entry(columns::CREATED)
        .or_insert(SqlValue::Integer(now));
    prepared
        .entry(columns::MODIFIED)
        .or_insert(SqlValue::Integer(now));
    prepared
        .entry(columns::TITLE)
        .or_insert_with(|| SqlValue::Text(untitled.to_string()));
    prepared
        .entry(columns::BODY)
        .or_insert_with(|| SqlValue::Text(String::new()));
    prepared
        .entry(columns::COLOR)
        .or_insert(SqlValue::Integer(schema::NoteColor::Default.tag()));
    prepared
        .entry(columns::CATEGORY)
        .or_insert_with(|| SqlValue::Text(DEFAULT_CATEGORY.to_string()));

    let created = integer(prepared, columns::CREATED);
    let modified = integer(prepared, columns::MODIFIED);
    if let (Some(created), Some(modified)) = (created, modified) {
        if modified < created {
            prepared.insert(columns::MODIFIED, SqlValue::Integer(created));
        }
    }
}

fn integer(prepared: &PreparedValues, column: &str) -> Option<i64> {
    match prepared.get(column) {
        Some(SqlValue::Integer(n)) => Some(*n),
        _ => None,
    }
}

/// Stamp the modification time of an update unless the caller supplied one.
pub fn apply_update_defaults(prepared: &mut PreparedValues, now: i64) {
    prepared
        .entry(columns::MODIFIED)
        .or_insert(SqlValue::Integer(now));
}
