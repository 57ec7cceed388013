// Note records, projected rows, and mutation field sets

use crate::error::{Result, StoreError};
use crate::schema::{columns, NoteColor};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A fully-loaded note with every column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created: i64,
    pub modified: i64,
    pub color: i64,
    pub category: String,
}

impl Note {
    /// Build a note from a row that carries all seven note columns.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Note {
            id: required_i64(row, columns::ID)?,
            title: row.get_str(columns::TITLE).unwrap_or_default().to_string(),
            body: row.get_str(columns::BODY).unwrap_or_default().to_string(),
            created: required_i64(row, columns::CREATED)?,
            modified: required_i64(row, columns::MODIFIED)?,
            color: row.get_i64(columns::COLOR).unwrap_or_default(),
            category: row.get_str(columns::CATEGORY).unwrap_or_default().to_string(),
        })
    }

    /// The color to render; unknown tags fall back to the default color.
    pub fn color(&self) -> NoteColor {
        NoteColor::from_tag(self.color)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created).single()
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.modified).single()
    }
}

fn required_i64(row: &Row, column: &str) -> Result<i64> {
    row.get_i64(column).ok_or_else(|| StoreError::InvalidValue {
        column: column.to_string(),
        reason: "missing from row".into(),
    })
}

/// One row of a read, keyed by the external column names of its projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// The row as a JSON object, in projection order.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (name, value) in self.columns.iter().zip(&self.values) {
            obj.insert(name.clone(), value.clone());
        }
        Value::Object(obj)
    }
}

/// A partial set of note fields for insert or update.
///
/// Values are kept dynamic and checked against the column definitions when a
/// mutation is executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteValues {
    fields: BTreeMap<String, Value>,
}

impl NoteValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object such as `{"title": "Groceries", "color": 2}`.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(NoteValues {
                fields: map.into_iter().collect(),
            }),
            Value::Null => Ok(Self::new()),
            other => Err(StoreError::InvalidValue {
                column: "<fields>".into(),
                reason: format!("expected an object, got {other}"),
            }),
        }
    }

    pub fn title(self, title: impl Into<String>) -> Self {
        self.set(columns::TITLE, title.into())
    }

    pub fn body(self, body: impl Into<String>) -> Self {
        self.set(columns::BODY, body.into())
    }

    pub fn color(self, color: NoteColor) -> Self {
        self.set(columns::COLOR, color.tag())
    }

    pub fn category(self, category: impl Into<String>) -> Self {
        self.set(columns::CATEGORY, category.into())
    }

    pub fn created(self, millis: i64) -> Self {
        self.set(columns::CREATED, millis)
    }

    pub fn modified(self, millis: i64) -> Self {
        self.set(columns::MODIFIED, millis)
    }

    /// Set any column by name.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.fields.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_row() -> Row {
        let cols: Arc<[String]> = ["id", "title", "body", "created", "modified", "color", "category"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Row::new(
            cols,
            vec![
                json!(3),
                json!("Groceries"),
                json!("milk"),
                json!(1_700_000_000_000i64),
                json!(1_700_000_000_500i64),
                json!(9),
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_row_accessors() {
        let row = full_row();
        assert_eq!(row.get_i64("id"), Some(3));
        assert_eq!(row.get_str("title"), Some("Groceries"));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.to_json()["body"], json!("milk"));
    }

    #[test]
    fn test_note_from_row() {
        let note = Note::from_row(&full_row()).unwrap();
        assert_eq!(note.id, 3);
        assert_eq!(note.category, "");
        assert_eq!(note.color(), NoteColor::Default);
        assert!(note.modified_at().unwrap() > note.created_at().unwrap());
    }

    #[test]
    fn test_note_from_partial_row_fails() {
        let cols: Arc<[String]> = vec!["id".to_string(), "title".to_string()].into();
        let row = Row::new(cols, vec![json!(1), json!("x")]);
        assert!(matches!(
            Note::from_row(&row),
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_values_builder() {
        let values = NoteValues::new()
            .title("Hi")
            .color(NoteColor::Blue)
            .set("category", "work");
        assert_eq!(values.len(), 3);
        assert_eq!(values.get("color"), Some(&json!(2)));
        assert!(values.contains("category"));
        assert!(!values.contains("body"));
    }

    #[test]
    fn test_values_from_json() {
        let values = NoteValues::from_json(json!({"title": "a", "body": "b"})).unwrap();
        assert_eq!(values.len(), 2);
        assert!(NoteValues::from_json(Value::Null).unwrap().is_empty());
        assert!(NoteValues::from_json(json!([1, 2])).is_err());
    }
}
