//! Table projection of a record set: one row per record, one cell per column,
//! plus the edit/delete actions a renderer wires to its buttons.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use crate::clock::parse_timestamp;
use crate::local_db_model::StoredRecord;
use crate::schema::{FieldKind, Schema};

pub const EMPTY_MESSAGE: &str = "No records yet.";
pub const ACTIONS_LABEL: &str = "Actions";

const MAX_FIELD_COLUMNS: usize = 4;

pub type Formatter = Box<dyn Fn(Option<&JsonValue>) -> String + Send + Sync>;

pub struct Column {
    pub key: String,
    pub label: String,
    formatter: Formatter,
}

impl Column {
    /// Column rendered with [`display_value`].
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_formatter(key, label, Box::new(display_value))
    }

    pub fn with_formatter(key: impl Into<String>, label: impl Into<String>, formatter: Formatter) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            formatter,
        }
    }

    pub fn render(&self, value: Option<&JsonValue>) -> String {
        (self.formatter)(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    Edit(String),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub cells: Vec<String>,
}

impl ListRow {
    pub fn edit(&self) -> ListAction {
        ListAction::Edit(self.id.clone())
    }

    pub fn delete(&self) -> ListAction {
        ListAction::Delete(self.id.clone())
    }
}

pub struct RecordList {
    columns: Vec<Column>,
}

impl RecordList {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// A formatted date column followed by up to four other fields, skipping
    /// notes and multi-line text.
    pub fn for_schema(schema: &Schema) -> Self {
        let mut columns = vec![Column::with_formatter("date", "Date", Box::new(pretty_date))];
        columns.extend(
            schema
                .fields
                .iter()
                .filter(|f| f.name != "date" && f.name != "notes" && f.kind != FieldKind::Textarea)
                .take(MAX_FIELD_COLUMNS)
                .map(|f| Column::new(f.name, f.label)),
        );
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column labels followed by the actions header.
    pub fn headers(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.label.as_str())
            .chain(std::iter::once(ACTIONS_LABEL))
            .collect()
    }

    pub fn rows<R: StoredRecord>(&self, records: &[R]) -> Vec<ListRow> {
        records
            .iter()
            .map(|record| ListRow {
                id: record.id().to_string(),
                cells: self
                    .columns
                    .iter()
                    .map(|c| c.render(record.field(&c.key)))
                    .collect(),
            })
            .collect()
    }
}

/// Strings as-is, `null`/missing as empty, anything else as JSON text.
pub fn display_value(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `2024-01-05` and full timestamps render as `5 Jan 2024`; anything
/// unparsable is shown verbatim.
pub fn pretty_date(value: Option<&JsonValue>) -> String {
    let raw = match value {
        Some(JsonValue::String(s)) if !s.is_empty() => s,
        _ => return display_value(value),
    };

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()));

    match date {
        Some(date) => date.format("%-d %b %Y").to_string(),
        None => raw.clone(),
    }
}
