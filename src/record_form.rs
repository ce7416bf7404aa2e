//! Headless form state for creating or editing one record.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use crate::app_response::{AppResponse, AppResult};
use crate::local_db_model::FieldMap;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { id: String },
}

#[derive(Debug, Clone)]
pub struct RecordForm {
    schema: &'static Schema,
    mode: FormMode,
    draft: FieldMap,
}

impl RecordForm {
    pub fn new(schema: &'static Schema, initial: Option<FieldMap>, today: NaiveDate) -> Self {
        let mut form = Self {
            schema,
            mode: FormMode::Create,
            draft: FieldMap::new(),
        };
        form.reset(schema, initial, today);
        form
    }

    /// Draft becomes: schema defaults, then today's `date`, then `initial`
    /// on top. An `initial` carrying a non-empty `id` puts the form in edit
    /// mode.
    pub fn reset(&mut self, schema: &'static Schema, initial: Option<FieldMap>, today: NaiveDate) {
        let mut draft = schema.default_values();
        draft.insert(
            "date".to_string(),
            JsonValue::String(today.format("%Y-%m-%d").to_string()),
        );

        let mut mode = FormMode::Create;
        if let Some(initial) = initial {
            if let Some(JsonValue::String(id)) = initial.get("id") {
                if !id.is_empty() {
                    mode = FormMode::Edit { id: id.clone() };
                }
            }
            draft.extend(initial);
        }

        self.schema = schema;
        self.mode = mode;
        self.draft = draft;
    }

    /// Back to create mode with a fresh draft.
    pub fn cancel(&mut self, today: NaiveDate) {
        self.reset(self.schema, None, today);
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn editing_id(&self) -> Option<&str> {
        match &self.mode {
            FormMode::Edit { id } => Some(id.as_str()),
            FormMode::Create => None,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing_id().is_some()
    }

    pub fn draft(&self) -> &FieldMap {
        &self.draft
    }

    pub fn value(&self, name: &str) -> Option<&JsonValue> {
        self.draft.get(name)
    }

    pub fn set_value(&mut self, name: &str, value: JsonValue) {
        self.draft.insert(name.to_string(), value);
    }

    /// Stores raw widget text, coerced by the field's kind.
    pub fn set_input(&mut self, name: &str, raw: &str) -> AppResult<()> {
        let field = self.schema.field(name).ok_or_else(|| {
            AppResponse::BadRequest(format!("{} has no field named {name}", self.schema.title))
        })?;
        self.draft.insert(name.to_string(), field.kind.coerce_input(raw));
        Ok(())
    }

    /// Validates the draft and hands back a copy of it.
    pub fn submit(&self) -> AppResult<FieldMap> {
        self.schema
            .validate(&self.draft)
            .map_err(AppResponse::ValidationError)?;
        Ok(self.draft.clone())
    }
}
