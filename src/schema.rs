//! Static schema registry.
//!
//! Every collection the tracker knows about is declared here as plain data:
//! a title, an ordered field list and optional default values. Renderers and
//! the [`RecordForm`](crate::record_form::RecordForm) read these tables; nothing
//! here is persisted.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};

/// Input behaviour of a field. Each kind owns its coercion and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Time,
    Select { options: &'static [&'static str] },
    Textarea,
    Checkbox,
}

impl FieldKind {
    /// Name of the native input a renderer should use.
    pub fn input_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Select { .. } => "select",
            FieldKind::Textarea => "textarea",
            FieldKind::Checkbox => "checkbox",
        }
    }

    pub fn options(&self) -> &'static [&'static str] {
        match self {
            FieldKind::Select { options } => *options,
            _ => &[],
        }
    }

    /// Converts raw widget text into the value stored in a draft.
    ///
    /// Empty input becomes `null` for numbers; unparsable numbers are kept as
    /// text so [`FieldKind::validate`] can reject them on submit.
    pub fn coerce_input(&self, raw: &str) -> JsonValue {
        match self {
            FieldKind::Number => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return JsonValue::Null;
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(number_value)
                    .unwrap_or_else(|| JsonValue::String(raw.to_string()))
            }
            FieldKind::Checkbox => {
                let lowered = raw.trim().to_ascii_lowercase();
                JsonValue::Bool(matches!(lowered.as_str(), "true" | "on" | "1" | "yes"))
            }
            _ => JsonValue::String(raw.to_string()),
        }
    }

    /// `null` is accepted for every kind: all fields are optional.
    pub fn validate(&self, value: &JsonValue) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            FieldKind::Text | FieldKind::Textarea => match value {
                JsonValue::String(_) => Ok(()),
                other => Err(format!("expected text, got {other}")),
            },
            FieldKind::Number => match value.as_f64() {
                Some(n) if n.is_finite() => Ok(()),
                _ => Err(format!("expected a number, got {value}")),
            },
            FieldKind::Date => match value.as_str() {
                Some("") => Ok(()),
                Some(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => Ok(()),
                _ => Err(format!("expected a YYYY-MM-DD date, got {value}")),
            },
            FieldKind::Time => match value.as_str() {
                Some("") => Ok(()),
                Some(s)
                    if NaiveTime::parse_from_str(s, "%H:%M").is_ok()
                        || NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok() =>
                {
                    Ok(())
                }
                _ => Err(format!("expected an HH:MM time, got {value}")),
            },
            FieldKind::Select { options } => match value.as_str() {
                Some("") => Ok(()),
                Some(s) if options.iter().any(|o| *o == s) => Ok(()),
                _ => Err(format!("{value} is not one of {options:?}")),
            },
            FieldKind::Checkbox => match value {
                JsonValue::Bool(_) => Ok(()),
                other => Err(format!("expected true or false, got {other}")),
            },
        }
    }
}

fn number_value(n: f64) -> Option<JsonValue> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(JsonValue::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(JsonValue::Number)
}

/// A default value that can live in a `static` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Text(&'static str),
    Number(f64),
    Bool(bool),
}

impl DefaultValue {
    pub fn to_json(self) -> JsonValue {
        match self {
            DefaultValue::Text(s) => JsonValue::String(s.to_string()),
            DefaultValue::Number(n) => number_value(n).unwrap_or(JsonValue::Null),
            DefaultValue::Bool(b) => JsonValue::Bool(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            placeholder: None,
        }
    }

    pub const fn with_placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = Some(placeholder);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Schema {
    pub collection: &'static str,
    pub title: &'static str,
    pub fields: &'static [FieldDef],
    pub defaults: &'static [(&'static str, DefaultValue)],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn default_values(&self) -> Map<String, JsonValue> {
        self.defaults
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }

    /// Checks every schema field present in `values`. Unknown keys pass
    /// through untouched.
    pub fn validate(&self, values: &Map<String, JsonValue>) -> Result<(), String> {
        for field in self.fields {
            if let Some(value) = values.get(field.name) {
                field
                    .kind
                    .validate(value)
                    .map_err(|e| format!("{}: {}", field.label, e))?;
            }
        }
        Ok(())
    }
}

const DATE: FieldDef = FieldDef::new("date", "Date", FieldKind::Date);
const NOTES: FieldDef = FieldDef::new("notes", "Notes", FieldKind::Textarea);

pub static SCHEMAS: [Schema; 12] = [
    Schema {
        collection: "mood",
        title: "Mood",
        fields: &[
            DATE,
            FieldDef::new("rating", "Rating (1-10)", FieldKind::Number),
            FieldDef::new("tags", "Tags (comma-separated)", FieldKind::Text)
                .with_placeholder("anxious, focused"),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "sleep",
        title: "Sleep",
        fields: &[
            DATE,
            FieldDef::new("bedtime", "Bedtime", FieldKind::Time),
            FieldDef::new("waketime", "Wake time", FieldKind::Time),
            FieldDef::new("durationHours", "Duration (hours)", FieldKind::Number),
            FieldDef::new("quality", "Quality (1-10)", FieldKind::Number),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "fluid",
        title: "Fluid",
        fields: &[
            DATE,
            FieldDef::new("waterMl", "Water (ml)", FieldKind::Number),
            FieldDef::new("caffeineMl", "Caffeine (ml)", FieldKind::Number),
            FieldDef::new("alcoholUnits", "Alcohol (units)", FieldKind::Number),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "food",
        title: "Food",
        fields: &[
            DATE,
            FieldDef::new(
                "mealType",
                "Meal Type",
                FieldKind::Select {
                    options: &["Breakfast", "Lunch", "Dinner", "Snack"],
                },
            ),
            FieldDef::new("description", "Description", FieldKind::Text),
            FieldDef::new("calories", "Calories", FieldKind::Number),
            FieldDef::new("proteinG", "Protein (g)", FieldKind::Number),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "urine",
        title: "Urine",
        fields: &[
            DATE,
            FieldDef::new(
                "color",
                "Color",
                FieldKind::Select {
                    options: &["Clear", "Pale", "Yellow", "Dark Yellow", "Amber"],
                },
            ),
            FieldDef::new(
                "clarity",
                "Clarity",
                FieldKind::Select {
                    options: &["Clear", "Slightly Cloudy", "Cloudy"],
                },
            ),
            FieldDef::new("frequency", "Frequency (per day)", FieldKind::Number),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "stool",
        title: "Stool",
        fields: &[
            DATE,
            FieldDef::new("bristol", "Bristol Scale (1-7)", FieldKind::Number),
            FieldDef::new("blood", "Blood present", FieldKind::Checkbox),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "journal",
        title: "Journal",
        fields: &[
            DATE,
            FieldDef::new("title", "Title", FieldKind::Text),
            FieldDef::new("content", "Content", FieldKind::Textarea),
        ],
        defaults: &[],
    },
    Schema {
        collection: "bloodTest",
        title: "Blood Test",
        fields: &[
            DATE,
            FieldDef::new("test", "Test Name", FieldKind::Text),
            FieldDef::new("value", "Value", FieldKind::Number),
            FieldDef::new("unit", "Unit", FieldKind::Text),
            FieldDef::new("refRange", "Reference Range", FieldKind::Text),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "measurements",
        title: "Measurements",
        fields: &[
            DATE,
            FieldDef::new("weightKg", "Weight (kg)", FieldKind::Number),
            FieldDef::new("bodyFatPct", "Body Fat (%)", FieldKind::Number),
            FieldDef::new("waistCm", "Waist (cm)", FieldKind::Number),
            FieldDef::new("bpSys", "BP Systolic", FieldKind::Number),
            FieldDef::new("bpDia", "BP Diastolic", FieldKind::Number),
            FieldDef::new("hrBpm", "Heart Rate (bpm)", FieldKind::Number),
        ],
        defaults: &[],
    },
    Schema {
        collection: "metrics",
        title: "Custom Metrics",
        fields: &[
            DATE,
            FieldDef::new("name", "Metric Name", FieldKind::Text),
            FieldDef::new("value", "Value", FieldKind::Number),
            FieldDef::new("unit", "Unit", FieldKind::Text),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "pain",
        title: "Pain",
        fields: &[
            DATE,
            FieldDef::new("location", "Location", FieldKind::Text),
            FieldDef::new("intensity", "Intensity (0-10)", FieldKind::Number),
            FieldDef::new("durationMin", "Duration (minutes)", FieldKind::Number),
            FieldDef::new("triggers", "Triggers", FieldKind::Text),
            NOTES,
        ],
        defaults: &[],
    },
    Schema {
        collection: "healthlensScore",
        title: "Healthlens Score",
        fields: &[
            DATE,
            FieldDef::new("score", "Score (0-100)", FieldKind::Number),
            NOTES,
        ],
        defaults: &[],
    },
];

pub fn schema(collection: &str) -> Option<&'static Schema> {
    SCHEMAS.iter().find(|s| s.collection == collection)
}

pub fn collection_keys() -> impl Iterator<Item = &'static str> {
    SCHEMAS.iter().map(|s| s.collection)
}
