use crate::domain::CanonicalError;
use serde_json::{Map, Number, Value, json};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    StringList,
    StringMap,
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::Boolean => "a boolean",
            FieldKind::StringList => "an array of strings",
            FieldKind::StringMap => "an object of string values",
        }
    }
}

/// One declared tool argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: &'static [&'static str],
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: None,
            choices: &[],
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Integer, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, description)
    }

    pub fn string_list(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::StringList, description)
    }

    pub fn string_map(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::StringMap, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    pub fn range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn at_least(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = match self.kind {
            FieldKind::String => json!({ "type": "string" }),
            FieldKind::Integer => json!({ "type": "integer" }),
            FieldKind::Boolean => json!({ "type": "boolean" }),
            FieldKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldKind::StringMap => {
                json!({ "type": "object", "additionalProperties": { "type": "string" } })
            }
        };
        if let Value::Object(map) = &mut schema {
            map.insert("description".into(), Value::String(self.description.into()));
            if !self.choices.is_empty() {
                map.insert("enum".into(), json!(self.choices));
            }
            if let Some(minimum) = self.minimum {
                map.insert("minimum".into(), json!(minimum));
            }
            if let Some(maximum) = self.maximum {
                map.insert("maximum".into(), json!(maximum));
            }
            if let Some(default) = &self.default {
                map.insert("default".into(), default.clone());
            }
        }
        schema
    }

    fn check(&self, value: &Value) -> Result<Value, CanonicalError> {
        let checked = match self.kind {
            FieldKind::String => {
                let text = value.as_str().ok_or_else(|| self.type_error())?;
                if self.required && text.trim().is_empty() {
                    return Err(CanonicalError::validation(format!(
                        "argument '{}' must not be empty",
                        self.name
                    )));
                }
                if !self.choices.is_empty() && !self.choices.contains(&text) {
                    return Err(CanonicalError::validation(format!(
                        "argument '{}' must be one of: {}",
                        self.name,
                        self.choices.join(", ")
                    )));
                }
                Value::String(text.to_string())
            }
            FieldKind::Integer => {
                let number = as_integer(value).ok_or_else(|| self.type_error())?;
                self.check_range(number)?;
                Value::Number(Number::from(number))
            }
            FieldKind::Boolean => Value::Bool(value.as_bool().ok_or_else(|| self.type_error())?),
            FieldKind::StringList => {
                let items = value.as_array().ok_or_else(|| self.type_error())?;
                if !items.iter().all(Value::is_string) {
                    return Err(self.type_error());
                }
                value.clone()
            }
            FieldKind::StringMap => {
                let entries = value.as_object().ok_or_else(|| self.type_error())?;
                if !entries.values().all(Value::is_string) {
                    return Err(self.type_error());
                }
                value.clone()
            }
        };
        Ok(checked)
    }

    fn check_range(&self, number: i64) -> Result<(), CanonicalError> {
        let below = self.minimum.is_some_and(|minimum| number < minimum);
        let above = self.maximum.is_some_and(|maximum| number > maximum);
        if !below && !above {
            return Ok(());
        }
        let message = match (self.minimum, self.maximum) {
            (Some(minimum), Some(maximum)) => format!(
                "argument '{}' must be between {minimum} and {maximum}, got {number}",
                self.name
            ),
            (Some(minimum), None) => {
                format!("argument '{}' must be at least {minimum}, got {number}", self.name)
            }
            (None, Some(maximum)) => {
                format!("argument '{}' must be at most {maximum}, got {number}", self.name)
            }
            (None, None) => format!("argument '{}' is out of range", self.name),
        };
        Err(CanonicalError::validation(message))
    }

    fn type_error(&self) -> CanonicalError {
        CanonicalError::validation(format!(
            "argument '{}' must be {}",
            self.name,
            self.kind.describe()
        ))
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    let float = value.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

/// Declared argument set of one tool.
///
/// Undeclared arguments are dropped unless the schema forbids them, so older
/// servers keep working with newer clients.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
    allow_extra: bool,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InputSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            allow_extra: true,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Rejects arguments the schema does not declare.
    pub fn forbid_extra(mut self) -> Self {
        self.allow_extra = false;
        self
    }

    pub fn allows_extra(&self) -> bool {
        self.allow_extra
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.to_string(), field.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
            .collect();
        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if !self.allow_extra {
            schema["additionalProperties"] = Value::Bool(false);
        }
        schema
    }

    /// Checks presence, types, ranges and choices, then fills declared defaults.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<ValidatedArgs, CanonicalError> {
        let mut unknown = arguments
            .keys()
            .filter(|key| !self.fields.iter().any(|field| field.name == key.as_str()));
        if !self.allow_extra {
            if let Some(unknown) = unknown.next() {
                return Err(CanonicalError::validation(format!(
                    "unexpected argument '{unknown}'"
                )));
            }
        } else {
            let ignored: Vec<&String> = unknown.collect();
            if !ignored.is_empty() {
                debug!(?ignored, "Ignoring undeclared arguments");
            }
        }

        let mut values = Map::new();
        for field in &self.fields {
            match arguments.get(field.name).filter(|value| !value.is_null()) {
                Some(value) => {
                    values.insert(field.name.to_string(), field.check(value)?);
                }
                None if field.required => {
                    return Err(CanonicalError::validation(format!(
                        "missing required argument '{}'",
                        field.name
                    )));
                }
                None => {
                    if let Some(default) = &field.default {
                        values.insert(field.name.to_string(), default.clone());
                    }
                }
            }
        }
        Ok(ValidatedArgs { values })
    }
}

/// Arguments that passed schema validation, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArgs {
    values: Map<String, Value>,
}

impl ValidatedArgs {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.str(name).map(str::to_string)
    }

    pub fn required_str(&self, name: &str) -> Result<&str, CanonicalError> {
        self.str(name).ok_or_else(|| {
            CanonicalError::validation(format!("missing required argument '{name}'"))
        })
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(Value::as_u64)
    }

    pub fn bool(&self, name: &str) -> bool {
        self.values.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn string_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn string_map(&self, name: &str) -> BTreeMap<String, String> {
        self.values
            .get(name)
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}
