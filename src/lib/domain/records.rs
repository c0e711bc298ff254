//! Normalisation of backend payloads into the shared record shapes.
//!
//! Both adapters feed raw JSON through these helpers so the same logical
//! operation yields structurally equivalent results regardless of transport.

use super::error::CanonicalError;
use super::result::{CanonicalResult, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const JOB_ID_ALIASES: &[&str] = &["id", "job_uuid", "job_id"];
const NAME_ALIASES: &[&str] = &["id", "runtime", "volume", "network", "node"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Volumes, networks, runtimes and nodes share this shape; type-specific fields stay in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn job_list(raw: Value) -> ToolOutcome {
    let items = extract_list(raw, "jobs")?;
    let jobs = items
        .into_iter()
        .map(job_from_value)
        .collect::<Result<Vec<_>, _>>()?;
    let count = jobs.len();
    Ok(CanonicalResult::new(json!({ "jobs": jobs, "count": count })))
}

pub fn job_record(raw: Value) -> ToolOutcome {
    let raw = unwrap_single(raw, "job");
    let job = job_from_value(raw)?;
    Ok(CanonicalResult::new(to_value(&job)?))
}

/// Acknowledgement for state-changing job operations; backend chatter is not carried over.
pub fn job_action(job_uuid: &str, action: &str) -> CanonicalResult {
    CanonicalResult::new(json!({ "job_uuid": job_uuid, "action": action }))
        .with_summary(format!("job {job_uuid} {action}"))
}

pub fn named_list(raw: Value, key: &str) -> ToolOutcome {
    let items = extract_list(raw, key)?;
    let records = items
        .into_iter()
        .map(named_from_value)
        .collect::<Result<Vec<_>, _>>()?;
    let count = records.len();
    let mut data = Map::new();
    data.insert(key.to_string(), to_value(&records)?);
    data.insert("count".to_string(), json!(count));
    Ok(CanonicalResult::new(Value::Object(data)))
}

pub fn named_record(raw: Value, singular: &str) -> ToolOutcome {
    let raw = unwrap_single(raw, singular);
    let record = named_from_value(raw)?;
    Ok(CanonicalResult::new(to_value(&record)?))
}

pub fn named_action(kind: &str, name: &str, action: &str) -> CanonicalResult {
    let mut data = Map::new();
    data.insert(kind.to_string(), Value::String(name.to_string()));
    data.insert("action".to_string(), Value::String(action.to_string()));
    CanonicalResult::new(Value::Object(data))
        .with_summary(format!("{kind} {name} {action}"))
}

/// Free-form status documents. Arrays are wrapped under `list_key`.
pub fn snapshot(raw: Value, list_key: &str) -> ToolOutcome {
    match canonical_keys(raw) {
        Value::Object(map) => Ok(CanonicalResult::new(Value::Object(map))),
        Value::Array(items) => {
            let mut data = Map::new();
            data.insert(list_key.to_string(), Value::Array(items));
            Ok(CanonicalResult::new(Value::Object(data)))
        }
        other => Err(CanonicalError::internal(format!(
            "expected an object or array for {list_key}, got {}",
            kind_of(&other)
        ))
        .with_detail(other.to_string())),
    }
}

/// Identifiers of every job in a `job_list` payload.
pub fn job_ids(data: &Value) -> Vec<String> {
    data.get("jobs")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .filter_map(|job| job.get("uuid").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrites object keys to snake_case, recursively.
pub fn canonical_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (snake_case(&key), canonical_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_keys).collect()),
        other => other,
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut previous_lower = false;
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if previous_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            previous_lower = false;
        } else if ch == '-' || ch == ' ' {
            out.push('_');
            previous_lower = false;
        } else {
            out.push(ch);
            previous_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

fn job_from_value(raw: Value) -> Result<JobRecord, CanonicalError> {
    let mut map = expect_object(canonical_keys(raw), "job")?;
    promote_key(&mut map, "uuid", JOB_ID_ALIASES);
    if !map.get("uuid").is_some_and(Value::is_string) {
        return Err(CanonicalError::internal("job record is missing its uuid")
            .with_detail(Value::Object(map).to_string()));
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|err| CanonicalError::internal(format!("malformed job record: {err}")))
}

fn named_from_value(raw: Value) -> Result<NamedRecord, CanonicalError> {
    let mut map = match canonical_keys(raw) {
        Value::String(name) => {
            let mut map = Map::new();
            map.insert("name".to_string(), Value::String(name));
            map
        }
        other => expect_object(other, "record")?,
    };
    promote_key(&mut map, "name", NAME_ALIASES);
    if !map.get("name").is_some_and(Value::is_string) {
        return Err(CanonicalError::internal("record is missing its name")
            .with_detail(Value::Object(map).to_string()));
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|err| CanonicalError::internal(format!("malformed record: {err}")))
}

fn promote_key(map: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    if map.contains_key(canonical) {
        return;
    }
    for alias in aliases {
        if let Some(value) = map.remove(*alias) {
            map.insert(canonical.to_string(), value);
            return;
        }
    }
}

fn extract_list(raw: Value, key: &str) -> Result<Vec<Value>, CanonicalError> {
    match raw {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(CanonicalError::internal(format!(
                "expected '{key}' to be an array, got {}",
                kind_of(&other)
            ))),
            None => Err(CanonicalError::internal(format!("response has no '{key}' list"))
                .with_detail(Value::Object(map).to_string())),
        },
        other => Err(CanonicalError::internal(format!(
            "expected a list of {key}, got {}",
            kind_of(&other)
        ))
        .with_detail(other.to_string())),
    }
}

fn unwrap_single(raw: Value, key: &str) -> Value {
    match raw {
        Value::Object(mut map) if map.len() == 1 && map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn expect_object(value: Value, what: &str) -> Result<Map<String, Value>, CanonicalError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CanonicalError::internal(format!(
            "expected {what} object, got {}",
            kind_of(&other)
        ))
        .with_detail(other.to_string())),
    }
}

fn to_value<T: Serialize>(record: &T) -> Result<Value, CanonicalError> {
    serde_json::to_value(record)
        .map_err(|err| CanonicalError::internal(format!("failed to encode record: {err}")))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
