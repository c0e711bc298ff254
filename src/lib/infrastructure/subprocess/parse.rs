use crate::domain::CanonicalError;
use serde_json::{Map, Value};

const NOT_FOUND_MARKERS: &[&str] = &["not found", "does not exist", "no such"];
const CONFLICT_MARKERS: &[&str] = &["already exists", "already installed"];
const CONNECTION_MARKERS: &[&str] = &[
    "connection refused",
    "failed to connect",
    "unavailable",
    "deadline exceeded",
    "no route to host",
    "tls handshake",
];

/// Parses stdout of a JSON-emitting command. Empty output is `null`.
pub fn parse_json(label: &str, stdout: &str) -> Result<Value, CanonicalError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed)
        .or_else(|_| parse_trailing_json(trimmed))
        .map_err(|err| {
            CanonicalError::internal(format!("rnx {label} produced malformed JSON: {err}"))
                .with_detail(stdout)
        })
}

/// Some rnx builds print banner lines before the JSON document. The document
/// starts at the first line opening with `{` or `[` that parses to the end.
fn parse_trailing_json(text: &str) -> Result<Value, serde_json::Error> {
    let mut first_error = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset + (line.len() - line.trim_start().len());
        offset += line.len();
        if !line.trim_start().starts_with(['{', '[']) {
            continue;
        }
        match serde_json::from_str(&text[start..]) {
            Ok(value) => return Ok(value),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => serde_json::from_str(text),
    }
}

/// Line-oriented output: `key: value` pairs, a column table, or plain lines.
pub fn parse_text(stdout: &str) -> Value {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return Value::Object(Map::new());
    }
    if let Some(table) = parse_table(&lines) {
        return table;
    }
    if let Some(pairs) = parse_pairs(&lines) {
        return pairs;
    }
    let lines = lines
        .iter()
        .map(|line| Value::String(line.trim().to_string()))
        .collect();
    let mut map = Map::new();
    map.insert("lines".to_string(), Value::Array(lines));
    Value::Object(map)
}

fn parse_pairs(lines: &[&str]) -> Option<Value> {
    let mut map = Map::new();
    for line in lines {
        let (key, value) = line.split_once(':')?;
        let key = key.trim();
        if key.is_empty() || key.contains("  ") {
            return None;
        }
        map.insert(normalise_key(key), Value::String(value.trim().to_string()));
    }
    Some(Value::Object(map))
}

fn parse_table(lines: &[&str]) -> Option<Value> {
    let header = columns(lines[0]);
    let is_header = header.len() >= 2
        && header
            .iter()
            .all(|column| column.chars().all(|c| !c.is_ascii_lowercase()));
    if !is_header || lines.len() < 2 {
        return None;
    }
    let keys: Vec<String> = header.iter().map(|column| normalise_key(column)).collect();

    let rows = lines[1..]
        .iter()
        .filter(|line| !line.trim_start().starts_with("---"))
        .map(|line| {
            let mut cells = columns(line);
            if cells.len() > keys.len() {
                let rest = cells.split_off(keys.len() - 1).join("  ");
                cells.push(rest);
            }
            let row: Map<String, Value> = keys
                .iter()
                .zip(cells.into_iter().chain(std::iter::repeat(String::new())))
                .map(|(key, cell)| (key.clone(), Value::String(cell)))
                .collect();
            Value::Object(row)
        })
        .collect();
    Some(Value::Array(rows))
}

/// Splits on runs of two or more spaces, the separator rnx tables use.
fn columns(line: &str) -> Vec<String> {
    line.trim()
        .split("  ")
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalise_key(key: &str) -> String {
    key.trim()
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Canonical error for a non-zero exit, classified from stderr.
///
/// The message names the command, the condition and the exit status only;
/// the raw process output is kept in `original_detail`.
pub fn classify_failure(label: &str, code: Option<i32>, stderr: &str, stdout: &str) -> CanonicalError {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let lowered = text.to_ascii_lowercase();
    let status = match code {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    };

    let error = if contains_any(&lowered, CONFLICT_MARKERS) {
        CanonicalError::conflict(format!("rnx {label} failed: resource already exists ({status})"))
    } else if contains_any(&lowered, NOT_FOUND_MARKERS) {
        CanonicalError::not_found(format!("rnx {label} failed: resource not found ({status})"))
    } else if contains_any(&lowered, CONNECTION_MARKERS) {
        CanonicalError::connection(format!(
            "rnx {label} failed: joblet node unreachable ({status})"
        ))
    } else {
        CanonicalError::backend_process(format!("rnx {label} failed ({status})"))
    };
    error.with_detail(text)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
