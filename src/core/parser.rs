//! RG-002: Plan document parsing.
//!
//! Accepts the JSON form of a plan document (YAML is accepted as a fallback,
//! being a superset). Structure:
//! - Root object with zero or more `plan` blocks (object or list of objects)
//! - Plan keys: `description`, `inputs`, `task`
//! - Each task block is keyed by its type; `description` and
//!   `detailed_description` are reserved, every other key is an argument
//!
//! A key repeated within one object is a syntax error at every level. Tasks
//! of the same type given more than once must use the list form.

use super::error::ParseError;
use super::types::{Plan, Task, TaskArg, Value};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Map;
use std::fmt;
use std::path::Path;

type JsonValue = serde_json::Value;

const ROOT_KEYS: &[&str] = &["plan"];
const PLAN_KEYS: &[&str] = &["description", "inputs", "task"];

/// Parse a plan document from disk.
pub fn parse_plan_file(path: &Path) -> Result<Vec<Plan>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_plans(&content)
}

/// Parse a plan document from a string.
pub fn parse_plans(text: &str) -> Result<Vec<Plan>, ParseError> {
    let root = parse_document(text)?;
    let root = root
        .as_object()
        .ok_or_else(|| ParseError::NotAnObject("document root".to_string()))?;
    check_keys(root, ROOT_KEYS)?;

    let Some(plans) = root.get("plan") else {
        return Ok(Vec::new());
    };

    blocks(plans)
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            parse_plan(block).map_err(|e| ParseError::Plan {
                index: i + 1,
                source: Box::new(e),
            })
        })
        .collect()
}

fn parse_document(text: &str) -> Result<JsonValue, ParseError> {
    match serde_json::from_str::<Document>(text) {
        Ok(doc) => Ok(doc.0),
        Err(json_err) => serde_yaml_ng::from_str::<Document>(text)
            .map(|doc| doc.0)
            .map_err(|_| ParseError::Syntax(json_err.to_string())),
    }
}

// ============================================================================
// Document tree
// ============================================================================

/// A JSON tree that refuses repeated object keys instead of keeping the last.
struct Document(JsonValue);

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor).map(Document)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = JsonValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a plan document value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<JsonValue, E> {
        Ok(JsonValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonValue, E> {
        serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom(format!("unsupported number: {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<JsonValue, D::Error> {
        Document::deserialize(deserializer).map(|doc| doc.0)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JsonValue, A::Error> {
        let mut items = Vec::new();
        while let Some(Document(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<JsonValue, A::Error> {
        let mut obj = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            if obj.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key: {}", key)));
            }
            let Document(value) = map.next_value()?;
            obj.insert(key, value);
        }
        Ok(JsonValue::Object(obj))
    }
}

/// A block may be a single object or a list of objects.
fn blocks(value: &JsonValue) -> Vec<&JsonValue> {
    match value {
        JsonValue::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn check_keys(obj: &Map<String, JsonValue>, valid: &[&str]) -> Result<(), ParseError> {
    match obj.keys().find(|k| !valid.contains(&k.as_str())) {
        Some(key) => Err(ParseError::InvalidKey(key.clone())),
        None => Ok(()),
    }
}

fn parse_plan(block: &JsonValue) -> Result<Plan, ParseError> {
    let obj = block
        .as_object()
        .ok_or_else(|| ParseError::NotAnObject("plan".to_string()))?;
    check_keys(obj, PLAN_KEYS)?;

    let mut plan = Plan::default();

    if let Some(desc) = obj.get("description") {
        plan.description = text_field("description", desc)?;
    }

    if let Some(inputs) = obj.get("inputs") {
        let inputs = inputs
            .as_object()
            .ok_or_else(|| ParseError::NotAnObject("inputs".to_string()))?;
        for (k, v) in inputs {
            plan.inputs.insert(k.clone(), weak_text(k, v)?);
        }
    }

    if let Some(tasks) = obj.get("task") {
        plan.tasks = parse_tasks(tasks)?;
    }

    Ok(plan)
}

fn parse_tasks(value: &JsonValue) -> Result<Vec<Task>, ParseError> {
    let mut result = Vec::new();
    match value {
        // "task": {"store": {...}, "delete": {...}}
        JsonValue::Object(obj) => {
            for (task_type, body) in obj {
                let index = result.len() + 1;
                result.push(parse_task(task_type, body).map_err(|e| ParseError::Task {
                    index,
                    source: Box::new(e),
                })?);
            }
        }
        // "task": [{"store": {...}}, {"delete": {...}}]
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let wrap = |e: ParseError| ParseError::Task {
                    index: i + 1,
                    source: Box::new(e),
                };
                let obj = item
                    .as_object()
                    .ok_or_else(|| wrap(ParseError::NotAnObject("task".to_string())))?;
                if obj.len() != 1 {
                    return Err(wrap(ParseError::TaskKeys(obj.len())));
                }
                let Some((task_type, body)) = obj.iter().next() else {
                    continue;
                };
                result.push(parse_task(task_type, body).map_err(wrap)?);
            }
        }
        _ => return Err(ParseError::NotAnObject("task".to_string())),
    }
    Ok(result)
}

fn parse_task(task_type: &str, body: &JsonValue) -> Result<Task, ParseError> {
    let mut task = Task::new(task_type);

    let obj = match body {
        JsonValue::Null => return Ok(task),
        JsonValue::Object(obj) => obj,
        _ => return Err(ParseError::NotAnObject(format!("task \"{}\"", task_type))),
    };

    for (key, value) in obj {
        match key.as_str() {
            "description" => task.description = text_field(key, value)?,
            "detailed_description" => task.detailed_description = Some(text_field(key, value)?),
            _ => {
                task.args.insert(key.clone(), TaskArg::new(scalar(key, value)?));
            }
        }
    }

    Ok(task)
}

fn text_field(key: &str, value: &JsonValue) -> Result<String, ParseError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ParseError::InvalidValue {
            key: key.to_string(),
            expected: "a string",
        })
}

/// Inputs are text; numbers and booleans are coerced.
fn weak_text(key: &str, value: &JsonValue) -> Result<String, ParseError> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        _ => Err(ParseError::InvalidValue {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

fn scalar(key: &str, value: &JsonValue) -> Result<Value, ParseError> {
    match value {
        JsonValue::String(s) => Ok(Value::Text(s.clone())),
        JsonValue::Number(n) => Ok(Value::Number(n.clone())),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        _ => Err(ParseError::InvalidValue {
            key: key.to_string(),
            expected: "a string, number or boolean",
        }),
    }
}
