//! RG-004: Plan document encoding.
//!
//! Inverse of the parser. Object keys are emitted in sorted order so the
//! output is stable: `encode(parse(text))` is a fixed point.

use super::types::{Plan, Task};
use serde_json::{Map, Value as JsonValue};

/// Encode plans as a pretty-printed JSON document.
pub fn encode_plans(plans: &[Plan]) -> String {
    let doc = plans_to_json(plans);
    // Serializing a Value built from strings, numbers and bools cannot fail.
    serde_json::to_string_pretty(&doc).unwrap_or_default()
}

/// Build the JSON document tree for a list of plans.
pub fn plans_to_json(plans: &[Plan]) -> JsonValue {
    let mut root = Map::new();
    if !plans.is_empty() {
        root.insert(
            "plan".to_string(),
            JsonValue::Array(plans.iter().map(plan_to_json).collect()),
        );
    }
    JsonValue::Object(root)
}

fn plan_to_json(plan: &Plan) -> JsonValue {
    let mut obj = Map::new();

    if !plan.description.is_empty() {
        obj.insert(
            "description".to_string(),
            JsonValue::String(plan.description.clone()),
        );
    }

    if !plan.inputs.is_empty() {
        let mut keys: Vec<&String> = plan.inputs.keys().collect();
        keys.sort();
        let inputs: Map<String, JsonValue> = keys
            .into_iter()
            .map(|k| (k.clone(), JsonValue::String(plan.inputs[k].clone())))
            .collect();
        obj.insert("inputs".to_string(), JsonValue::Object(inputs));
    }

    if !plan.tasks.is_empty() {
        obj.insert(
            "task".to_string(),
            JsonValue::Array(plan.tasks.iter().map(task_to_json).collect()),
        );
    }

    JsonValue::Object(obj)
}

fn task_to_json(task: &Task) -> JsonValue {
    let mut entries: Vec<(String, JsonValue)> = Vec::with_capacity(task.args.len() + 2);

    if !task.description.is_empty() {
        entries.push((
            "description".to_string(),
            JsonValue::String(task.description.clone()),
        ));
    }
    if let Some(ref detail) = task.detailed_description {
        entries.push((
            "detailed_description".to_string(),
            JsonValue::String(detail.clone()),
        ));
    }
    for (name, arg) in &task.args {
        let value = serde_json::to_value(&arg.value).unwrap_or(JsonValue::Null);
        entries.push((name.clone(), value));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let body: Map<String, JsonValue> = entries.into_iter().collect();
    let mut wrapper = Map::new();
    wrapper.insert(task.task_type.clone(), JsonValue::Object(body));
    JsonValue::Object(wrapper)
}
