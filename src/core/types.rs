//! RG-001: Plan model types.
//!
//! A plan is an ordered list of tasks. Task arguments are scalar values that
//! may carry `${name}` interpolation references to values produced by earlier
//! tasks. Those values live in the run's store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::TaskError;
use super::resolver;

// ============================================================================
// Plans and tasks
// ============================================================================

/// An executable goal: a description plus the tasks that achieve it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Human-readable description
    pub description: String,

    /// Named inputs, visible to tasks as `input.<name>`
    pub inputs: IndexMap<String, String>,

    /// Tasks in declaration (and execution) order
    pub tasks: Vec<Task>,
}

/// A single step of a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    /// Type tag selecting the executor
    pub task_type: String,

    /// Arguments by name
    pub args: IndexMap<String, TaskArg>,

    /// Short description of what this task will do
    pub description: String,

    /// Long-form details (optional)
    pub detailed_description: Option<String>,
}

impl Task {
    /// Create a task with no arguments.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Self::default()
        }
    }

    /// Builder-style argument insertion.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), TaskArg::new(value));
        self
    }
}

// ============================================================================
// Values
// ============================================================================

/// A dynamically-typed scalar. Nested structures are not supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl Value {
    /// Name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&serde_json::Number> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

// ============================================================================
// Arguments and results
// ============================================================================

/// A task argument. Text values may contain interpolation references.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskArg {
    pub value: Value,
}

impl TaskArg {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Interpolation references in declaration order, de-duplicated.
    /// Non-text values have none.
    pub fn refs(&self) -> Vec<String> {
        match &self.value {
            Value::Text(s) => resolver::extract_refs(s),
            _ => Vec::new(),
        }
    }

    /// Borrow the value as text, failing with a type mismatch naming `name`.
    pub fn as_text(&self, name: &str) -> Result<&str, TaskError> {
        self.value.as_str().ok_or_else(|| TaskError::TypeMismatch {
            arg: name.to_string(),
            expected: "string",
            found: self.value.kind(),
        })
    }
}

/// A value produced by a task and placed into the run's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub value: Value,
}

impl TaskResult {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// The per-run mapping of names to produced values.
pub type Store = IndexMap<String, TaskResult>;

/// What a task contributes to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    /// Values added to (or replaced in) the store
    pub values: IndexMap<String, TaskResult>,

    /// Names removed from the store
    pub removed: Vec<String>,
}

impl ExecResult {
    /// Apply this result to a store: insertions first, then removals.
    pub fn apply_to(&self, store: &mut Store) {
        for (name, value) in &self.values {
            store.insert(name.clone(), value.clone());
        }
        for name in &self.removed {
            store.shift_remove(name);
        }
    }
}

// ============================================================================
// Execution events
// ============================================================================

/// Progress events emitted during plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecuteEvent {
    RunStarted {
        description: String,
        task_count: usize,
    },
    TaskStarted {
        index: usize,
        task_type: String,
    },
    TaskCompleted {
        index: usize,
        task_type: String,
        duration_seconds: f64,
    },
    TaskFailed {
        index: usize,
        task_type: String,
        error: String,
    },
    RunCompleted {
        tasks_run: usize,
        total_seconds: f64,
    },
}
