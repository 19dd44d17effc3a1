//! Recording task executor for tests.

use crate::core::error::TaskError;
use crate::core::executor::{ExecArgs, TaskExecutor};
use crate::core::types::{ExecResult, TaskArg, TaskResult, Value};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};

/// Returns canned results and records how it was called.
#[derive(Default)]
pub struct MockTask {
    validate_result: ExecResult,
    validate_error: Option<String>,
    execute_result: ExecResult,
    execute_error: Option<String>,
    output: Option<String>,

    validate_calls: Cell<usize>,
    execute_calls: Cell<usize>,
    validate_args: RefCell<Option<IndexMap<String, TaskArg>>>,
    execute_args: RefCell<Option<IndexMap<String, TaskArg>>>,
    extra: RefCell<Option<IndexMap<String, Value>>>,
}

impl MockTask {
    pub fn failing_validate(msg: &str) -> Self {
        Self {
            validate_error: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_execute(msg: &str) -> Self {
        Self {
            execute_error: Some(msg.to_string()),
            ..Self::default()
        }
    }

    /// Declare and produce `name` with `value`.
    pub fn with_execute_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = TaskResult::new(value);
        self.validate_result
            .values
            .insert(name.to_string(), value.clone());
        self.execute_result.values.insert(name.to_string(), value);
        self
    }

    /// Write `line` to the task output on every call.
    pub fn with_output(mut self, line: &str) -> Self {
        self.output = Some(line.to_string());
        self
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.get()
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.get()
    }

    pub fn last_validate_args(&self) -> Option<IndexMap<String, TaskArg>> {
        self.validate_args.borrow().clone()
    }

    pub fn last_execute_args(&self) -> Option<IndexMap<String, TaskArg>> {
        self.execute_args.borrow().clone()
    }

    pub fn last_extra(&self) -> Option<IndexMap<String, Value>> {
        self.extra.borrow().clone()
    }

    fn respond(
        &self,
        args: &mut ExecArgs<'_>,
        result: &ExecResult,
        error: &Option<String>,
    ) -> Result<ExecResult, TaskError> {
        *self.extra.borrow_mut() = Some(args.extra.clone());
        if let Some(ref line) = self.output {
            args.println(line)?;
        }
        match error {
            Some(msg) => Err(TaskError::Invalid(msg.clone())),
            None => Ok(result.clone()),
        }
    }
}

impl TaskExecutor for MockTask {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        self.validate_calls.set(self.validate_calls.get() + 1);
        *self.validate_args.borrow_mut() = Some(args.args.clone());
        self.respond(args, &self.validate_result, &self.validate_error)
    }

    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        self.execute_calls.set(self.execute_calls.get() + 1);
        *self.execute_args.borrow_mut() = Some(args.args.clone());
        self.respond(args, &self.execute_result, &self.execute_error)
    }
}
