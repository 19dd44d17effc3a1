//! `delete`: remove a named value from the run's store.

use crate::core::error::TaskError;
use crate::core::executor::{ExecArgs, TaskExecutor};
use crate::core::types::ExecResult;

/// Removes the store entry named by its single `key` argument.
///
/// The key must be a literal string. Interpolated keys are rejected so a
/// deletion always names a concrete entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteTask;

impl DeleteTask {
    fn key(args: &ExecArgs<'_>) -> Result<String, TaskError> {
        let arg = match args.arg("key") {
            Some(arg) if args.args.len() == 1 => arg,
            _ => {
                return Err(TaskError::Invalid(
                    "exactly one arg 'key' should be given".to_string(),
                ))
            }
        };
        if !arg.refs().is_empty() {
            return Err(TaskError::Invalid(
                "key can't contain interpolations".to_string(),
            ));
        }
        arg.value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TaskError::Invalid("key must be a string".to_string()))
    }

    fn removal(args: &ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        Ok(ExecResult {
            removed: vec![Self::key(args)?],
            ..ExecResult::default()
        })
    }
}

impl TaskExecutor for DeleteTask {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        Self::removal(args)
    }

    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        Self::removal(args)
    }
}
