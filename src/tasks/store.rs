//! `store`: reserve named values in the run's store.

use crate::core::error::TaskError;
use crate::core::executor::{ExecArgs, TaskExecutor};
use crate::core::types::{ExecResult, TaskResult};

/// Declares every argument name as a store entry.
///
/// Only validation has an effect: each name becomes resolvable by later
/// tasks' references. Execution places nothing in the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreTask;

impl TaskExecutor for StoreTask {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        let mut result = ExecResult::default();
        for name in args.args.keys() {
            result.values.insert(name.clone(), TaskResult::new(""));
        }
        Ok(result)
    }

    fn execute(&self, _args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        Ok(ExecResult::default())
    }
}
