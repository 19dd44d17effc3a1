//! RG-007: Error taxonomy for parsing, validation, execution and tasks.

use crate::directory::DirectoryError;
use std::path::PathBuf;
use thiserror::Error;

/// Plan document parse failure. The first error wins.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing: {0}")]
    Syntax(String),

    #[error("error parsing: {0} must be an object")]
    NotAnObject(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("needs exactly 1 key, found {0}")]
    TaskKeys(usize),

    #[error("{key}: expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("plan {index}: {source}")]
    Plan {
        index: usize,
        source: Box<ParseError>,
    },

    #[error("task {index}: {source}")]
    Task {
        index: usize,
        source: Box<ParseError>,
    },
}

/// Failure raised by a task executor's Validate or Execute.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("missing required argument: {0}")]
    MissingArg(String),

    #[error("unknown argument: {0}")]
    UnknownArg(String),

    #[error("argument type mismatch: {arg} must be a {expected}, got {found}")]
    TypeMismatch {
        arg: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("no shared context available to this task")]
    MissingContext,

    #[error("infra not found in directory: {0}")]
    InfraNotFound(String),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to launch provisioner: {0}")]
    Transport(String),

    #[error("error executing provisioner (exit code {exit_code})\n\nThe raw output is below:\n\n{output}")]
    Provision { exit_code: i32, output: String },

    #[error("failed to read provisioner state {path}: {message}")]
    State { path: PathBuf, message: String },
}

/// Failure to interpolate an argument against the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("unknown reference: {0}")]
    UnknownReference(String),
}

/// One problem found during plan validation.
#[derive(Debug, Error)]
pub enum ValidationIssue {
    #[error("Task {index} ({task_type}): unknown task type")]
    UnknownTaskType { index: usize, task_type: String },

    #[error("Task {index} ({task_type}): unknown reference: {reference}")]
    UnknownReference {
        index: usize,
        task_type: String,
        reference: String,
    },

    #[error("Task {index} ({task_type}): {source}")]
    Task {
        index: usize,
        task_type: String,
        source: TaskError,
    },
}

/// Every problem found while validating a plan.
#[derive(Debug, Error)]
#[error("{} error(s) occurred:\n{}", .issues.len(), format_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("\n* {}", i))
        .collect::<String>()
}

/// Failure that stopped plan execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Task {index} ({task_type}): unknown task type")]
    UnknownTaskType { index: usize, task_type: String },

    #[error("Task {index} ({task_type}), arg {arg}: {source}")]
    Interpolation {
        index: usize,
        task_type: String,
        arg: String,
        source: InterpolationError,
    },

    #[error("Task {index} ({task_type}): {source}")]
    Task {
        index: usize,
        task_type: String,
        source: TaskError,
    },
}

impl ExecuteError {
    /// 1-based position of the task that failed.
    pub fn task_index(&self) -> usize {
        match self {
            Self::UnknownTaskType { index, .. }
            | Self::Interpolation { index, .. }
            | Self::Task { index, .. } => *index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_rg007_parse_error_nesting() {
        let err = ParseError::Plan {
            index: 2,
            source: Box::new(ParseError::Task {
                index: 1,
                source: Box::new(ParseError::TaskKeys(2)),
            }),
        };
        assert_eq!(err.to_string(), "plan 2: task 1: needs exactly 1 key, found 2");
    }

    #[test]
    fn test_rg007_validation_lists_all() {
        let err = ValidationError {
            issues: vec![
                ValidationIssue::UnknownTaskType {
                    index: 1,
                    task_type: "bogus".into(),
                },
                ValidationIssue::UnknownReference {
                    index: 2,
                    task_type: "store".into(),
                    reference: "missing".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 error(s) occurred"));
        assert!(msg.contains("unknown task type"));
        assert!(msg.contains("unknown reference: missing"));
    }

    #[test]
    fn test_rg007_execute_error_keeps_source() {
        let err = ExecuteError::Task {
            index: 3,
            task_type: "apply".into(),
            source: TaskError::Invalid("boom".into()),
        };
        assert_eq!(err.task_index(), 3);
        assert_eq!(err.to_string(), "Task 3 (apply): boom");
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }
}
