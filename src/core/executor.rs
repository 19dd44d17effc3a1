//! RG-005: Execution engine. Two-phase plan processing.
//!
//! Validate walks every task, collecting every problem it finds: unknown
//! types, references to names no earlier task declares, and task-level
//! argument errors. Execute runs tasks strictly in declaration order,
//! threading the store between them, and stops at the first failure
//! without rolling back earlier side effects.

use super::context::SharedContext;
use super::error::{ExecuteError, TaskError, ValidationError, ValidationIssue};
use super::resolver;
use super::types::{ExecResult, ExecuteEvent, Plan, Store, Task, TaskArg, TaskResult, Value};
use crate::tasks::TaskRegistry;
use indexmap::IndexMap;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

/// The Validate/Execute contract implemented by every task type.
pub trait TaskExecutor {
    /// Check arguments and declare the names this task adds or removes.
    /// Arguments are not interpolated.
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError>;

    /// Perform the task with interpolated arguments.
    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError>;
}

impl<T: TaskExecutor + ?Sized> TaskExecutor for Rc<T> {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        (**self).validate(args)
    }

    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        (**self).execute(args)
    }
}

/// Input to a single Validate or Execute call.
pub struct ExecArgs<'a> {
    /// Arguments by name
    pub args: IndexMap<String, TaskArg>,

    /// Task output. Discarded during validation.
    pub output: &'a mut dyn Write,

    /// Store snapshot as of this task
    pub store: &'a Store,

    /// Shared run-time context, if the caller supplied one
    pub context: Option<&'a SharedContext>,

    /// Caller-defined extra data
    pub extra: &'a IndexMap<String, Value>,
}

impl<'a> ExecArgs<'a> {
    pub fn arg(&self, name: &str) -> Option<&TaskArg> {
        self.args.get(name)
    }

    /// A required text argument.
    pub fn text(&self, name: &str) -> Result<&str, TaskError> {
        self.args
            .get(name)
            .ok_or_else(|| TaskError::MissingArg(name.to_string()))?
            .as_text(name)
    }

    /// An optional text argument. Present but non-text is an error.
    pub fn optional_text(&self, name: &str) -> Result<Option<&str>, TaskError> {
        self.args.get(name).map(|a| a.as_text(name)).transpose()
    }

    /// Reject any argument not in `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<(), TaskError> {
        match self.args.keys().find(|k| !known.contains(&k.as_str())) {
            Some(name) => Err(TaskError::UnknownArg(name.clone())),
            None => Ok(()),
        }
    }

    pub fn context(&self) -> Result<&'a SharedContext, TaskError> {
        self.context.ok_or(TaskError::MissingContext)
    }

    /// Write a line to the task output.
    pub fn println(&mut self, msg: &str) -> Result<(), TaskError> {
        writeln!(self.output, "{}", msg)?;
        Ok(())
    }
}

/// Store contents before the first task: each plan input as `input.<name>`.
fn seed_store(plan: &Plan) -> Store {
    plan.inputs
        .iter()
        .map(|(k, v)| (format!("input.{}", k), TaskResult::new(v.as_str())))
        .collect()
}

/// Runs plans against a task registry.
pub struct Executor<'a> {
    tasks: &'a TaskRegistry,
    context: Option<&'a SharedContext>,
    extra: IndexMap<String, Value>,
    callback: Option<&'a dyn Fn(&ExecuteEvent)>,
}

impl<'a> Executor<'a> {
    pub fn new(tasks: &'a TaskRegistry) -> Self {
        Self {
            tasks,
            context: None,
            extra: IndexMap::new(),
            callback: None,
        }
    }

    pub fn with_context(mut self, context: &'a SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Receive progress events during `execute`.
    pub fn with_callback(mut self, callback: &'a dyn Fn(&ExecuteEvent)) -> Self {
        self.callback = Some(callback);
        self
    }

    fn emit(&self, event: ExecuteEvent) {
        if let Some(cb) = self.callback {
            cb(&event);
        }
    }

    /// Validate a plan, reporting every problem at once.
    pub fn validate(&self, plan: &Plan) -> Result<(), ValidationError> {
        let mut sink = std::io::sink();
        let mut store = seed_store(plan);
        let mut issues = Vec::new();

        for (i, task) in plan.tasks.iter().enumerate() {
            let index = i + 1;
            let executor = self.tasks.get(&task.task_type);
            if executor.is_none() {
                issues.push(ValidationIssue::UnknownTaskType {
                    index,
                    task_type: task.task_type.clone(),
                });
            }

            for arg in task.args.values() {
                for reference in arg.refs() {
                    if !store.contains_key(&reference) {
                        issues.push(ValidationIssue::UnknownReference {
                            index,
                            task_type: task.task_type.clone(),
                            reference,
                        });
                    }
                }
            }

            let Some(executor) = executor else { continue };
            let mut args = ExecArgs {
                args: task.args.clone(),
                output: &mut sink,
                store: &store,
                context: self.context,
                extra: &self.extra,
            };
            match executor.validate(&mut args) {
                Ok(result) => result.apply_to(&mut store),
                Err(source) => issues.push(ValidationIssue::Task {
                    index,
                    task_type: task.task_type.clone(),
                    source,
                }),
            }
        }

        if issues.is_empty() {
            tracing::debug!(tasks = plan.tasks.len(), "plan valid");
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Execute a plan, returning the final store.
    pub fn execute(&self, plan: &Plan, output: &mut dyn Write) -> Result<Store, ExecuteError> {
        let start = Instant::now();
        let mut store = seed_store(plan);

        tracing::info!(description = %plan.description, tasks = plan.tasks.len(), "executing plan");
        self.emit(ExecuteEvent::RunStarted {
            description: plan.description.clone(),
            task_count: plan.tasks.len(),
        });

        for (i, task) in plan.tasks.iter().enumerate() {
            let index = i + 1;
            let task_start = Instant::now();
            self.emit(ExecuteEvent::TaskStarted {
                index,
                task_type: task.task_type.clone(),
            });
            tracing::debug!(index, task_type = %task.task_type, "task started");

            match self.run_task(index, task, &store, output) {
                Ok(result) => {
                    result.apply_to(&mut store);
                    self.emit(ExecuteEvent::TaskCompleted {
                        index,
                        task_type: task.task_type.clone(),
                        duration_seconds: task_start.elapsed().as_secs_f64(),
                    });
                }
                Err(e) => {
                    tracing::warn!(index, task_type = %task.task_type, error = %e, "task failed");
                    self.emit(ExecuteEvent::TaskFailed {
                        index,
                        task_type: task.task_type.clone(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        self.emit(ExecuteEvent::RunCompleted {
            tasks_run: plan.tasks.len(),
            total_seconds: start.elapsed().as_secs_f64(),
        });
        Ok(store)
    }

    fn run_task(
        &self,
        index: usize,
        task: &Task,
        store: &Store,
        output: &mut dyn Write,
    ) -> Result<ExecResult, ExecuteError> {
        let executor = self
            .tasks
            .get(&task.task_type)
            .ok_or_else(|| ExecuteError::UnknownTaskType {
                index,
                task_type: task.task_type.clone(),
            })?;

        let mut args = IndexMap::with_capacity(task.args.len());
        for (name, raw) in &task.args {
            let arg = resolver::interpolate(raw, store).map_err(|source| {
                ExecuteError::Interpolation {
                    index,
                    task_type: task.task_type.clone(),
                    arg: name.clone(),
                    source,
                }
            })?;
            args.insert(name.clone(), arg);
        }

        let mut exec_args = ExecArgs {
            args,
            output,
            store,
            context: self.context,
            extra: &self.extra,
        };
        executor
            .execute(&mut exec_args)
            .map_err(|source| ExecuteError::Task {
                index,
                task_type: task.task_type.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::mock::MockTask;
    use std::cell::RefCell;

    fn registry_with(mocks: &[(&str, &Rc<MockTask>)]) -> TaskRegistry {
        let mut reg = TaskRegistry::builtin();
        for (tag, mock) in mocks {
            reg.register(*tag, Box::new(Rc::clone(mock)));
        }
        reg
    }

    fn plan(tasks: Vec<Task>) -> Plan {
        Plan {
            description: "test".into(),
            tasks,
            ..Plan::default()
        }
    }

    // ========================================================================
    // Execute
    // ========================================================================

    #[test]
    fn test_rg005_execute_stops_at_first_failure() {
        let a = Rc::new(MockTask::default());
        let b = Rc::new(MockTask::failing_execute("boom"));
        let c = Rc::new(MockTask::default());
        let reg = registry_with(&[("a", &a), ("b", &b), ("c", &c)]);

        let p = plan(vec![Task::new("a"), Task::new("b"), Task::new("c")]);
        let err = Executor::new(&reg)
            .execute(&p, &mut std::io::sink())
            .unwrap_err();

        assert_eq!(err.task_index(), 2);
        assert_eq!(err.to_string(), "Task 2 (b): boom");
        assert_eq!(a.execute_calls(), 1);
        assert_eq!(b.execute_calls(), 1);
        assert_eq!(c.execute_calls(), 0);
    }

    #[test]
    fn test_rg005_execute_threads_store() {
        let producer = Rc::new(MockTask::default().with_execute_value("foo", "bar"));
        let consumer = Rc::new(MockTask::default());
        let reg = registry_with(&[("produce", &producer), ("consume", &consumer)]);

        let p = plan(vec![
            Task::new("produce"),
            Task::new("consume").with_arg("x", "v=${foo}"),
        ]);
        let store = Executor::new(&reg).execute(&p, &mut std::io::sink()).unwrap();

        assert_eq!(store["foo"].value, Value::from("bar"));
        let args = consumer.last_execute_args().unwrap();
        assert_eq!(args["x"].value, Value::from("v=bar"));
    }

    #[test]
    fn test_rg005_inputs_seed_store() {
        let consumer = Rc::new(MockTask::default());
        let reg = registry_with(&[("consume", &consumer)]);
        let mut p = plan(vec![Task::new("consume").with_arg("r", "${input.region}")]);
        p.inputs.insert("region".into(), "us-east-1".into());

        let store = Executor::new(&reg).execute(&p, &mut std::io::sink()).unwrap();
        assert_eq!(store["input.region"].value, Value::from("us-east-1"));
        assert_eq!(
            consumer.last_execute_args().unwrap()["r"].value,
            Value::from("us-east-1")
        );
    }

    #[test]
    fn test_rg005_execute_unknown_reference() {
        let consumer = Rc::new(MockTask::default());
        let reg = registry_with(&[("consume", &consumer)]);
        let p = plan(vec![Task::new("consume").with_arg("x", "${nope}")]);

        let err = Executor::new(&reg)
            .execute(&p, &mut std::io::sink())
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Interpolation { index: 1, .. }));
        assert!(err.to_string().contains("unknown reference: nope"));
        assert_eq!(consumer.execute_calls(), 0);
    }

    #[test]
    fn test_rg005_execute_unknown_type() {
        let reg = TaskRegistry::builtin();
        let p = plan(vec![Task::new("store"), Task::new("bogus")]);
        let err = Executor::new(&reg)
            .execute(&p, &mut std::io::sink())
            .unwrap_err();
        assert!(matches!(err, ExecuteError::UnknownTaskType { index: 2, .. }));
    }

    #[test]
    fn test_rg005_delete_removes_from_store() {
        let producer = Rc::new(MockTask::default().with_execute_value("foo", "bar"));
        let reg = registry_with(&[("produce", &producer)]);
        let p = plan(vec![
            Task::new("produce"),
            Task::new("delete").with_arg("key", "foo"),
        ]);
        let store = Executor::new(&reg).execute(&p, &mut std::io::sink()).unwrap();
        assert!(!store.contains_key("foo"));
    }

    #[test]
    fn test_rg005_events_in_order() {
        let reg = TaskRegistry::builtin();
        let events = RefCell::new(Vec::new());
        let record = |e: &ExecuteEvent| events.borrow_mut().push(e.clone());
        let p = plan(vec![Task::new("store").with_arg("a", "1")]);

        Executor::new(&reg)
            .with_callback(&record)
            .execute(&p, &mut std::io::sink())
            .unwrap();

        let events = events.into_inner();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ExecuteEvent::RunStarted { task_count: 1, .. }));
        assert!(matches!(events[1], ExecuteEvent::TaskStarted { index: 1, .. }));
        assert!(matches!(events[2], ExecuteEvent::TaskCompleted { index: 1, .. }));
        assert!(matches!(events[3], ExecuteEvent::RunCompleted { tasks_run: 1, .. }));
    }

    #[test]
    fn test_rg005_failure_event() {
        let b = Rc::new(MockTask::failing_execute("kaput"));
        let reg = registry_with(&[("b", &b)]);
        let events = RefCell::new(Vec::new());
        let record = |e: &ExecuteEvent| events.borrow_mut().push(e.clone());

        let _ = Executor::new(&reg)
            .with_callback(&record)
            .execute(&plan(vec![Task::new("b")]), &mut std::io::sink());

        let events = events.into_inner();
        match events.last() {
            Some(ExecuteEvent::TaskFailed { index, error, .. }) => {
                assert_eq!(*index, 1);
                assert!(error.contains("kaput"));
            }
            other => panic!("expected TaskFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_rg005_extra_visible_to_tasks() {
        let mock = Rc::new(MockTask::default());
        let reg = registry_with(&[("m", &mock)]);
        Executor::new(&reg)
            .with_extra("env", "staging")
            .execute(&plan(vec![Task::new("m")]), &mut std::io::sink())
            .unwrap();
        assert_eq!(
            mock.last_extra().unwrap()["env"],
            Value::from("staging")
        );
    }

    // ========================================================================
    // Validate
    // ========================================================================

    #[test]
    fn test_rg005_validate_ok() {
        let reg = TaskRegistry::builtin();
        let p = plan(vec![
            Task::new("store").with_arg("foo", "1"),
            Task::new("store").with_arg("bar", "${foo}"),
            Task::new("delete").with_arg("key", "foo"),
        ]);
        Executor::new(&reg).validate(&p).unwrap();
    }

    #[test]
    fn test_rg005_validate_collects_all() {
        let reg = TaskRegistry::builtin();
        let p = plan(vec![
            Task::new("bogus"),
            Task::new("delete").with_arg("key", "${x}"),
            Task::new("store").with_arg("y", "${missing}"),
        ]);
        let err = Executor::new(&reg).validate(&p).unwrap_err();
        let msg = err.to_string();

        assert_eq!(err.issues.len(), 4);
        assert!(msg.starts_with("4 error(s) occurred"));
        assert!(msg.contains("Task 1 (bogus): unknown task type"));
        assert!(msg.contains("Task 2 (delete): unknown reference: x"));
        assert!(msg.contains("Task 2 (delete): key can't contain interpolations"));
        assert!(msg.contains("Task 3 (store): unknown reference: missing"));
    }

    #[test]
    fn test_rg005_validate_respects_removal() {
        let reg = TaskRegistry::builtin();
        let p = plan(vec![
            Task::new("store").with_arg("foo", "1"),
            Task::new("delete").with_arg("key", "foo"),
            Task::new("store").with_arg("bar", "${foo}"),
        ]);
        let err = Executor::new(&reg).validate(&p).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(matches!(
            &err.issues[0],
            ValidationIssue::UnknownReference { index: 3, reference, .. } if reference == "foo"
        ));
    }

    #[test]
    fn test_rg005_validate_sees_inputs() {
        let reg = TaskRegistry::builtin();
        let mut p = plan(vec![Task::new("store").with_arg("x", "${input.zone}")]);
        assert!(Executor::new(&reg).validate(&p).is_err());
        p.inputs.insert("zone".into(), "b".into());
        Executor::new(&reg).validate(&p).unwrap();
    }

    #[test]
    fn test_rg005_validate_passes_raw_args() {
        let mock = Rc::new(MockTask::default());
        let reg = registry_with(&[("m", &mock)]);
        let p = plan(vec![
            Task::new("store").with_arg("foo", "1"),
            Task::new("m").with_arg("x", "${foo}"),
        ]);
        Executor::new(&reg).validate(&p).unwrap();
        assert_eq!(mock.validate_calls(), 1);
        assert_eq!(mock.execute_calls(), 0);
        assert_eq!(
            mock.last_validate_args().unwrap()["x"].value,
            Value::from("${foo}")
        );
    }

    #[test]
    fn test_rg005_validate_continues_after_task_error() {
        let bad = Rc::new(MockTask::failing_validate("bad args"));
        let after = Rc::new(MockTask::default());
        let reg = registry_with(&[("bad", &bad), ("after", &after)]);
        let p = plan(vec![Task::new("bad"), Task::new("after")]);

        let err = Executor::new(&reg).validate(&p).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(after.validate_calls(), 1);
    }

    #[test]
    fn test_rg005_validate_does_not_write_output() {
        let mock = Rc::new(MockTask::default().with_output("hello"));
        let reg = registry_with(&[("m", &mock)]);
        let p = plan(vec![Task::new("m")]);
        let exec = Executor::new(&reg);

        exec.validate(&p).unwrap();
        let mut out = Vec::new();
        exec.execute(&p, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");
    }

    #[test]
    fn test_rg005_println_helper() {
        let store = Store::new();
        let extra = IndexMap::new();
        let mut buf = Vec::new();
        let mut args = ExecArgs {
            args: IndexMap::new(),
            output: &mut buf,
            store: &store,
            context: None,
            extra: &extra,
        };
        args.println("line").unwrap();
        assert!(matches!(args.context(), Err(TaskError::MissingContext)));
        drop(args);
        assert_eq!(buf, b"line\n");
    }

    #[test]
    fn test_rg005_arg_helpers() {
        let store = Store::new();
        let extra = IndexMap::new();
        let mut sink = std::io::sink();
        let mut map = IndexMap::new();
        map.insert("name".to_string(), TaskArg::new("x"));
        map.insert("flag".to_string(), TaskArg::new(true));
        let args = ExecArgs {
            args: map,
            output: &mut sink,
            store: &store,
            context: None,
            extra: &extra,
        };

        assert_eq!(args.text("name").unwrap(), "x");
        assert!(matches!(args.text("nope"), Err(TaskError::MissingArg(_))));
        let err = args.text("flag").unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument type mismatch: flag must be a string, got bool"
        );
        assert_eq!(args.optional_text("nope").unwrap(), None);
        assert!(args.check_known(&["name", "flag"]).is_ok());
        assert!(matches!(
            args.check_known(&["name"]),
            Err(TaskError::UnknownArg(n)) if n == "flag"
        ));
    }
}
