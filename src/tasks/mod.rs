//! RG-006: Task registry and built-in task executors.

pub mod apply;
pub mod delete;
pub mod deploy_version;
pub mod store;

#[cfg(test)]
pub mod mock;

use crate::core::executor::TaskExecutor;
use indexmap::IndexMap;

type Constructor = fn() -> Box<dyn TaskExecutor>;

fn boxed<T: TaskExecutor + Default + 'static>() -> Box<dyn TaskExecutor> {
    Box::new(T::default())
}

/// Built-in task types.
const BUILTIN: &[(&str, Constructor)] = &[
    ("store", boxed::<store::StoreTask>),
    ("delete", boxed::<delete::DeleteTask>),
    ("apply", boxed::<apply::ApplyTask>),
    ("deploy-version", boxed::<deploy_version::DeployVersionTask>),
];

/// Mapping of task type tags to executors.
#[derive(Default)]
pub struct TaskRegistry {
    executors: IndexMap<String, Box<dyn TaskExecutor>>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in task type.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        for (tag, ctor) in BUILTIN {
            reg.register(*tag, ctor());
        }
        reg
    }

    /// Register (or replace) the executor for a tag.
    pub fn register(&mut self, tag: impl Into<String>, executor: Box<dyn TaskExecutor>) {
        self.executors.insert(tag.into(), executor);
    }

    pub fn get(&self, tag: &str) -> Option<&dyn TaskExecutor> {
        self.executors.get(tag).map(|e| e.as_ref())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.executors.contains_key(tag)
    }

    /// Registered tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}
