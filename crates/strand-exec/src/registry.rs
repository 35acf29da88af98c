use std::collections::HashMap;

use strand_core::Task;

use crate::ExecError;

/// Name → task lookup used by worker servers.
#[derive(Clone, Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its own name.
    pub fn register(&mut self, task: Task) -> Result<(), ExecError> {
        if self.tasks.contains_key(task.name()) {
            return Err(ExecError::DuplicateTask {
                name: task.name().to_string(),
            });
        }
        self.tasks.insert(task.name().to_string(), task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
