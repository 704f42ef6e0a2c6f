use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FixtureError, Result};
use crate::task::{Task, TaskDef};

/// Holds one [`Task`] per name. Registering a name again replaces the
/// previous definition.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    tasks: HashMap<String, Arc<Task>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores `definition`. Returns the frozen task together
    /// with the definition it replaced, if any.
    pub fn register(&mut self, definition: TaskDef) -> Result<(Arc<Task>, Option<Arc<Task>>)> {
        let task = Arc::new(definition.freeze()?);
        let replaced = self.tasks.insert(task.name.clone(), task.clone());
        Ok((task, replaced))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Task>> {
        self.tasks.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<Task>> {
        self.get(name)
            .ok_or_else(|| FixtureError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(TaskDef::new("user")).unwrap();
        registry.register(TaskDef::new("post").depends_on("user")).unwrap();

        assert!(registry.contains("user"));
        assert_eq!(registry.require("post").unwrap().dependencies(), ["user"]);
        assert_eq!(registry.names(), ["post", "user"]);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = Registry::new();
        registry.register(TaskDef::new("user")).unwrap();
        let (task, replaced) = registry
            .register(TaskDef::new("user").example(|| json!({ "v": 2 })))
            .unwrap();

        assert!(replaced.is_some());
        assert!(task.has_example());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_definition_leaves_registry_untouched() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(TaskDef::default()),
            Err(FixtureError::InvalidDefinition(_))
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_unknown_task() {
        let registry = Registry::new();
        assert!(matches!(
            registry.require("ghost"),
            Err(FixtureError::UnknownTask(name)) if name == "ghost"
        ));
    }
}
