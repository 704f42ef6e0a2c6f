pub use anyhow::Error as UserError;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = FixtureError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Invalid task definition: {0}")]
    InvalidDefinition(String),

    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Invalid example count: {0}")]
    InvalidCount(String),

    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    #[error("Task '{task}' failed while creating its dependencies:\n{source}")]
    DependencyFailed {
        task: String,
        #[source]
        source: Box<FixtureError>,
    },

    #[error("Dependency cycle detected between tasks: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Task '{task}':\n{source}")]
    Task {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Clean up of task '{task}' failed after {cleaned} task(s) were cleaned:\n{source}")]
    CleanupFailed {
        task: String,
        cleaned: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("A helper is already registered with the name '{0}'")]
    DuplicateHelper(String),

    #[error("Malformed helper call: {0}")]
    MissingHelperArgs(String),

    #[error("No helper is registered with the name '{0}'")]
    UnknownHelper(String),

    #[error("Helper '{name}':\n{source}")]
    Helper {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scheduled task could not be joined")]
    Runtime(#[from] tokio::task::JoinError),
}

impl FixtureError {
    pub(crate) fn task(task: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Task {
            task: task.into(),
            source: source.into(),
        }
    }

    pub(crate) fn dependency(task: impl Into<String>, source: FixtureError) -> Self {
        Self::DependencyFailed {
            task: task.into(),
            source: Box::new(source),
        }
    }

    /// Walks through `DependencyFailed` wrappers and returns the error that
    /// started the failure.
    pub fn root(&self) -> &FixtureError {
        match self {
            FixtureError::DependencyFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the task that actually failed, if the error is tied to one.
    pub fn failed_task(&self) -> Option<&str> {
        match self.root() {
            FixtureError::Task { task, .. } | FixtureError::CleanupFailed { task, .. } => {
                Some(task)
            }
            FixtureError::UnknownTask(task) => Some(task),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_nested_dependencies() {
        let inner = FixtureError::task("a", anyhow::anyhow!("boom"));
        let err = FixtureError::dependency("c", FixtureError::dependency("b", inner));

        assert!(matches!(err.root(), FixtureError::Task { task, .. } if task == "a"));
        assert_eq!(err.failed_task(), Some("a"));
    }

    #[test]
    fn test_messages() {
        let err = FixtureError::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected between tasks: a -> b -> a"
        );

        let err = FixtureError::UnknownTask("user".into());
        assert_eq!(err.to_string(), "Task 'user' is not registered");
        assert_eq!(err.failed_task(), Some("user"));
    }
}
