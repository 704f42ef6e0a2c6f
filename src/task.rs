//! Task definitions.
//!
//! A [`TaskDef`] is the mutable builder that test code fills in. Registering
//! it freezes it into a [`Task`], which is shared by reference between the
//! registry, the scheduler and the cleanup stack and never changes again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::Fixture;
use crate::error::{FixtureError, Result};
use crate::strategy::Strategy;

/// An owned, boxed future that can be moved across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type ExampleFn = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;
pub(crate) type InitFn = Arc<dyn Fn(&Fixture) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type CreateFn =
    Arc<dyn Fn(Fixture, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub(crate) type CleanFn =
    Arc<dyn Fn(Fixture) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An ordered list of task names, without duplicates.
///
/// Anything that reads as "one name" or "several names" converts into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Names(Vec<String>);

impl Names {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    fn push(&mut self, name: String) {
        if !self.0.contains(&name) {
            self.0.push(name);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Names {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut names = Names::default();
        for name in iter {
            names.push(name.into());
        }
        names
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Names(vec![name.to_string()])
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Names(vec![name])
    }
}

impl From<&[&str]> for Names {
    fn from(names: &[&str]) -> Self {
        names.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().collect()
    }
}

impl From<Vec<&str>> for Names {
    fn from(names: Vec<&str>) -> Self {
        names.into_iter().collect()
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

/// Builder for a fixture task.
///
/// # Example
///
/// ```rust,no_run
/// use fixative::{Fixture, TaskDef};
/// use serde_json::json;
///
/// let fixture = Fixture::new();
/// fixture
///     .task(TaskDef::new("user").example(|| json!({ "name": "joe" })))
///     .unwrap();
/// fixture
///     .task(TaskDef::new("post").depends_on("user").example(|| json!({ "title": "hi" })))
///     .unwrap();
/// ```
#[derive(Clone, Default)]
pub struct TaskDef {
    name: Option<String>,
    dependencies: Names,
    children: Names,
    example: Option<ExampleFn>,
    initialize: Option<InitFn>,
    create: Option<CreateFn>,
    clean: Option<CleanFn>,
    strategy: Option<Arc<dyn Strategy>>,
}

impl TaskDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tasks that must be fully created before this one runs.
    pub fn depends_on(mut self, names: impl Into<Names>) -> Self {
        self.dependencies = names.into();
        self
    }

    /// Tasks created after this one completes.
    pub fn children(mut self, names: impl Into<Names>) -> Self {
        self.children = names.into();
        self
    }

    pub fn example<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.example = Some(Arc::new(move || Ok(f())));
        self
    }

    /// Like [`TaskDef::example`], for producers that can fail.
    pub fn try_example<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.example = Some(Arc::new(f));
        self
    }

    /// Runs before the example is generated. The fixture is passed in so the
    /// hook can look at, or patch, values created by dependencies.
    pub fn initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fixture) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(f));
        self
    }

    /// Persists the generated example. The resolved value is what gets stored
    /// on the fixture.
    pub fn create<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Fixture, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.create = Some(Arc::new(move |fixture, value| -> BoxFuture<'static, _> {
            Box::pin(f(fixture, value))
        }));
        self
    }

    /// Custom teardown. Runs while the value is still on the fixture.
    pub fn clean<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Fixture) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.clean = Some(Arc::new(move |fixture| -> BoxFuture<'static, _> {
            Box::pin(f(fixture))
        }));
        self
    }

    /// Delegates persistence to `strategy`. Explicit `create`/`clean`
    /// closures take precedence over it.
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub(crate) fn freeze(self) -> Result<Task> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return Err(FixtureError::InvalidDefinition(
                    "task name was not set".to_string(),
                ));
            }
        };

        if self.dependencies.0.contains(&name) {
            return Err(FixtureError::InvalidDefinition(format!(
                "task '{name}' depends on itself"
            )));
        }

        let mut create = self.create;
        let mut clean = self.clean;

        if let Some(strategy) = self.strategy {
            if create.is_none() {
                let (strategy, name) = (strategy.clone(), name.clone());
                create = Some(Arc::new(move |fixture: Fixture, value: Value| {
                    strategy.create(fixture, name.clone(), value)
                }));
            }
            if clean.is_none() {
                let name = name.clone();
                clean = Some(Arc::new(move |fixture: Fixture| {
                    let value = fixture.get(&name);
                    strategy.remove(fixture, name.clone(), value)
                }));
            }
        }

        Ok(Task {
            name,
            dependencies: self.dependencies.0,
            children: self.children.0,
            example: self.example,
            initialize: self.initialize,
            create,
            clean,
        })
    }
}

impl std::fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// A registered, immutable task.
pub struct Task {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) children: Vec<String>,
    pub(crate) example: Option<ExampleFn>,
    pub(crate) initialize: Option<InitFn>,
    pub(crate) create: Option<CreateFn>,
    pub(crate) clean: Option<CleanFn>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Whether running this task stores a value on the fixture.
    pub fn has_example(&self) -> bool {
        self.example.is_some()
    }

    pub fn has_clean(&self) -> bool {
        self.clean.is_some()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("children", &self.children)
            .field("example", &self.example.is_some())
            .field("initialize", &self.initialize.is_some())
            .field("create", &self.create.is_some())
            .field("clean", &self.clean.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_requires_name() {
        let err = TaskDef::default().freeze().unwrap_err();
        assert!(matches!(err, FixtureError::InvalidDefinition(ref msg) if msg.contains("name was not set")));

        let err = TaskDef::new("  ").freeze().unwrap_err();
        assert!(matches!(err, FixtureError::InvalidDefinition(_)));
    }

    #[test]
    fn test_normalizes_names() {
        let task = TaskDef::new("post")
            .depends_on("user")
            .children(["comment", "like", "comment"])
            .freeze()
            .unwrap();

        assert_eq!(task.dependencies(), ["user"]);
        assert_eq!(task.children(), ["comment", "like"]);
    }

    #[test]
    fn test_defaults_to_empty_lists() {
        let task = TaskDef::new("user").freeze().unwrap();
        assert!(task.dependencies().is_empty());
        assert!(task.children().is_empty());
        assert!(!task.has_example());
        assert!(!task.has_clean());
    }

    #[test]
    fn test_rejects_self_dependency() {
        let err = TaskDef::new("user").depends_on("user").freeze().unwrap_err();
        assert!(matches!(err, FixtureError::InvalidDefinition(ref msg) if msg.contains("itself")));
    }

    #[test]
    fn test_name_set_later() {
        let task = TaskDef::default()
            .example(|| json!(1))
            .name("late")
            .freeze()
            .unwrap();

        assert_eq!(task.name(), "late");
        assert!(task.has_example());
    }
}
