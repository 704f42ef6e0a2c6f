//! Adapters for test-framework lifecycle hooks.
//!
//! A hook is a zero-argument unit of work that reports completion once. Use
//! [`Hook::run`] from async test code, or [`Hook::call`] where the framework
//! expects a completion callback.

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::Fixture;
use crate::error::Result;

/// Creates one task when run. Obtained from [`Fixture::hook`].
#[derive(Debug, Clone)]
pub struct Hook {
    fixture: Fixture,
    name: String,
}

impl Hook {
    pub(crate) fn new(fixture: Fixture, name: String) -> Self {
        Self { fixture, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self) -> Result<Option<Value>> {
        self.fixture.create(&self.name).await
    }

    /// Runs the hook on the current tokio runtime and reports the outcome to
    /// `done`.
    pub fn call<F>(&self, done: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Option<Value>>) + Send + 'static,
    {
        let hook = self.clone();
        tokio::spawn(async move { done(hook.run().await) })
    }
}

/// Cleans the whole fixture when run. Obtained from [`Fixture::clean_hook`].
#[derive(Debug, Clone)]
pub struct CleanHook {
    fixture: Fixture,
}

impl CleanHook {
    pub(crate) fn new(fixture: Fixture) -> Self {
        Self { fixture }
    }

    pub async fn run(&self) -> Result<usize> {
        self.fixture.clean().await
    }

    pub fn call<F>(&self, done: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<usize>) + Send + 'static,
    {
        let hook = self.clone();
        tokio::spawn(async move { done(hook.run().await) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::oneshot;

    use crate::TaskDef;

    use super::*;

    #[tokio::test]
    async fn test_hook_creates_task() {
        let fixture = Fixture::new();
        fixture
            .task(TaskDef::new("test1").example(|| json!({ "a": 1 })))
            .unwrap();

        let hook = fixture.hook("test1");
        assert_eq!(hook.name(), "test1");
        assert_eq!(hook.run().await.unwrap(), Some(json!({ "a": 1 })));
        assert_eq!(fixture.get("test1"), Some(json!({ "a": 1 })));
    }

    #[tokio::test]
    async fn test_callback_style() {
        let fixture = Fixture::new();
        fixture
            .task(TaskDef::new("test1").example(|| json!({ "a": 1 })))
            .unwrap();

        let (tx, rx) = oneshot::channel();
        fixture
            .hook("test1")
            .call(move |result| {
                let _ = tx.send(result.map(|value| value.is_some()));
            })
            .await
            .unwrap();
        assert!(rx.await.unwrap().unwrap());

        let (tx, rx) = oneshot::channel();
        fixture
            .clean_hook()
            .call(move |result| {
                let _ = tx.send(result);
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hook_reports_unknown_task() {
        let fixture = Fixture::new();
        let (tx, rx) = oneshot::channel();

        fixture
            .hook("missing")
            .call(move |result| {
                let _ = tx.send(result.is_err());
            })
            .await
            .unwrap();

        assert!(rx.await.unwrap());
    }
}
