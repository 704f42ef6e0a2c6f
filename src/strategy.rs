//! Pluggable persistence.
//!
//! By default a fixture task only keeps its example in memory. A
//! [`Strategy`] turns the generated example into a real record (a database
//! row, a remote entity) and removes it again during clean up. The scheduler
//! treats both calls as opaque asynchronous units.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use serde_json::Value;

use crate::Fixture;
use crate::task::BoxFuture;
use crate::utils::lock;

pub trait Strategy: Send + Sync + 'static {
    /// Persists `example` for the task `name`. The returned value replaces
    /// the example on the fixture.
    fn create(
        &self,
        fixture: Fixture,
        name: String,
        example: Value,
    ) -> BoxFuture<'static, anyhow::Result<Value>>;

    /// Removes what `create` persisted. `value` is the value currently held
    /// by the fixture, if any.
    fn remove(
        &self,
        fixture: Fixture,
        name: String,
        value: Option<Value>,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// In-memory store handing out incrementing `id`s, shaped like an entity
/// store: `create` saves a record and returns it with its id, `remove`
/// deletes by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<BTreeMap<u64, (String, Value)>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the store for use with [`TaskDef::strategy`](crate::TaskDef::strategy).
    pub fn shared(&self) -> Arc<dyn Strategy> {
        Arc::new(self.clone())
    }

    pub fn get(&self, id: u64) -> Option<Value> {
        lock(&self.rows).get(&id).map(|(_, value)| value.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.rows).is_empty()
    }

    /// All records saved for the task `name`, oldest first.
    pub fn records(&self, name: &str) -> Vec<Value> {
        lock(&self.rows)
            .values()
            .filter(|(owner, _)| owner == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    fn save(&self, name: String, example: Value) -> anyhow::Result<Value> {
        let Value::Object(mut record) = example else {
            return Err(anyhow!("only objects can be saved, got {example}"));
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        record.insert("id".into(), Value::from(id));

        let record = Value::Object(record);
        lock(&self.rows).insert(id, (name, record.clone()));
        Ok(record)
    }

    fn delete(&self, name: &str, value: Option<Value>) -> anyhow::Result<()> {
        // Nothing was saved, nothing to remove.
        let Some(value) = value else {
            return Ok(());
        };

        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .with_context(|| format!("record of '{name}' has no id"))?;

        lock(&self.rows)
            .remove(&id)
            .map(|_| ())
            .with_context(|| format!("record {id} of '{name}' does not exist"))
    }
}

impl Strategy for MemoryStore {
    fn create(
        &self,
        _: Fixture,
        name: String,
        example: Value,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        let store = self.clone();
        Box::pin(async move { store.save(name, example) })
    }

    fn remove(
        &self,
        _: Fixture,
        name: String,
        value: Option<Value>,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete(&name, value) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let store = MemoryStore::new();
        let fixture = Fixture::new();

        let a = store
            .create(fixture.clone(), "user".into(), json!({ "name": "a" }))
            .await
            .unwrap();
        let b = store
            .create(fixture, "user".into(), json!({ "name": "b" }))
            .await
            .unwrap();

        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 2);
        assert_eq!(store.records("user").len(), 2);
        assert_eq!(store.get(2).unwrap()["name"], "b");
    }

    #[tokio::test]
    async fn test_create_rejects_scalars() {
        let store = MemoryStore::new();
        let result = store.create(Fixture::new(), "n".into(), json!(7)).await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let fixture = Fixture::new();

        let saved = store
            .create(fixture.clone(), "user".into(), json!({}))
            .await
            .unwrap();
        store
            .remove(fixture.clone(), "user".into(), Some(saved.clone()))
            .await
            .unwrap();
        assert!(store.is_empty());

        // removing twice is an error, removing nothing is not
        assert!(store.remove(fixture.clone(), "user".into(), Some(saved)).await.is_err());
        assert!(store.remove(fixture, "user".into(), None).await.is_ok());
    }
}
