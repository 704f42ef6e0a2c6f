use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use serde_json::Value;
use tracing::Instrument;

use crate::cleanup::{CleanupOrder, CleanupStack};
use crate::config::Options;
use crate::error::{FixtureError, Result};
use crate::example::{self, Count, ExampleOptions, Generated};
use crate::helper::{HelperDef, HelperFn};
use crate::hook::{CleanHook, Hook};
use crate::registry::Registry;
use crate::scheduler::{self, RunState};
use crate::task::{BoxFuture, Task, TaskDef};
use crate::utils::{lock, read, write};

/// An isolated fixture namespace.
///
/// A `Fixture` owns its registered tasks, the values they produced, the
/// record of what has to be torn down and its helpers. Cloning it is cheap
/// and yields another handle to the same namespace; use
/// [`Fixture::instantiate`] for an independent one.
///
/// # Example
///
/// ```rust,no_run
/// use fixative::{Fixture, TaskDef};
/// use serde_json::json;
///
/// # async fn run() -> fixative::Result<()> {
/// let fixture = Fixture::new();
/// fixture.task(TaskDef::new("a").example(|| json!({ "v": 1 })))?;
/// fixture.task(TaskDef::new("b").depends_on("a").example(|| json!({ "v": 2 })))?;
///
/// assert_eq!(fixture.create("b").await?, Some(json!({ "v": 2 })));
/// assert_eq!(fixture.get("a"), Some(json!({ "v": 1 })));
///
/// assert_eq!(fixture.clean().await?, 2);
/// assert!(fixture.get("b").is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Fixture {
    inner: Arc<Inner>,
}

struct Inner {
    options: Options,
    registry: RwLock<Registry>,
    run_state: RunState,
    values: Mutex<HashMap<String, Value>>,
    cleanup: Mutex<CleanupStack>,
    helpers: RwLock<HashMap<String, HelperFn>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                registry: RwLock::new(Registry::new()),
                run_state: RunState::default(),
                values: Mutex::new(HashMap::new()),
                cleanup: Mutex::new(CleanupStack::default()),
                helpers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// A brand new fixture that shares nothing with this one.
    pub fn instantiate(&self, options: Options) -> Fixture {
        Fixture::with_options(options)
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Whether both handles point to the same namespace.
    pub fn same_as(&self, other: &Fixture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn span(&self, operation: &'static str) -> tracing::Span {
        match &self.inner.options.label {
            Some(label) => tracing::debug_span!("fixture", %label, operation),
            None => tracing::debug_span!("fixture", operation),
        }
    }

    // ******************************
    // *           Tasks            *
    // ******************************

    /// Registers a task, replacing any earlier task with the same name.
    pub fn task(&self, definition: TaskDef) -> Result<&Self> {
        let (task, replaced) = write(&self.inner.registry).register(definition)?;

        if replaced.is_some() {
            tracing::debug!(task = %task.name, "redefined task");
            self.inner.run_state.reset(&task.name);
        }

        Ok(self)
    }

    /// The registered task called `name`.
    pub fn definition(&self, name: &str) -> Option<Arc<Task>> {
        read(&self.inner.registry).get(name).cloned()
    }

    pub fn has_task(&self, name: &str) -> bool {
        read(&self.inner.registry).contains(name)
    }

    /// Names of all registered tasks, sorted.
    pub fn tasks(&self) -> Vec<String> {
        read(&self.inner.registry).names()
    }

    /// Whether `name` already ran in the current cycle.
    pub fn has_run(&self, name: &str) -> bool {
        self.inner.run_state.has_run(name)
    }

    /// Runs `name` and its dependency closure, without expanding children.
    pub async fn start(&self, name: &str) -> Result<Option<Value>> {
        scheduler::start(self, name)
            .instrument(self.span("start"))
            .await
    }

    /// Creates `name`: its dependencies first, then the task itself, then
    /// its children one after another.
    ///
    /// Returns the value stored for `name`, or `None` when the task has no
    /// example.
    pub async fn create(&self, name: &str) -> Result<Option<Value>> {
        let mut expanding = Vec::new();
        self.create_in(name, &mut expanding)
            .instrument(self.span("create"))
            .await
    }

    fn create_in<'a>(
        &'a self,
        name: &'a str,
        expanding: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            tracing::debug!(task = name, "creating");

            let plan = {
                let registry = self.registry();
                scheduler::plan(&registry, name)?
            };
            let children = plan.target().children.clone();

            scheduler::execute(self, plan).await?;
            tracing::debug!(task = name, "created");

            expanding.push(name.to_string());
            for child in &children {
                if expanding.contains(child) {
                    tracing::debug!(task = name, child = %child, "child is already being created");
                    continue;
                }
                self.create_in(child, expanding).await?;
            }
            expanding.pop();

            Ok(self.get(name))
        })
    }

    /// Makes sure the dependencies of `options.name` exist, then generates
    /// examples of it without storing them.
    pub async fn create_with(&self, options: ExampleOptions) -> Result<Option<Generated>> {
        let task = self
            .definition(&options.name)
            .ok_or_else(|| FixtureError::UnknownTask(options.name.clone()))?;

        for dependency in &task.dependencies {
            self.create(dependency)
                .await
                .map_err(|err| FixtureError::dependency(&task.name, err))?;
        }

        example::generate(&task, options.count, options.overrides.as_ref())
    }

    /// Shorthand for [`Fixture::create_with`] with a count.
    pub async fn create_many<N>(&self, n: N, name: &str) -> Result<Option<Generated>>
    where
        N: TryInto<Count, Error = FixtureError>,
    {
        self.create_with(ExampleOptions::new(name).count(n)?).await
    }

    /// An adapter creating `name` when a test framework runs it.
    pub fn hook(&self, name: impl Into<String>) -> Hook {
        let name = name.into();
        tracing::debug!(task = %name, "adding test hook");
        Hook::new(self.clone(), name)
    }

    /// An adapter cleaning this fixture when a test framework runs it.
    pub fn clean_hook(&self) -> CleanHook {
        CleanHook::new(self.clone())
    }

    // ******************************
    // *          Examples          *
    // ******************************

    /// One example of `name`, or `None` if the task has no example.
    pub fn example(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .example_with(ExampleOptions::new(name))?
            .map(Generated::into_value))
    }

    /// `n` examples of `name`. A count of one is returned unwrapped.
    pub fn examples<N>(&self, n: N, name: &str) -> Result<Option<Generated>>
    where
        N: TryInto<Count, Error = FixtureError>,
    {
        self.example_with(ExampleOptions::new(name).count(n)?)
    }

    pub fn example_with(&self, options: ExampleOptions) -> Result<Option<Generated>> {
        let task = self
            .definition(&options.name)
            .ok_or_else(|| FixtureError::UnknownTask(options.name.clone()))?;

        example::generate(&task, options.count, options.overrides.as_ref())
    }

    // ******************************
    // *           Values           *
    // ******************************

    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.inner.values).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.values).contains_key(name)
    }

    /// Names of the tasks currently holding a value, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.inner.values).keys().cloned().collect();
        names.sort();
        names
    }

    /// Mutates the stored value of `name` in place. Returns `false` when
    /// there is no such value.
    ///
    /// The namespace is locked while `f` runs, so `f` must not call back
    /// into this fixture.
    pub fn update<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        match lock(&self.inner.values).get_mut(name) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert(&self, name: &str, value: Value) {
        lock(&self.inner.values).insert(name.to_string(), value);
    }

    fn remove(&self, name: &str) -> Option<Value> {
        lock(&self.inner.values).remove(name)
    }

    // ******************************
    // *          Clean up          *
    // ******************************

    pub(crate) fn push_cleanup(&self, task: Arc<Task>) {
        lock(&self.inner.cleanup).push(task);
    }

    /// Number of tasks waiting to be torn down.
    pub fn pending_cleanup(&self) -> usize {
        lock(&self.inner.cleanup).len()
    }

    /// Names of the tasks waiting to be torn down, in execution order.
    pub fn pending_cleanup_names(&self) -> Vec<String> {
        lock(&self.inner.cleanup).names()
    }

    /// Tears down every task that ran, in the configured order, and returns
    /// how many were cleaned.
    ///
    /// The first failing teardown stops the drain. Tasks cleaned so far stay
    /// cleaned, the failing one stays queued for the next call.
    pub async fn clean(&self) -> Result<usize> {
        self.drain().instrument(self.span("clean")).await
    }

    fn next_cleanup(&self, order: CleanupOrder) -> Option<Arc<Task>> {
        lock(&self.inner.cleanup).take(order)
    }

    async fn drain(&self) -> Result<usize> {
        let order = self.inner.options.cleanup_order;
        tracing::debug!(pending = self.pending_cleanup(), ?order, "running clean up tasks");

        let mut cleaned = 0;
        loop {
            let Some(task) = self.next_cleanup(order) else {
                break;
            };

            if let Some(clean) = &task.clean
                && let Err(source) = clean(self.clone()).await
            {
                lock(&self.inner.cleanup).restore(order, task.clone());
                return Err(FixtureError::CleanupFailed {
                    task: task.name.clone(),
                    cleaned,
                    source,
                });
            }

            self.remove(&task.name);
            self.inner.run_state.reset(&task.name);
            tracing::debug!(task = %task.name, "cleaned");
            cleaned += 1;
        }

        Ok(cleaned)
    }

    // ******************************
    // *          Helpers           *
    // ******************************

    /// Registers a helper. Names are write-once.
    pub fn helper(&self, definition: HelperDef) -> Result<&Self> {
        let (name, func) = definition.into_parts()?;

        let mut helpers = write(&self.inner.helpers);
        if helpers.contains_key(&name) {
            return Err(FixtureError::DuplicateHelper(name));
        }

        helpers.insert(name, func);
        Ok(self)
    }

    /// Calls the helper `name` with this fixture as its receiver.
    pub fn call_helper(&self, name: &str, args: &[Value]) -> Result<Value> {
        if name.is_empty() {
            return Err(FixtureError::MissingHelperArgs("no helper name".into()));
        }

        let func = read(&self.inner.helpers)
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::UnknownHelper(name.to_string()))?;

        func(self, args).map_err(|source| FixtureError::Helper {
            name: name.to_string(),
            source,
        })
    }

    pub fn has_helper(&self, name: &str) -> bool {
        read(&self.inner.helpers).contains_key(name)
    }

    // ******************************
    // *          Internals         *
    // ******************************

    pub(crate) fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        read(&self.inner.registry)
    }

    pub(crate) fn run_state(&self) -> &RunState {
        &self.inner.run_state
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("options", &self.inner.options)
            .field("tasks", &self.tasks())
            .field("values", &self.names())
            .field("pending_cleanup", &self.pending_cleanup())
            .finish()
    }
}
