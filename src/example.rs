//! Example generation.
//!
//! A task's `example` producer is called once per requested instance. Each
//! generated value can then be reshaped by an [`Override`] before it is
//! handed back to the caller or stored on the fixture.

use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{FixtureError, Result};
use crate::task::Task;

/// A validated, strictly positive number of examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Count(NonZeroUsize);

impl Count {
    pub const ONE: Count = Count(NonZeroUsize::MIN);

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for Count {
    fn default() -> Self {
        Count::ONE
    }
}

impl TryFrom<usize> for Count {
    type Error = FixtureError;

    fn try_from(value: usize) -> Result<Self> {
        NonZeroUsize::new(value)
            .map(Count)
            .ok_or_else(|| FixtureError::InvalidCount(format!("{value} is not a positive number")))
    }
}

macro_rules! impl_count_from_int {
    ($($T:ty),*) => {
        $(
            impl TryFrom<$T> for Count {
                type Error = FixtureError;

                fn try_from(value: $T) -> Result<Self> {
                    let n = usize::try_from(value).map_err(|_| {
                        FixtureError::InvalidCount(format!("{value} is not a positive number"))
                    })?;
                    Count::try_from(n)
                }
            }
        )*
    };
}

impl_count_from_int!(i32, i64, u32, u64);

impl TryFrom<f64> for Count {
    type Error = FixtureError;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(FixtureError::InvalidCount(format!("{value} is not a real number")));
        }
        if value < 1.0 {
            return Err(FixtureError::InvalidCount(format!("{value} is not a positive number")));
        }
        if value.fract() != 0.0 {
            return Err(FixtureError::InvalidCount(format!("{value} is not an integer")));
        }
        if value > usize::MAX as f64 {
            return Err(FixtureError::InvalidCount(format!("{value} is too large")));
        }

        Count::try_from(value as usize)
    }
}

type OverrideFn = Arc<dyn Fn(Value, usize) -> Value + Send + Sync>;

/// Reshapes generated examples.
///
/// `Merge` is the plain shallow merge where override keys win. `PerIndex`
/// merges the `i`-th map into the `i`-th example only. `With` is the open
/// extension point for anything else.
#[derive(Clone)]
pub enum Override {
    Merge(Map<String, Value>),
    PerIndex(Vec<Map<String, Value>>),
    With(OverrideFn),
}

impl Override {
    pub fn with<F>(f: F) -> Self
    where
        F: Fn(Value, usize) -> Value + Send + Sync + 'static,
    {
        Override::With(Arc::new(f))
    }

    /// Applies the override to the example at position `index`.
    pub fn apply(&self, example: Value, index: usize) -> Value {
        match self {
            Override::Merge(map) => merge(example, map),
            Override::PerIndex(maps) => match maps.get(index) {
                Some(map) => merge(example, map),
                None => example,
            },
            Override::With(f) => f(example, index),
        }
    }
}

impl std::fmt::Debug for Override {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Override::Merge(map) => f.debug_tuple("Merge").field(map).finish(),
            Override::PerIndex(maps) => f.debug_tuple("PerIndex").field(maps).finish(),
            Override::With(_) => write!(f, "With(*)"),
        }
    }
}

impl From<Map<String, Value>> for Override {
    fn from(map: Map<String, Value>) -> Self {
        Override::Merge(map)
    }
}

impl TryFrom<Value> for Override {
    type Error = FixtureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Override::Merge(map)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(FixtureError::InvalidOverride(format!(
                        "entry {i} must be an object, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Override::PerIndex),
            other => Err(FixtureError::InvalidOverride(format!(
                "expected an object or an array of objects, got {other}"
            ))),
        }
    }
}

/// Shallow merge, keys from `patch` win. A base that isn't an object is
/// replaced by the patch.
fn merge(base: Value, patch: &Map<String, Value>) -> Value {
    match base {
        Value::Object(mut map) => {
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
            Value::Object(map)
        }
        _ => Value::Object(patch.clone()),
    }
}

/// Output of example generation. A single requested example is never
/// wrapped in a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    One(Value),
    Many(Vec<Value>),
}

impl Generated {
    pub fn len(&self) -> usize {
        match self {
            Generated::One(_) => 1,
            Generated::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Generated::Many(_))
    }

    pub fn as_one(&self) -> Option<&Value> {
        match self {
            Generated::One(value) => Some(value),
            Generated::Many(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Generated::One(value) => vec![value],
            Generated::Many(values) => values,
        }
    }

    /// Flattens into a plain value, many examples become a JSON array.
    pub fn into_value(self) -> Value {
        match self {
            Generated::One(value) => value,
            Generated::Many(values) => Value::Array(values),
        }
    }
}

/// The full set of knobs accepted by example generation.
#[derive(Debug, Clone)]
pub struct ExampleOptions {
    pub name: String,
    pub count: Count,
    pub overrides: Option<Override>,
}

impl ExampleOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Count::ONE,
            overrides: None,
        }
    }

    pub fn count<N>(mut self, n: N) -> Result<Self>
    where
        N: TryInto<Count, Error = FixtureError>,
    {
        self.count = n.try_into()?;
        Ok(self)
    }

    pub fn overrides(mut self, overrides: impl Into<Override>) -> Self {
        self.overrides = Some(overrides.into());
        self
    }

    pub fn try_overrides(mut self, overrides: Value) -> Result<Self> {
        self.overrides = Some(Override::try_from(overrides)?);
        Ok(self)
    }
}

/// Calls the producer once. Panics are reported as task errors.
pub(crate) fn produce(task: &Task) -> Result<Option<Value>> {
    let Some(example) = &task.example else {
        return Ok(None);
    };

    match catch_unwind(AssertUnwindSafe(|| example())) {
        Ok(result) => result
            .map(Some)
            .map_err(|err| FixtureError::task(&task.name, err)),
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("Example panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("Example panicked: {s}")
            } else {
                String::from("Example panicked with unknown payload")
            };

            Err(FixtureError::task(&task.name, anyhow::anyhow!(msg)))
        }
    }
}

/// Upper bound on the examples reserved up front, counts are not trusted.
const PREALLOCATED_EXAMPLES: usize = 1024;

/// Generates `count` independent examples of `task`.
///
/// Returns `None` when the task has no example producer.
pub(crate) fn generate(
    task: &Task,
    count: Count,
    overrides: Option<&Override>,
) -> Result<Option<Generated>> {
    if task.example.is_none() {
        return Ok(None);
    }

    tracing::debug!(task = %task.name, count = count.get(), "generating examples");

    let mut examples = Vec::with_capacity(count.get().min(PREALLOCATED_EXAMPLES));
    for index in 0..count.get() {
        let Some(example) = produce(task)? else {
            return Ok(None);
        };

        examples.push(match overrides {
            Some(overrides) => overrides.apply(example, index),
            None => example,
        });
    }

    if examples.len() == 1 {
        Ok(examples.pop().map(Generated::One))
    } else {
        Ok(Some(Generated::Many(examples)))
    }
}
