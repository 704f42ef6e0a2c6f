use std::sync::Arc;

use serde_json::Value;

use crate::Fixture;
use crate::error::{FixtureError, Result};

pub(crate) type HelperFn = Arc<dyn Fn(&Fixture, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Builder for a helper function.
///
/// Helpers receive the fixture they were registered on as an explicit first
/// argument, followed by the call arguments.
///
/// ```rust
/// use fixative::{Fixture, HelperDef};
/// use serde_json::json;
///
/// let fixture = Fixture::new();
/// fixture
///     .helper(HelperDef::new("sum").run(|_, args| {
///         Ok(json!(args.iter().filter_map(|v| v.as_i64()).sum::<i64>()))
///     }))
///     .unwrap();
///
/// assert_eq!(fixture.call_helper("sum", &[json!(2), json!(3)]).unwrap(), json!(5));
/// ```
#[derive(Clone, Default)]
pub struct HelperDef {
    name: Option<String>,
    func: Option<HelperFn>,
}

impl HelperDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            func: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn run<F>(mut self, func: F) -> Self
    where
        F: Fn(&Fixture, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(func));
        self
    }

    pub(crate) fn into_parts(self) -> Result<(String, HelperFn)> {
        let name = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(FixtureError::MissingHelperArgs("no helper name".into())),
        };

        let func = self.func.ok_or_else(|| {
            FixtureError::MissingHelperArgs(format!("no function given for helper '{name}'"))
        })?;

        Ok((name, func))
    }
}

impl std::fmt::Debug for HelperDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperDef")
            .field("name", &self.name)
            .field("func", &self.func.as_ref().map(|_| "*"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_name() {
        let err = HelperDef::default().run(|_, _| Ok(Value::Null)).into_parts();
        assert!(matches!(err, Err(FixtureError::MissingHelperArgs(msg)) if msg.contains("no helper name")));
    }

    #[test]
    fn test_requires_function() {
        let err = HelperDef::new("noop").into_parts();
        assert!(matches!(err, Err(FixtureError::MissingHelperArgs(msg)) if msg.contains("noop")));
    }
}
