use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupOrder;
use crate::error::{FixtureError, Result};

/// Environment variable overriding [`Options::cleanup_order`].
pub const ENV_CLEANUP_ORDER: &str = "FIXATIVE_CLEANUP_ORDER";
/// Environment variable overriding [`Options::label`].
pub const ENV_LABEL: &str = "FIXATIVE_LABEL";

/// Settings of a single fixture instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Name attached to the tracing span of every operation, handy when
    /// several fixtures log at once.
    pub label: Option<String>,
    /// Teardown order used by [`Fixture::clean`](crate::Fixture::clean).
    pub cleanup_order: CleanupOrder,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn cleanup_order(mut self, order: CleanupOrder) -> Self {
        self.cleanup_order = order;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| FixtureError::Config(err.to_string()))
    }

    /// Defaults, overridden by `FIXATIVE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(order) = var(ENV_CLEANUP_ORDER) {
            self.cleanup_order = order.parse()?;
        }
        if let Some(label) = var(ENV_LABEL).filter(|label| !label.is_empty()) {
            self.label = Some(label);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.cleanup_order, CleanupOrder::Reverse);
        assert_eq!(options.label, None);
    }

    #[test]
    fn test_from_json() {
        let options = Options::from_json(r#"{ "label": "users", "cleanup_order": "forward" }"#).unwrap();
        assert_eq!(options, Options::new().label("users").cleanup_order(CleanupOrder::Forward));

        assert_eq!(Options::from_json("{}").unwrap(), Options::default());
        assert!(matches!(
            Options::from_json(r#"{ "preload": "test/fixtures" }"#),
            Err(FixtureError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            (ENV_CLEANUP_ORDER, "forward".to_string()),
            (ENV_LABEL, "suite".to_string()),
        ]);

        let options = Options::default()
            .with_vars(|key| vars.get(key).cloned())
            .unwrap();

        assert_eq!(options.cleanup_order, CleanupOrder::Forward);
        assert_eq!(options.label.as_deref(), Some("suite"));
    }

    #[test]
    fn test_env_rejects_bad_order() {
        let result = Options::default().with_vars(|key| {
            (key == ENV_CLEANUP_ORDER).then(|| "backwards".to_string())
        });
        assert!(matches!(result, Err(FixtureError::Config(_))));
    }
}
