use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::FixtureError;
use crate::task::Task;

/// Order in which executed tasks are torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupOrder {
    /// Dependents are torn down before their dependencies.
    #[default]
    Reverse,
    /// Tasks are torn down in the order they ran.
    Forward,
}

impl FromStr for CleanupOrder {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reverse" => Ok(CleanupOrder::Reverse),
            "forward" => Ok(CleanupOrder::Forward),
            other => Err(FixtureError::Config(format!(
                "unknown cleanup order '{other}', expected 'reverse' or 'forward'"
            ))),
        }
    }
}

/// Tasks that ran and still have to be torn down, in execution order.
#[derive(Debug, Default)]
pub(crate) struct CleanupStack {
    entries: Vec<Arc<Task>>,
}

impl CleanupStack {
    /// Records a task that started running. A task still waiting for its
    /// teardown is not recorded twice.
    pub fn push(&mut self, task: Arc<Task>) {
        if !self.entries.iter().any(|entry| Arc::ptr_eq(entry, &task)) {
            self.entries.push(task);
        }
    }

    /// Removes the next task to tear down.
    pub fn take(&mut self, order: CleanupOrder) -> Option<Arc<Task>> {
        match order {
            CleanupOrder::Reverse => self.entries.pop(),
            CleanupOrder::Forward if self.entries.is_empty() => None,
            CleanupOrder::Forward => Some(self.entries.remove(0)),
        }
    }

    /// Puts back a task whose teardown failed, so it is the next one taken.
    pub fn restore(&mut self, order: CleanupOrder, task: Arc<Task>) {
        match order {
            CleanupOrder::Reverse => self.entries.push(task),
            CleanupOrder::Forward => self.entries.insert(0, task),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|task| task.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskDef;

    fn task(name: &str) -> Arc<Task> {
        Arc::new(TaskDef::new(name).freeze().unwrap())
    }

    fn stack() -> CleanupStack {
        let mut stack = CleanupStack::default();
        stack.push(task("a"));
        stack.push(task("b"));
        stack.push(task("c"));
        stack
    }

    #[test]
    fn test_reverse_order() {
        let mut stack = stack();
        let order: Vec<_> = std::iter::from_fn(|| stack.take(CleanupOrder::Reverse))
            .map(|task| task.name.clone())
            .collect();

        assert_eq!(order, ["c", "b", "a"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_forward_order() {
        let mut stack = stack();
        let order: Vec<_> = std::iter::from_fn(|| stack.take(CleanupOrder::Forward))
            .map(|task| task.name.clone())
            .collect();

        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_restore_keeps_position() {
        for order in [CleanupOrder::Reverse, CleanupOrder::Forward] {
            let mut stack = stack();
            let first = stack.take(order).unwrap();
            stack.restore(order, first.clone());

            assert_eq!(stack.len(), 3);
            assert_eq!(stack.take(order).unwrap().name, first.name);
        }
    }

    #[test]
    fn test_push_skips_pending_task() {
        let mut stack = CleanupStack::default();
        let a = task("a");
        stack.push(a.clone());
        stack.push(a);
        // a redefinition is a different task
        stack.push(task("a"));

        assert_eq!(stack.names(), ["a", "a"]);
    }

    #[test]
    fn test_parse_order() {
        assert_eq!("Forward".parse::<CleanupOrder>().unwrap(), CleanupOrder::Forward);
        assert_eq!(" reverse ".parse::<CleanupOrder>().unwrap(), CleanupOrder::Reverse);
        assert!(matches!(
            "sideways".parse::<CleanupOrder>(),
            Err(FixtureError::Config(_))
        ));
    }
}
