#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod cleanup;
mod config;
mod error;
mod example;
mod fixture;
mod helper;
mod hook;
#[cfg(feature = "logging")]
pub mod logging;
mod registry;
mod scheduler;
mod strategy;
mod task;
mod utils;

use std::sync::LazyLock;

pub use crate::cleanup::CleanupOrder;
pub use crate::config::{ENV_CLEANUP_ORDER, ENV_LABEL, Options};
pub use crate::error::*;
pub use crate::example::{Count, ExampleOptions, Generated, Override};
pub use crate::fixture::Fixture;
pub use crate::helper::HelperDef;
pub use crate::hook::{CleanHook, Hook};
pub use crate::strategy::{MemoryStore, Strategy};
pub use crate::task::{BoxFuture, Names, Task, TaskDef};

static GLOBAL: LazyLock<Fixture> = LazyLock::new(Fixture::new);

/// The process-wide default fixture.
///
/// Test files that share one set of tasks can register and create them here
/// instead of passing a [`Fixture`] around. Anything that needs isolation
/// should use its own instance, see [`Fixture::instantiate`].
pub fn global() -> &'static Fixture {
    &GLOBAL
}
