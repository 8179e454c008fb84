pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod orchestrator;
pub mod permissions;
pub mod registry;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;

pub use error::{CoreError, Result};
