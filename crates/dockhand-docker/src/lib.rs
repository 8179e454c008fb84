//! `dockhand-docker`: container runtime clients for the dockhand engine.
//!
//! Two front ends implement [`ContainerRuntime`]:
//!
//! - [`DockerCli`] spawns the `docker` binary for every call
//! - [`DockerHttp`] talks to the Docker Engine API over TCP
//!
//! [`connect`] picks one from the `runtime` settings section.

use std::sync::Arc;

use dockhand_core::config::RuntimeConfig;
use dockhand_core::runtime::ContainerRuntime;

pub mod cli;
pub mod error;
pub mod http;
pub mod types;

pub use cli::DockerCli;
pub use error::{DockerError, Result};
pub use http::DockerHttp;

/// Build the runtime client described by `config`.
pub fn connect(config: &RuntimeConfig) -> Result<Arc<dyn ContainerRuntime>> {
    match config {
        RuntimeConfig::Cli { binary } => Ok(Arc::new(DockerCli::new(binary.clone()))),
        RuntimeConfig::Http { endpoint } => Ok(Arc::new(DockerHttp::new(endpoint)?)),
    }
}
