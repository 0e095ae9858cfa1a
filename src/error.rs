//! Error types for the provisioning orchestrator

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort a provisioning run.
///
/// Every variant renders as a single human-readable line; the HTTP
/// front-end maps all of them to the same failure response without
/// distinguishing the kind.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Client id is empty or contains characters outside `[A-Za-z0-9-]`
    #[error("invalid client name: {0:?}")]
    InvalidClientId(String),

    /// Backend binary or shared frontend bundle is absent
    #[error("required artifact not found at {}", .path.display())]
    MissingArtifact {
        /// The path that was expected to exist
        path: PathBuf,
    },

    /// The allocator exhausted its port range
    #[error("no free ports in {start}..={end}")]
    NoFreePort { start: u16, end: u16 },

    /// Unit write, catalog reload, or service start failed
    #[error("supervisor: {0}")]
    Supervisor(String),

    /// Rule write, validation, or reload failed
    #[error("proxy: {0}")]
    Proxy(String),

    /// Filesystem operation failed while building the client layout
    #[error("{}: {}", .path.display(), .source)]
    Io {
        /// The path the operation was applied to
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Attach a path to a raw io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
