//! Per-client filesystem layout
//!
//! Each client owns one subtree under the clients directory: a `frontend/`
//! copy of the shared bundle, a `data/` directory and an `uploads/`
//! directory. Frontend assets are build artifacts and are replaced on every
//! run; data and uploads are client-owned state and are never touched once
//! created.

use crate::config::PathsConfig;
use crate::error::ProvisionError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolved directory tree for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLayout {
    /// Root of the client subtree, also the backend's working directory
    pub client_dir: PathBuf,
    /// Static assets served directly by the proxy
    pub frontend_dir: PathBuf,
    /// Client-owned state storage
    pub data_dir: PathBuf,
    /// Client-owned uploaded files
    pub uploads_dir: PathBuf,
}

impl ClientLayout {
    /// Deterministic layout for `id` under `clients_dir`. Purely
    /// path arithmetic; nothing is created.
    pub fn for_client(clients_dir: &Path, id: &str) -> Self {
        let client_dir = clients_dir.join(id);
        Self {
            frontend_dir: client_dir.join("frontend"),
            data_dir: client_dir.join("data"),
            uploads_dir: client_dir.join("uploads"),
            client_dir,
        }
    }
}

/// Check that the shared artifacts every deployment needs are present.
///
/// Runs before any mutation so a missing artifact leaves no partial state.
pub fn check_artifacts(paths: &PathsConfig) -> Result<(), ProvisionError> {
    for path in [paths.backend_binary(), paths.frontend_dist()] {
        if !path.exists() {
            return Err(ProvisionError::MissingArtifact { path });
        }
    }
    Ok(())
}

/// Create (or reset) the filesystem layout for `id` and copy the shared
/// frontend bundle into it.
pub fn provision(paths: &PathsConfig, id: &str) -> Result<ClientLayout, ProvisionError> {
    check_artifacts(paths)?;

    let layout = ClientLayout::for_client(&paths.clients_dir(), id);

    fs::create_dir_all(&layout.data_dir).map_err(|e| ProvisionError::io(&layout.data_dir, e))?;
    fs::create_dir_all(&layout.uploads_dir)
        .map_err(|e| ProvisionError::io(&layout.uploads_dir, e))?;

    // Replace the frontend wholesale so it always matches the shared bundle
    if layout.frontend_dir.exists() {
        debug!(path = %layout.frontend_dir.display(), "Removing previous frontend copy");
        fs::remove_dir_all(&layout.frontend_dir)
            .map_err(|e| ProvisionError::io(&layout.frontend_dir, e))?;
    }
    copy_dir(&paths.frontend_dist(), &layout.frontend_dir)?;

    info!(client = id, dir = %layout.client_dir.display(), "Client layout provisioned");
    Ok(layout)
}

/// Recursively copy regular files and directories. Symlinks in the shared
/// bundle are not followed; the bundle is expected to be a plain build
/// output.
fn copy_dir(src: &Path, dst: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(dst).map_err(|e| ProvisionError::io(dst, e))?;

    let entries = fs::read_dir(src).map_err(|e| ProvisionError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(src, e))?;
        let file_type = entry.file_type().map_err(|e| ProvisionError::io(entry.path(), e))?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| ProvisionError::io(&target, e))?;
        }
    }
    Ok(())
}
