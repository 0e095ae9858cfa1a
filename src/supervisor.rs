//! Supervision unit management for client backends
//!
//! Each client gets one deterministically named unit describing its backend
//! process. Registration overwrites any prior unit for the same client and
//! restarts the running instance, so re-running create converges instead of
//! accumulating duplicates.

use crate::error::ProvisionError;
use crate::layout::ClientLayout;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Narrow interface over the host's service supervisor.
///
/// The orchestrator only ever upserts one unit, reloads the catalog and
/// starts one service, so that is the whole surface. Tests substitute a
/// call-recording implementation and run without root or a live host.
pub trait ServiceManager: Send + Sync {
    /// Write (or overwrite) the unit descriptor for `name`.
    fn upsert_unit(&self, name: &str, unit: &str) -> Result<(), ProvisionError>;

    /// Make the supervisor re-read its unit catalog.
    fn reload_catalog(&self) -> Result<(), ProvisionError>;

    /// Enable `name` at boot and (re)start it now, replacing any running
    /// instance.
    fn enable_and_start(&self, name: &str) -> Result<(), ProvisionError>;
}

/// Deterministic unit name for a client
pub fn service_name(id: &str) -> String {
    format!("bizcalc-client-{}", id)
}

/// Render the supervision unit for one client backend
pub fn render_unit(id: &str, working_dir: &Path, binary: &Path, port: u16, run_as: &str) -> String {
    format!(
        r#"[Unit]
Description=BizCalc API (client: {id})
After=network.target

[Service]
Type=simple
User={run_as}
WorkingDirectory={working_dir}
Environment=PORT={port}
ExecStart={binary}
Restart=always
RestartSec=5

[Install]
WantedBy=multi-user.target
"#,
        id = id,
        run_as = run_as,
        working_dir = working_dir.display(),
        port = port,
        binary = binary.display(),
    )
}

/// Register the client's backend with the supervisor: upsert the unit,
/// reload the catalog, then enable and (re)start the service.
///
/// A reload or start failure is propagated as-is; the proxy must not be
/// pointed at a service that could not be brought up.
pub fn register(
    manager: &dyn ServiceManager,
    id: &str,
    layout: &ClientLayout,
    binary: &Path,
    port: u16,
    run_as: &str,
) -> Result<String, ProvisionError> {
    let name = service_name(id);
    let unit = render_unit(id, &layout.client_dir, binary, port, run_as);

    manager.upsert_unit(&name, &unit)?;
    manager.reload_catalog()?;
    manager.enable_and_start(&name)?;

    info!(client = id, service = %name, port, "Backend service registered");
    Ok(name)
}

/// systemctl-backed implementation writing units into a configured directory
pub struct Systemctl {
    unit_dir: PathBuf,
}

impl Systemctl {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), ProvisionError> {
        debug!(?args, "Running systemctl");
        let output = Command::new("systemctl").args(args).output().map_err(|e| {
            ProvisionError::Supervisor(format!("failed to run systemctl {}: {}", args.join(" "), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Supervisor(format!(
                "systemctl {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ServiceManager for Systemctl {
    fn upsert_unit(&self, name: &str, unit: &str) -> Result<(), ProvisionError> {
        let path = self.unit_dir.join(format!("{}.service", name));
        fs::write(&path, unit).map_err(|e| {
            ProvisionError::Supervisor(format!("failed to write unit {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Unit descriptor written");
        Ok(())
    }

    fn reload_catalog(&self) -> Result<(), ProvisionError> {
        self.run(&["daemon-reload"])
    }

    fn enable_and_start(&self, name: &str) -> Result<(), ProvisionError> {
        self.run(&["enable", "--now", &format!("{}.service", name)])
    }
}
