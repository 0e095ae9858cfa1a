//! Reverse-proxy virtual host management
//!
//! One rule file per client, written into the available-rules directory and
//! activated by a same-named symlink in the enabled-rules directory. The
//! rule serves the client's frontend copy directly and forwards `/api/`
//! traffic to the allocated backend port.

use crate::error::ProvisionError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Narrow interface over the host's reverse proxy.
///
/// Mirrors the three external actions the orchestrator performs: write and
/// activate one rule, validate the aggregate configuration, apply it.
pub trait ProxyManager: Send + Sync {
    /// Write (or overwrite) the rule `name` and make it active. Returns the
    /// path of the written rule file.
    fn upsert_rule(&self, name: &str, rule: &str) -> Result<PathBuf, ProvisionError>;

    /// Syntax/consistency check across all active rules, not just the last
    /// one written.
    fn validate(&self) -> Result<(), ProvisionError>;

    /// Apply the active configuration.
    fn reload(&self) -> Result<(), ProvisionError>;
}

/// Deterministic rule name for a client
pub fn rule_name(id: &str) -> String {
    format!("bizcalc-{}.conf", id)
}

/// Render the virtual-host rule routing `hostname` to a client deployment.
///
/// Static files come straight from the client's frontend copy with SPA
/// fallback to the index document; anything under `/api/` is forwarded to
/// the local backend port with the standard forwarded headers and upgrade
/// passthrough.
pub fn render_vhost(hostname: &str, frontend_dir: &Path, port: u16) -> String {
    format!(
        r#"server {{
    listen 80;
    server_name {hostname};
    root {root};
    index index.html;

    location /api/ {{
        proxy_pass http://127.0.0.1:{port}/;
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}

    location / {{
        try_files $uri $uri/ /index.html;
    }}
}}
"#,
        hostname = hostname,
        root = frontend_dir.display(),
        port = port,
    )
}

/// Route `hostname` to this client's static assets and backend port.
///
/// The rule is written and activated before validation runs; a validation
/// failure therefore leaves the rule in place and skips the reload. The next
/// successful run for the same client overwrites it.
pub fn configure(
    manager: &dyn ProxyManager,
    id: &str,
    hostname: &str,
    frontend_dir: &Path,
    port: u16,
) -> Result<PathBuf, ProvisionError> {
    let name = rule_name(id);
    let rule = render_vhost(hostname, frontend_dir, port);

    let path = manager.upsert_rule(&name, &rule)?;
    manager.validate()?;
    manager.reload()?;

    info!(client = id, hostname, port, path = %path.display(), "Proxy rule active");
    Ok(path)
}

/// nginx-backed implementation using the sites-available/sites-enabled
/// convention
pub struct Nginx {
    sites_available: PathBuf,
    sites_enabled: PathBuf,
}

impl Nginx {
    pub fn new(sites_available: impl Into<PathBuf>, sites_enabled: impl Into<PathBuf>) -> Self {
        Self {
            sites_available: sites_available.into(),
            sites_enabled: sites_enabled.into(),
        }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<(), ProvisionError> {
        debug!(program, ?args, "Running proxy command");
        let output = Command::new(program).args(args).output().map_err(|e| {
            ProvisionError::Proxy(format!("failed to run {} {}: {}", program, args.join(" "), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Proxy(format!(
                "{} {} failed: {}",
                program,
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ProxyManager for Nginx {
    fn upsert_rule(&self, name: &str, rule: &str) -> Result<PathBuf, ProvisionError> {
        for dir in [&self.sites_available, &self.sites_enabled] {
            fs::create_dir_all(dir).map_err(|e| {
                ProvisionError::Proxy(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        let target = self.sites_available.join(name);
        fs::write(&target, rule).map_err(|e| {
            ProvisionError::Proxy(format!("failed to write rule {}: {}", target.display(), e))
        })?;

        // Replace any existing link first; symlink creation fails on a
        // pre-existing name. symlink_metadata also catches dangling links.
        let link = self.sites_enabled.join(name);
        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link).map_err(|e| {
                ProvisionError::Proxy(format!("failed to remove link {}: {}", link.display(), e))
            })?;
        }
        activate(&target, &link)?;

        debug!(path = %target.display(), "Proxy rule written and linked");
        Ok(target)
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        self.run("nginx", &["-t"])
    }

    fn reload(&self) -> Result<(), ProvisionError> {
        self.run("systemctl", &["reload", "nginx"])
    }
}

#[cfg(unix)]
fn activate(target: &Path, link: &Path) -> Result<(), ProvisionError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| {
        ProvisionError::Proxy(format!("failed to link {}: {}", link.display(), e))
    })
}

#[cfg(not(unix))]
fn activate(target: &Path, link: &Path) -> Result<(), ProvisionError> {
    // No symlinks; fall back to a plain copy of the rule file
    fs::copy(target, link)
        .map(|_| ())
        .map_err(|e| ProvisionError::Proxy(format!("failed to copy {}: {}", link.display(), e)))
}
