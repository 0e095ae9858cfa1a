use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Global configuration for the onboarding service
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP front-end settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Host filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Backend port allocation range
    #[serde(default)]
    pub ports: PortRangeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1; the form performs privileged
    /// operations and must not be exposed publicly)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default: 8080)
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_listen_port(),
        }
    }
}

/// Where deployments, supervision units and proxy rules live on the host
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Deployment root holding `bin/`, `frontend/` and `clients/`
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Directory the supervisor reads unit descriptors from
    #[serde(default = "default_systemd_dir")]
    pub systemd_dir: PathBuf,

    /// Directory proxy rules are written to
    #[serde(default = "default_sites_available")]
    pub sites_available: PathBuf,

    /// Directory active proxy rules are linked into
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: PathBuf,

    /// User the client backends run as
    #[serde(default = "default_run_as")]
    pub run_as: String,
}

impl PathsConfig {
    /// Shared backend executable started by every client's unit
    pub fn backend_binary(&self) -> PathBuf {
        self.base_dir.join("bin").join("bizcalc-server")
    }

    /// Shared frontend bundle copied into each client's subtree
    pub fn frontend_dist(&self) -> PathBuf {
        self.base_dir.join("frontend")
    }

    /// Root of the per-client subtrees
    pub fn clients_dir(&self) -> PathBuf {
        self.base_dir.join("clients")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            systemd_dir: default_systemd_dir(),
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            run_as: default_run_as(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortRangeConfig {
    /// First candidate backend port (default: 3001)
    #[serde(default = "default_range_start")]
    pub start: u16,

    /// Last candidate backend port, inclusive (default: 3999)
    #[serde(default = "default_range_end")]
    pub end: u16,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        Self {
            start: default_range_start(),
            end: default_range_end(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/opt/bizcalc")
}

fn default_systemd_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}

fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_run_as() -> String {
    "www-data".to_string()
}

fn default_range_start() -> u16 {
    3001
}

fn default_range_end() -> u16 {
    3999
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ports.start == 0 {
            anyhow::bail!("ports.start must be greater than 0");
        }
        if self.ports.start > self.ports.end {
            anyhow::bail!(
                "ports.start ({}) must not exceed ports.end ({})",
                self.ports.start,
                self.ports.end
            );
        }
        Ok(())
    }
}
