//! Server configuration: TOML file + CLI overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use webcmd_core::HookRule;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    /// `[[hooks]]` tables, consulted before the built-in hooks.
    #[serde(default)]
    pub hooks: Vec<HookRule>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Pause after forwarding input so its output shows up on the next page load.
    #[serde(default = "default_input_delay_ms")]
    pub input_delay_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            input_delay_ms: default_input_delay_ms(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_input_delay_ms() -> u64 {
    1000
}

/// Values given on the command line; `None` means "use the file/default".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub input_delay_ms: Option<u64>,
    pub output: Option<PathBuf>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub command: String,
    pub port: u16,
    pub bind: String,
    pub input_delay: Duration,
    pub output_path: PathBuf,
    pub hook_rules: Vec<HookRule>,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, command: String, cli: CliOverrides) -> Result<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)
                        .with_context(|| format!("cannot read {}", expanded.display()))?;
                    toml::from_str::<ConfigFile>(&content)
                        .with_context(|| format!("config parse error in {}", expanded.display()))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Ok(Self {
            command,
            port: cli.port.unwrap_or(file_config.server.port),
            bind: cli.bind.unwrap_or(file_config.server.bind),
            input_delay: Duration::from_millis(
                cli.input_delay_ms
                    .unwrap_or(file_config.server.input_delay_ms),
            ),
            output_path: cli
                .output
                .map(|p| expand_tilde(&p))
                .unwrap_or_else(temp_output_path),
            hook_rules: file_config.hooks,
        })
    }

    /// `bind:port` string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// `$TMPDIR/web-cmd_<32 hex chars>`.
pub fn temp_output_path() -> PathBuf {
    use rand::Rng;
    let bytes: [u8; 16] = rand::thread_rng().gen();
    std::env::temp_dir().join(format!("web-cmd_{}", hex::encode(bytes)))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
