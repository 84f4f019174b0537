//! Configuration system for the Taskwire gateway.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskwire/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the gateway.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayConfigFile {
    server: ServerFileConfig,
    auth: AuthFileConfig,
    limits: LimitsFileConfig,
}

/// `[server]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

/// `[auth]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    public_key_path: Option<PathBuf>,
    algorithm: Option<String>,
}

/// `[limits]` section of the gateway config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LimitsFileConfig {
    rate_limit_max: Option<u32>,
    rate_limit_window_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the gateway server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskwire gateway server")]
pub struct GatewayCliArgs {
    /// Address to bind the gateway to.
    #[arg(short, long, env = "TASKWIRE_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskwire/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the token issuer's public key (PEM).
    #[arg(long, env = "TASKWIRE_PUBLIC_KEY")]
    pub public_key: Option<PathBuf>,

    /// Token signature algorithm (e.g. RS256, ES256, EdDSA).
    #[arg(long, env = "TASKWIRE_ALGORITHM")]
    pub algorithm: Option<String>,

    /// Maximum requests per identity per rate-limit window.
    #[arg(long)]
    pub rate_limit_max: Option<u32>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKWIRE_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:7400`).
    pub bind_addr: String,
    /// Path to the token issuer's public key (PEM). Required at startup.
    pub public_key_path: Option<PathBuf>,
    /// Token signature algorithm name.
    pub algorithm: String,
    /// Maximum requests per identity per window.
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Per-subscriber event queue capacity.
    pub channel_capacity: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7400".to_string(),
            public_key_path: None,
            algorithm: "RS256".to_string(),
            rate_limit_max: 120,
            rate_limit_window_secs: 60,
            channel_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &GatewayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `GatewayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &GatewayCliArgs, file: &GatewayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            public_key_path: cli
                .public_key
                .clone()
                .or_else(|| file.auth.public_key_path.clone()),
            algorithm: cli
                .algorithm
                .clone()
                .or_else(|| file.auth.algorithm.clone())
                .unwrap_or(defaults.algorithm),
            rate_limit_max: cli
                .rate_limit_max
                .or(file.limits.rate_limit_max)
                .unwrap_or(defaults.rate_limit_max),
            rate_limit_window_secs: file
                .limits
                .rate_limit_window_secs
                .unwrap_or(defaults.rate_limit_window_secs),
            channel_capacity: file
                .limits
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the gateway.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<GatewayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(GatewayConfigFile::default());
        };
        config_dir.join("taskwire").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GatewayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
