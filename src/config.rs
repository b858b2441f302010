use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::gcp::Endpoints;
use crate::reconcile::FulfillmentSettings;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "perimeter-control.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Base URLs of the Google Cloud APIs.
    #[serde(default)]
    pub upstream: Endpoints,
    #[serde(default)]
    pub perimeter: PerimeterConfig,
    #[serde(default)]
    pub fulfillment: FulfillmentSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    64
}

fn default_perimeter_name() -> String {
    "df_webhook".to_string()
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// No nested expansion: `${VAR:-${DEFAULT}}` is not supported.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&parse_var_reference(&mut chars)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse `VAR}` or `VAR:-default}` after seeing `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut closed = false;

    while let Some(c) = chars.next() {
        if c == '}' {
            closed = true;
            break;
        }
        if let Some(default) = default_value.as_mut() {
            default.push(c);
        } else if c == ':' && chars.peek() == Some(&'-') {
            chars.next();
            default_value = Some(String::new());
        } else {
            var_name.push(c);
        }
    }

    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    match (std::env::var(&var_name), default_value) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum number of update requests handled at once, across all routes.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

// ============================================================================
// PerimeterConfig
// ============================================================================

/// The service perimeter governed by the perimeter routes.
#[derive(Debug, Clone, Deserialize)]
pub struct PerimeterConfig {
    #[serde(default = "default_perimeter_name")]
    pub name: String,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        Self {
            name: default_perimeter_name(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
