//! Runtime configuration.
//!
//! Read once at startup from the process environment (after `.env` has been
//! loaded). Every key is optional; anything missing falls back to the values
//! the overlay ships with.

use crate::error::ConfigError;
use crate::geometry::Size;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVICE_PORT: u16 = 8501;
pub const CONTROL_WINDOW_SIZE: Size = Size { width: 50.0, height: 50.0 };

#[cfg(windows)]
const DEFAULT_INTERPRETER: &str = "python";
#[cfg(not(windows))]
const DEFAULT_INTERPRETER: &str = "python3";

/// How the backing service is launched and health-gated.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    pub interpreter: String,
    pub server_module: String,
    pub entry_script: PathBuf,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub port_release_timeout: Duration,
}

impl ServiceConfig {
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Arguments passed to the interpreter, in order.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.server_module.clone(),
            "run".to_string(),
            self.entry_script.display().to_string(),
            "--server.headless=true".to_string(),
            format!("--server.port={}", self.port),
        ]
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVICE_PORT,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            server_module: "streamlit".to_string(),
            entry_script: PathBuf::from("polish_bot.py"),
            ready_timeout: Duration::from_secs(30),
            ready_interval: Duration::from_millis(250),
            port_release_timeout: Duration::from_secs(3),
        }
    }
}

/// Geometry of the two overlay windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub control_size: Size,
    pub content_size: Size,
    pub gap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            control_size: CONTROL_WINDOW_SIZE,
            content_size: Size { width: 350.0, height: 600.0 },
            gap: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    pub service: ServiceConfig,
    pub layout: LayoutConfig,
    pub toggle_shortcut: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            layout: LayoutConfig::default(),
            toggle_shortcut: "CommandOrControl+Shift+Space".to_string(),
        }
    }
}

impl OverlayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = parse::<u16>(&get, "OVERLAY_SERVICE_PORT")? {
            if port == 0 {
                return Err(ConfigError::Invalid {
                    key: "OVERLAY_SERVICE_PORT",
                    value: "0".to_string(),
                });
            }
            config.service.port = port;
        }
        if let Some(interpreter) = get("OVERLAY_PYTHON") {
            config.service.interpreter = interpreter;
        }
        if let Some(module) = get("OVERLAY_SERVER_MODULE") {
            config.service.server_module = module;
        }
        if let Some(script) = get("OVERLAY_ENTRY_SCRIPT") {
            config.service.entry_script = PathBuf::from(script);
        }
        if let Some(ms) = parse::<u64>(&get, "OVERLAY_READY_TIMEOUT_MS")? {
            config.service.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&get, "OVERLAY_READY_INTERVAL_MS")? {
            config.service.ready_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse::<u64>(&get, "OVERLAY_PORT_RELEASE_TIMEOUT_MS")? {
            config.service.port_release_timeout = Duration::from_millis(ms);
        }
        if let Some(width) = parse_positive(&get, "OVERLAY_CONTENT_WIDTH")? {
            config.layout.content_size.width = width;
        }
        if let Some(height) = parse_positive(&get, "OVERLAY_CONTENT_HEIGHT")? {
            config.layout.content_size.height = height;
        }
        if let Some(gap) = parse::<f64>(&get, "OVERLAY_WINDOW_GAP")? {
            config.layout.gap = gap;
        }
        if let Some(shortcut) = get("OVERLAY_TOGGLE_SHORTCUT") {
            config.toggle_shortcut = shortcut;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_positive(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<f64>, ConfigError> {
    match parse::<f64>(get, key)? {
        Some(v) if v <= 0.0 || !v.is_finite() => Err(ConfigError::Invalid {
            key,
            value: v.to_string(),
        }),
        other => Ok(other),
    }
}
