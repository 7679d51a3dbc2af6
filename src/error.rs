//! Error types for the overlay controller.
//!
//! Everything that can cross the IPC boundary is `Serialize` so Tauri commands
//! can hand it straight back to the control window.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum OverlayError {
    /// The control window is created once per process.
    #[error("control window already exists")]
    ControlWindowExists,

    #[error("control window has not been created yet")]
    NoControlWindow,

    #[error("window error: {0}")]
    Window(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("controller state poisoned")]
    Poisoned,
}

impl From<tauri::Error> for OverlayError {
    fn from(err: tauri::Error) -> Self {
        OverlayError::Window(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for OverlayError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        OverlayError::Poisoned
    }
}

pub type OverlayResult<T> = Result<T, OverlayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
