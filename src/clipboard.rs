use crate::error::{OverlayError, OverlayResult};
use tauri::{AppHandle, Runtime};
use tauri_plugin_clipboard_manager::ClipboardExt;

/// Plain-text clipboard access for the control window.
pub trait ClipboardSource: Send + Sync {
    fn read_text(&self) -> OverlayResult<String>;
}

pub struct TauriClipboard<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriClipboard<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> ClipboardSource for TauriClipboard<R> {
    fn read_text(&self) -> OverlayResult<String> {
        self.app
            .clipboard()
            .read_text()
            .map_err(|e| OverlayError::Clipboard(e.to_string()))
    }
}
