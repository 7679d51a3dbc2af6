//! The message set the control window may send.
//!
//! Exactly five requests exist; anything else the webview might want is not
//! reachable. Each Tauri command in `commands` maps onto one variant and goes
//! through `OverlayController::dispatch`.

use crate::geometry::Position;
use crate::window::ContentVisibility;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IpcRequest {
    PointerDown { position: Position },
    PointerMove { position: Position },
    PointerUp,
    ToggleContent,
    ReadClipboard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum IpcResponse {
    Ack,
    /// New control-window position, or `None` when the move was ignored.
    Moved(Option<Position>),
    Content(ContentVisibility),
    ClipboardText(String),
}
