//! Tauri commands exposed to the control window.
//!
//! The capability file grants these five to the `control` window and nothing
//! else; the content window cannot invoke any of them.

use crate::error::OverlayResult;
use crate::geometry::Position;
use crate::ipc::{IpcRequest, IpcResponse};
use crate::window::{ContentVisibility, CONTROL_LABEL};
use crate::AppController;
use tauri::{AppHandle, Emitter, Manager, State};

pub const EVENT_CONTENT_VISIBILITY: &str = "content://visibility";
pub const EVENT_CONTENT_LOAD_FAILED: &str = "content://load-failed";
pub const EVENT_SERVICE_STATUS: &str = "service://status";

#[tauri::command]
pub fn pointer_down(position: Position, controller: State<'_, AppController>) -> OverlayResult<IpcResponse> {
    controller.dispatch(IpcRequest::PointerDown { position })
}

#[tauri::command]
pub fn pointer_move(position: Position, controller: State<'_, AppController>) -> OverlayResult<IpcResponse> {
    controller.dispatch(IpcRequest::PointerMove { position })
}

#[tauri::command]
pub fn pointer_up(controller: State<'_, AppController>) -> OverlayResult<IpcResponse> {
    controller.dispatch(IpcRequest::PointerUp)
}

// Async: window creation waits on the event loop, so it must not run on the
// main thread.
#[tauri::command]
pub async fn toggle_content(app: AppHandle, controller: State<'_, AppController>) -> OverlayResult<IpcResponse> {
    let response = controller.dispatch(IpcRequest::ToggleContent)?;
    if let IpcResponse::Content(visibility) = &response {
        after_toggle(&app, *visibility);
    }
    Ok(response)
}

#[tauri::command]
pub fn read_clipboard_text(controller: State<'_, AppController>) -> OverlayResult<IpcResponse> {
    controller.dispatch(IpcRequest::ReadClipboard)
}

/// Toggle triggered from the host side (tray menu, global shortcut).
pub fn toggle_from_host(app: &AppHandle) {
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        let Some(controller) = app.try_state::<AppController>() else {
            tracing::debug!("[overlay] toggle ignored, controller not ready");
            return;
        };
        match controller.dispatch(IpcRequest::ToggleContent) {
            Ok(IpcResponse::Content(visibility)) => after_toggle(&app, visibility),
            Ok(_) => {}
            Err(e) => tracing::warn!("[overlay] toggle failed: {}", e),
        }
    });
}

fn after_toggle(app: &AppHandle, visibility: ContentVisibility) {
    if let Err(e) = app.emit_to(CONTROL_LABEL, EVENT_CONTENT_VISIBILITY, visibility) {
        tracing::warn!("[overlay] failed to emit visibility: {}", e);
    }
    if visibility == ContentVisibility::Shown {
        spawn_load_check(app.clone());
    }
}

/// One load check per show, off the calling thread.
fn spawn_load_check(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let Some(controller) = app.try_state::<AppController>() else {
            return;
        };
        match controller.check_content_load().await {
            Ok(None) => {}
            Ok(Some(failure)) => {
                if let Err(e) = app.emit_to(CONTROL_LABEL, EVENT_CONTENT_LOAD_FAILED, failure) {
                    tracing::warn!("[overlay] failed to emit load failure: {}", e);
                }
            }
            Err(e) => tracing::warn!("[overlay] could not record load failure: {}", e),
        }
    });
}
