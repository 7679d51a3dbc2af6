//! OverlayController - the one object that owns overlay state for the life of
//! the process: both windows, the drag session, the clipboard bridge and the
//! supervised backing service.
//!
//! Pointer events and window-destroyed events arrive on the main thread while
//! toggles run on async workers. The drag lock is never held across a window
//! call, and the window manager keeps the same rule for its own state.

use crate::clipboard::ClipboardSource;
use crate::drag::DragTracker;
use crate::error::OverlayResult;
use crate::ipc::{IpcRequest, IpcResponse};
use crate::supervisor::{BackingServiceSupervisor, ReadinessProbe};
use crate::window::{LoadFailure, OverlayWindowManager, WindowFactory};
use std::sync::{Arc, Mutex};

pub struct OverlayController<F: WindowFactory> {
    windows: OverlayWindowManager<F>,
    drag: Mutex<DragTracker>,
    clipboard: Box<dyn ClipboardSource>,
    probe: Box<dyn ReadinessProbe>,
    supervisor: Arc<BackingServiceSupervisor>,
}

impl<F: WindowFactory> OverlayController<F> {
    pub fn new(
        windows: OverlayWindowManager<F>,
        clipboard: Box<dyn ClipboardSource>,
        probe: Box<dyn ReadinessProbe>,
        supervisor: Arc<BackingServiceSupervisor>,
    ) -> Self {
        Self {
            windows,
            drag: Mutex::new(DragTracker::new()),
            clipboard,
            probe,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<BackingServiceSupervisor> {
        &self.supervisor
    }

    pub fn windows(&self) -> &OverlayWindowManager<F> {
        &self.windows
    }

    pub fn create_control_window(&self) -> OverlayResult<()> {
        self.windows.create_control_window()?;
        Ok(())
    }

    pub fn dispatch(&self, request: IpcRequest) -> OverlayResult<IpcResponse> {
        match request {
            IpcRequest::PointerDown { position } => {
                let window = self.windows.control_position()?;
                self.drag.lock()?.pointer_down(position, window);
                Ok(IpcResponse::Ack)
            }
            IpcRequest::PointerMove { position } => {
                let target = self.drag.lock()?.pointer_move(position);
                if let Some(target) = target {
                    self.windows.apply_drag_position(target)?;
                }
                Ok(IpcResponse::Moved(target))
            }
            IpcRequest::PointerUp => {
                self.drag.lock()?.pointer_up();
                Ok(IpcResponse::Ack)
            }
            IpcRequest::ToggleContent => self.windows.toggle_content().map(IpcResponse::Content),
            IpcRequest::ReadClipboard => self.clipboard.read_text().map(IpcResponse::ClipboardText),
        }
    }

    pub fn content_closed(&self) -> OverlayResult<()> {
        self.windows.content_closed()
    }

    pub fn report_load_failure(&self, reason: impl Into<String>) -> OverlayResult<LoadFailure> {
        self.windows.report_load_failure(reason)
    }

    pub fn content_url(&self) -> &str {
        self.windows.content_url()
    }

    /// Probe the content URL once. A dead URL is recorded so the next show
    /// re-navigates; `None` means the service answered.
    pub async fn check_content_load(&self) -> OverlayResult<Option<LoadFailure>> {
        if self.probe.is_ready(self.content_url()).await {
            return Ok(None);
        }
        self.report_load_failure("backing service did not answer").map(Some)
    }

    /// Teardown hook. Stops the backing service; repeated calls are no-ops.
    pub async fn shutdown(&self) {
        self.supervisor.stop().await;
    }
}
