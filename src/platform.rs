//! Tauri-backed windows for the overlay window manager.

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{Bounds, Position, Size};
use crate::window::{ContentWindowSpec, ControlWindowSpec, OverlayWindow, WindowFactory};
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, LogicalPosition, Runtime, Url, WebviewUrl, WebviewWindow, WebviewWindowBuilder};

/// Page bundled from `ui/` that draws the floating button.
const CONTROL_PAGE: &str = "index.html";

pub struct TauriOverlayWindow<R: Runtime> {
    window: WebviewWindow<R>,
    home: Option<Url>,
}

impl<R: Runtime> Clone for TauriOverlayWindow<R> {
    fn clone(&self) -> Self {
        Self {
            window: self.window.clone(),
            home: self.home.clone(),
        }
    }
}

impl<R: Runtime> OverlayWindow for TauriOverlayWindow<R> {
    fn bounds(&self) -> OverlayResult<Bounds> {
        let scale = self.window.scale_factor()?;
        let position = self.window.outer_position()?.to_logical::<f64>(scale);
        let size = self.window.outer_size()?.to_logical::<f64>(scale);
        Ok(Bounds {
            position: Position::new(position.x, position.y),
            size: Size {
                width: size.width,
                height: size.height,
            },
        })
    }

    fn set_position(&self, position: Position) -> OverlayResult<()> {
        self.window
            .set_position(LogicalPosition::new(position.x, position.y))?;
        Ok(())
    }

    fn show(&self) -> OverlayResult<()> {
        self.window.show()?;
        Ok(())
    }

    fn hide(&self) -> OverlayResult<()> {
        self.window.hide()?;
        Ok(())
    }

    fn is_visible(&self) -> OverlayResult<bool> {
        Ok(self.window.is_visible()?)
    }

    fn reload(&self) -> OverlayResult<()> {
        if let Some(url) = &self.home {
            self.window.navigate(url.clone())?;
        }
        Ok(())
    }
}

pub struct TauriWindowFactory<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriWindowFactory<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> WindowFactory for TauriWindowFactory<R> {
    type Window = TauriOverlayWindow<R>;

    fn create_control(&self, spec: &ControlWindowSpec) -> OverlayResult<Self::Window> {
        let window = WebviewWindowBuilder::new(&self.app, spec.label, WebviewUrl::App(CONTROL_PAGE.into()))
            .title("")
            .inner_size(spec.size.width, spec.size.height)
            .always_on_top(spec.always_on_top)
            .decorations(spec.decorations)
            .transparent(spec.transparent)
            .resizable(spec.resizable)
            .skip_taskbar(spec.skip_taskbar)
            .shadow(spec.shadow)
            .build()?;
        Ok(TauriOverlayWindow { window, home: None })
    }

    fn create_content(&self, spec: &ContentWindowSpec) -> OverlayResult<Self::Window> {
        let url: Url = spec
            .url
            .parse()
            .map_err(|e| OverlayError::Window(format!("invalid content url {}: {}", spec.url, e)))?;

        let window = WebviewWindowBuilder::new(&self.app, spec.label, WebviewUrl::External(url.clone()))
            .title(&spec.title)
            .inner_size(spec.size.width, spec.size.height)
            .resizable(true)
            .visible(false)
            .on_page_load(|_window, payload| {
                if matches!(payload.event(), PageLoadEvent::Finished) {
                    tracing::debug!("[window] content loaded {}", payload.url());
                }
            })
            .build()?;
        Ok(TauriOverlayWindow {
            window,
            home: Some(url),
        })
    }
}
