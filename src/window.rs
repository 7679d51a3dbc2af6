//! Overlay Window Manager
//!
//! Owns the control window (the 50x50 floating button) and the lazily created
//! content window that shows the backing service. The content window is placed
//! relative to the control window every time it becomes visible; it does not
//! follow the control window while it is being dragged.

use crate::config::LayoutConfig;
use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{content_position, Bounds, Position, Size};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

pub const CONTROL_LABEL: &str = "control";
pub const CONTENT_LABEL: &str = "content";

/// A platform window the manager can move, show and hide. Handles are cheap
/// to clone and every clone refers to the same window.
pub trait OverlayWindow: Clone {
    fn bounds(&self) -> OverlayResult<Bounds>;
    fn set_position(&self, position: Position) -> OverlayResult<()>;
    fn show(&self) -> OverlayResult<()>;
    fn hide(&self) -> OverlayResult<()>;
    fn is_visible(&self) -> OverlayResult<bool>;
    /// Navigate back to the URL the window was created with.
    fn reload(&self) -> OverlayResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlWindowSpec {
    pub label: &'static str,
    pub size: Size,
    pub always_on_top: bool,
    pub decorations: bool,
    pub transparent: bool,
    pub resizable: bool,
    pub skip_taskbar: bool,
    pub shadow: bool,
}

impl ControlWindowSpec {
    pub fn floating_button(size: Size) -> Self {
        Self {
            label: CONTROL_LABEL,
            size,
            always_on_top: true,
            decorations: false,
            transparent: true,
            resizable: false,
            skip_taskbar: true,
            shadow: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentWindowSpec {
    pub label: &'static str,
    pub url: String,
    pub size: Size,
    pub title: String,
}

/// Builds platform windows. The content window must come back hidden.
pub trait WindowFactory {
    type Window: OverlayWindow;

    fn create_control(&self, spec: &ControlWindowSpec) -> OverlayResult<Self::Window>;
    fn create_content(&self, spec: &ContentWindowSpec) -> OverlayResult<Self::Window>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentVisibility {
    Shown,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub url: String,
    pub reason: String,
}

struct Slots<W> {
    control: Option<W>,
    content: Option<W>,
    load_failure: Option<LoadFailure>,
}

/// Window calls can block until the event loop answers, so no lock the main
/// thread waits on is ever held across one. `slots` is only held to copy
/// handles in or out. `toggle` serialises window creation and toggles and is
/// only taken off the main thread.
pub struct OverlayWindowManager<F: WindowFactory> {
    factory: F,
    layout: LayoutConfig,
    content_url: String,
    slots: Mutex<Slots<F::Window>>,
    toggle: Mutex<()>,
}

impl<F: WindowFactory> OverlayWindowManager<F> {
    pub fn new(factory: F, layout: LayoutConfig, content_url: impl Into<String>) -> Self {
        Self {
            factory,
            layout,
            content_url: content_url.into(),
            slots: Mutex::new(Slots {
                control: None,
                content: None,
                load_failure: None,
            }),
            toggle: Mutex::new(()),
        }
    }

    pub fn create_control_window(&self) -> OverlayResult<F::Window> {
        let _toggle = self.toggle.lock()?;
        if self.slots()?.control.is_some() {
            return Err(OverlayError::ControlWindowExists);
        }
        let spec = ControlWindowSpec::floating_button(self.layout.control_size);
        let window = self.factory.create_control(&spec)?;
        self.slots()?.control = Some(window.clone());
        tracing::info!("[window] control window created");
        Ok(window)
    }

    pub fn control(&self) -> OverlayResult<Option<F::Window>> {
        Ok(self.slots()?.control.clone())
    }

    pub fn content(&self) -> OverlayResult<Option<F::Window>> {
        Ok(self.slots()?.content.clone())
    }

    pub fn content_url(&self) -> &str {
        &self.content_url
    }

    pub fn control_position(&self) -> OverlayResult<Position> {
        Ok(self.control_window()?.bounds()?.position)
    }

    pub fn toggle_content(&self) -> OverlayResult<ContentVisibility> {
        let _toggle = self.toggle.lock()?;
        // Positioning reads the control window, so it has to exist first.
        let control = self.control_window()?;

        let existing = self.slots()?.content.clone();
        let (content, visible) = match existing {
            Some(content) => {
                let visible = content.is_visible()?;
                (content, visible)
            }
            None => {
                let spec = ContentWindowSpec {
                    label: CONTENT_LABEL,
                    url: self.content_url.clone(),
                    size: self.layout.content_size,
                    title: "Polish".to_string(),
                };
                let content = self.factory.create_content(&spec)?;
                self.slots()?.content = Some(content.clone());
                tracing::info!("[window] content window created for {}", self.content_url);
                (content, false)
            }
        };

        if visible {
            content.hide()?;
            tracing::debug!("[window] content hidden");
            return Ok(ContentVisibility::Hidden);
        }

        let failure = self.slots()?.load_failure.take();
        if let Some(failure) = failure {
            tracing::info!("[window] retrying {} after earlier failure: {}", failure.url, failure.reason);
            content.reload()?;
        }
        self.place_content(&control, &content)?;
        content.show()?;
        tracing::debug!("[window] content shown");
        Ok(ContentVisibility::Shown)
    }

    pub fn position_content_relative_to_control(&self) -> OverlayResult<()> {
        let control = self.control_window()?;
        let content = self
            .content()?
            .ok_or_else(|| OverlayError::Window("content window missing".to_string()))?;
        self.place_content(&control, &content)
    }

    /// Move the control window. The content window stays where it is until
    /// it is next shown.
    pub fn apply_drag_position(&self, position: Position) -> OverlayResult<()> {
        self.control_window()?.set_position(position)
    }

    /// The user closed the content window; forget it so the next toggle
    /// builds a fresh one.
    pub fn content_closed(&self) -> OverlayResult<()> {
        let mut slots = self.slots()?;
        if slots.content.take().is_some() {
            tracing::info!("[window] content window closed by user");
        }
        slots.load_failure = None;
        Ok(())
    }

    pub fn report_load_failure(&self, reason: impl Into<String>) -> OverlayResult<LoadFailure> {
        let failure = LoadFailure {
            url: self.content_url.clone(),
            reason: reason.into(),
        };
        tracing::error!("[window] content failed to load {}: {}", failure.url, failure.reason);
        self.slots()?.load_failure = Some(failure.clone());
        Ok(failure)
    }

    pub fn load_failure(&self) -> OverlayResult<Option<LoadFailure>> {
        Ok(self.slots()?.load_failure.clone())
    }

    fn place_content(&self, control: &F::Window, content: &F::Window) -> OverlayResult<()> {
        let control = control.bounds()?;
        let size = content.bounds()?.size;
        content.set_position(content_position(control, size, self.layout.gap))
    }

    fn control_window(&self) -> OverlayResult<F::Window> {
        self.slots()?.control.clone().ok_or(OverlayError::NoControlWindow)
    }

    fn slots(&self) -> OverlayResult<MutexGuard<'_, Slots<F::Window>>> {
        Ok(self.slots.lock()?)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc::{Receiver, Sender};
    use std::sync::Arc;

    #[derive(Debug)]
    pub struct FakeWindow {
        pub id: usize,
        pub bounds: Mutex<Bounds>,
        pub visible: AtomicBool,
        pub reloads: AtomicUsize,
    }

    impl FakeWindow {
        pub fn is_shown(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        pub fn reload_count(&self) -> usize {
            self.reloads.load(Ordering::SeqCst)
        }
    }

    impl OverlayWindow for Arc<FakeWindow> {
        fn bounds(&self) -> OverlayResult<Bounds> {
            Ok(*self.bounds.lock()?)
        }

        fn set_position(&self, position: Position) -> OverlayResult<()> {
            self.bounds.lock()?.position = position;
            Ok(())
        }

        fn show(&self) -> OverlayResult<()> {
            self.visible.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn hide(&self) -> OverlayResult<()> {
            self.visible.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_visible(&self) -> OverlayResult<bool> {
            Ok(self.is_shown())
        }

        fn reload(&self) -> OverlayResult<()> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Makes `create_content` stall like a real window build waiting on the
    /// event loop: it reports on `entered` and waits for `release`.
    pub struct ContentGate {
        pub entered: Sender<()>,
        pub release: Mutex<Receiver<()>>,
    }

    #[derive(Default)]
    pub struct FakeFactory {
        pub control_at: Position,
        pub created: Mutex<Vec<Arc<FakeWindow>>>,
        pub control_specs: Mutex<Vec<ControlWindowSpec>>,
        pub content_specs: Mutex<Vec<ContentWindowSpec>>,
        pub content_gate: Option<ContentGate>,
    }

    impl FakeFactory {
        pub fn at(control_at: Position) -> Self {
            Self {
                control_at,
                ..Self::default()
            }
        }

        pub fn gated(control_at: Position, gate: ContentGate) -> Self {
            Self {
                control_at,
                content_gate: Some(gate),
                ..Self::default()
            }
        }

        pub fn content_spec_count(&self) -> usize {
            self.content_specs.lock().unwrap().len()
        }

        fn make(&self, bounds: Bounds) -> Arc<FakeWindow> {
            let mut created = self.created.lock().unwrap();
            let window = Arc::new(FakeWindow {
                id: created.len(),
                bounds: Mutex::new(bounds),
                visible: AtomicBool::new(false),
                reloads: AtomicUsize::new(0),
            });
            created.push(window.clone());
            window
        }
    }

    impl WindowFactory for FakeFactory {
        type Window = Arc<FakeWindow>;

        fn create_control(&self, spec: &ControlWindowSpec) -> OverlayResult<Self::Window> {
            self.control_specs.lock()?.push(spec.clone());
            let window = self.make(Bounds {
                position: self.control_at,
                size: spec.size,
            });
            window.visible.store(true, Ordering::SeqCst);
            Ok(window)
        }

        fn create_content(&self, spec: &ContentWindowSpec) -> OverlayResult<Self::Window> {
            if let Some(gate) = &self.content_gate {
                let _ = gate.entered.send(());
                let _ = gate.release.lock()?.recv();
            }
            self.content_specs.lock()?.push(spec.clone());
            Ok(self.make(Bounds {
                position: Position::default(),
                size: spec.size,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeFactory;
    use super::*;

    fn manager(at: Position) -> OverlayWindowManager<FakeFactory> {
        OverlayWindowManager::new(FakeFactory::at(at), LayoutConfig::default(), "http://localhost:8501")
    }

    fn content_of(m: &OverlayWindowManager<FakeFactory>) -> std::sync::Arc<fake::FakeWindow> {
        m.content().unwrap().expect("content window")
    }

    fn assert_beside_control(m: &OverlayWindowManager<FakeFactory>) {
        let control = m.control().unwrap().unwrap().bounds().unwrap();
        let content = content_of(m).bounds().unwrap();
        let gap = LayoutConfig::default().gap;
        assert!((content.position.x + content.size.width + gap - control.position.x).abs() < 1e-9);
        assert!(
            ((content.position.y + content.size.height / 2.0)
                - (control.position.y + control.size.height / 2.0))
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn test_control_window_spec() {
        let m = manager(Position::new(0.0, 0.0));
        m.create_control_window().unwrap();
        let specs = m.factory.control_specs.lock().unwrap();
        let spec = &specs[0];
        assert_eq!(spec.size, Size { width: 50.0, height: 50.0 });
        assert!(spec.always_on_top && spec.transparent && spec.skip_taskbar);
        assert!(!spec.decorations && !spec.resizable && !spec.shadow);
    }

    #[test]
    fn test_control_window_created_once() {
        let m = manager(Position::new(0.0, 0.0));
        m.create_control_window().unwrap();
        assert_eq!(
            m.create_control_window().map(|_| ()),
            Err(OverlayError::ControlWindowExists)
        );
    }

    #[test]
    fn test_toggle_before_control_window_fails() {
        let m = manager(Position::new(0.0, 0.0));
        assert_eq!(m.toggle_content(), Err(OverlayError::NoControlWindow));
        assert!(m.content().unwrap().is_none());
    }

    #[test]
    fn test_toggle_reuses_single_content_window() {
        let m = manager(Position::new(900.0, 400.0));
        m.create_control_window().unwrap();

        assert_eq!(m.toggle_content().unwrap(), ContentVisibility::Shown);
        let first = content_of(&m).id;
        assert_eq!(m.toggle_content().unwrap(), ContentVisibility::Hidden);
        assert!(!content_of(&m).is_shown());
        assert_eq!(m.toggle_content().unwrap(), ContentVisibility::Shown);

        assert_eq!(content_of(&m).id, first);
        assert_eq!(m.factory.content_spec_count(), 1);
        assert_eq!(m.factory.content_specs.lock().unwrap()[0].url, "http://localhost:8501");
    }

    #[test]
    fn test_content_positioned_left_of_control() {
        let m = manager(Position::new(1000.0, 500.0));
        m.create_control_window().unwrap();
        m.toggle_content().unwrap();
        assert_eq!(content_of(&m).bounds().unwrap().position, Position::new(640.0, 225.0));
        assert_beside_control(&m);
    }

    #[test]
    fn test_drag_does_not_move_content_until_next_show() {
        let m = manager(Position::new(1000.0, 500.0));
        m.create_control_window().unwrap();
        m.toggle_content().unwrap();
        let before = content_of(&m).bounds().unwrap().position;

        m.apply_drag_position(Position::new(700.0, 300.0)).unwrap();
        assert_eq!(m.control_position().unwrap(), Position::new(700.0, 300.0));
        assert_eq!(content_of(&m).bounds().unwrap().position, before);

        m.toggle_content().unwrap();
        m.toggle_content().unwrap();
        assert_beside_control(&m);
    }

    #[test]
    fn test_closed_content_is_recreated() {
        let m = manager(Position::new(500.0, 500.0));
        m.create_control_window().unwrap();
        m.toggle_content().unwrap();
        m.content_closed().unwrap();
        assert!(m.content().unwrap().is_none());

        assert_eq!(m.toggle_content().unwrap(), ContentVisibility::Shown);
        assert_eq!(m.factory.content_spec_count(), 2);
        assert_beside_control(&m);
    }

    #[test]
    fn test_load_failure_retried_on_next_show() {
        let m = manager(Position::new(500.0, 500.0));
        m.create_control_window().unwrap();
        m.toggle_content().unwrap();

        let failure = m.report_load_failure("connection refused").unwrap();
        assert_eq!(failure.url, "http://localhost:8501");
        assert_eq!(content_of(&m).reload_count(), 0);

        m.toggle_content().unwrap(); // hide
        assert!(m.load_failure().unwrap().is_some());
        m.toggle_content().unwrap(); // show -> reload
        assert_eq!(content_of(&m).reload_count(), 1);
        assert!(m.load_failure().unwrap().is_none());
    }
}
