//! Drag-state tracker for the control window.
//!
//! The webview reports raw pointer positions; this turns them into absolute
//! window positions. Every move is computed from the anchors captured at
//! pointer-down, so lost or coalesced move events never accumulate error.

use crate::geometry::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub anchor_window: Position,
    pub anchor_pointer: Position,
}

impl DragSession {
    pub fn target_for(&self, pointer: Position) -> Position {
        self.anchor_window + (pointer - self.anchor_pointer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

#[derive(Debug, Default)]
pub struct DragTracker {
    state: DragState,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Start (or restart) a session. A second down while dragging simply
    /// replaces the anchors.
    pub fn pointer_down(&mut self, pointer: Position, window: Position) {
        self.state = DragState::Dragging(DragSession {
            anchor_window: window,
            anchor_pointer: pointer,
        });
    }

    /// Returns the new window position, or `None` when no drag is active.
    pub fn pointer_move(&self, pointer: Position) -> Option<Position> {
        match self.state {
            DragState::Dragging(session) => Some(session.target_for(pointer)),
            DragState::Idle => None,
        }
    }

    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }
}
