//! Logical screen geometry shared by the drag tracker and the window manager.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub position: Position,
    pub size: Size,
}

/// Where the content window goes: its right edge `gap` units left of the
/// control window, vertically centred on it.
pub fn content_position(control: Bounds, content: Size, gap: f64) -> Position {
    Position::new(
        control.position.x - (content.width + gap),
        control.position.y - content.height / 2.0 + control.size.height / 2.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_sits_left_of_control() {
        // 350 wide + 10 gap, 600 tall next to a 50x50 button.
        let control = Bounds {
            position: Position::new(1000.0, 500.0),
            size: Size { width: 50.0, height: 50.0 },
        };
        let pos = content_position(control, Size { width: 350.0, height: 600.0 }, 10.0);
        assert_eq!(pos, Position::new(640.0, 225.0));
    }

    #[test]
    fn test_edges_line_up() {
        let control = Bounds {
            position: Position::new(-40.0, 3.0),
            size: Size { width: 50.0, height: 50.0 },
        };
        let content = Size { width: 800.0, height: 333.0 };
        let pos = content_position(control, content, 10.0);
        assert_eq!(pos.x + content.width + 10.0, control.position.x);
        assert!(
            ((pos.y + content.height / 2.0) - (control.position.y + control.size.height / 2.0)).abs()
                < 1e-9
        );
    }
}
