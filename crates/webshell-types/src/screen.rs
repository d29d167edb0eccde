//! Monitor geometry and click regions.

use serde::{Deserialize, Serialize};

/// Index of a monitor as reported by the compositor.
pub type MonitorId = i32;

/// Size of one monitor in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorGeometry {
    pub id: MonitorId,
    pub width: u32,
    pub height: u32,
}

impl MonitorGeometry {
    #[must_use]
    pub fn new(id: MonitorId, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }
}

/// A rectangle on a widget surface that accepts pointer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClickRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}
