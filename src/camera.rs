use cgmath::Matrix4;

use crate::rect::Rectangle;

/// Tracks the window size and which part of the world is visible.
///
/// `screen = world + offset()`. When the window is larger than the world
/// view along an axis, the view is centered on that axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCamera {
    window_width: i32,
    window_height: i32,
    position: Rectangle,
}

impl WindowCamera {
    pub fn new(window_width: i32, window_height: i32) -> Self {
        Self {
            window_width,
            window_height,
            position: Rectangle::new(0, 0, window_width, window_height),
        }
    }

    pub fn set_window_size(&mut self, width: i32, height: i32) {
        self.window_width = width;
        self.window_height = height;
    }

    pub fn window_size(&self) -> (i32, i32) {
        (self.window_width, self.window_height)
    }

    pub fn set_world_position(&mut self, position: Rectangle) {
        self.position = position;
    }

    pub fn world_position(&self) -> Rectangle {
        self.position
    }

    /// Moves the world view so that `(x, y)` sits at its centre.
    pub fn center_around(&mut self, x: i32, y: i32) {
        self.position.x = x - self.position.width / 2;
        self.position.y = y - self.position.height / 2;
    }

    pub fn offset(&self) -> (i32, i32) {
        (
            axis_offset(self.window_width, self.position.width, self.position.x),
            axis_offset(self.window_height, self.position.height, self.position.y),
        )
    }

    /// Orthographic projection over the window in y-down pixel space.
    ///
    /// Spans the window size, not the world view, so vertices that already
    /// carry [`offset`](Self::offset) land on the same pixels the blit
    /// backend writes.
    pub fn projection(&self) -> Matrix4<f32> {
        cgmath::ortho(
            0.0,
            self.window_width as f32,
            self.window_height as f32,
            0.0,
            -1.0,
            1.0,
        )
    }
}

fn axis_offset(window: i32, world: i32, world_pos: i32) -> i32 {
    if window > world {
        (window - world) / 2 - world_pos
    } else {
        -world_pos
    }
}
