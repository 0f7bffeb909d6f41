// View transform module
// Zoom/pan state and the destination rectangle it produces

/// Multiplicative zoom step per key press
pub const ZOOM_STEP: f32 = 1.1;

/// Lower bound for the zoom factor
pub const MIN_ZOOM: f32 = 0.1;

/// Pan distance per key press, in window pixels
pub const PAN_STEP: i32 = 20;

/// Background color behind the image (sRGB)
pub const BACKGROUND_RGB: [u8; 3] = [30, 30, 30];

/// Zoom and pan parameters controlling how the image is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub zoom: f32,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::identity()
    }
}

impl ViewState {
    pub fn identity() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0,
            offset_y: 0,
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom *= ZOOM_STEP;
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / ZOOM_STEP).max(MIN_ZOOM);
    }

    /// Shift the image by a number of pan steps on each axis
    pub fn pan(&mut self, steps_x: i32, steps_y: i32) {
        self.offset_x = self.offset_x.saturating_add(steps_x.saturating_mul(PAN_STEP));
        self.offset_y = self.offset_y.saturating_add(steps_y.saturating_mul(PAN_STEP));
    }

    pub fn reset(&mut self) {
        *self = Self::identity();
    }

    /// Compute where the image lands in a window of the given size.
    ///
    /// The scaled image is centred in the window and then shifted by the
    /// pan offsets. The rectangle may extend past any window edge.
    pub fn dest_rect(&self, image_size: (u32, u32), window_size: (u32, u32)) -> DestRect {
        // float -> int casts saturate, so extreme zoom cannot wrap
        let scaled_w = (image_size.0 as f32 * self.zoom) as i32;
        let scaled_h = (image_size.1 as f32 * self.zoom) as i32;
        let win_w = window_size.0.min(i32::MAX as u32) as i32;
        let win_h = window_size.1.min(i32::MAX as u32) as i32;

        DestRect {
            x: (win_w.saturating_sub(scaled_w) / 2).saturating_add(self.offset_x),
            y: (win_h.saturating_sub(scaled_h) / 2).saturating_add(self.offset_y),
            w: scaled_w,
            h: scaled_h,
        }
    }
}

/// Target area on the window surface, in window pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl DestRect {
    pub fn right(&self) -> i64 {
        self.x as i64 + self.w as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.h as i64
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}
