use serde::{Deserialize, Serialize};

/// Resolution metadata of one screenshot.
///
/// `original_*` is the screen in input-device coordinates; `scaled_*` is the
/// image actually sent to the model. Scaled dimensions never exceed the
/// original ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub original_width: u32,
    pub original_height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl ScreenGeometry {
    pub fn new(original_width: u32, original_height: u32, scaled_width: u32, scaled_height: u32) -> Self {
        Self {
            original_width,
            original_height,
            scaled_width: scaled_width.min(original_width),
            scaled_height: scaled_height.min(original_height),
        }
    }

    /// Geometry for a screenshot sent at full resolution.
    pub fn unscaled(width: u32, height: u32) -> Self {
        Self::new(width, height, width, height)
    }
}

/// A screen position in floating-point pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(&self, other: &Point, t: f64) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    /// Integer pixel address, only taken where the OS call needs one.
    pub fn rounded(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png_bytes: Vec<u8>,
    pub image_base64: String,
    pub geometry: ScreenGeometry,
}

impl Screenshot {
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.image_base64)
    }
}
