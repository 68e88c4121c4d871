use async_trait::async_trait;
use base64::Engine as _;
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{ScreenGeometry, Screenshot};

/// Producer of screenshots plus their resolution metadata.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    async fn capture(&self) -> DeskPilotResult<Screenshot>;
}

/// Captures the primary monitor through `xcap`.
pub struct XcapCapturer {
    max_size: u32,
    scale_threshold: u32,
}

impl XcapCapturer {
    pub fn new(max_size: u32, scale_threshold: u32) -> Self {
        Self {
            max_size,
            scale_threshold,
        }
    }
}

#[async_trait]
impl ScreenCapturer for XcapCapturer {
    async fn capture(&self) -> DeskPilotResult<Screenshot> {
        let (max_size, threshold) = (self.max_size, self.scale_threshold);
        tokio::task::spawn_blocking(move || capture_primary_blocking(max_size, threshold))
            .await
            .map_err(|e| DeskPilotError::Capture(format!("capture task join: {e}")))?
    }
}

fn capture_primary_blocking(max_size: u32, threshold: u32) -> DeskPilotResult<Screenshot> {
    let monitors = xcap::Monitor::all().map_err(|e| DeskPilotError::Capture(e.to_string()))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| DeskPilotError::Capture("no monitor available".into()))?;

    let image = monitor
        .capture_image()
        .map_err(|e| DeskPilotError::Capture(e.to_string()))?;

    // Monitor size is what the input backend addresses; the raw image may be
    // larger on HiDPI screens.
    let (screen_w, screen_h) = (monitor.width(), monitor.height());
    tracing::debug!(
        screen = %format!("{screen_w}×{screen_h}"),
        image = %format!("{}×{}", image.width(), image.height()),
        "primary monitor captured"
    );
    encode_screenshot(image, screen_w, screen_h, max_size, threshold)
}

/// Target size for the image sent to the model. Screens whose longer side is
/// at most `threshold` are left alone; larger ones get their longer side
/// reduced to `max_size`, keeping the aspect ratio.
pub fn plan_scaled_size(width: u32, height: u32, max_size: u32, threshold: u32) -> (u32, u32) {
    if width.max(height) <= threshold || width == 0 || height == 0 {
        return (width, height);
    }
    if width > height {
        let new_w = max_size.min(width);
        let new_h = (height as u64 * new_w as u64 / width as u64) as u32;
        (new_w, new_h.max(1))
    } else {
        let new_h = max_size.min(height);
        let new_w = (width as u64 * new_h as u64 / height as u64) as u32;
        (new_w.max(1), new_h)
    }
}

pub fn encode_screenshot(
    image: RgbaImage,
    screen_width: u32,
    screen_height: u32,
    max_size: u32,
    threshold: u32,
) -> DeskPilotResult<Screenshot> {
    let (target_w, target_h) = plan_scaled_size(image.width(), image.height(), max_size, threshold);
    let scaled = if (target_w, target_h) != image.dimensions() {
        image::imageops::resize(&image, target_w, target_h, FilterType::Triangle)
    } else {
        image
    };

    let mut png_bytes = Vec::new();
    DynamicImage::ImageRgba8(scaled.clone())
        .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    let image_base64 = base64::engine::general_purpose::STANDARD.encode(&png_bytes);

    let geometry = ScreenGeometry::new(screen_width, screen_height, scaled.width(), scaled.height());
    Ok(Screenshot {
        png_bytes,
        image_base64,
        geometry,
    })
}
