// Proportional → screen pixel mapping across scaled screenshots.
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{Point, ScreenGeometry};

/// Distance kept from every screen edge so the pointer never lands in a
/// corner hot zone.
pub const SAFE_MARGIN_PX: f64 = 5.0;

#[derive(Debug, Clone, Default)]
pub struct CoordinateTransformer {
    geometry: Option<ScreenGeometry>,
    safe_margin: f64,
}

impl CoordinateTransformer {
    pub fn new() -> Self {
        Self {
            geometry: None,
            safe_margin: SAFE_MARGIN_PX,
        }
    }

    pub fn with_geometry(geometry: ScreenGeometry) -> Self {
        let mut t = Self::new();
        t.set_geometry(geometry);
        t
    }

    /// Replaces the geometry of the previous perception cycle.
    pub fn set_geometry(&mut self, geometry: ScreenGeometry) {
        self.geometry = Some(geometry);
    }

    pub fn geometry(&self) -> Option<ScreenGeometry> {
        self.geometry
    }

    /// Maps fractions of the screen (0–1) to screen pixels, clamped to the
    /// safe area. Stays in floating point.
    pub fn to_actual(&self, x_proportion: f64, y_proportion: f64) -> DeskPilotResult<Point> {
        let geo = self.geometry.ok_or_else(|| {
            DeskPilotError::Executor("no screen geometry yet; capture a screenshot first".into())
        })?;
        let xp = clamp_unit(x_proportion);
        let yp = clamp_unit(y_proportion);

        let width = geo.original_width as f64;
        let height = geo.original_height as f64;
        Ok(Point::new(
            clamp_margin(xp * width, width, self.safe_margin),
            clamp_margin(yp * height, height, self.safe_margin),
        ))
    }

    /// Rescales a position given in the scaled screenshot's pixel space to
    /// the original resolution. Identity until a scaled geometry is known.
    pub fn relative_to_actual(&self, x_relative: f64, y_relative: f64) -> Point {
        match self.geometry {
            Some(geo) if geo.scaled_width > 0 && geo.scaled_height > 0 => {
                let x_ratio = geo.original_width as f64 / geo.scaled_width as f64;
                let y_ratio = geo.original_height as f64 / geo.scaled_height as f64;
                Point::new(x_relative * x_ratio, y_relative * y_ratio)
            }
            _ => Point::new(x_relative, y_relative),
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

fn clamp_margin(v: f64, dimension: f64, margin: f64) -> f64 {
    let upper = (dimension - margin).max(margin);
    v.clamp(margin, upper)
}
