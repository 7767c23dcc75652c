use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Space available to the overlay image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomConfig {
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: f32,
}

const MIN_STEP: f32 = 0.01;

impl Default for ZoomConfig {
    fn default() -> Self {
        Self::new(0.1, 1.0, 1.0, 0.1)
    }
}

impl ZoomConfig {
    /// Normalises the bounds so that `min <= default <= max`. The step is
    /// at least one hundredth, the precision `clamp` keeps.
    pub fn new(min: f32, max: f32, default: f32, step: f32) -> Self {
        let min = if min.is_finite() && min > 0.0 { min } else { 0.1 };
        let max = if max.is_finite() { max.max(min) } else { min };
        let step = if step.is_finite() && step > 0.0 {
            step.max(MIN_STEP)
        } else {
            0.1
        };
        let default = if default.is_finite() {
            default.clamp(min, max)
        } else {
            max
        };
        Self {
            min,
            max,
            default,
            step,
        }
    }

    pub fn clamp(&self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            return self.default;
        }
        // Keep two decimals so repeated steps do not drift.
        ((zoom * 100.0).round() / 100.0).clamp(self.min, self.max)
    }

    pub fn zoom_in(&self, zoom: f32) -> f32 {
        self.clamp(zoom + self.step)
    }

    pub fn zoom_out(&self, zoom: f32) -> f32 {
        self.clamp(zoom - self.step)
    }

    /// Largest zoom (up to the default) at which the whole image fits.
    pub fn fit(&self, natural: ImageSize, viewport: Viewport) -> f32 {
        if natural.width == 0 || natural.height == 0 {
            return self.default;
        }
        let scale_x = viewport.width as f32 / natural.width as f32;
        let scale_y = viewport.height as f32 / natural.height as f32;
        let fitted = self.default.min(scale_x).min(scale_y);
        // Round down so the fitted image never overflows by a pixel.
        ((fitted * 100.0).floor() / 100.0).clamp(self.min, self.max)
    }
}

pub fn display_size(natural: ImageSize, zoom: f32) -> ImageSize {
    ImageSize {
        width: (natural.width as f32 * zoom).round() as u32,
        height: (natural.height as f32 * zoom).round() as u32,
    }
}
