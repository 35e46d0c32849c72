use glam::Mat4;

/// Per-frame inputs supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    /// Logical surface width.
    pub width: f32,
    /// Logical surface height.
    pub height: f32,
    /// Physical pixels per logical pixel.
    pub pixel_ratio: f32,
    pub view: Mat4,
    pub perspective: Mat4,
    pub clear_color: [f32; 4],
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            pixel_ratio: 1.0,
            view: Mat4::IDENTITY,
            perspective: Mat4::IDENTITY,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl FrameParams {
    /// Viewport size in physical pixels, rounded to the nearest pixel.
    pub fn physical_size(&self) -> (u32, u32) {
        let scale = |v: f32| (v * self.pixel_ratio).round().max(0.0) as u32;
        (scale(self.width), scale(self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_applies_pixel_ratio() {
        let params = FrameParams {
            width: 400.0,
            height: 300.0,
            pixel_ratio: 2.0,
            ..FrameParams::default()
        };
        assert_eq!(params.physical_size(), (800, 600));
    }

    #[test]
    fn fractional_ratio_rounds() {
        let params = FrameParams {
            width: 101.0,
            height: 51.0,
            pixel_ratio: 1.5,
            ..FrameParams::default()
        };
        assert_eq!(params.physical_size(), (152, 77));
    }
}
