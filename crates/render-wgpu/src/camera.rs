use glam::{Mat4, Vec3};
use monet_common::FrameParams;

/// Camera orbiting a target point. +Z is up, the axis instances rotate about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub sensitivity: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 8.0,
            yaw: 45.0_f32.to_radians(),
            pitch: 30.0_f32.to_radians(),
            fov: 60.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            sensitivity: 0.005,
        }
    }
}

impl OrbitCamera {
    const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

    /// Orbit that places the eye at `eye` looking at `target`.
    pub fn looking_at(eye: Vec3, target: Vec3, fov_degrees: f32) -> Self {
        let offset = eye - target;
        let distance = offset.length().max(1e-3);
        Self {
            target,
            distance,
            yaw: offset.y.atan2(offset.x),
            pitch: (offset.z / distance)
                .clamp(-1.0, 1.0)
                .asin()
                .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT),
            fov: fov_degrees.to_radians(),
            ..Self::default()
        }
    }

    pub fn eye(&self) -> Vec3 {
        self.target
            + self.distance
                * Vec3::new(
                    self.yaw.cos() * self.pitch.cos(),
                    self.yaw.sin() * self.pitch.cos(),
                    self.pitch.sin(),
                )
    }

    /// Drag in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * 0.9_f32.powf(steps)).clamp(self.near * 2.0, self.far * 0.5);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Z)
    }

    pub fn perspective_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect.max(1e-3), self.near, self.far)
    }

    /// Frame parameters for a canvas of `width` x `height` logical pixels.
    pub fn frame_params(
        &self,
        width: f32,
        height: f32,
        pixel_ratio: f32,
        clear_color: [f32; 4],
    ) -> FrameParams {
        FrameParams {
            width,
            height,
            pixel_ratio,
            view: self.view_matrix(),
            perspective: self.perspective_matrix(width / height.max(1.0)),
            clear_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera() {
        let cam = OrbitCamera::default();
        assert!(cam.eye().z > 0.0);
        let vp = cam.perspective_matrix(16.0 / 9.0) * cam.view_matrix();
        assert!(!vp.col(0).x.is_nan());
    }

    #[test]
    fn looking_at_recovers_eye() {
        let eye = Vec3::new(3.0, -2.0, 4.0);
        let target = Vec3::new(0.0, 0.0, 1.0);
        let cam = OrbitCamera::looking_at(eye, target, 45.0);
        assert!((cam.eye() - eye).length() < 1e-4);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = OrbitCamera::default();
        cam.orbit(0.0, 1.0e6);
        assert!(cam.pitch <= OrbitCamera::PITCH_LIMIT);
    }

    #[test]
    fn zoom_moves_closer() {
        let mut cam = OrbitCamera::default();
        let before = cam.distance;
        cam.zoom(1.0);
        assert!(cam.distance < before);
    }

    #[test]
    fn frame_params_carry_separate_matrices() {
        let cam = OrbitCamera::default();
        let params = cam.frame_params(800.0, 600.0, 2.0, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(params.view, cam.view_matrix());
        assert_eq!(params.perspective, cam.perspective_matrix(800.0 / 600.0));
        assert_eq!(params.physical_size(), (1600, 1200));
    }
}
