//! Camera view description

use crate::backend::types::Rect;
use crate::settings::CameraSettings;
use glam::{Mat4, Vec3, Vec4};

/// What the camera clears its target to before drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearFlags {
    #[default]
    Skybox,
    Color,
    Depth,
    Nothing,
}

/// One camera's view for a frame
#[derive(Debug, Clone)]
pub struct CameraView {
    /// Label used in skip/degradation reports
    pub name: String,
    /// Pixel rectangle this camera occupies within the display target
    pub viewport: Rect,
    pub view: Mat4,
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
    pub clear_flags: ClearFlags,
    /// Linear background color used with [`ClearFlags::Color`]
    pub background: Vec4,
    pub allow_hdr: bool,
    /// Reflection probes use the dedicated copy-attachment flags
    pub is_reflection: bool,
    pub settings: CameraSettings,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            name: "Camera".to_string(),
            viewport: Rect::from_size(1280, 720),
            view: Mat4::IDENTITY,
            projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0),
            near: 0.1,
            far: 1000.0,
            clear_flags: ClearFlags::Skybox,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            allow_hdr: true,
            is_reflection: false,
            settings: CameraSettings::default(),
        }
    }
}

impl CameraView {
    /// Perspective camera looking from `eye` toward `target`
    pub fn perspective(
        name: &str,
        viewport: Rect,
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let aspect = viewport.width.max(1) as f32 / viewport.height.max(1) as f32;
        Self {
            name: name.to_string(),
            viewport,
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            near,
            far,
            ..Self::default()
        }
    }

    pub fn pixel_width(&self) -> u32 {
        self.viewport.width
    }

    pub fn pixel_height(&self) -> u32 {
        self.viewport.height
    }

    /// Combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Inverse view-projection, used to recover world-space frustum corners
    pub fn inverse_view_projection(&self) -> Mat4 {
        self.view_projection().inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perspective_camera_matches_viewport_aspect() {
        let camera = CameraView::perspective(
            "main",
            Rect::from_size(1920, 1080),
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            60f32.to_radians(),
            0.3,
            500.0,
        );
        assert_eq!(camera.pixel_width(), 1920);
        assert_eq!(camera.pixel_height(), 1080);
        assert_eq!(camera.near, 0.3);
        assert_eq!(camera.far, 500.0);

        // A point straight ahead of the camera lands near NDC center
        let clip = camera.view_projection() * Vec4::new(0.0, 2.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 0.3 && ndc.y.abs() < 0.3);
    }
}
