//! Light types consumed by the frame renderer

use glam::Vec3;

/// Shadow casting mode of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightShadows {
    #[default]
    None,
    Hard,
    Soft,
}

/// Directional light (like the sun)
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadows: LightShadows,
    /// Shadow opacity, [0, 1]; 0 disables shadowing for this light
    pub shadow_strength: f32,
    /// Slope-scale depth bias applied while rendering this light's casters
    pub slope_scale_bias: f32,
    /// World-space normal offset factor at shadow sampling time
    pub normal_bias: f32,
    /// Extra near-plane pullback for caster pancaking
    pub near_plane_offset: f32,
    /// Baked shadowmask channel, if the light has one
    pub mask_channel: Option<u32>,
    pub rendering_layer_mask: u32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            shadows: LightShadows::None,
            shadow_strength: 1.0,
            slope_scale_bias: 1.0,
            normal_bias: 0.5,
            near_plane_offset: 0.1,
            mask_channel: None,
            rendering_layer_mask: u32::MAX,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            ..Self::default()
        }
    }

    /// Same light with soft shadows enabled at the given strength
    pub fn with_shadows(mut self, strength: f32) -> Self {
        self.shadows = LightShadows::Soft;
        self.shadow_strength = strength;
        self
    }
}
