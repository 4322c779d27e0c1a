//! Pipeline configuration supplied by the host application
//!
//! Plain data with `Default` impls; nothing here owns GPU state.

use crate::backend::types::FinalBlendMode;
use glam::{Vec3, Vec4};

/// Lower bound applied to the render scale before any buffer-size math
pub const RENDER_SCALE_MIN: f32 = 0.1;
/// Upper bound applied to the render scale before any buffer-size math
pub const RENDER_SCALE_MAX: f32 = 2.0;

/// Shadow atlas resolution (square, power of two)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasSize {
    Size256 = 256,
    Size512 = 512,
    Size1024 = 1024,
    Size2048 = 2048,
    Size4096 = 4096,
    Size8192 = 8192,
}

impl AtlasSize {
    pub fn pixels(self) -> u32 {
        self as u32
    }
}

/// PCF tap count for shadow filtering
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowFilter {
    Pcf2x2 = 0,
    Pcf3x3 = 1,
    Pcf5x5 = 2,
    Pcf7x7 = 3,
}

impl ShadowFilter {
    /// Filter radius factor in texels: one texel for 2x2, growing per tier
    pub fn size_factor(self) -> f32 {
        self as u32 as f32 + 1.0
    }
}

/// How adjacent cascades are blended at their boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CascadeBlendMode {
    #[default]
    Hard,
    Soft,
    Dither,
}

/// When the baked shadowmask replaces realtime shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowmaskMode {
    /// Mask applies at every distance
    Always,
    /// Mask takes over beyond the realtime shadow distance
    Distance,
}

/// Directional shadow map configuration
#[derive(Debug, Clone)]
pub struct DirectionalShadows {
    pub atlas_size: AtlasSize,
    pub filter: ShadowFilter,
    /// Number of cascades per light, 1..=4
    pub cascade_count: usize,
    /// Cumulative split fractions for the first three cascade boundaries
    pub cascade_ratios: [f32; 3],
    /// Fade fraction at the outer cascade boundary, (0, 1]
    pub cascade_fade: f32,
    pub cascade_blend: CascadeBlendMode,
}

impl Default for DirectionalShadows {
    fn default() -> Self {
        Self {
            atlas_size: AtlasSize::Size1024,
            filter: ShadowFilter::Pcf2x2,
            cascade_count: 4,
            cascade_ratios: [0.1, 0.25, 0.5],
            cascade_fade: 0.1,
            cascade_blend: CascadeBlendMode::Hard,
        }
    }
}

/// Shadow configuration
#[derive(Debug, Clone)]
pub struct ShadowSettings {
    /// Maximum distance from the camera at which shadows render
    pub max_distance: f32,
    /// Fraction of the max distance over which shadows fade out
    pub distance_fade: f32,
    /// Shadowmask behavior for lights that carry a baked channel
    pub shadowmask: ShadowmaskMode,
    pub directional: DirectionalShadows,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            distance_fade: 0.1,
            shadowmask: ShadowmaskMode::Distance,
            directional: DirectionalShadows::default(),
        }
    }
}

/// Bicubic filtering policy for the final rescale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BicubicRescalingMode {
    #[default]
    Off,
    /// Bicubic only when the buffer is upscaled to the display
    UpOnly,
    /// Bicubic for both up- and downscaling
    UpAndDown,
}

/// FXAA quality tier (tap pattern of the edge search)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FxaaQuality {
    Low,
    #[default]
    Medium,
    High,
}

/// FXAA pass configuration
#[derive(Debug, Clone)]
pub struct FxaaSettings {
    pub enabled: bool,
    /// Absolute luma contrast below which a pixel is skipped, [0.0312, 0.0833]
    pub fixed_threshold: f32,
    /// Contrast threshold relative to the brightest neighbor, [0.063, 0.333]
    pub relative_threshold: f32,
    /// Sub-pixel blend amount, [0, 1]
    pub subpixel_blending: f32,
    pub quality: FxaaQuality,
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            fixed_threshold: 0.0833,
            relative_threshold: 0.166,
            subpixel_blending: 0.75,
            quality: FxaaQuality::Medium,
        }
    }
}

/// Per-frame camera buffer configuration shared by all cameras
#[derive(Debug, Clone)]
pub struct CameraBufferSettings {
    pub allow_hdr: bool,
    pub copy_color: bool,
    pub copy_color_reflection: bool,
    pub copy_depth: bool,
    pub copy_depth_reflection: bool,
    /// Internal resolution multiplier, clamped to
    /// [`RENDER_SCALE_MIN`], [`RENDER_SCALE_MAX`] before use
    pub render_scale: f32,
    pub bicubic_rescaling: BicubicRescalingMode,
    pub fxaa: FxaaSettings,
}

impl Default for CameraBufferSettings {
    fn default() -> Self {
        Self {
            allow_hdr: true,
            copy_color: true,
            copy_color_reflection: false,
            copy_depth: true,
            copy_depth_reflection: false,
            render_scale: 1.0,
            bicubic_rescaling: BicubicRescalingMode::Off,
            fxaa: FxaaSettings::default(),
        }
    }
}

/// Bloom combination strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BloomMode {
    #[default]
    Additive,
    Scattering,
}

/// Bloom configuration
#[derive(Debug, Clone)]
pub struct BloomSettings {
    /// Maximum pyramid depth, 0..=16; 0 disables bloom
    pub max_iterations: u32,
    /// Smallest dimension a pyramid level may reach, >= 1
    pub downscale_limit: u32,
    pub bicubic_upsampling: bool,
    /// Brightness threshold in gamma space
    pub threshold: f32,
    /// Knee fraction of the threshold, [0, 1]
    pub threshold_knee: f32,
    pub intensity: f32,
    /// Suppress isolated over-bright pixels during prefiltering
    pub fade_fireflies: bool,
    pub mode: BloomMode,
    /// Per-level combination weight in scattering mode, [0.05, 0.95]
    pub scatter: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            downscale_limit: 2,
            bicubic_upsampling: false,
            threshold: 0.5,
            threshold_knee: 0.5,
            intensity: 1.0,
            fade_fireflies: false,
            mode: BloomMode::Additive,
            scatter: 0.7,
        }
    }
}

/// Basic per-channel color adjustments
#[derive(Debug, Clone)]
pub struct ColorAdjustments {
    /// Exposure adjustment in stops
    pub post_exposure: f32,
    /// Contrast in percent, [-100, 100]
    pub contrast: f32,
    /// Linear multiply color, alpha unused
    pub color_filter: Vec4,
    /// Hue shift in degrees, [-180, 180]
    pub hue_shift: f32,
    /// Saturation in percent, [-100, 100]
    pub saturation: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            post_exposure: 0.0,
            contrast: 0.0,
            color_filter: Vec4::ONE,
            hue_shift: 0.0,
            saturation: 0.0,
        }
    }
}

/// White balance in temperature/tint offsets, [-100, 100] each
#[derive(Debug, Clone, Default)]
pub struct WhiteBalance {
    pub temperature: f32,
    pub tint: f32,
}

/// Split toning tints for shadows and highlights
#[derive(Debug, Clone)]
pub struct SplitToning {
    pub shadows: Vec3,
    pub highlights: Vec3,
    /// Balance between the two tints in percent, [-100, 100]
    pub balance: f32,
}

impl Default for SplitToning {
    fn default() -> Self {
        Self {
            shadows: Vec3::splat(0.5),
            highlights: Vec3::splat(0.5),
            balance: 0.0,
        }
    }
}

/// 3x3 output-channel mixer, rows are source weights
#[derive(Debug, Clone)]
pub struct ChannelMixer {
    pub red: Vec3,
    pub green: Vec3,
    pub blue: Vec3,
}

impl Default for ChannelMixer {
    fn default() -> Self {
        Self {
            red: Vec3::X,
            green: Vec3::Y,
            blue: Vec3::Z,
        }
    }
}

/// Tonal-range color wheels with range breakpoints
#[derive(Debug, Clone)]
pub struct ShadowsMidtonesHighlights {
    pub shadows: Vec4,
    pub midtones: Vec4,
    pub highlights: Vec4,
    pub shadows_start: f32,
    pub shadows_end: f32,
    pub highlights_start: f32,
    pub highlights_end: f32,
}

impl Default for ShadowsMidtonesHighlights {
    fn default() -> Self {
        Self {
            shadows: Vec4::ONE,
            midtones: Vec4::ONE,
            highlights: Vec4::ONE,
            shadows_start: 0.0,
            shadows_end: 0.3,
            highlights_start: 0.55,
            highlights_end: 1.0,
        }
    }
}

/// Tone mapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneMapping {
    #[default]
    None,
    Aces,
    Neutral,
    Reinhard,
}

/// Color grading LUT resolution; the baked texture is `n*n` wide, `n` tall
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutResolution {
    Lut16 = 16,
    Lut32 = 32,
    Lut64 = 64,
}

impl LutResolution {
    pub fn height(self) -> u32 {
        self as u32
    }

    pub fn width(self) -> u32 {
        let n = self as u32;
        n * n
    }
}

impl Default for LutResolution {
    fn default() -> Self {
        LutResolution::Lut32
    }
}

/// Post-effect configuration; absence of the whole struct disables the stack
#[derive(Debug, Clone, Default)]
pub struct PostFxSettings {
    pub bloom: BloomSettings,
    pub color_adjustments: ColorAdjustments,
    pub white_balance: WhiteBalance,
    pub split_toning: SplitToning,
    pub channel_mixer: ChannelMixer,
    pub shadows_midtones_highlights: ShadowsMidtonesHighlights,
    pub tone_mapping: ToneMapping,
    pub lut_resolution: LutResolution,
}

/// How a camera's own render scale combines with the global one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderScaleMode {
    #[default]
    Inherit,
    Multiply,
    Override,
}

/// Per-camera overrides
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Rendering layers this camera draws
    pub rendering_layer_mask: u32,
    /// Restrict lights to this camera's rendering layers
    pub mask_lights: bool,
    /// Replaces the pipeline post-FX settings when set
    pub post_fx_override: Option<PostFxSettings>,
    pub allow_fxaa: bool,
    /// Preserve the source alpha channel through post effects
    pub keep_alpha: bool,
    pub copy_color: bool,
    pub copy_depth: bool,
    pub render_scale_mode: RenderScaleMode,
    pub render_scale: f32,
    pub final_blend_mode: FinalBlendMode,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            rendering_layer_mask: u32::MAX,
            mask_lights: false,
            post_fx_override: None,
            allow_fxaa: true,
            keep_alpha: false,
            copy_color: true,
            copy_depth: true,
            render_scale_mode: RenderScaleMode::Inherit,
            render_scale: 1.0,
            final_blend_mode: FinalBlendMode::default(),
        }
    }
}

impl CameraSettings {
    /// Resolve the effective (unclamped) render scale from the buffer-wide
    /// value and this camera's mode
    pub fn resolve_render_scale(&self, buffer_scale: f32) -> f32 {
        match self.render_scale_mode {
            RenderScaleMode::Inherit => buffer_scale,
            RenderScaleMode::Override => self.render_scale,
            RenderScaleMode::Multiply => buffer_scale * self.render_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_filter_size_factor_grows_per_tier() {
        assert_eq!(ShadowFilter::Pcf2x2.size_factor(), 1.0);
        assert_eq!(ShadowFilter::Pcf3x3.size_factor(), 2.0);
        assert_eq!(ShadowFilter::Pcf5x5.size_factor(), 3.0);
        assert_eq!(ShadowFilter::Pcf7x7.size_factor(), 4.0);
    }

    #[test]
    fn lut_resolution_dimensions() {
        assert_eq!(LutResolution::Lut16.width(), 256);
        assert_eq!(LutResolution::Lut16.height(), 16);
        assert_eq!(LutResolution::Lut64.width(), 4096);
        assert_eq!(LutResolution::Lut64.height(), 64);
    }

    #[test]
    fn render_scale_modes_resolve() {
        let mut settings = CameraSettings {
            render_scale: 0.5,
            ..CameraSettings::default()
        };

        settings.render_scale_mode = RenderScaleMode::Inherit;
        assert_eq!(settings.resolve_render_scale(1.5), 1.5);

        settings.render_scale_mode = RenderScaleMode::Override;
        assert_eq!(settings.resolve_render_scale(1.5), 0.5);

        settings.render_scale_mode = RenderScaleMode::Multiply;
        assert_eq!(settings.resolve_render_scale(1.5), 0.75);
    }
}
