//! Frame-scoped render target management

pub mod arena;

pub use arena::{ArenaError, TargetArena};

/// Logical key of a frame-scoped render target.
///
/// Every ephemeral texture the pipeline touches is addressed by one of these
/// keys; the arena pools the backing allocation per key across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKey {
    /// Intermediate color attachment for a camera
    CameraColor,
    /// Intermediate depth attachment for a camera
    CameraDepth,
    /// Copy of the color attachment sampled by materials
    CameraColorCopy,
    /// Copy of the depth attachment sampled by materials
    CameraDepthCopy,
    /// Directional shadow atlas (1x1 dummy when nothing casts shadows)
    ShadowAtlas,
    /// Bloom prefilter output at half resolution
    BloomPrefilter,
    /// Horizontal blur scratch of one pyramid level
    BloomHorizontal(u8),
    /// Blurred result of one pyramid level
    BloomVertical(u8),
    /// Upsample combine buffer of one pyramid level
    BloomCombine(u8),
    /// Fully combined bloom contribution at buffer resolution
    BloomResult,
    /// Baked color grading lookup table
    ColorGradingLut,
    /// Graded color, input of the anti-aliasing pass
    ColorGradingResult,
    /// LDR result awaiting the final rescale
    FinalResult,
}
