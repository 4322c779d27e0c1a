//! Common plain-data types shared between the pipeline and backends

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
    /// Depth format sampled through a comparison sampler (shadow maps)
    Shadowmap,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float | TextureFormat::Shadowmap)
    }

    pub fn is_hdr(&self) -> bool {
        matches!(self, TextureFormat::Rgba16Float)
    }

    /// Working color format for a camera buffer
    pub fn color(hdr: bool) -> Self {
        if hdr {
            TextureFormat::Rgba16Float
        } else {
            TextureFormat::Rgba8Unorm
        }
    }
}

/// Filter mode for samplers and rescaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Load action for a render target attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    Clear([f32; 4]),
    Load,
    /// Previous contents are irrelevant and need not be fetched
    DontCare,
}

/// Store action for a render target attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Store,
    Discard,
}

/// Blend factor for the final composite into the display target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Source/destination blend pair for compositing a camera into the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalBlendMode {
    pub source: BlendFactor,
    pub destination: BlendFactor,
}

impl Default for FinalBlendMode {
    fn default() -> Self {
        Self {
            source: BlendFactor::One,
            destination: BlendFactor::Zero,
        }
    }
}

impl FinalBlendMode {
    /// Replace-mode compositing: destination contributes nothing, so the
    /// target does not need to be preserved before the final draw.
    pub fn is_replace(&self) -> bool {
        self.destination == BlendFactor::Zero
    }
}

/// Integer pixel rectangle (viewport within a target)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    /// Whether this rect covers the whole of a `width`×`height` target
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }
}

/// Descriptor for a frame-scoped render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDesc {
    pub width: u32,
    pub height: u32,
    /// 0 for color targets, 32 for depth/shadow targets
    pub depth_bits: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
}

impl TargetDesc {
    pub fn color(width: u32, height: u32, hdr: bool) -> Self {
        Self {
            width,
            height,
            depth_bits: 0,
            format: TextureFormat::color(hdr),
            filter: FilterMode::Linear,
        }
    }

    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_bits: 32,
            format: TextureFormat::Depth32Float,
            filter: FilterMode::Nearest,
        }
    }

    pub fn shadowmap(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            depth_bits: 32,
            format: TextureFormat::Shadowmap,
            filter: FilterMode::Linear,
        }
    }
}

/// Depth buffer convention of the executing backend.
///
/// Shadow atlas matrices bake a sign flip for reversed-Z depth buffers, so
/// the orchestrator asks the backend once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthConvention {
    /// Depth 0 at the near plane (OpenGL-style)
    Forward,
    /// Depth 1 at the near plane (reversed-Z)
    Reversed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_format_tracks_hdr() {
        assert_eq!(TextureFormat::color(true), TextureFormat::Rgba16Float);
        assert_eq!(TextureFormat::color(false), TextureFormat::Rgba8Unorm);
        assert!(TextureFormat::color(true).is_hdr());
        assert!(!TextureFormat::color(false).is_hdr());
    }

    #[test]
    fn depth_formats_are_depth() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(TextureFormat::Shadowmap.is_depth());
        assert!(!TextureFormat::Rgba16Float.is_depth());
    }

    #[test]
    fn rect_covers_full_target_only() {
        assert!(Rect::from_size(1920, 1080).covers(1920, 1080));
        assert!(!Rect::new(0, 0, 960, 1080).covers(1920, 1080));
        assert!(!Rect::new(10, 0, 1920, 1080).covers(1920, 1080));
    }

    #[test]
    fn replace_blend_has_zero_destination() {
        assert!(FinalBlendMode::default().is_replace());
        let blended = FinalBlendMode {
            source: BlendFactor::SrcAlpha,
            destination: BlendFactor::OneMinusSrcAlpha,
        };
        assert!(!blended.is_replace());
    }
}
