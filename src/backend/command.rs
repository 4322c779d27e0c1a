//! Deferred command recording
//!
//! Every pipeline component appends [`FrameCommand`]s to a per-camera
//! [`CommandList`]. Global shader parameters are addressed through the
//! [`GlobalParam`] binding table instead of process-wide string lookups, so
//! the full set of bindings a frame touches is visible in one place.

use crate::backend::traits::TargetId;
use crate::backend::types::{FinalBlendMode, LoadAction, Rect, StoreAction};
use crate::settings::{CascadeBlendMode, FxaaQuality, ShadowFilter, ShadowmaskMode};
use crate::submit::DrawRequest;
use glam::{Mat4, Vec4};

/// A render target reference inside a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRef {
    /// The camera's display target (swapchain image)
    Display,
    /// A frame-scoped target acquired from the arena
    Temporary(TargetId),
}

impl From<TargetId> for TargetRef {
    fn from(id: TargetId) -> Self {
        TargetRef::Temporary(id)
    }
}

/// Global shader parameter binding table.
///
/// One variant per global the pipeline binds; components receive the command
/// list by reference and bind through these slots only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalParam {
    /// `(1/w, 1/h, w, h)` of the camera buffer
    BufferSize,

    // Directional lights
    DirectionalLightCount,
    DirectionalLightColors,
    DirectionalLightDirections,
    /// Per light `(strength, tile_base, normal_bias, mask_channel)`
    DirectionalLightShadowData,

    // Shadows
    DirectionalShadowAtlas,
    DirectionalShadowMatrices,
    CascadeCount,
    CascadeCullingSpheres,
    CascadeData,
    /// `(atlas_size, 1/atlas_size)`
    ShadowAtlasSize,
    /// `(1/max_distance, 1/distance_fade, 1/(1 - f*f))`
    ShadowDistanceFade,

    // Attachment copies sampled by materials
    CameraColorTexture,
    CameraDepthTexture,

    // Post effects
    PostFxSource,
    PostFxSource2,
    BloomThreshold,
    BloomIntensity,
    BloomBicubicUpsampling,
    ColorAdjustments,
    ColorFilter,
    WhiteBalance,
    SplitToningShadows,
    SplitToningHighlights,
    ChannelMixerRed,
    ChannelMixerGreen,
    ChannelMixerBlue,
    SmhShadows,
    SmhMidtones,
    SmhHighlights,
    SmhRange,
    ColorGradingLut,
    ColorGradingLutParameters,
    ColorGradingLutInLogC,
    CopyBicubic,
    FxaaConfig,
}

/// Value bound to a [`GlobalParam`] slot
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
    Texture(TargetRef),
}

/// Fullscreen pass selector for blit-style draws.
///
/// An explicit selector enum rather than an ordinal offset into a shader
/// pass list; the backend maps each variant to its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostPass {
    Copy,
    BloomPrefilter,
    BloomPrefilterFireflies,
    BloomHorizontal,
    BloomVertical,
    BloomAdd,
    BloomScatter,
    BloomScatterFinal,
    ColorGradingNone,
    ColorGradingAces,
    ColorGradingNeutral,
    ColorGradingReinhard,
    ApplyColorGrading,
    ApplyColorGradingWithLuma,
    Fxaa,
    FxaaWithLuma,
    FinalRescale,
}

/// One attachment of a render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub target: TargetRef,
    pub load: LoadAction,
    pub store: StoreAction,
}

/// A single recorded command
#[derive(Debug, Clone, PartialEq)]
pub enum FrameCommand {
    /// Begin rendering into the given attachments (ends any previous pass).
    /// Depth-only passes leave `color` unset; depth clears carry the clear
    /// value in the first component.
    SetRenderTarget {
        color: Option<Attachment>,
        depth: Option<Attachment>,
    },
    SetViewport(Rect),
    SetViewProjection {
        view: Mat4,
        projection: Mat4,
    },
    /// Constant and slope-scale depth bias for subsequent draws
    SetDepthBias {
        constant: f32,
        slope_scale: f32,
    },
    SetGlobal {
        param: GlobalParam,
        value: ParamValue,
    },
    /// Shadow sampling shader variant selection
    SetShadowVariant {
        filter: ShadowFilter,
        blend: CascadeBlendMode,
        mask: Option<ShadowmaskMode>,
    },
    SetFxaaQuality(FxaaQuality),
    /// Fullscreen draw of `pass` reading `source`, covering all of
    /// `destination`
    Blit {
        source: TargetRef,
        destination: TargetRef,
        pass: PostPass,
    },
    /// Fullscreen draw into the display target honoring the camera viewport
    /// and final blend factors
    FinalDraw {
        source: TargetRef,
        pass: PostPass,
        viewport: Rect,
        load: LoadAction,
        blend: FinalBlendMode,
    },
    /// Direct GPU copy between same-sized attachments
    CopyTexture {
        source: TargetRef,
        destination: TargetRef,
    },
    /// Geometry submission resolved by the draw collaborator
    DrawGeometry(DrawRequest),
    DrawSkybox,
    /// Shadow caster submission for one (light, cascade) tile
    DrawShadowCasters {
        visible_light: usize,
        cascade: usize,
        /// Cross-cascade blend culling factor, `max(0, 0.8 - cascade_fade)`
        cull_factor: f32,
    },
}

/// A recorded, replayable sequence of frame commands.
///
/// The list is cleared (allocation preserved) at the start of every camera
/// pass and compared verbatim in determinism tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<FrameCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear recorded commands, preserving capacity for the next camera
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    pub fn push(&mut self, command: FrameCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[FrameCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    // Typed binding helpers

    pub fn set_float(&mut self, param: GlobalParam, value: f32) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Float(value),
        });
    }

    pub fn set_int(&mut self, param: GlobalParam, value: i32) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Int(value),
        });
    }

    pub fn set_vec4(&mut self, param: GlobalParam, value: Vec4) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Vec4(value),
        });
    }

    pub fn set_vec4_array(&mut self, param: GlobalParam, value: Vec<Vec4>) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Vec4Array(value),
        });
    }

    pub fn set_mat4_array(&mut self, param: GlobalParam, value: Vec<Mat4>) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Mat4Array(value),
        });
    }

    pub fn set_texture(&mut self, param: GlobalParam, target: TargetRef) {
        self.push(FrameCommand::SetGlobal {
            param,
            value: ParamValue::Texture(target),
        });
    }

    /// Record a fullscreen blit
    pub fn blit(&mut self, source: TargetRef, destination: TargetRef, pass: PostPass) {
        self.set_texture(GlobalParam::PostFxSource, source);
        self.push(FrameCommand::Blit {
            source,
            destination,
            pass,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::TargetId;

    #[test]
    fn reset_preserves_capacity() {
        let mut list = CommandList::new();
        for _ in 0..16 {
            list.push(FrameCommand::DrawSkybox);
        }
        let cap = list.commands.capacity();
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.commands.capacity(), cap);
    }

    #[test]
    fn blit_binds_source_before_drawing() {
        let mut list = CommandList::new();
        let src = TargetRef::Temporary(TargetId(3));
        list.blit(src, TargetRef::Display, PostPass::Copy);
        assert_eq!(
            list.commands()[0],
            FrameCommand::SetGlobal {
                param: GlobalParam::PostFxSource,
                value: ParamValue::Texture(src),
            }
        );
        assert!(matches!(
            list.commands()[1],
            FrameCommand::Blit {
                destination: TargetRef::Display,
                pass: PostPass::Copy,
                ..
            }
        ));
    }
}
