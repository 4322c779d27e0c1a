//! Frame composition pipeline
//!
//! One [`CameraRenderer`] drives a camera through its pass phases:
//! visibility query, shadow atlas, geometry submission, post effects, final
//! composite. Failures degrade per camera; nothing here aborts the frame
//! for other cameras.

pub mod lighting;
pub mod postprocess;
pub mod shadows;

pub use postprocess::PostFxStack;
pub use shadows::{ShadowAtlas, ShadowReservation};

use crate::backend::command::{
    Attachment, CommandList, FrameCommand, GlobalParam, PostPass, TargetRef,
};
use crate::backend::traits::{BackendError, DisplayInfo, GraphicsBackend, TargetId};
use crate::backend::types::{LoadAction, Rect, StoreAction, TargetDesc};
use crate::editor::EditorHooks;
use crate::scene::{CameraView, ClearFlags, DirectionalLight};
use crate::settings::{
    CameraBufferSettings, PostFxSettings, ShadowSettings, RENDER_SCALE_MAX, RENDER_SCALE_MIN,
};
use crate::submit::{DrawRequest, DrawSubmission};
use crate::targets::{ArenaError, TargetArena, TargetKey};
use crate::visibility::{CullingRequest, VisibilityQuery};
use glam::Vec4;
use thiserror::Error;

/// Pipeline error; converted to a skipped camera at the camera boundary
#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Phases of one camera's pass, in strict order
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CameraPhase {
    #[default]
    Idle = 0,
    Culled,
    ShadowsRendered,
    GeometrySubmitted,
    PostFxApplied,
    Submitted,
}

/// Why a camera was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The camera frustum was degenerate and culling failed
    CullingFailed,
    /// A backend or arena error aborted the camera's pass
    ResourceFailure,
}

/// Result of rendering one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraOutcome {
    Rendered,
    Skipped(SkipReason),
}

/// Effective buffer size for a camera: native pixels, or the scaled and
/// clamped size when scaled rendering is on.
fn effective_buffer_size(camera: &CameraView, render_scale: f32, scaled: bool) -> (u32, u32) {
    if scaled {
        let scale = render_scale.clamp(RENDER_SCALE_MIN, RENDER_SCALE_MAX);
        (
            ((camera.pixel_width() as f32 * scale) as u32).max(1),
            ((camera.pixel_height() as f32 * scale) as u32).max(1),
        )
    } else {
        (camera.pixel_width(), camera.pixel_height())
    }
}

/// Everything a camera pass needs from its surroundings
pub struct FrameContext<'a> {
    pub visibility: &'a mut dyn VisibilityQuery,
    pub draws: &'a mut dyn DrawSubmission,
    pub editor: &'a mut dyn EditorHooks,
    pub lights: &'a [DirectionalLight],
    pub buffer_settings: &'a CameraBufferSettings,
    pub shadow_settings: &'a ShadowSettings,
    pub post_fx: Option<&'a PostFxSettings>,
    pub display: DisplayInfo,
    /// 1x1 texture bound to the copy globals when copies are off
    pub missing_texture: TargetId,
}

/// Per-camera pass driver
#[derive(Default)]
pub struct CameraRenderer {
    list: CommandList,
    shadows: ShadowAtlas,
    post_fx: PostFxStack,
    phase: CameraPhase,
}

impl CameraRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CameraPhase {
        self.phase
    }

    /// The commands recorded for the most recent camera
    pub fn commands(&self) -> &CommandList {
        &self.list
    }

    fn advance(&mut self, next: CameraPhase) {
        debug_assert_eq!(
            next as u8,
            self.phase as u8 + 1,
            "camera phases must advance strictly in order"
        );
        self.phase = next;
    }

    /// Render one camera into the display target.
    ///
    /// A degenerate frustum skips the camera and reports it; resource errors
    /// propagate for the caller to contain at the camera boundary.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        arena: &mut TargetArena,
        camera: &CameraView,
        ctx: &mut FrameContext,
    ) -> Result<CameraOutcome, FrameError> {
        self.phase = CameraPhase::Idle;
        self.list.reset();

        ctx.editor.prepare_camera(camera);

        let settings = &camera.settings;
        let use_color_texture = if camera.is_reflection {
            ctx.buffer_settings.copy_color_reflection
        } else {
            ctx.buffer_settings.copy_color && settings.copy_color
        };
        let use_depth_texture = if camera.is_reflection {
            ctx.buffer_settings.copy_depth_reflection
        } else {
            ctx.buffer_settings.copy_depth && settings.copy_depth
        };
        let post_settings = settings
            .post_fx_override
            .as_ref()
            .or(ctx.post_fx)
            .cloned();

        // 1. Visibility, bounded by the shadow distance
        let shadow_distance = ctx.shadow_settings.max_distance.min(camera.far);
        let request = CullingRequest {
            view: camera.view,
            projection: camera.projection,
            near: camera.near,
            far: camera.far,
            shadow_distance,
            layer_mask: settings.rendering_layer_mask,
        };
        let Some(visibility) = ctx.visibility.cull(&request) else {
            log::warn!("camera '{}': culling failed, skipping", camera.name);
            return Ok(CameraOutcome::Skipped(SkipReason::CullingFailed));
        };
        self.advance(CameraPhase::Culled);

        // 2.-3. Buffer sizing
        let render_scale = settings.resolve_render_scale(ctx.buffer_settings.render_scale);
        let use_scaled = !(0.99..=1.01).contains(&render_scale);
        let hdr = ctx.buffer_settings.allow_hdr && camera.allow_hdr;
        let (buffer_width, buffer_height) = effective_buffer_size(camera, render_scale, use_scaled);
        self.list.set_vec4(
            GlobalParam::BufferSize,
            Vec4::new(
                1.0 / buffer_width as f32,
                1.0 / buffer_height as f32,
                buffer_width as f32,
                buffer_height as f32,
            ),
        );

        self.post_fx.setup(
            settings,
            post_settings,
            (buffer_width, buffer_height),
            camera.viewport,
            (ctx.display.width, ctx.display.height),
            hdr,
            ctx.buffer_settings.fxaa.clone(),
            ctx.buffer_settings.bicubic_rescaling,
            backend.post_shaders_available(),
        );

        // 4a. Shadows render before any geometry so the atlas and its
        // globals are bound for the opaque passes.
        self.shadows.begin_frame(ctx.shadow_settings);
        let light_mask = if settings.mask_lights {
            settings.rendering_layer_mask
        } else {
            u32::MAX
        };
        lighting::setup(
            &mut self.list,
            ctx.lights,
            &mut self.shadows,
            visibility.as_ref(),
            light_mask,
        );
        let depth_convention = backend.depth_convention();
        self.shadows.render(
            backend,
            arena,
            &mut self.list,
            visibility.as_ref(),
            depth_convention,
        )?;
        self.advance(CameraPhase::ShadowsRendered);

        // Intermediate buffer: needed for scaled rendering, attachment
        // copies, or an active post-FX chain.
        let post_active = self.post_fx.is_active();
        let use_intermediate = use_scaled || use_color_texture || use_depth_texture || post_active;

        let attachments = if use_intermediate {
            let color = arena.acquire(
                backend,
                TargetKey::CameraColor,
                TargetDesc::color(buffer_width, buffer_height, hdr),
            )?;
            let depth = arena.acquire(
                backend,
                TargetKey::CameraDepth,
                TargetDesc::depth(buffer_width, buffer_height),
            )?;
            Some((color, depth))
        } else {
            None
        };

        self.bind_camera_target(camera, attachments, buffer_width, buffer_height);

        // Copy globals stay valid even when no copy happens this frame
        self.list
            .set_texture(GlobalParam::CameraColorTexture, ctx.missing_texture.into());
        self.list
            .set_texture(GlobalParam::CameraDepthTexture, ctx.missing_texture.into());

        // 4b. Geometry: opaque front-to-back, skybox, attachment copies,
        // transparent back-to-front.
        ctx.draws.submit(
            &mut self.list,
            DrawRequest::opaque(settings.rendering_layer_mask),
        );
        if camera.clear_flags == ClearFlags::Skybox {
            self.list.push(FrameCommand::DrawSkybox);
        }
        if let Some((color, depth)) = attachments {
            if use_color_texture || use_depth_texture {
                self.copy_attachments(
                    backend,
                    arena,
                    (color, depth),
                    use_color_texture,
                    use_depth_texture,
                    buffer_width,
                    buffer_height,
                    hdr,
                )?;
            }
        }
        ctx.draws.submit(
            &mut self.list,
            DrawRequest::transparent(settings.rendering_layer_mask),
        );
        self.advance(CameraPhase::GeometrySubmitted);

        ctx.editor.gizmos_before_post_fx(&mut self.list);

        // 5. Post effects, or a direct composite of the intermediate buffer
        match attachments {
            Some((color, _)) if post_active => {
                self.post_fx.render(backend, arena, &mut self.list, color)?;
            }
            Some((color, _)) => self.composite_direct(camera, &ctx.display, color),
            None => {}
        }
        self.advance(CameraPhase::PostFxApplied);

        ctx.editor.gizmos_after_post_fx(&mut self.list);

        // 6. Release per-camera targets; everything must come back
        arena.release(TargetKey::ShadowAtlas)?;
        if use_intermediate {
            arena.release(TargetKey::CameraColor)?;
            arena.release(TargetKey::CameraDepth)?;
            if use_color_texture {
                arena.release(TargetKey::CameraColorCopy)?;
            }
            if use_depth_texture {
                arena.release(TargetKey::CameraDepthCopy)?;
            }
        }
        arena.finish_frame()?;

        backend.execute(&self.list)?;
        self.advance(CameraPhase::Submitted);
        Ok(CameraOutcome::Rendered)
    }

    fn bind_camera_target(
        &mut self,
        camera: &CameraView,
        attachments: Option<(TargetId, TargetId)>,
        buffer_width: u32,
        buffer_height: u32,
    ) {
        // An intermediate buffer starts with garbage, so clearing can never
        // be weaker than a full color + depth clear there.
        let flags = if attachments.is_some()
            && matches!(camera.clear_flags, ClearFlags::Depth | ClearFlags::Nothing)
        {
            ClearFlags::Color
        } else {
            camera.clear_flags
        };
        let clear_color = match flags {
            ClearFlags::Skybox => LoadAction::Clear([0.0, 0.0, 0.0, 0.0]),
            ClearFlags::Color => LoadAction::Clear(camera.background.to_array()),
            ClearFlags::Depth | ClearFlags::Nothing => LoadAction::Load,
        };
        let clear_depth = match flags {
            ClearFlags::Nothing => LoadAction::Load,
            _ => LoadAction::Clear([1.0, 0.0, 0.0, 0.0]),
        };

        let (color, depth) = match attachments {
            Some((color, depth)) => (
                Attachment {
                    target: color.into(),
                    load: clear_color,
                    store: StoreAction::Store,
                },
                Attachment {
                    target: depth.into(),
                    load: clear_depth,
                    store: StoreAction::Store,
                },
            ),
            None => (
                Attachment {
                    target: TargetRef::Display,
                    load: clear_color,
                    store: StoreAction::Store,
                },
                // The display target brings its own depth
                Attachment {
                    target: TargetRef::Display,
                    load: clear_depth,
                    store: StoreAction::Discard,
                },
            ),
        };

        self.list.push(FrameCommand::SetRenderTarget {
            color: Some(color),
            depth: Some(depth),
        });
        let viewport = if attachments.is_some() {
            Rect::from_size(buffer_width, buffer_height)
        } else {
            camera.viewport
        };
        self.list.push(FrameCommand::SetViewport(viewport));
        self.list.push(FrameCommand::SetViewProjection {
            view: camera.view,
            projection: camera.projection,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_attachments<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        arena: &mut TargetArena,
        (color, depth): (TargetId, TargetId),
        use_color_texture: bool,
        use_depth_texture: bool,
        buffer_width: u32,
        buffer_height: u32,
        hdr: bool,
    ) -> Result<(), FrameError> {
        if use_color_texture {
            let copy = arena.acquire(
                backend,
                TargetKey::CameraColorCopy,
                TargetDesc::color(buffer_width, buffer_height, hdr),
            )?;
            self.list.push(FrameCommand::CopyTexture {
                source: color.into(),
                destination: copy.into(),
            });
            self.list
                .set_texture(GlobalParam::CameraColorTexture, copy.into());
        }
        if use_depth_texture {
            let copy = arena.acquire(
                backend,
                TargetKey::CameraDepthCopy,
                TargetDesc::depth(buffer_width, buffer_height),
            )?;
            self.list.push(FrameCommand::CopyTexture {
                source: depth.into(),
                destination: copy.into(),
            });
            self.list
                .set_texture(GlobalParam::CameraDepthTexture, copy.into());
        }

        // Copying ended the pass; rebind the attachments preserving contents
        self.list.push(FrameCommand::SetRenderTarget {
            color: Some(Attachment {
                target: color.into(),
                load: LoadAction::Load,
                store: StoreAction::Store,
            }),
            depth: Some(Attachment {
                target: depth.into(),
                load: LoadAction::Load,
                store: StoreAction::Store,
            }),
        });
        self.list
            .push(FrameCommand::SetViewport(Rect::from_size(buffer_width, buffer_height)));
        Ok(())
    }

    /// Composite the intermediate buffer straight into the display target
    /// when no post effects run
    fn composite_direct(&mut self, camera: &CameraView, display: &DisplayInfo, source: TargetId) {
        let blend = camera.settings.final_blend_mode;
        let covers = camera.viewport.covers(display.width, display.height);
        let load = if covers && blend.is_replace() {
            LoadAction::DontCare
        } else {
            LoadAction::Load
        };
        self.list.push(FrameCommand::FinalDraw {
            source: source.into(),
            pass: PostPass::Copy,
            viewport: camera.viewport,
            load,
            blend,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{CameraSettings, RenderScaleMode};

    fn camera_with_scale(mode: RenderScaleMode, scale: f32) -> CameraView {
        CameraView {
            viewport: Rect::from_size(1000, 500),
            settings: CameraSettings {
                render_scale_mode: mode,
                render_scale: scale,
                ..CameraSettings::default()
            },
            ..CameraView::default()
        }
    }

    #[test]
    fn buffer_size_is_floored() {
        let camera = camera_with_scale(RenderScaleMode::Override, 0.75);
        let scale = camera.settings.resolve_render_scale(1.0);
        assert_eq!(effective_buffer_size(&camera, scale, true), (750, 375));

        let camera = camera_with_scale(RenderScaleMode::Override, 0.333);
        let scale = camera.settings.resolve_render_scale(1.0);
        assert_eq!(effective_buffer_size(&camera, scale, true), (333, 166));
    }

    #[test]
    fn render_scale_is_clamped_both_ways() {
        let camera = camera_with_scale(RenderScaleMode::Override, 5.0);
        let scale = camera.settings.resolve_render_scale(1.0);
        assert_eq!(effective_buffer_size(&camera, scale, true), (2000, 1000));

        let camera = camera_with_scale(RenderScaleMode::Override, 0.01);
        let scale = camera.settings.resolve_render_scale(1.0);
        assert_eq!(effective_buffer_size(&camera, scale, true), (100, 50));
    }

    #[test]
    fn native_size_without_scaling() {
        let camera = camera_with_scale(RenderScaleMode::Inherit, 1.0);
        assert_eq!(effective_buffer_size(&camera, 1.0, false), (1000, 500));
    }
}
