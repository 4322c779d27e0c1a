//! Frame renderer driving all cameras
//!
//! Owns the backend, the target arena and the per-camera pipeline; cameras
//! render strictly one after another so target-state invariants hold. A
//! failing camera is contained and reported, the rest of the frame still
//! renders.

use crate::backend::traits::{GraphicsBackend, TargetId};
use crate::backend::types::TargetDesc;
use crate::editor::EditorHooks;
use crate::pipeline::{CameraOutcome, CameraRenderer, FrameContext, FrameError, SkipReason};
use crate::scene::FrameScene;
use crate::settings::{CameraBufferSettings, PostFxSettings, ShadowSettings};
use crate::submit::DrawSubmission;
use crate::targets::TargetArena;
use crate::visibility::VisibilityQuery;

/// Pipeline-wide configuration
#[derive(Debug, Clone, Default)]
pub struct RendererSettings {
    pub buffer: CameraBufferSettings,
    pub shadows: ShadowSettings,
    /// Post-effect settings; `None` disables the stack for every camera
    /// that does not override it
    pub post_fx: Option<PostFxSettings>,
}

/// The main frame renderer
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    arena: TargetArena,
    camera_renderer: CameraRenderer,
    settings: RendererSettings,
    missing_texture: TargetId,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, settings: RendererSettings) -> Result<Self, FrameError> {
        // Persistent 1x1 stand-in bound wherever a copy texture global must
        // stay valid without a copy this frame.
        let missing_texture = backend.create_target(&TargetDesc::color(1, 1, false))?;
        Ok(Self {
            backend,
            arena: TargetArena::new(),
            camera_renderer: CameraRenderer::new(),
            settings,
            missing_texture,
        })
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Render every camera of the scene and present the frame.
    ///
    /// Returns one outcome per camera, in order.
    pub fn render_frame(
        &mut self,
        scene: &FrameScene,
        visibility: &mut dyn VisibilityQuery,
        draws: &mut dyn DrawSubmission,
        editor: &mut dyn EditorHooks,
    ) -> Result<Vec<CameraOutcome>, FrameError> {
        let display = self.backend.begin_frame()?;
        let mut outcomes = Vec::with_capacity(scene.cameras.len());

        for camera in &scene.cameras {
            let mut ctx = FrameContext {
                visibility,
                draws,
                editor,
                lights: &scene.lights,
                buffer_settings: &self.settings.buffer,
                shadow_settings: &self.settings.shadows,
                post_fx: self.settings.post_fx.as_ref(),
                display,
                missing_texture: self.missing_texture,
            };
            match self
                .camera_renderer
                .render(&mut self.backend, &mut self.arena, camera, &mut ctx)
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    // Contain the failure: free whatever the pass left
                    // behind and move on to the next camera.
                    log::error!("camera '{}': {error}", camera.name);
                    let _ = self.arena.finish_frame();
                    outcomes.push(CameraOutcome::Skipped(SkipReason::ResourceFailure));
                }
            }
        }

        self.backend.end_frame()?;
        Ok(outcomes)
    }
}
