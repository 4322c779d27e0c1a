//! Frame Renderer - a frame composition pipeline
//!
//! Given a scene's cameras and lights, this crate produces the final color
//! image for a frame: visibility-driven opaque/transparent draws, a cascaded
//! directional shadow atlas, and a post-processing chain (bloom, LUT color
//! grading, tone mapping, FXAA, resolution rescaling).
//!
//! # Architecture
//! - Pipeline components record into a per-camera [`CommandList`]; a
//!   [`GraphicsBackend`](backend::GraphicsBackend) executes it. The wgpu
//!   backend presents to a window; the recording backend runs headless.
//! - Ephemeral render targets are owned by the [`targets::TargetArena`],
//!   pooled by logical key across frames.
//! - Scene culling and draw batching stay in the host engine behind the
//!   [`visibility::VisibilityQuery`] and [`submit::DrawSubmission`] seams.
//!
//! Every failure mode degrades per feature or per camera: shadows fall back
//! to a dummy atlas, missing post shaders disable the stack, a degenerate
//! camera skips only itself.

pub mod backend;
pub mod editor;
pub mod pipeline;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod submit;
pub mod targets;
pub mod visibility;
pub mod window;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{CommandList, FrameCommand, GlobalParam};
pub use editor::{EditorHooks, NoopEditorHooks};
pub use pipeline::{CameraOutcome, CameraPhase, FrameError, PostFxStack, ShadowAtlas};
pub use renderer::{Renderer, RendererSettings};
pub use scene::{CameraView, DirectionalLight, FrameScene};
pub use settings::{CameraBufferSettings, CameraSettings, PostFxSettings, ShadowSettings};
pub use submit::{DrawSubmission, RecordedSubmission};
pub use targets::{TargetArena, TargetKey};
pub use visibility::{VisibilityQuery, VisibilityResult};
pub use window::{Window, WindowConfig};

/// Initialize env_logger for host applications that have no logger yet
pub fn init_logging() {
    let _ = env_logger::builder().format_timestamp(None).try_init();
}
