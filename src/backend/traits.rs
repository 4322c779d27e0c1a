//! Backend seam: error type, opaque handles and the `GraphicsBackend` trait
//!
//! The pipeline records a [`CommandList`](crate::backend::CommandList) per
//! camera and hands it to a backend for execution. Backends own the actual
//! GPU objects; the pipeline only ever sees opaque [`TargetId`] handles.

use crate::backend::command::CommandList;
use crate::backend::types::{DepthConvention, TargetDesc};
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to present: {0}")]
    PresentFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Unknown render target handle {0:?}")]
    UnknownTarget(TargetId),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a backend-owned render target texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) u64);

/// Display target description returned when a frame begins
#[derive(Debug, Clone, Copy)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    pub hdr: bool,
}

/// Main graphics backend trait
///
/// All GPU work is deferred: `execute` consumes a recorded command list and
/// never blocks on GPU completion. Target creation may allocate GPU memory,
/// which is why the arena pools targets by key across frames.
pub trait GraphicsBackend {
    /// Create a render target texture
    fn create_target(&mut self, desc: &TargetDesc) -> BackendResult<TargetId>;

    /// Destroy a render target texture
    fn destroy_target(&mut self, target: TargetId);

    /// Begin a new frame, acquiring the display target
    fn begin_frame(&mut self) -> BackendResult<DisplayInfo>;

    /// Execute one camera's recorded commands
    fn execute(&mut self, list: &CommandList) -> BackendResult<()>;

    /// End and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Depth buffer convention used by this backend
    fn depth_convention(&self) -> DepthConvention;

    /// Whether the post-processing shader set is available.
    ///
    /// When this reports false the compositor is disabled for the frame and
    /// cameras blit straight to the display target.
    fn post_shaders_available(&self) -> bool {
        true
    }
}
