//! Editor capability interface
//!
//! Editor builds inject an implementation to preview cameras and draw
//! gizmos; runtime builds use [`NoopEditorHooks`]. The core never carries
//! editor state of its own.

use crate::backend::command::CommandList;
use crate::scene::CameraView;

/// Optional editor integration points around a camera pass
pub trait EditorHooks {
    /// Called before culling, e.g. to emit scene-view UI geometry
    fn prepare_camera(&mut self, _camera: &CameraView) {}

    /// Gizmos drawn into the camera buffer, before post effects
    fn gizmos_before_post_fx(&mut self, _list: &mut CommandList) {}

    /// Gizmos drawn over the final image
    fn gizmos_after_post_fx(&mut self, _list: &mut CommandList) {}
}

/// No-op implementation for non-editor builds
#[derive(Debug, Default)]
pub struct NoopEditorHooks;

impl EditorHooks for NoopEditorHooks {}
