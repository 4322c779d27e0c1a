//! Draw submission seam
//!
//! Actual draw-call batching lives in the host engine. The orchestrator
//! describes what to draw through a [`DrawRequest`] and the collaborator
//! turns it into GPU draws when the command list executes.

use crate::backend::command::{CommandList, FrameCommand};

/// Draw ordering criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortCriteria {
    /// Front-to-back with state-change grouping, for opaque geometry
    CommonOpaque,
    /// Back-to-front, for transparent geometry
    CommonTransparent,
}

/// Material queue range selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRange {
    Opaque,
    Transparent,
    All,
}

/// Shader pass selector understood by the host's materials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPass {
    Unlit,
    Lit,
}

/// One geometry submission
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRequest {
    pub sort: SortCriteria,
    pub queue: QueueRange,
    pub rendering_layer_mask: u32,
    pub passes: Vec<DrawPass>,
}

impl DrawRequest {
    pub fn opaque(rendering_layer_mask: u32) -> Self {
        Self {
            sort: SortCriteria::CommonOpaque,
            queue: QueueRange::Opaque,
            rendering_layer_mask,
            passes: vec![DrawPass::Unlit, DrawPass::Lit],
        }
    }

    pub fn transparent(rendering_layer_mask: u32) -> Self {
        Self {
            sort: SortCriteria::CommonTransparent,
            queue: QueueRange::Transparent,
            rendering_layer_mask,
            passes: vec![DrawPass::Unlit, DrawPass::Lit],
        }
    }
}

/// The external draw submission collaborator
pub trait DrawSubmission {
    /// Record the draws for `request` into the camera's command list
    fn submit(&mut self, list: &mut CommandList, request: DrawRequest);
}

/// Default submission: records the request verbatim for the backend's draw
/// delegate to resolve at execution time.
#[derive(Debug, Default)]
pub struct RecordedSubmission;

impl DrawSubmission for RecordedSubmission {
    fn submit(&mut self, list: &mut CommandList, request: DrawRequest) {
        list.push(FrameCommand::DrawGeometry(request));
    }
}
