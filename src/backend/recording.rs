//! Recording backend
//!
//! A GPU-free [`GraphicsBackend`] that hands out synthetic target handles
//! and keeps every executed command list. Used by the test suite and by
//! headless hosts that consume the command stream themselves.

use crate::backend::command::CommandList;
use crate::backend::traits::{BackendResult, DisplayInfo, GraphicsBackend, TargetId};
use crate::backend::types::{DepthConvention, TargetDesc};
use std::collections::HashMap;

/// Backend that records instead of rendering
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    hdr: bool,
    depth_convention: DepthConvention,
    post_shaders: bool,
    next_target: u64,
    alive: HashMap<TargetId, TargetDesc>,
    created: usize,
    destroyed: usize,
    executed: Vec<CommandList>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            hdr: true,
            depth_convention: DepthConvention::Reversed,
            post_shaders: true,
            next_target: 1,
            alive: HashMap::new(),
            created: 0,
            destroyed: 0,
            executed: Vec::new(),
        }
    }

    /// Simulate a backend whose post-processing shaders failed to load
    pub fn without_post_shaders(mut self) -> Self {
        self.post_shaders = false;
        self
    }

    pub fn with_depth_convention(mut self, convention: DepthConvention) -> Self {
        self.depth_convention = convention;
        self
    }

    pub fn targets_created(&self) -> usize {
        self.created
    }

    pub fn targets_destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn targets_alive(&self) -> usize {
        self.alive.len()
    }

    /// Descriptor of a live target
    pub fn target_desc(&self, id: TargetId) -> Option<&TargetDesc> {
        self.alive.get(&id)
    }

    /// Every command list executed so far, in order
    pub fn executed(&self) -> &[CommandList] {
        &self.executed
    }

    pub fn last_executed(&self) -> Option<&CommandList> {
        self.executed.last()
    }

    pub fn clear_executed(&mut self) {
        self.executed.clear();
    }
}

impl GraphicsBackend for RecordingBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> BackendResult<TargetId> {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        self.alive.insert(id, *desc);
        self.created += 1;
        Ok(id)
    }

    fn destroy_target(&mut self, target: TargetId) {
        if self.alive.remove(&target).is_some() {
            self.destroyed += 1;
        }
    }

    fn begin_frame(&mut self) -> BackendResult<DisplayInfo> {
        Ok(DisplayInfo {
            width: self.width,
            height: self.height,
            hdr: self.hdr,
        })
    }

    fn execute(&mut self, list: &CommandList) -> BackendResult<()> {
        self.executed.push(list.clone());
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn depth_convention(&self) -> DepthConvention {
        self.depth_convention
    }

    fn post_shaders_available(&self) -> bool {
        self.post_shaders
    }
}
