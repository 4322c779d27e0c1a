//! GPU backend abstraction
//!
//! The frame pipeline records work into a [`command::CommandList`] and hands
//! it to a [`traits::GraphicsBackend`] for execution. Components never talk
//! to the GPU API directly.

pub mod command;
pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use command::{CommandList, FrameCommand, GlobalParam, ParamValue};
pub use traits::{BackendError, BackendResult, GraphicsBackend, TargetId};
pub use types::*;
