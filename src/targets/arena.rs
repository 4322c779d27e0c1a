//! Render target arena
//!
//! Tracks ephemeral GPU targets by logical key. Acquisitions are exclusive
//! for the duration of a camera pass; the backing allocation is pooled by
//! key across frames and only recreated when the descriptor changes.
//! Pyramid-style passes use the arena's level stack so that their release
//! order is a structural invariant rather than index bookkeeping.

use crate::backend::traits::{BackendError, GraphicsBackend, TargetId};
use crate::backend::types::TargetDesc;
use crate::targets::TargetKey;
use std::collections::HashMap;
use thiserror::Error;

/// Arena misuse and allocation errors
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Target {0:?} acquired twice without release")]
    AlreadyAcquired(TargetKey),
    #[error("Target {0:?} released without an acquisition")]
    NotAcquired(TargetKey),
    #[error("Targets still acquired at end of frame: {0:?}")]
    Leaked(Vec<TargetKey>),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy)]
struct PooledTarget {
    id: TargetId,
    desc: TargetDesc,
}

/// One entry of the pyramid level stack
#[derive(Debug, Clone, Copy)]
pub struct LevelEntry {
    pub key: TargetKey,
    pub id: TargetId,
    pub desc: TargetDesc,
}

/// Frame-scoped render target arena with per-key pooling
#[derive(Debug, Default)]
pub struct TargetArena {
    pooled: HashMap<TargetKey, PooledTarget>,
    active: Vec<TargetKey>,
    level_stack: Vec<LevelEntry>,
}

impl TargetArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the target for `key`, creating or resizing the pooled backing
    /// texture as needed.
    ///
    /// Resizing is only reachable while the key is unacquired; acquiring an
    /// already-acquired key is an error regardless of the descriptor.
    pub fn acquire<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        key: TargetKey,
        desc: TargetDesc,
    ) -> Result<TargetId, ArenaError> {
        if self.active.contains(&key) {
            return Err(ArenaError::AlreadyAcquired(key));
        }

        let id = match self.pooled.get(&key) {
            Some(pooled) if pooled.desc == desc => pooled.id,
            Some(pooled) => {
                backend.destroy_target(pooled.id);
                let id = backend.create_target(&desc)?;
                self.pooled.insert(key, PooledTarget { id, desc });
                id
            }
            None => {
                let id = backend.create_target(&desc)?;
                self.pooled.insert(key, PooledTarget { id, desc });
                id
            }
        };

        self.active.push(key);
        Ok(id)
    }

    /// Release an acquired target back to the pool
    pub fn release(&mut self, key: TargetKey) -> Result<(), ArenaError> {
        match self.active.iter().rposition(|&k| k == key) {
            Some(index) => {
                self.active.remove(index);
                Ok(())
            }
            None => Err(ArenaError::NotAcquired(key)),
        }
    }

    /// Handle of a currently acquired target
    pub fn get(&self, key: TargetKey) -> Option<TargetId> {
        if self.active.contains(&key) {
            self.pooled.get(&key).map(|p| p.id)
        } else {
            None
        }
    }

    /// Acquire a target and push it onto the pyramid level stack
    pub fn push_level<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        key: TargetKey,
        desc: TargetDesc,
    ) -> Result<TargetId, ArenaError> {
        let id = self.acquire(backend, key, desc)?;
        self.level_stack.push(LevelEntry { key, id, desc });
        Ok(id)
    }

    /// Pop the most recently pushed level without releasing it.
    ///
    /// The caller owns the acquisition and must `release` the key once the
    /// level has been consumed.
    pub fn detach_level(&mut self) -> Option<LevelEntry> {
        self.level_stack.pop()
    }

    pub fn level_count(&self) -> usize {
        self.level_stack.len()
    }

    /// End-of-camera check: every acquisition must have been released.
    ///
    /// Outstanding targets are force-released so the next camera starts
    /// clean, and reported as an error.
    pub fn finish_frame(&mut self) -> Result<(), ArenaError> {
        self.level_stack.clear();
        if self.active.is_empty() {
            Ok(())
        } else {
            let leaked = std::mem::take(&mut self.active);
            log::error!("render targets leaked at end of frame: {leaked:?}");
            Err(ArenaError::Leaked(leaked))
        }
    }

    /// Destroy all pooled allocations (shutdown or device loss)
    pub fn clear_pool<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.active.clear();
        self.level_stack.clear();
        for (_, pooled) in self.pooled.drain() {
            backend.destroy_target(pooled.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    fn desc(size: u32) -> TargetDesc {
        TargetDesc::color(size, size, true)
    }

    #[test]
    fn same_descriptor_reuses_backing_across_frames() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();

        let first = arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(128))
            .unwrap();
        arena.release(TargetKey::CameraColor).unwrap();
        arena.finish_frame().unwrap();

        let second = arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(128))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.targets_created(), 1);
        arena.release(TargetKey::CameraColor).unwrap();
        arena.finish_frame().unwrap();
    }

    #[test]
    fn changed_descriptor_recreates_backing() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();

        let first = arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(128))
            .unwrap();
        arena.release(TargetKey::CameraColor).unwrap();

        let second = arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(256))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(backend.targets_created(), 2);
        assert_eq!(backend.targets_destroyed(), 1);
        arena.release(TargetKey::CameraColor).unwrap();
    }

    #[test]
    fn double_acquire_is_rejected() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();

        arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(128))
            .unwrap();
        let err = arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(256))
            .unwrap_err();
        assert!(matches!(err, ArenaError::AlreadyAcquired(TargetKey::CameraColor)));
    }

    #[test]
    fn release_without_acquire_is_rejected() {
        let mut arena = TargetArena::new();
        let err = arena.release(TargetKey::BloomResult).unwrap_err();
        assert!(matches!(err, ArenaError::NotAcquired(TargetKey::BloomResult)));
    }

    #[test]
    fn leaks_are_reported_and_cleared() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();

        arena
            .acquire(&mut backend, TargetKey::CameraColor, desc(128))
            .unwrap();
        arena
            .acquire(&mut backend, TargetKey::CameraDepth, TargetDesc::depth(128, 128))
            .unwrap();

        match arena.finish_frame() {
            Err(ArenaError::Leaked(keys)) => {
                assert_eq!(keys, vec![TargetKey::CameraColor, TargetKey::CameraDepth]);
            }
            other => panic!("expected leak report, got {other:?}"),
        }
        // Next frame starts clean
        arena.finish_frame().unwrap();
    }

    #[test]
    fn level_stack_pops_in_reverse_push_order() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut arena = TargetArena::new();

        for i in 0..3u8 {
            arena
                .push_level(&mut backend, TargetKey::BloomVertical(i), desc(64 >> i))
                .unwrap();
        }
        assert_eq!(arena.level_count(), 3);

        for i in (0..3u8).rev() {
            let entry = arena.detach_level().unwrap();
            assert_eq!(entry.key, TargetKey::BloomVertical(i));
            arena.release(entry.key).unwrap();
        }
        arena.finish_frame().unwrap();
    }
}
