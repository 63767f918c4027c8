//! Presentation boundary
//!
//! The engine never renders; it writes strip offsets and transition settings
//! to a [`StripSurface`] supplied by the host (DOM, terminal, GPU, ...).

use std::time::Duration;

use parking_lot::Mutex;

use crate::reward::Reward;

/// Render target for the reel strip
///
/// Called with the engine locked: implementations must not call back into
/// the engine.
pub trait StripSurface: Send + Sync {
    /// Enable (`Some(duration)`) or disable (`None`) the offset transition
    fn set_transition(&self, duration: Option<Duration>);

    /// Move the strip to `offset`
    fn set_offset(&self, offset: f64);

    /// Force pending writes to take effect before the next one
    fn flush_layout(&self);

    /// Spin finished on `reward`
    fn settled(&self, _reward: &Reward) {}
}

/// Surface that draws nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl StripSurface for NullSurface {
    fn set_transition(&self, _duration: Option<Duration>) {}
    fn set_offset(&self, _offset: f64) {}
    fn flush_layout(&self) {}
}

/// A single write to a surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Transition(Option<Duration>),
    Offset(f64),
    Flush,
    Settled(Reward),
}

/// Surface that records every write, for inspection by hosts and tests
#[derive(Debug, Default)]
pub struct RecordingSurface {
    ops: Mutex<Vec<SurfaceOp>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all writes so far
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.lock().clone()
    }

    /// Last offset written, if any
    pub fn last_offset(&self) -> Option<f64> {
        self.ops.lock().iter().rev().find_map(|op| match op {
            SurfaceOp::Offset(offset) => Some(*offset),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

impl StripSurface for RecordingSurface {
    fn set_transition(&self, duration: Option<Duration>) {
        self.ops.lock().push(SurfaceOp::Transition(duration));
    }

    fn set_offset(&self, offset: f64) {
        self.ops.lock().push(SurfaceOp::Offset(offset));
    }

    fn flush_layout(&self) {
        self.ops.lock().push(SurfaceOp::Flush);
    }

    fn settled(&self, reward: &Reward) {
        self.ops.lock().push(SurfaceOp::Settled(reward.clone()));
    }
}

/// Reset to rest, flush, then animate to the target.
///
/// Both offset writes must be separated by the flush with the transition off
/// for the first, otherwise the surface collapses them into one jump.
pub fn drive_to_target(
    surface: &dyn StripSurface,
    rest_offset: f64,
    target_offset: f64,
    duration: Duration,
) {
    surface.set_transition(None);
    surface.set_offset(rest_offset);
    surface.flush_layout();
    surface.set_transition(Some(duration));
    surface.set_offset(target_offset);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_then_animate_order() {
        let surface = RecordingSurface::new();
        drive_to_target(&surface, 100.0, 1500.0, Duration::from_millis(750));
        assert_eq!(
            surface.ops(),
            vec![
                SurfaceOp::Transition(None),
                SurfaceOp::Offset(100.0),
                SurfaceOp::Flush,
                SurfaceOp::Transition(Some(Duration::from_millis(750))),
                SurfaceOp::Offset(1500.0),
            ]
        );
        assert_eq!(surface.last_offset(), Some(1500.0));
        surface.clear();
        assert!(surface.ops().is_empty());
    }
}
