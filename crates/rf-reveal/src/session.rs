//! Spin session tracking
//!
//! One session covers a single trigger-to-settle cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::landing::LandingTarget;
use crate::resolver::{Resolution, ResolutionSource};
use crate::reward::Reward;

/// Spin session identifier
pub type SessionId = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// SPIN STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine / session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SpinStatus {
    /// Ready for a trigger
    #[default]
    Idle = 0,
    /// Waiting on the outcome resolver
    Resolving = 1,
    /// Strip is travelling to the target offset
    Animating = 2,
    /// Winning reward published
    Settled = 3,
}

impl SpinStatus {
    /// A spin is in flight
    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, SpinStatus::Resolving | SpinStatus::Animating)
    }

    /// Whether `next` is a legal forward step from this status
    #[inline]
    pub fn can_advance_to(&self, next: SpinStatus) -> bool {
        matches!(
            (self, next),
            (SpinStatus::Idle, SpinStatus::Resolving)
                | (SpinStatus::Resolving, SpinStatus::Animating)
                | (SpinStatus::Animating, SpinStatus::Settled)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPIN SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// A single spin, from trigger to settle
#[derive(Debug, Clone)]
pub struct SpinSession {
    pub id: SessionId,
    pub status: SpinStatus,
    /// Known once resolved
    pub winning_reward: Option<Reward>,
    pub winning_index: Option<usize>,
    /// How the winner was chosen
    pub resolution_source: Option<ResolutionSource>,
    pub target_slot_index: Option<usize>,
    pub target_offset: Option<f64>,
    pub started_at: Instant,
    /// Captured when animation starts; later speed changes do not affect it
    pub duration: Option<Duration>,
}

impl SpinSession {
    /// New session entering Resolving
    pub fn begin(id: SessionId) -> Self {
        Self {
            id,
            status: SpinStatus::Resolving,
            winning_reward: None,
            winning_index: None,
            resolution_source: None,
            target_slot_index: None,
            target_offset: None,
            started_at: Instant::now(),
            duration: None,
        }
    }

    /// Resolving → Animating
    pub fn start_animation(
        &mut self,
        resolution: &Resolution,
        target: &LandingTarget,
        duration: Duration,
    ) -> bool {
        if !self.advance(SpinStatus::Animating) {
            return false;
        }
        self.winning_reward = Some(resolution.reward.clone());
        self.winning_index = Some(resolution.index);
        self.resolution_source = Some(resolution.source);
        self.target_slot_index = Some(target.target_slot_index);
        self.target_offset = Some(target.target_offset);
        self.duration = Some(duration);
        true
    }

    /// Animating → Settled
    pub fn settle(&mut self) -> Option<Reward> {
        if !self.advance(SpinStatus::Settled) {
            return None;
        }
        self.winning_reward.clone()
    }

    /// Time since trigger, on the runtime clock the settle timer uses
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn advance(&mut self, next: SpinStatus) -> bool {
        if !self.status.can_advance_to(next) {
            log::debug!(
                "Session {} refused transition {:?} -> {:?}",
                self.id,
                self.status,
                next
            );
            return false;
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward::Reward;

    fn resolution() -> Resolution {
        Resolution {
            index: 1,
            reward: Reward::new("b", "B"),
            source: ResolutionSource::Authoritative,
        }
    }

    fn target() -> LandingTarget {
        LandingTarget {
            base_index: 2,
            target_slot_index: 12,
            target_offset: 1200.0,
            rest_offset: 0.0,
        }
    }

    #[test]
    fn test_status_order() {
        assert!(SpinStatus::Idle.can_advance_to(SpinStatus::Resolving));
        assert!(!SpinStatus::Idle.can_advance_to(SpinStatus::Animating));
        assert!(!SpinStatus::Animating.can_advance_to(SpinStatus::Resolving));
        assert!(SpinStatus::Resolving.is_busy());
        assert!(!SpinStatus::Settled.is_busy());
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = SpinSession::begin(7);
        assert_eq!(session.status, SpinStatus::Resolving);
        assert!(session.settle().is_none());

        assert!(session.start_animation(&resolution(), &target(), Duration::from_millis(750)));
        assert_eq!(session.status, SpinStatus::Animating);
        assert_eq!(session.target_slot_index, Some(12));
        assert!(!session.start_animation(&resolution(), &target(), Duration::from_millis(1)));
        assert_eq!(session.duration, Some(Duration::from_millis(750)));

        let reward = session.settle().unwrap();
        assert_eq!(reward.name, "B");
        assert_eq!(session.status, SpinStatus::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_runtime_clock() {
        let session = SpinSession::begin(3);
        tokio::time::advance(Duration::from_millis(750)).await;
        assert_eq!(session.elapsed(), Duration::from_millis(750));
    }
}
