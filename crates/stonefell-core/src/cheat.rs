//! Cheat scoring.
//!
//! Detected anomalies never terminate a session directly; they raise a
//! per-entity score that moderation tooling inspects out of band. The tracker
//! is deliberately dumb: it only goes up, and the single exception is that
//! flags raised during active combat are swallowed, because combat movement
//! produces too many false positives to be worth scoring.

use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::entity::InstanceId;

/// Reason a cheat flag was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheatReason {
    /// Client reported a movement speed that disagrees with the server's
    /// derived value.
    SpeedMismatch {
        /// Speed the client claimed, in milliseconds per tile.
        reported: u32,
        /// Speed the server derived.
        expected: u32,
    },
    /// A movement step arrived faster than the entity can legally move.
    StepTooFast {
        /// Observed interval since the last step, margin included.
        interval_ms: u64,
        /// Minimum legal interval.
        expected_ms: u64,
    },
    /// A movement stop arrived without a preceding movement start.
    StopWithoutStart,
    /// Client-reported origin drifted from the server-side position.
    PositionDrift {
        /// Position the client claimed.
        reported: IVec2,
        /// Position the server holds.
        actual: IVec2,
    },
}

impl fmt::Display for CheatReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpeedMismatch { reported, expected } => {
                write!(f, "speed mismatch (reported {reported} ms, expected {expected} ms)")
            }
            Self::StepTooFast { interval_ms, expected_ms } => {
                write!(f, "step too fast ({interval_ms} ms, expected >= {expected_ms} ms)")
            }
            Self::StopWithoutStart => write!(f, "movement stop without start"),
            Self::PositionDrift { reported, actual } => {
                write!(
                    f,
                    "position drift (reported ({}, {}), actual ({}, {}))",
                    reported.x, reported.y, actual.x, actual.y
                )
            }
        }
    }
}

/// A scored cheat flag, emitted on the world's event stream for moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatAlert {
    /// Entity the flag was raised against.
    pub instance: InstanceId,
    /// What was detected.
    pub reason: CheatReason,
    /// Score after this flag was applied.
    pub score: u32,
}

/// Monotonic per-entity cheat score.
///
/// # Example
///
/// ```
/// use stonefell_core::cheat::{CheatReason, CheatTracker};
/// use stonefell_core::entity::InstanceId;
///
/// let mut tracker = CheatTracker::default();
/// let alert = tracker.flag(InstanceId::new(1), CheatReason::StopWithoutStart, 1, false);
///
/// assert_eq!(alert.unwrap().score, 1);
/// assert_eq!(tracker.score(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatTracker {
    score: u32,
}

impl CheatTracker {
    /// Creates a tracker with a zero score.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current score.
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    /// Raises a flag worth `amount` points.
    ///
    /// Returns the resulting [`CheatAlert`], or `None` when the flag was
    /// swallowed because the entity is in active combat. The score never
    /// decreases through this path.
    pub fn flag(
        &mut self,
        instance: InstanceId,
        reason: CheatReason,
        amount: u32,
        in_combat: bool,
    ) -> Option<CheatAlert> {
        if in_combat {
            debug!(%instance, %reason, "cheat flag swallowed during combat");
            return None;
        }
        self.score = self.score.saturating_add(amount);
        debug!(%instance, %reason, score = self.score, "cheat flag raised");
        Some(CheatAlert {
            instance,
            reason,
            score: self.score,
        })
    }

    /// Administrative reset. The only way the score goes down.
    pub fn reset(&mut self) {
        self.score = 0;
    }
}
