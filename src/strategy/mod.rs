//! Client-side execution strategies built on the order executor.
//!
//! This module handles:
//! - TWAP: one order split into time-spaced slices
//! - Grid: resting limit orders spread over a price range
//! - The run state machine both share

pub mod grid;
pub mod twap;

use serde::Serialize;
use strum::Display;
use tracing::warn;

pub use grid::{GridEngine, GridOrder, GridPlan, GridReport, SkippedLevel};
pub use twap::{ScheduledSlice, SliceFailure, SliceFill, TwapEngine, TwapOrderStyle, TwapPlan, TwapReport};

/// Lifecycle of a strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RunState {
    /// Not started.
    Pending,
    /// Placing orders.
    Running,
    /// Every step was attempted.
    Completed,
    /// Stopped early by a failure or an interrupt.
    Aborted,
}

impl RunState {
    /// Whether `next` is a legal successor.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::Running)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Aborted)
        )
    }

    /// Move to `next` if legal; returns whether it moved.
    pub fn advance(&mut self, next: RunState) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            warn!(from = %self, to = %next, "Ignoring illegal run state transition");
            false
        }
    }

    /// Completed or Aborted.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}
