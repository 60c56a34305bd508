//! Adaptive per-connection share difficulty.
//!
//! Each connection's inter-share interval is smoothed with an exponential
//! moving average. Once enough shares and time have accumulated the
//! controller compares the average against the target interval and moves
//! the difficulty towards it:
//!
//! ```text
//! factor   = clamp(ema / target_time, 0.2, 5)
//! proposed = difficulty / factor
//!            clamped to [difficulty * max_step_down, difficulty * max_step_up]
//!            then to [min_diff, max_diff]
//! ```
//!
//! A proposal is only adopted when it differs from the current value by
//! more than the hysteresis fraction, which keeps noisy share timing from
//! making the difficulty flap.

mod controller;
mod state;

use thiserror::Error;
use tokio::time::Instant;

use crate::types::{ConnectionId, Difficulty};

pub use crate::types::{difficulty_to_target, target_to_difficulty};
pub use controller::VarDiff;
pub use state::{DifficultyState, Retarget};

/// Input from the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A share was processed, accepted or rejected.
    Submitted {
        connection: ConnectionId,
        at: Instant,
    },

    /// The connection's difficulty was set from outside the controller.
    DifficultyReported { connection: ConnectionId, value: f64 },

    Disconnected { connection: ConnectionId },
}

impl ConnectionEvent {
    pub fn submitted_now(connection: ConnectionId) -> Self {
        Self::Submitted {
            connection,
            at: Instant::now(),
        }
    }
}

/// Output towards the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum VarDiffEvent {
    /// Send this difficulty to the connection.
    NewDifficulty {
        connection: ConnectionId,
        difficulty: Difficulty,
    },

    Error(VarDiffError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VarDiffError {
    #[error("{connection}: reported difficulty {value} is not finite")]
    NonFiniteDifficulty { connection: ConnectionId, value: f64 },
}
