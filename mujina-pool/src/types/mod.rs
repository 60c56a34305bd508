//! Core types shared by the job manager and the difficulty controller.

mod connection;
mod difficulty;

pub use connection::ConnectionId;
pub use difficulty::{
    DIFFICULTY_DECIMALS, Difficulty, Q, difficulty_to_target, target_to_difficulty, u256_to_f64,
};
pub use ruint::aliases::U256;
