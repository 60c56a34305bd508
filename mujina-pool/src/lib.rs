//! Work distribution and share verification core for a mining pool.
//!
//! The pool hands connected miners jobs derived from the current block
//! template, verifies the shares they submit, and retargets each miner's
//! personal difficulty so that shares arrive at a steady cadence.
//!
//! - [`job::JobManager`] owns the job table, extranonce allocation, and the
//!   share-verification path.
//! - [`pow`] implements the proof-of-work evaluation used to score shares.
//! - [`vardiff::VarDiff`] owns per-connection adaptive difficulty.
//! - [`daemon::Daemon`] wires the two together and manages their tasks.
//!
//! Transport, template construction, and payouts live outside this crate.

pub mod config;
pub mod daemon;
pub mod job;
pub mod pow;
pub mod tracing;
pub mod types;
pub mod vardiff;
