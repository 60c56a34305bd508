//! Jobs, the job table, and share verification.
//!
//! [`JobManager`] turns chain data from the template builder into [`Job`]s
//! and decides which job ids miners may still submit against. A new block
//! replaces the whole table; a refresh adds to it. Shares are checked
//! against the table, the job's duplicate registry, and finally the
//! proof-of-work targets.

mod extranonce;
#[allow(clippy::module_inception)]
mod job;
mod manager;
mod share;
mod template;

pub use extranonce::{
    EXTRANONCE_PLACEHOLDER, Extranonce1, ExtranonceAllocator, ExtranonceError, NONCE_SIZE,
};
pub use job::{Job, JobCounter, JobId, JobIdError};
pub use manager::{JobEvent, JobManager, ShareRecord};
pub use share::{AcceptedShare, ShareError, ShareResponse, ShareSubmission};
pub use template::{ChainData, CoinbaseTemplate};
