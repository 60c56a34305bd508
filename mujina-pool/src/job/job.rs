//! Mining jobs and their identifiers.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use ruint::aliases::U256;
use thiserror::Error;

use super::template::ChainData;

/// Identifier of a job, rendered on the wire as lowercase hex without
/// padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u16);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not a job id: {0:?}")]
pub struct JobIdError(String);

impl JobId {
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    /// Only the canonical rendering parses, so "0a" or "A" never alias
    /// job "a".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = u16::from_str_radix(s, 16)
            .map(JobId)
            .map_err(|_| JobIdError(s.to_string()))?;
        if id.to_string() != s {
            return Err(JobIdError(s.to_string()));
        }
        Ok(id)
    }
}

/// Source of job ids.
///
/// Counts up from 1 and wraps back to 1 before reaching `0xffff`, so an id
/// is never zero.
#[derive(Debug, Default)]
pub struct JobCounter {
    counter: u16,
}

impl JobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> JobId {
        self.counter = self.counter.wrapping_add(1);
        if self.counter == u16::MAX || self.counter == 0 {
            self.counter = 1;
        }
        JobId(self.counter)
    }

    pub fn current(&self) -> JobId {
        JobId(self.counter)
    }
}

/// Key under which a submission is recorded for duplicate detection.
///
/// Hex fields are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubmitKey {
    extranonce1: String,
    extranonce2: String,
    ntime: String,
    nonce: String,
}

/// One unit of assignable work.
///
/// Immutable after creation apart from the registry of submissions already
/// seen against it.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    chain: ChainData,
    submits: Mutex<HashSet<SubmitKey>>,
}

impl Job {
    pub fn new(id: JobId, chain: ChainData) -> Self {
        Self {
            id,
            chain,
            submits: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn chain(&self) -> &ChainData {
        &self.chain
    }

    pub fn height(&self) -> u32 {
        self.chain.height
    }

    pub fn msg(&self) -> &str {
        &self.chain.msg
    }

    pub fn base_target(&self) -> U256 {
        self.chain.base_target
    }

    pub fn network_target(&self) -> Option<U256> {
        self.chain.network_target
    }

    /// Coinbase transaction for one (extranonce1, extranonce2) pair.
    pub fn serialize_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        self.chain.coinbase.serialize(extranonce1, extranonce2)
    }

    /// Record a submission; returns `false` if it was already recorded.
    ///
    /// Check and insert happen under one lock, so of two concurrent
    /// identical submissions exactly one is accepted.
    pub fn register_submit(
        &self,
        extranonce1: &str,
        extranonce2: &str,
        ntime: &str,
        nonce: &str,
    ) -> bool {
        let key = SubmitKey {
            extranonce1: extranonce1.to_ascii_lowercase(),
            extranonce2: extranonce2.to_ascii_lowercase(),
            ntime: ntime.to_ascii_lowercase(),
            nonce: nonce.to_ascii_lowercase(),
        };
        self.submits.lock().insert(key)
    }
}
