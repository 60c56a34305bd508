//! Share submissions and their outcomes.

use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;

use crate::types::Difficulty;

/// A miner's submission as received from the transport layer.
#[derive(Debug, Clone)]
pub struct ShareSubmission {
    pub job_id: String,

    /// Difficulty in force before the most recent retarget, if any.
    pub previous_difficulty: Option<Difficulty>,

    /// Difficulty currently assigned to the connection.
    pub difficulty: Difficulty,

    /// Hex, as assigned to the connection.
    pub extranonce1: String,

    /// Hex, chosen by the miner.
    pub extranonce2: String,

    /// Submission time field, opaque to verification apart from duplicate
    /// detection.
    pub ntime: String,

    /// Nonce as sent by the miner. Ignored; the nonce is recomputed from
    /// the two extranonces.
    pub nonce: String,

    pub ip: IpAddr,
    pub port: u16,
    pub worker: String,
}

impl ShareSubmission {
    /// Full nonce: `extranonce1 || extranonce2`.
    pub fn full_nonce(&self) -> String {
        format!("{}{}", self.extranonce1, self.extranonce2)
    }
}

/// Why a share was rejected.
///
/// Every variant maps onto one of the wire error codes 20-23.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("incorrect nonce2 size")]
    IncorrectNonce2Size,

    #[error("job not found")]
    JobNotFound,

    #[error("incorrect nonce size")]
    IncorrectNonceSize,

    /// Nonce of the right length that is not valid hex.
    #[error("malformed nonce")]
    MalformedNonce,

    #[error("duplicate share")]
    Duplicate,

    #[error("low difficulty share")]
    LowDifficulty,
}

impl ShareError {
    pub fn code(&self) -> u32 {
        match self {
            ShareError::IncorrectNonce2Size
            | ShareError::IncorrectNonceSize
            | ShareError::MalformedNonce => 20,
            ShareError::JobNotFound => 21,
            ShareError::Duplicate => 22,
            ShareError::LowDifficulty => 23,
        }
    }
}

/// Outcome of a share that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedShare {
    pub height: u32,
    pub block_reward: u64,
    pub msg: String,

    /// Candidate block hash, hex, when the share also meets the network
    /// target.
    pub block_hash: Option<String>,
}

impl AcceptedShare {
    pub fn is_block(&self) -> bool {
        self.block_hash.is_some()
    }
}

/// Wire form of a share result:
/// `{"result": true, "error": null, "blockHash": ""}` or
/// `{"result": null, "error": [code, message]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub result: Option<bool>,
    pub error: Option<(u32, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl From<&Result<AcceptedShare, ShareError>> for ShareResponse {
    fn from(outcome: &Result<AcceptedShare, ShareError>) -> Self {
        match outcome {
            Ok(accepted) => Self {
                result: Some(true),
                error: None,
                block_hash: Some(accepted.block_hash.clone().unwrap_or_default()),
            },
            Err(err) => Self {
                result: None,
                error: Some((err.code(), err.to_string())),
                block_hash: None,
            },
        }
    }
}

impl From<Result<AcceptedShare, ShareError>> for ShareResponse {
    fn from(outcome: Result<AcceptedShare, ShareError>) -> Self {
        Self::from(&outcome)
    }
}
