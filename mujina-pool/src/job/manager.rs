//! Job table management and share verification.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::extranonce::{Extranonce1, ExtranonceAllocator, ExtranonceError, NONCE_SIZE};
use super::job::{Job, JobCounter, JobId};
use super::share::{AcceptedShare, ShareError, ShareSubmission};
use super::template::ChainData;
use crate::config::PoolConfig;
use crate::pow;
use crate::tracing::prelude::*;
use crate::types::Difficulty;

/// Signals for the broadcast layer.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// New block: push this job to every connection. All previously issued
    /// job ids are now unknown.
    NewBlock(Arc<Job>),

    /// Refreshed work at the same block. Earlier job ids stay valid.
    UpdatedBlock { job: Arc<Job>, is_refresh: bool },

    /// Emitted once for every processed submission, accepted or not.
    ShareObserved { record: ShareRecord, nonce: String },
}

/// Metadata about one processed submission.
///
/// Job-derived fields are only filled in for accepted shares.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRecord {
    pub job: String,
    pub ip: IpAddr,
    pub port: u16,
    pub worker: String,
    pub difficulty: Difficulty,
    pub height: Option<u32>,
    pub block_reward: Option<u64>,
    pub msg: Option<String>,
    pub block_found: bool,

    /// Hex candidate block hash; empty unless `block_found`.
    pub block_hash: String,

    pub error: Option<ShareError>,
}

impl ShareRecord {
    fn rejected(share: &ShareSubmission, error: ShareError) -> Self {
        Self {
            job: share.job_id.clone(),
            ip: share.ip,
            port: share.port,
            worker: share.worker.clone(),
            difficulty: share.difficulty,
            height: None,
            block_reward: None,
            msg: None,
            block_found: false,
            block_hash: String::new(),
            error: Some(error),
        }
    }

    fn accepted(share: &ShareSubmission, accepted: &AcceptedShare) -> Self {
        Self {
            job: share.job_id.clone(),
            ip: share.ip,
            port: share.port,
            worker: share.worker.clone(),
            difficulty: share.difficulty,
            height: Some(accepted.height),
            block_reward: Some(accepted.block_reward),
            msg: Some(accepted.msg.clone()),
            block_found: accepted.is_block(),
            block_hash: accepted.block_hash.clone().unwrap_or_default(),
            error: None,
        }
    }
}

type JobTable = Arc<HashMap<JobId, Arc<Job>>>;

#[derive(Debug, Default)]
struct State {
    counter: JobCounter,
    current: Option<Arc<Job>>,

    /// Swapped whole on a new block, so a reader holding a snapshot never
    /// sees a partially replaced table.
    jobs: JobTable,
}

/// Owns the current job, the table of jobs miners may still submit against,
/// and per-connection extranonce allocation.
///
/// All methods take `&self`; share verification runs concurrently with
/// template updates.
#[derive(Debug)]
pub struct JobManager {
    extranonces: ExtranonceAllocator,
    state: RwLock<State>,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl JobManager {
    pub fn new(
        config: &PoolConfig,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Result<Self, ExtranonceError> {
        let extranonces = match config.instance_id {
            Some(instance_id) => ExtranonceAllocator::new(instance_id, config.extranonce1_size)?,
            None => ExtranonceAllocator::with_random_instance(config.extranonce1_size)?,
        };

        Ok(Self {
            extranonces,
            state: RwLock::new(State::default()),
            events,
        })
    }

    /// Extranonce1 for a newly connected miner.
    pub fn next_extranonce1(&self) -> Extranonce1 {
        self.extranonces.next()
    }

    /// Extranonce2 bytes each miner must supply.
    pub fn extranonce2_size(&self) -> usize {
        self.extranonces.extranonce2_size()
    }

    /// Most recently created job.
    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.state.read().current.clone()
    }

    /// Snapshot of every job a miner may currently submit against.
    pub fn valid_jobs(&self) -> JobTable {
        self.state.read().jobs.clone()
    }

    /// Adopt `chain` if it describes a new block.
    ///
    /// Returns `true` if the job table was replaced. Data for the current
    /// block, or for a different block at a lower height, is ignored.
    pub fn process_template(&self, chain: ChainData) -> bool {
        let mut state = self.state.write();

        if let Some(current) = &state.current {
            if current.msg() == chain.msg {
                return false;
            }
            if chain.height < current.height() {
                debug!(
                    height = chain.height,
                    current_height = current.height(),
                    "Ignoring stale template"
                );
                return false;
            }
        }

        let job = Arc::new(Job::new(state.counter.next(), chain));
        let mut jobs = HashMap::new();
        jobs.insert(job.id(), job.clone());
        state.jobs = Arc::new(jobs);
        state.current = Some(job.clone());

        info!(job = %job.id(), height = job.height(), "New block");
        self.emit(JobEvent::NewBlock(job));
        true
    }

    /// Make `chain` the current job without invalidating earlier ones.
    pub fn update_current_job(&self, chain: ChainData) {
        let mut state = self.state.write();

        let job = Arc::new(Job::new(state.counter.next(), chain));
        let mut jobs = (*state.jobs).clone();
        jobs.insert(job.id(), job.clone());
        state.jobs = Arc::new(jobs);
        state.current = Some(job.clone());

        debug!(job = %job.id(), height = job.height(), "Job refreshed");
        self.emit(JobEvent::UpdatedBlock {
            job,
            is_refresh: true,
        });
    }

    /// Verify and classify a share.
    ///
    /// Every call emits exactly one [`JobEvent::ShareObserved`], whatever
    /// the outcome.
    pub fn process_share(&self, share: &ShareSubmission) -> Result<AcceptedShare, ShareError> {
        let nonce = share.full_nonce();
        let outcome = self.verify(share, &nonce);

        let record = match &outcome {
            Ok(accepted) => {
                if let Some(hash) = &accepted.block_hash {
                    info!(
                        job = %share.job_id,
                        worker = %share.worker,
                        height = accepted.height,
                        block_hash = %hash,
                        "Block candidate found"
                    );
                } else {
                    trace!(job = %share.job_id, worker = %share.worker, "Share accepted");
                }
                ShareRecord::accepted(share, accepted)
            }
            Err(err) => {
                debug!(
                    job = %share.job_id,
                    worker = %share.worker,
                    code = err.code(),
                    reason = %err,
                    "Share rejected"
                );
                ShareRecord::rejected(share, *err)
            }
        };

        self.emit(JobEvent::ShareObserved { record, nonce });
        outcome
    }

    fn verify(&self, share: &ShareSubmission, nonce: &str) -> Result<AcceptedShare, ShareError> {
        if share.extranonce2.len() != self.extranonce2_size() * 2 {
            return Err(ShareError::IncorrectNonce2Size);
        }

        let job = self.lookup(&share.job_id).ok_or(ShareError::JobNotFound)?;

        if nonce.len() != NONCE_SIZE * 2 {
            return Err(ShareError::IncorrectNonceSize);
        }
        let extranonce1 = hex::decode(&share.extranonce1).map_err(|_| ShareError::MalformedNonce)?;
        let extranonce2 = hex::decode(&share.extranonce2).map_err(|_| ShareError::MalformedNonce)?;

        if !job.register_submit(&share.extranonce1, &share.extranonce2, &share.ntime, nonce) {
            return Err(ShareError::Duplicate);
        }

        let coinbase = job.serialize_coinbase(&extranonce1, &extranonce2);
        let pow = pow::evaluate(&coinbase, job.height());

        // Block and share thresholds are checked independently; a share that
        // meets the network target is a block whatever its share difficulty.
        let block_hash = match job.network_target() {
            Some(target) if target >= pow.fh => Some(hex::encode(pow.block_hash())),
            _ => {
                if !share.difficulty.is_met_by(pow.fh, job.base_target()) {
                    return Err(ShareError::LowDifficulty);
                }
                None
            }
        };

        let chain = job.chain();
        Ok(AcceptedShare {
            height: chain.height,
            block_reward: chain.coinbase_value,
            msg: chain.msg.clone(),
            block_hash,
        })
    }

    fn lookup(&self, job_id: &str) -> Option<Arc<Job>> {
        let id: JobId = job_id.parse().ok()?;
        let jobs = self.valid_jobs();
        jobs.get(&id).cloned()
    }

    fn emit(&self, event: JobEvent) {
        if self.events.send(event).is_err() {
            debug!("Job event channel closed");
        }
    }
}
