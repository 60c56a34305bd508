//! Pool core lifecycle.
//!
//! Builds the job manager and difficulty controller from a [`PoolConfig`],
//! runs the controller as a task, and tears everything down on shutdown.
//! The transport layer talks to the running core through a [`PoolHandle`].

use std::sync::Arc;

use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::PoolConfig;
use crate::job::{JobEvent, JobManager};
use crate::tracing::prelude::*;
use crate::vardiff::{ConnectionEvent, VarDiff, VarDiffEvent};

const CONNECTION_EVENT_CAPACITY: usize = 1024;
const VARDIFF_EVENT_CAPACITY: usize = 256;

/// Endpoints of a running pool core.
#[derive(Debug)]
pub struct PoolHandle {
    pub jobs: Arc<JobManager>,
    pub connection_events: mpsc::Sender<ConnectionEvent>,
    pub job_events: mpsc::UnboundedReceiver<JobEvent>,
    pub vardiff_events: mpsc::Receiver<VarDiffEvent>,
}

pub struct Daemon {
    config: PoolConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Validate the configuration and start the core's tasks.
    pub fn start(&self) -> anyhow::Result<PoolHandle> {
        self.config.validate()?;

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(JobManager::new(&self.config, job_tx)?);

        let (connection_tx, connection_rx) = mpsc::channel(CONNECTION_EVENT_CAPACITY);
        let (vardiff_tx, vardiff_rx) = mpsc::channel(VARDIFF_EVENT_CAPACITY);
        let mut vardiff = VarDiff::new(self.config.vardiff.clone(), vardiff_tx);
        self.tracker.spawn({
            let shutdown = self.shutdown.clone();
            async move {
                vardiff.run(connection_rx, shutdown).await;
                debug!(
                    connections = vardiff.connection_count(),
                    "Difficulty controller stopped"
                );
            }
        });

        info!(
            extranonce1_size = self.config.extranonce1_size,
            extranonce2_size = jobs.extranonce2_size(),
            "Pool core started"
        );

        Ok(PoolHandle {
            jobs,
            connection_events: connection_tx,
            job_events: job_rx,
            vardiff_events: vardiff_rx,
        })
    }

    /// Stop all tasks and wait for them to finish.
    pub async fn stop(&self) {
        trace!("Shutting down.");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Run until SIGINT or SIGTERM, logging core events.
    ///
    /// With no transport attached, events are only logged.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut handle = self.start()?;

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        };

        let handled = log_events(&mut handle, shutdown).await;
        debug!(events = handled, "Event loop stopped");

        drop(handle);
        self.stop().await;
        info!("Exiting.");
        Ok(())
    }
}

/// Log events from `handle` until `shutdown` completes.
///
/// The handle stays borrowed for the whole loop, so its job manager (and
/// with it the job event sender) outlives the loop. Returns the number of
/// events logged.
async fn log_events(handle: &mut PoolHandle, shutdown: impl Future<Output = ()>) -> usize {
    tokio::pin!(shutdown);
    let mut handled = 0;

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            Some(event) = handle.job_events.recv() => log_job_event(&event),
            Some(event) = handle.vardiff_events.recv() => log_vardiff_event(&event),
        }
        handled += 1;
    }

    handled
}

fn log_job_event(event: &JobEvent) {
    match event {
        JobEvent::NewBlock(job) => debug!(job = %job.id(), "Broadcast new block"),
        JobEvent::UpdatedBlock { job, .. } => debug!(job = %job.id(), "Broadcast refreshed job"),
        JobEvent::ShareObserved { record, nonce } => trace!(
            job = %record.job,
            worker = %record.worker,
            nonce = %nonce,
            accepted = record.error.is_none(),
            "Share observed"
        ),
    }
}

fn log_vardiff_event(event: &VarDiffEvent) {
    match event {
        VarDiffEvent::NewDifficulty {
            connection,
            difficulty,
        } => debug!(%connection, %difficulty, "New difficulty"),
        VarDiffEvent::Error(err) => warn!(error = %err, "Difficulty controller error"),
    }
}
