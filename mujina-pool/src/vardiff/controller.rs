use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::state::{DifficultyState, Retarget};
use super::{ConnectionEvent, VarDiffError, VarDiffEvent};
use crate::config::VarDiffConfig;
use crate::tracing::prelude::*;
use crate::types::{ConnectionId, Difficulty};

/// Per-connection difficulty controller.
///
/// Owns one [`DifficultyState`] per connection, created on first reference
/// and dropped on disconnect. There is no capacity bound or idle eviction;
/// a connection that never reports its disconnect keeps its state.
#[derive(Debug)]
pub struct VarDiff {
    config: VarDiffConfig,
    alpha: f64,
    connections: HashMap<ConnectionId, DifficultyState>,
    events_tx: mpsc::Sender<VarDiffEvent>,
}

impl VarDiff {
    pub fn new(config: VarDiffConfig, events_tx: mpsc::Sender<VarDiffEvent>) -> Self {
        Self {
            alpha: config.alpha(),
            config,
            connections: HashMap::new(),
            events_tx,
        }
    }

    /// Process connection events until cancelled or the channel closes.
    ///
    /// A failing event is reported as [`VarDiffEvent::Error`] and the loop
    /// carries on with the next one.
    pub async fn run(
        &mut self,
        mut events_rx: mpsc::Receiver<ConnectionEvent>,
        cancellation: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            debug!("Connection event channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&mut self, event: ConnectionEvent) {
        let result = match event {
            ConnectionEvent::Submitted { connection, at } => Ok(self
                .on_submission(connection, at)
                .map(|difficulty| VarDiffEvent::NewDifficulty {
                    connection,
                    difficulty,
                })),
            ConnectionEvent::DifficultyReported { connection, value } => {
                self.set_initial_difficulty(connection, value).map(|_| None)
            }
            ConnectionEvent::Disconnected { connection } => {
                self.remove(connection);
                Ok(None)
            }
        };

        let outgoing = match result {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "VarDiff event handling failed");
                VarDiffEvent::Error(err)
            }
        };

        if self.events_tx.send(outgoing).await.is_err() {
            debug!("VarDiff event channel closed");
        }
    }

    /// Record a share from `connection` at `at`.
    ///
    /// Returns the new difficulty if a retarget adopted one.
    pub fn on_submission(&mut self, connection: ConnectionId, at: Instant) -> Option<Difficulty> {
        let start = self.config.start_difficulty();
        let state = self
            .connections
            .entry(connection)
            .or_insert_with(|| DifficultyState::new(start, at));
        state.record_share(at, self.alpha);

        match state.try_retarget(at, &self.config) {
            Retarget::NotDue => None,
            Retarget::Unchanged { proposed } => {
                trace!(
                    %connection,
                    current = %state.difficulty(),
                    proposed,
                    "Retarget within hysteresis"
                );
                None
            }
            Retarget::Adjusted { old, new } => {
                debug!(
                    %connection,
                    old = %old,
                    new = %new,
                    ema_interval = ?state.ema_interval(),
                    "Difficulty retargeted"
                );
                Some(new)
            }
        }
    }

    /// Assign `value`, clamped into the configured bounds, as the
    /// connection's difficulty.
    pub fn set_initial_difficulty(
        &mut self,
        connection: ConnectionId,
        value: f64,
    ) -> Result<Difficulty, VarDiffError> {
        if !value.is_finite() {
            return Err(VarDiffError::NonFiniteDifficulty { connection, value });
        }

        let config = &self.config;
        let state = self
            .connections
            .entry(connection)
            .or_insert_with(|| DifficultyState::new(config.start_difficulty(), Instant::now()));
        state.set_difficulty(Difficulty::new(value), config);
        Ok(state.difficulty())
    }

    /// Drop all state for `connection`.
    pub fn remove(&mut self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_some() {
            trace!(%connection, "Connection removed");
        }
    }

    pub fn current_difficulty(&self, connection: ConnectionId) -> Option<Difficulty> {
        self.connections.get(&connection).map(|state| state.difficulty())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn create_vardiff() -> (VarDiff, mpsc::Receiver<VarDiffEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (VarDiff::new(VarDiffConfig::default(), tx), rx)
    }

    /// Send `count` submissions `interval` apart, starting now.
    async fn submit_stream(
        tx: &mpsc::Sender<ConnectionEvent>,
        connection: ConnectionId,
        interval: Duration,
        count: u32,
    ) {
        let start = Instant::now();
        for i in 0..count {
            tx.send(ConnectionEvent::Submitted {
                connection,
                at: start + interval * i,
            })
            .await
            .unwrap();
        }
    }

    fn drain(rx: &mut mpsc::Receiver<VarDiffEvent>) -> Vec<VarDiffEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn shares_at_target_emit_nothing() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(128);
        let conn = ConnectionId::from(1);

        submit_stream(&tx, conn, Duration::from_secs(12), 100).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        assert!(drain(&mut out_rx).is_empty());
        assert_eq!(vardiff.current_difficulty(conn), Some(Difficulty::new(64.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_shares_emit_bounded_increase() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(128);
        let conn = ConnectionId::from(1);

        submit_stream(&tx, conn, Duration::from_secs(6), 40).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        match drain(&mut out_rx).as_slice() {
            [VarDiffEvent::NewDifficulty { connection, difficulty }] => {
                assert_eq!(*connection, conn);
                assert!((difficulty.as_f64() - 102.4).abs() < 1e-6);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_shares_emit_bounded_decrease() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(128);
        let conn = ConnectionId::from(1);

        submit_stream(&tx, conn, Duration::from_secs(24), 40).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        match drain(&mut out_rx).as_slice() {
            [VarDiffEvent::NewDifficulty { difficulty, .. }] => {
                assert!((difficulty.as_f64() - 38.4).abs() < 1e-6);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_fast_shares_converge_to_max() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(4096);
        let conn = ConnectionId::from(1);

        // One share a second: every evaluation wants the full step up.
        submit_stream(&tx, conn, Duration::from_secs(1), 3000).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        let difficulties: Vec<f64> = drain(&mut out_rx)
            .into_iter()
            .map(|event| match event {
                VarDiffEvent::NewDifficulty { difficulty, .. } => difficulty.as_f64(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();

        assert!(difficulties.windows(2).all(|w| w[1] <= w[0] * 1.6 + 1e-6));
        assert!(difficulties.iter().all(|&d| (1.0..=4_000_000.0).contains(&d)));
        assert_eq!(vardiff.current_difficulty(conn), Some(Difficulty::new(4_000_000.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn connections_are_independent() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let fast = ConnectionId::from(1);
        let steady = ConnectionId::from(2);

        let start = Instant::now();
        for i in 0..40 {
            vardiff.on_submission(fast, start + Duration::from_secs(6) * i);
            vardiff.on_submission(steady, start + Duration::from_secs(12) * i);
        }

        assert!(vardiff.current_difficulty(fast).unwrap().as_f64() > 64.0);
        assert_eq!(vardiff.current_difficulty(steady), Some(Difficulty::new(64.0)));
        assert_eq!(vardiff.connection_count(), 2);
        assert!(drain(&mut out_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reported_difficulty_is_clamped() {
        let (mut vardiff, _out_rx) = create_vardiff();
        let conn = ConnectionId::from(1);

        assert_eq!(vardiff.set_initial_difficulty(conn, 0.5), Ok(Difficulty::new(1.0)));
        assert_eq!(
            vardiff.set_initial_difficulty(conn, 1e9),
            Ok(Difficulty::new(4_000_000.0))
        );
        assert_eq!(vardiff.set_initial_difficulty(conn, 256.0), Ok(Difficulty::new(256.0)));
        assert_eq!(vardiff.current_difficulty(conn), Some(Difficulty::new(256.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_report_emits_error_and_continues() {
        let (mut vardiff, mut out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(128);
        let conn = ConnectionId::from(1);

        tx.send(ConnectionEvent::DifficultyReported {
            connection: conn,
            value: f64::NAN,
        })
        .await
        .unwrap();
        submit_stream(&tx, conn, Duration::from_secs(6), 40).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        let events = drain(&mut out_rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            VarDiffEvent::Error(VarDiffError::NonFiniteDifficulty { connection, .. }) if *connection == conn
        ));
        assert!(matches!(events[1], VarDiffEvent::NewDifficulty { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_removes_state() {
        let (mut vardiff, _out_rx) = create_vardiff();
        let (tx, rx) = mpsc::channel(16);
        let conn = ConnectionId::from(1);

        tx.send(ConnectionEvent::submitted_now(conn)).await.unwrap();
        tx.send(ConnectionEvent::Disconnected { connection: conn })
            .await
            .unwrap();
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        assert_eq!(vardiff.connection_count(), 0);
        assert_eq!(vardiff.current_difficulty(conn), None);

        // Returning later starts over from the start difficulty.
        vardiff.on_submission(conn, Instant::now());
        assert_eq!(vardiff.current_difficulty(conn), Some(Difficulty::new(64.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation() {
        let (mut vardiff, _out_rx) = create_vardiff();
        let (_tx, rx) = mpsc::channel(16);
        let cancellation = CancellationToken::new();

        cancellation.cancel();
        tokio::time::timeout(Duration::from_secs(1), vardiff.run(rx, cancellation))
            .await
            .expect("run should return once cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn closed_output_channel_is_not_fatal() {
        let (mut vardiff, out_rx) = create_vardiff();
        drop(out_rx);
        let (tx, rx) = mpsc::channel(128);
        let conn = ConnectionId::from(1);

        submit_stream(&tx, conn, Duration::from_secs(6), 40).await;
        drop(tx);
        vardiff.run(rx, CancellationToken::new()).await;

        assert!(vardiff.current_difficulty(conn).unwrap().as_f64() > 64.0);
    }
}
