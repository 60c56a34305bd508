use tokio::time::Instant;

use crate::config::VarDiffConfig;
use crate::types::Difficulty;

/// Shortest inter-share interval fed to the average, in seconds.
const MIN_SHARE_INTERVAL: f64 = 0.001;

/// Bounds on `ema / target_time` before it is applied.
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Result of one retarget check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Retarget {
    /// Too few shares, too little time, or no interval average yet.
    NotDue,

    /// Evaluated; the proposal was within hysteresis of the current value.
    Unchanged { proposed: f64 },

    /// Evaluated and adopted.
    Adjusted { old: Difficulty, new: Difficulty },
}

/// Adaptive difficulty state of one connection.
#[derive(Debug, Clone)]
pub struct DifficultyState {
    difficulty: Difficulty,
    last_share: Option<Instant>,

    /// Smoothed seconds between shares; `None` until two shares are seen.
    ema_interval: Option<f64>,

    shares_since_retarget: u32,
    last_retarget: Instant,
}

impl DifficultyState {
    pub fn new(difficulty: Difficulty, now: Instant) -> Self {
        Self {
            difficulty,
            last_share: None,
            ema_interval: None,
            shares_since_retarget: 0,
            last_retarget: now,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn ema_interval(&self) -> Option<f64> {
        self.ema_interval
    }

    pub fn shares_since_retarget(&self) -> u32 {
        self.shares_since_retarget
    }

    /// Set the difficulty, clamped into the configured bounds.
    pub fn set_difficulty(&mut self, value: Difficulty, config: &VarDiffConfig) {
        self.difficulty = value.clamp(config.min_difficulty(), config.max_difficulty());
    }

    /// Fold a share seen at `at` into the interval average.
    pub fn record_share(&mut self, at: Instant, alpha: f64) {
        if let Some(last) = self.last_share {
            let dt = at
                .saturating_duration_since(last)
                .as_secs_f64()
                .max(MIN_SHARE_INTERVAL);
            self.ema_interval = Some(match self.ema_interval {
                None => dt,
                Some(ema) => (1.0 - alpha) * ema + alpha * dt,
            });
        }
        self.last_share = Some(at);
        self.shares_since_retarget += 1;
    }

    /// Retarget if enough shares and time have accumulated.
    ///
    /// Any evaluation restarts the share count and interval, whether or not
    /// the difficulty changes.
    pub fn try_retarget(&mut self, at: Instant, config: &VarDiffConfig) -> Retarget {
        if self.shares_since_retarget < config.retarget_shares {
            return Retarget::NotDue;
        }
        if at.saturating_duration_since(self.last_retarget) < config.retarget_interval() {
            return Retarget::NotDue;
        }
        let Some(ema) = self.ema_interval else {
            return Retarget::NotDue;
        };

        self.last_retarget = at;
        self.shares_since_retarget = 0;

        let current = self.difficulty.as_f64();

        // Fast shares (factor < 1) raise difficulty, slow shares lower it.
        let factor = (ema / config.target_time).clamp(MIN_FACTOR, MAX_FACTOR);
        let proposed = (current / factor)
            .min(current * config.max_step_up)
            .max(current * config.max_step_down)
            .min(config.max_diff)
            .max(config.min_diff);

        let change = (proposed - current).abs() / current.max(1e-9);
        if change <= config.hysteresis {
            return Retarget::Unchanged { proposed };
        }

        let old = self.difficulty;
        self.difficulty = Difficulty::new(proposed).rounded();
        Retarget::Adjusted {
            old,
            new: self.difficulty,
        }
    }
}
