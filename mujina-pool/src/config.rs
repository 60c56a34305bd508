//! Pool core configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Difficulty;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("extranonce1 size must be in range 1..=4, got {0}")]
    Extranonce1Size(u8),

    #[error("min_diff must be positive and finite, got {0}")]
    MinDifficulty(f64),

    #[error("max_diff must be finite, got {0}")]
    MaxDifficulty(f64),

    #[error("min_diff {min} exceeds max_diff {max}")]
    DifficultyBounds { min: f64, max: f64 },

    #[error("target_time must be positive")]
    TargetTime,

    #[error("max_step_up must be at least 1, got {0}")]
    StepUp(f64),

    #[error("max_step_down must be in (0, 1], got {0}")]
    StepDown(f64),

    #[error("hysteresis must be non-negative, got {0}")]
    Hysteresis(f64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Seeds the high bits of every extranonce1. Random when unset, so
    /// several pool instances behind one endpoint hand out disjoint values.
    pub instance_id: Option<u32>,

    /// Bytes of the 8-byte nonce space assigned by the pool per connection.
    /// The remainder is miner-chosen extranonce2.
    pub extranonce1_size: u8,

    pub vardiff: VarDiffConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            extranonce1_size: 4,
            vardiff: VarDiffConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading pool config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing pool config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4).contains(&self.extranonce1_size) {
            return Err(ConfigError::Extranonce1Size(self.extranonce1_size));
        }
        self.vardiff.validate()
    }
}

/// Tuning for the per-connection difficulty controller.
///
/// Times are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VarDiffConfig {
    /// Desired mean interval between a miner's shares.
    pub target_time: f64,

    pub min_diff: f64,
    pub max_diff: f64,

    /// Difficulty assigned to a connection before any retarget.
    pub start_diff: f64,

    /// Shares required since the last evaluation before retargeting.
    pub retarget_shares: u32,

    /// Seconds required since the last evaluation before retargeting.
    pub retarget_interval: f64,

    /// Half-life of the inter-share interval average.
    pub ema_halflife: f64,

    /// Largest multiplicative increase per evaluation.
    pub max_step_up: f64,

    /// Largest multiplicative decrease per evaluation.
    pub max_step_down: f64,

    /// Minimum relative change before a new difficulty is adopted.
    pub hysteresis: f64,
}

impl Default for VarDiffConfig {
    fn default() -> Self {
        Self {
            target_time: 12.0,
            min_diff: 1.0,
            max_diff: 4_000_000.0,
            start_diff: 64.0,
            retarget_shares: 30,
            retarget_interval: 90.0,
            ema_halflife: 60.0,
            max_step_up: 1.6,
            max_step_down: 0.6,
            hysteresis: 0.02,
        }
    }
}

impl VarDiffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_diff.is_finite() && self.min_diff > 0.0) {
            return Err(ConfigError::MinDifficulty(self.min_diff));
        }
        if !self.max_diff.is_finite() {
            return Err(ConfigError::MaxDifficulty(self.max_diff));
        }
        if self.min_diff > self.max_diff {
            return Err(ConfigError::DifficultyBounds {
                min: self.min_diff,
                max: self.max_diff,
            });
        }
        if !(self.target_time > 0.0) {
            return Err(ConfigError::TargetTime);
        }
        if !(self.max_step_up >= 1.0) {
            return Err(ConfigError::StepUp(self.max_step_up));
        }
        if !(self.max_step_down > 0.0 && self.max_step_down <= 1.0) {
            return Err(ConfigError::StepDown(self.max_step_down));
        }
        if !(self.hysteresis >= 0.0) {
            return Err(ConfigError::Hysteresis(self.hysteresis));
        }
        Ok(())
    }

    pub fn min_difficulty(&self) -> Difficulty {
        Difficulty::new(self.min_diff)
    }

    pub fn max_difficulty(&self) -> Difficulty {
        Difficulty::new(self.max_diff)
    }

    /// `start_diff` clamped into the configured bounds.
    pub fn start_difficulty(&self) -> Difficulty {
        Difficulty::new(self.start_diff).clamp(self.min_difficulty(), self.max_difficulty())
    }

    pub fn retarget_interval(&self) -> Duration {
        Duration::from_secs_f64(self.retarget_interval.max(0.0))
    }

    /// EMA smoothing coefficient `1 - exp(-ln 2 / halflife)`.
    pub fn alpha(&self) -> f64 {
        1.0 - (-std::f64::consts::LN_2 / self.ema_halflife.max(1e-9)).exp()
    }
}
