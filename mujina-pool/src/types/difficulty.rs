//! Share difficulty and its conversion to and from 256-bit targets.

use std::fmt;

use ruint::aliases::{U256, U512};
use serde::{Deserialize, Serialize};

/// Boundary value `Q = 2^256 - 1` that difficulty 1 maps onto.
pub const Q: U256 = U256::MAX;

/// Fractional digits kept when a difficulty is used in integer arithmetic.
///
/// The retarget controller rounds adopted values to this many digits, so
/// scaling by `10^DIFFICULTY_DECIMALS` is exact for every difficulty the pool
/// assigns.
pub const DIFFICULTY_DECIMALS: u32 = 8;

const DIFFICULTY_SCALE: u64 = 100_000_000;

/// Per-miner share difficulty.
///
/// Unlike a network difficulty, pool difficulty is a floating-point value:
/// the retarget controller moves it in fractional steps. Higher difficulty
/// means a smaller target and fewer qualifying hashes:
/// ```text
/// target = Q / difficulty
/// difficulty = Q / target
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(f64);

impl Difficulty {
    pub const ONE: Self = Self(1.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Value used when scoring shares.
    ///
    /// Non-finite and non-positive difficulties are treated as 1.
    pub fn effective(self) -> f64 {
        if self.0.is_finite() && self.0 > 0.0 {
            self.0
        } else {
            1.0
        }
    }

    /// Effective difficulty as a fixed-point integer with
    /// [`DIFFICULTY_DECIMALS`] fractional digits, never zero.
    pub fn scaled(self) -> U512 {
        let product = (self.effective() * DIFFICULTY_SCALE as f64).round();
        // Past 2^512 every nonzero hash already fails, so saturating is exact.
        U512::try_from(product)
            .unwrap_or(U512::MAX)
            .max(U512::from(1u8))
    }

    /// Round to [`DIFFICULTY_DECIMALS`] fractional digits.
    pub fn rounded(self) -> Self {
        let scale = DIFFICULTY_SCALE as f64;
        Self((self.0 * scale).round() / scale)
    }

    /// Clamp into `[min, max]`.
    pub fn clamp(self, min: Difficulty, max: Difficulty) -> Self {
        Self(self.0.max(min.0).min(max.0))
    }

    /// Whether `hash <= base_target / difficulty`, evaluated without
    /// rounding as `hash * scaled <= base_target * 10^8`.
    ///
    /// Uses [`effective`](Self::effective), so fractional difficulties below
    /// 1 widen the target past `base_target`.
    pub fn is_met_by(self, hash: U256, base_target: U256) -> bool {
        let lhs = U512::from(hash).saturating_mul(self.scaled());
        let rhs = U512::from(base_target) * U512::from(DIFFICULTY_SCALE);
        lhs <= rhs
    }

    /// Target corresponding to this difficulty.
    pub fn to_target(self) -> U256 {
        difficulty_to_target(self.0)
    }

    /// Difficulty corresponding to a target.
    pub fn from_target(target: U256) -> Self {
        Self(target_to_difficulty(target))
    }
}

impl From<f64> for Difficulty {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<u64> for Difficulty {
    fn from(value: u64) -> Self {
        Self(value as f64)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;

        if value < 1.0 {
            let s = format!("{:.6}", value);
            let trimmed = s.trim_end_matches('0').trim_end_matches('.');
            return write!(f, "{}", trimmed);
        }

        let (scaled, suffix) = if value >= 1e12 {
            (value / 1e12, "T")
        } else if value >= 1e9 {
            (value / 1e9, "G")
        } else if value >= 1e6 {
            (value / 1e6, "M")
        } else if value >= 1e3 {
            (value / 1e3, "K")
        } else {
            (value, "")
        };

        if scaled >= 100.0 || scaled.fract() == 0.0 {
            write!(f, "{:.0}{}", scaled, suffix)
        } else if scaled >= 10.0 {
            write!(f, "{:.1}{}", scaled, suffix)
        } else {
            write!(f, "{:.2}{}", scaled, suffix)
        }
    }
}

/// `floor(Q / max(difficulty, 1))`.
///
/// Non-finite input is treated as 1. The division is carried out on the
/// fixed-point form of the difficulty, so the result is exact for values
/// with at most [`DIFFICULTY_DECIMALS`] fractional digits.
pub fn difficulty_to_target(difficulty: f64) -> U256 {
    let difficulty = if difficulty.is_finite() {
        difficulty.max(1.0)
    } else {
        1.0
    };
    let scaled = Difficulty(difficulty).scaled();

    let numerator = U512::from(Q) * U512::from(DIFFICULTY_SCALE);
    let quotient = numerator / scaled;
    // scaled >= DIFFICULTY_SCALE, so the quotient never exceeds Q.
    U256::saturating_from(quotient)
}

/// `Q / max(target, 1)` as a floating-point difficulty.
pub fn target_to_difficulty(target: U256) -> f64 {
    let target = target.max(U256::from(1u8));
    u256_to_f64(Q) / u256_to_f64(target)
}

/// Lossy conversion for display and ratio math.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}
