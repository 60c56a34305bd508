//! Height-dependent dataset size and the constant mixing table.

use std::sync::LazyLock;

/// Dataset size before the first increase.
pub const N_BASE: u32 = 1 << 26;

/// First height at which the dataset size grows.
pub const INCREASE_START: u32 = 600 * 1024;

/// Blocks between successive 5% increases.
pub const INCREASE_PERIOD: u32 = 50 * 1024;

/// Height from which the dataset size is fixed at [`N_MAX`].
pub const N_INCREASE_HEIGHT_MAX: u32 = 4_198_400;

/// Dataset size at and above [`N_INCREASE_HEIGHT_MAX`].
pub const N_MAX: u32 = 2_147_387_550;

/// Number of 8-byte entries in the mixing table.
const MIXING_ENTRIES: u64 = 1024;

/// Dataset size `N(height)`.
///
/// Compounds +5% every [`INCREASE_PERIOD`] blocks from [`INCREASE_START`],
/// always starting again from [`N_BASE`]. Each step divides before it
/// multiplies, and that truncation is part of the definition.
pub fn dataset_size(height: u32) -> u32 {
    let height = height.min(N_INCREASE_HEIGHT_MAX);
    if height < INCREASE_START {
        return N_BASE;
    }
    if height >= N_INCREASE_HEIGHT_MAX {
        return N_MAX;
    }

    let iterations = (height - INCREASE_START) / INCREASE_PERIOD + 1;
    let mut n = N_BASE as u64;
    for _ in 0..iterations {
        n = n / 100 * 105;
    }
    // Below the ceiling height the compounded value stays under N_MAX.
    n as u32
}

/// Concatenation of the 8-byte big-endian integers `0..1024`.
pub static MIXING_TABLE: LazyLock<Vec<u8>> = LazyLock::new(|| {
    (0..MIXING_ENTRIES)
        .flat_map(|i| i.to_be_bytes())
        .collect()
});
