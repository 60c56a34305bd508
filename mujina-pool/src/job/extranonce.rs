//! Extranonce1 allocation.
//!
//! The 8-byte nonce space of every job is split in two. The pool assigns the
//! leading `extranonce1` bytes once per connection, and the miner rolls the
//! trailing `extranonce2` bytes. Two connections therefore never search the
//! same space as long as their extranonce1 values differ, which the
//! allocator guarantees for the lifetime of the process.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Bytes substituted for the extranonces when the coinbase is first
/// serialized; its length is the whole nonce space.
pub const EXTRANONCE_PLACEHOLDER: [u8; 8] = [0xf0, 0x00, 0x00, 0x0f, 0xf1, 0x11, 0x11, 0x1f];

/// Total nonce bytes split between extranonce1 and extranonce2.
pub const NONCE_SIZE: usize = EXTRANONCE_PLACEHOLDER.len();

/// Bits of the allocation counter below the instance id.
const INSTANCE_SHIFT: u32 = 27;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtranonceError {
    #[error("Invalid extranonce1 size: {0} (must be 1-4 bytes)")]
    InvalidSize(u8),
}

/// Pool-assigned extranonce1 for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extranonce1 {
    value: u32,
    size: u8,
}

impl Extranonce1 {
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Big-endian bytes, `size` long.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.value.to_be_bytes()[4 - self.size as usize..].to_vec()
    }
}

impl fmt::Display for Extranonce1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Process-wide extranonce1 allocator.
///
/// The counter starts at `instance_id << 27` and is incremented atomically on
/// every allocation; each extranonce1 is the low `size` bytes of the
/// big-endian counter value. State is not persisted, so values may repeat
/// across restarts.
#[derive(Debug)]
pub struct ExtranonceAllocator {
    counter: AtomicU32,
    size: u8,
}

impl ExtranonceAllocator {
    pub fn new(instance_id: u32, size: u8) -> Result<Self, ExtranonceError> {
        if !(1..=4).contains(&size) {
            return Err(ExtranonceError::InvalidSize(size));
        }

        Ok(Self {
            counter: AtomicU32::new(instance_id.wrapping_shl(INSTANCE_SHIFT)),
            size,
        })
    }

    /// Allocator with an instance id drawn from OS randomness.
    pub fn with_random_instance(size: u8) -> Result<Self, ExtranonceError> {
        Self::new(random_instance_id(), size)
    }

    /// Allocate the next extranonce1.
    pub fn next(&self) -> Extranonce1 {
        let value = self.counter.fetch_add(1, Ordering::Relaxed);
        let mask = match self.size {
            4 => u32::MAX,
            size => (1u32 << (size * 8)) - 1,
        };
        Extranonce1 {
            value: value & mask,
            size: self.size,
        }
    }

    /// Extranonce1 size in bytes.
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Extranonce2 size in bytes: the rest of the nonce space.
    pub fn extranonce2_size(&self) -> usize {
        NONCE_SIZE - self.size as usize
    }
}

// RandomState is seeded from the OS, so separate processes started at the
// same instant still get different ids.
fn random_instance_id() -> u32 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(0);
    hasher.finish() as u32
}
