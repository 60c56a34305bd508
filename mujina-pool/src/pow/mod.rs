//! Proof-of-work evaluation for submitted shares.
//!
//! A share is scored by hashing its serialized coinbase into a seed, deriving
//! 32 dataset indices from that seed, and summing one 31-byte element per
//! index:
//!
//! ```text
//! i       = BE32(H(C)[24..32] mod N(h))
//! e       = H(i || BE32(h) || M)[1..32]
//! J       = index_gen(e || C, h)                 32 indices
//! f       = sum over j in J of H(BE32(j) || BE32(h) || M)[1..32]
//! fh      = H(BE256(f))
//! ```
//!
//! `H` is BLAKE2b-256 and `M` the constant [`MIXING_TABLE`]. `fh` is what the
//! job manager compares against the network and share targets. All of this
//! is integer arithmetic; no floating point is involved.

mod dataset;

use blake2::{Blake2b, Digest, digest::consts::U32};
use ruint::aliases::U256;

pub use dataset::{
    INCREASE_PERIOD, INCREASE_START, MIXING_TABLE, N_BASE, N_INCREASE_HEIGHT_MAX, N_MAX,
    dataset_size,
};

/// Number of dataset elements summed per evaluation.
pub const INDEX_COUNT: usize = 32;

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b with a 32-byte output.
pub fn digest(data: &[u8]) -> [u8; 32] {
    digest_parts(&[data])
}

/// [`digest`] of the concatenation of `parts`, without building it.
pub fn digest_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derive [`INDEX_COUNT`] dataset indices from a seed.
///
/// The seed digest is doubled to 64 bytes and read as 32 overlapping
/// big-endian `u32` windows at offsets `0..32`, each reduced modulo
/// `N(height)`.
pub fn index_gen(seed: &[u8], height: u32) -> [u32; INDEX_COUNT] {
    let hash = digest(seed);
    let mut extended = [0u8; 64];
    extended[..32].copy_from_slice(&hash);
    extended[32..].copy_from_slice(&hash);

    let n = dataset_size(height);
    std::array::from_fn(|offset| {
        let window = [
            extended[offset],
            extended[offset + 1],
            extended[offset + 2],
            extended[offset + 3],
        ];
        u32::from_be_bytes(window) % n
    })
}

/// Result of scoring one serialized coinbase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowOutcome {
    /// Sum of the selected dataset elements. Encoded as 32 big-endian bytes
    /// this is the candidate block hash.
    pub f: U256,

    /// Digest of `f`, compared against targets.
    pub fh: U256,
}

impl PowOutcome {
    /// `f` as 32 big-endian bytes.
    pub fn block_hash(&self) -> [u8; 32] {
        self.f.to_be_bytes::<32>()
    }
}

/// Dataset element for `index`: the last 31 bytes of
/// `H(BE32(index) || BE32(height) || M)`.
fn element(index: u32, height_bytes: &[u8; 4]) -> U256 {
    let hash = digest_parts(&[&index.to_be_bytes(), height_bytes, MIXING_TABLE.as_slice()]);
    U256::from_be_slice(&hash[1..])
}

/// Score a serialized coinbase at the given height.
pub fn evaluate(coinbase: &[u8], height: u32) -> PowOutcome {
    let n = dataset_size(height);
    let height_bytes = height.to_be_bytes();

    let coinbase_hash = digest(coinbase);
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&coinbase_hash[24..32]);
    // n fits in u32, so the remainder does too.
    let i = (u64::from_be_bytes(tail) % n as u64) as u32;

    let e = digest_parts(&[&i.to_be_bytes(), &height_bytes, MIXING_TABLE.as_slice()]);

    let mut seed = Vec::with_capacity(31 + coinbase.len());
    seed.extend_from_slice(&e[1..]);
    seed.extend_from_slice(coinbase);
    let indices = index_gen(&seed, height);

    // Each element is below 2^248, so 32 of them sum below 2^253.
    let f = indices
        .iter()
        .fold(U256::ZERO, |sum, &index| sum + element(index, &height_bytes));

    let fh = U256::from_be_bytes(digest(&f.to_be_bytes::<32>()));

    PowOutcome { f, fh }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u256_hex(s: &str) -> U256 {
        U256::from_str_radix(s, 16).unwrap()
    }

    #[test]
    fn digest_is_blake2b_256() {
        assert_eq!(
            hex::encode(digest(b"abc")),
            "bddd813c634239723171ef3fee98579b94964e3bb1cb3e427262c8c068d52319"
        );
        assert_eq!(
            hex::encode(digest(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn digest_parts_matches_concatenation() {
        assert_eq!(digest_parts(&[&b"a"[..], &b""[..], &b"bc"[..]]), digest(b"abc"));
    }

    #[test]
    fn index_gen_known_answer() {
        let expected = [
            14173035, 4418488, 57391171, 62407629, 4443404, 63769616, 17567970, 1106637,
            14863814, 47040194, 29803073, 46285059, 37815217, 17019331, 61981683, 29619080,
            66291761, 59257119, 3219357, 18849167, 60657420, 26152071, 51152716, 8866987,
            55356354, 11256440, 63076503, 41457425, 9900412, 51477508, 24904920, 317507,
        ];
        assert_eq!(index_gen(b"seed", 500_000), expected);
    }

    #[test]
    fn index_gen_stays_in_range() {
        for height in [0, 614_400, 1_000_000, 4_198_400] {
            let n = dataset_size(height);
            let indices = index_gen(b"range check", height);
            assert_eq!(indices.len(), INDEX_COUNT);
            assert!(indices.iter().all(|&idx| idx < n));
            assert_eq!(indices, index_gen(b"range check", height));
        }
    }

    #[test]
    fn evaluate_known_answer_after_activation() {
        let coinbase = hex::decode("0100000000000001aabbccdd00000000").unwrap();
        let outcome = evaluate(&coinbase, 700_000);
        assert_eq!(
            outcome.f,
            u256_hex("10359b5afde9f2a8daa3c220fa9357972ddca99bcb1f8df94cd900ac8bcdf84e")
        );
        assert_eq!(
            outcome.fh,
            u256_hex("48f3c32f674afe7015e8fffbbc0cc20f30a4a1de66ae84ad06cd14b662b1017b")
        );
    }

    #[test]
    fn evaluate_known_answer_before_activation() {
        let coinbase = hex::decode("0100000000000001aabbccdd00000000").unwrap();
        let outcome = evaluate(&coinbase, 100);
        assert_eq!(
            outcome.f,
            u256_hex("10edeeb0d97350ffe3729c0499a1b34e28cd6300322cd8be3e978005b73da300")
        );
        assert_eq!(
            outcome.fh,
            u256_hex("1175daf25cbf3f11981cef42056b65988de7e73dc52339658d31d0652f0f389d")
        );
    }

    #[test]
    fn fh_is_digest_of_block_hash() {
        let outcome = evaluate(b"any coinbase", 1_000_000);
        assert_eq!(
            outcome.fh,
            U256::from_be_bytes(digest(&outcome.block_hash()))
        );
    }

    #[test]
    fn sum_does_not_wrap() {
        let outcome = evaluate(b"headroom", 2_500_000);
        assert!(outcome.f < U256::from(32u8) << 248usize);
    }
}
