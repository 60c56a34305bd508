//! Chain data consumed from the block template builder.

use ruint::aliases::U256;

/// Snapshot of chain data a job is built from.
///
/// Produced upstream from the node's block template; only the fields the
/// share-verification path consumes are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainData {
    /// Height of the block being mined.
    pub height: u32,

    /// Identity of the block being mined (e.g. the node's header message).
    /// A change means new work, not a refresh.
    pub msg: String,

    /// Block reward available to the coinbase.
    pub coinbase_value: u64,

    /// Target a share must meet to be a full block, when the node supplies
    /// one.
    pub network_target: Option<U256>,

    /// Target for difficulty-1 shares; a share at difficulty `d` must meet
    /// `base_target / d`.
    pub base_target: U256,

    pub coinbase: CoinbaseTemplate,
}

/// Coinbase transaction split around the extranonce.
///
/// Each distinct (extranonce1, extranonce2) pair yields a distinct coinbase
/// and thus distinct proof-of-work input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseTemplate {
    /// Coinbase bytes before the extranonces.
    pub coinbase1: Vec<u8>,

    /// Coinbase bytes after the extranonces.
    pub coinbase2: Vec<u8>,
}

impl CoinbaseTemplate {
    pub fn new(coinbase1: Vec<u8>, coinbase2: Vec<u8>) -> Self {
        Self {
            coinbase1,
            coinbase2,
        }
    }

    /// Split a coinbase serialized with `placeholder` in the extranonce slot.
    ///
    /// Returns `None` if the placeholder does not occur.
    pub fn from_placeholder(coinbase: &[u8], placeholder: &[u8]) -> Option<Self> {
        if placeholder.is_empty() || placeholder.len() > coinbase.len() {
            return None;
        }
        let at = coinbase
            .windows(placeholder.len())
            .position(|window| window == placeholder)?;
        Some(Self {
            coinbase1: coinbase[..at].to_vec(),
            coinbase2: coinbase[at + placeholder.len()..].to_vec(),
        })
    }

    /// `coinbase1 || extranonce1 || extranonce2 || coinbase2`.
    pub fn serialize(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut tx = Vec::with_capacity(
            self.coinbase1.len() + extranonce1.len() + extranonce2.len() + self.coinbase2.len(),
        );
        tx.extend_from_slice(&self.coinbase1);
        tx.extend_from_slice(extranonce1);
        tx.extend_from_slice(extranonce2);
        tx.extend_from_slice(&self.coinbase2);
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::EXTRANONCE_PLACEHOLDER;

    #[test]
    fn serialize_places_extranonces_between_parts() {
        let template = CoinbaseTemplate::new(vec![0x01, 0x02], vec![0xfe]);
        assert_eq!(
            template.serialize(&[0xaa, 0xbb], &[0xcc]),
            vec![0x01, 0x02, 0xaa, 0xbb, 0xcc, 0xfe]
        );
    }

    #[test]
    fn from_placeholder_splits_around_slot() {
        let mut tx = vec![0x01, 0x00, 0x00, 0x00];
        tx.extend_from_slice(&EXTRANONCE_PLACEHOLDER);
        tx.extend_from_slice(&[0xde, 0xad]);

        let template = CoinbaseTemplate::from_placeholder(&tx, &EXTRANONCE_PLACEHOLDER).unwrap();
        assert_eq!(template.coinbase1, vec![0x01, 0x00, 0x00, 0x00]);
        assert_eq!(template.coinbase2, vec![0xde, 0xad]);

        // Re-serializing with the placeholder recovers the original.
        assert_eq!(
            template.serialize(&EXTRANONCE_PLACEHOLDER[..4], &EXTRANONCE_PLACEHOLDER[4..]),
            tx
        );
    }

    #[test]
    fn from_placeholder_requires_slot() {
        assert!(CoinbaseTemplate::from_placeholder(&[0x01, 0x02], &EXTRANONCE_PLACEHOLDER).is_none());
        assert!(CoinbaseTemplate::from_placeholder(&[0u8; 16], &EXTRANONCE_PLACEHOLDER).is_none());
    }
}
