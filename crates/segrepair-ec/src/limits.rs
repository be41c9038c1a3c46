//! Helpers over limit slots.
//!
//! A slot vector always has one entry per piece number; `None` marks a
//! piece with no limit.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use segrepair_orders::AddressedOrderLimit;

use crate::error::EcError;

/// Number of slots holding a limit.
#[must_use]
pub fn non_nil_count(limits: &[Option<AddressedOrderLimit>]) -> usize {
    limits.iter().filter(|limit| limit.is_some()).count()
}

/// Whether every limit targets a different storage node.
#[must_use]
pub fn unique(limits: &[Option<AddressedOrderLimit>]) -> bool {
    let mut seen = HashSet::with_capacity(limits.len());
    limits
        .iter()
        .flatten()
        .all(|addressed| seen.insert(addressed.limit.storage_node_id))
}

/// Keep `sample_size` limits chosen at random, clearing the rest.
///
/// Kept limits stay at their piece number.
///
/// # Errors
///
/// Returns [`EcError::SampleTooLarge`] if fewer than `sample_size` limits
/// are present.
pub fn random_sample<R>(
    limits: &[Option<AddressedOrderLimit>],
    sample_size: usize,
    rng: &mut R,
) -> Result<Vec<Option<AddressedOrderLimit>>, EcError>
where
    R: Rng + ?Sized,
{
    let mut present: Vec<usize> = limits
        .iter()
        .enumerate()
        .filter_map(|(i, limit)| limit.as_ref().map(|_| i))
        .collect();
    if present.len() < sample_size {
        return Err(EcError::SampleTooLarge {
            requested: sample_size,
            available: present.len(),
        });
    }

    present.shuffle(rng);
    let mut sample = vec![None; limits.len()];
    for &i in &present[..sample_size] {
        sample[i] = limits[i].clone();
    }
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use segrepair_orders::{
        Node, NodeAddress, NodeId, OrderLimitIssuer, OrderLimitIssuerConfig, PieceId,
        SatelliteIdentity,
    };

    use super::*;

    fn node(byte: u8) -> Node {
        Node {
            id: NodeId::from_bytes([byte; 32]),
            address: NodeAddress::new(format!("10.0.0.{byte}:7777")),
        }
    }

    fn limits(nodes: &[Option<Node>]) -> Vec<Option<AddressedOrderLimit>> {
        let issuer = OrderLimitIssuer::new(
            Arc::new(SatelliteIdentity::generate()),
            OrderLimitIssuerConfig::default(),
        );
        let healthy: Vec<(u16, Node)> = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.clone().map(|n| (u16::try_from(i).unwrap(), n)))
            .collect();
        issuer
            .create_get_repair_limits(PieceId::random(), None, 256, nodes.len(), 0, &healthy)
            .unwrap()
            .0
    }

    #[test]
    fn counts_and_uniqueness() {
        let slots = limits(&[Some(node(1)), None, Some(node(2)), None]);
        assert_eq!(non_nil_count(&slots), 2);
        assert!(unique(&slots));

        let dup = limits(&[Some(node(1)), Some(node(3)), Some(node(1))]);
        assert!(!unique(&dup));
        assert!(unique(&[]));
    }

    #[test]
    fn sample_keeps_positions() {
        let slots = limits(&[Some(node(1)), None, Some(node(2)), Some(node(3)), Some(node(4))]);
        let mut rng = StdRng::seed_from_u64(7);
        let sample = random_sample(&slots, 2, &mut rng).unwrap();

        assert_eq!(sample.len(), slots.len());
        assert_eq!(non_nil_count(&sample), 2);
        assert!(sample[1].is_none());
        for (kept, original) in sample.iter().zip(&slots) {
            if let Some(kept) = kept {
                assert_eq!(Some(kept), original.as_ref());
            }
        }
    }

    #[test]
    fn sample_everything_or_nothing() {
        let slots = limits(&[Some(node(1)), Some(node(2)), None]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(random_sample(&slots, 2, &mut rng).unwrap(), slots);
        assert_eq!(non_nil_count(&random_sample(&slots, 0, &mut rng).unwrap()), 0);
    }

    #[test]
    fn sample_too_large() {
        let slots = limits(&[Some(node(1)), None]);
        let err = random_sample(&slots, 2, &mut rand::thread_rng()).unwrap_err();
        assert!(matches!(
            err,
            EcError::SampleTooLarge {
                requested: 2,
                available: 1
            }
        ));
    }
}
