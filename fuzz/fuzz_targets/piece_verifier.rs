//! Piece verifier fuzz target.
//!
//! Feeds node-controlled bytes (piece hash, signature, piece content) into
//! the verifier. It must never panic and must never accept a hash the
//! uplink did not sign.

#![no_main]

use std::sync::OnceLock;

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use segrepair_crypto::{Ed25519Signature, Ed25519SigningKey, hash_piece};
use segrepair_ec::verify_piece_hash;
use segrepair_orders::{
    NodeId, OrderLimit, PieceAction, PieceHash, PieceId, PiecePrivateKey, SatelliteIdentity,
    SerialNumber, Signer, sign_order_limit,
};

struct Fixture {
    limit: OrderLimit,
}

fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let satellite = SatelliteIdentity::new(Ed25519SigningKey::from_bytes(&[7; 32]));
        let uplink = PiecePrivateKey::from_signing_key(Ed25519SigningKey::from_bytes(&[9; 32]));
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let limit = sign_order_limit(
            &satellite,
            OrderLimit {
                serial_number: SerialNumber::from_bytes([1; 16]),
                satellite_id: Signer::id(&satellite),
                uplink_public_key: uplink.public_key(),
                storage_node_id: NodeId::from_bytes([2; 32]),
                piece_id: PieceId::from_bytes([3; 32]),
                action: PieceAction::GetRepair,
                limit: 1 << 20,
                piece_expiration: None,
                order_creation: created,
                order_expiration: created + chrono::Duration::hours(48),
                satellite_signature: None,
            },
        )
        .unwrap();
        Fixture { limit }
    })
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 64 + 32 + 1 {
        return;
    }
    let fixture = fixture();
    let (signature, rest) = data.split_at(64);
    let (claimed, content) = rest.split_at(32);

    let piece_id = if content[0] & 1 == 0 {
        fixture.limit.piece_id
    } else {
        PieceId::from_bytes(claimed.try_into().unwrap())
    };
    let hash = PieceHash {
        piece_id,
        hash: claimed.to_vec(),
        piece_size: content.len() as u64,
        timestamp: fixture.limit.order_creation,
        signature: Ed25519Signature::try_from_slice(signature).ok(),
    };

    let calculated = hash_piece(content);
    if verify_piece_hash(&fixture.limit, &hash, &calculated).is_ok() {
        panic!("accepted a piece hash the uplink never signed");
    }
    let _ = verify_piece_hash(&fixture.limit, &hash, claimed);
});
