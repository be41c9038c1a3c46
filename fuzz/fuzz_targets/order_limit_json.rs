//! Order limit decoding fuzz target.
//!
//! Decodes arbitrary JSON as an order limit and checks it against a fixed
//! satellite. Decoding may fail; verification must never succeed.

#![no_main]

use libfuzzer_sys::fuzz_target;
use segrepair_crypto::Ed25519SigningKey;
use segrepair_ec::verify_order_limit_signature;
use segrepair_orders::{OrderLimit, SatelliteIdentity};

fuzz_target!(|data: &[u8]| {
    let Ok(limit) = serde_json::from_slice::<OrderLimit>(data) else {
        return;
    };
    let satellite = SatelliteIdentity::new(Ed25519SigningKey::from_bytes(&[7; 32]));
    assert!(verify_order_limit_signature(&satellite, &limit).is_err());
});
