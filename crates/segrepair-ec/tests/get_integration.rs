//! End-to-end tests for repair downloads.
//!
//! Pieces are encoded with the real Reed-Solomon codec, limits and hashes
//! carry real signatures, and nodes are in-memory mocks with scripted
//! misbehaviour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use segrepair_ec::{EcError, EcRepairer, EcRepairerConfig, RemotePiece, SegmentDownload};
use segrepair_erasure::RedundancyScheme;
use segrepair_piecestore::NodeUrl;
use segrepair_testkit::{
    MockNetwork, NodeBehavior, StoredSegment, TestSatellite, init_test_tracing, segment_data,
};
use tokio::io::AsyncReadExt;

// ─── Helpers ───────────────────────────────────────────────────────────────

struct Setup {
    network: MockNetwork,
    satellite: TestSatellite,
    segment: StoredSegment,
}

async fn setup(data_len: usize) -> Setup {
    init_test_tracing();
    let network = MockNetwork::new();
    let satellite = TestSatellite::new();
    let scheme = RedundancyScheme::new(4, 5, 6, 8, 256).unwrap();
    let segment = StoredSegment::store(&network, &satellite, scheme, segment_data(data_len)).await;
    Setup {
        network,
        satellite,
        segment,
    }
}

fn repairer(setup: &Setup, config: EcRepairerConfig) -> EcRepairer {
    EcRepairer::with_reed_solomon(
        Arc::new(setup.network.clone()),
        setup.satellite.signee(),
        config,
    )
}

async fn get(setup: &Setup, pieces: &[usize]) -> Result<SegmentDownload, EcError> {
    get_with(setup, pieces, EcRepairerConfig::default(), &HashMap::new()).await
}

async fn get_with(
    setup: &Setup,
    pieces: &[usize],
    config: EcRepairerConfig,
    cached: &HashMap<segrepair_orders::NodeId, String>,
) -> Result<SegmentDownload, EcError> {
    let (limits, key) = setup.segment.get_limits(&setup.satellite, pieces);
    repairer(setup, config)
        .get(
            &limits,
            cached,
            &key,
            &setup.segment.scheme,
            setup.segment.data.len() as u64,
        )
        .await
}

async fn read_segment(download: SegmentDownload) -> Vec<u8> {
    let mut reader = download.reader;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    out
}

// ─── Reconstruction ────────────────────────────────────────────────────────

#[tokio::test]
async fn reconstructs_segment_from_healthy_pieces() {
    let setup = setup(4096).await;
    let download = get(&setup, &[0, 1, 2, 3, 4, 5, 6, 7]).await.unwrap();

    assert!(download.failed_pieces.is_empty());
    assert_eq!(download.report.successes.len(), 4);
    assert!(download.report.fails.is_empty());
    assert_eq!(read_segment(download).await, setup.segment.data);
}

#[tokio::test]
async fn reconstructs_from_any_required_subset() {
    let setup = setup(3000).await;
    for pieces in [[0, 1, 2, 3], [4, 5, 6, 7], [0, 2, 5, 7]] {
        let download = get(&setup, &pieces).await.unwrap();
        assert_eq!(read_segment(download).await, setup.segment.data);
    }
}

#[tokio::test]
async fn temp_file_and_memory_buffering_agree() {
    let setup = setup(10_000).await;
    for in_memory_repair in [false, true] {
        let config = EcRepairerConfig {
            in_memory_repair,
            ..EcRepairerConfig::default()
        };
        let download = get_with(&setup, &[1, 3, 5, 7], config, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(read_segment(download).await, setup.segment.data);
    }
}

#[tokio::test]
async fn empty_segment() {
    let setup = setup(0).await;
    let download = get(&setup, &[0, 1, 2, 3]).await.unwrap();
    assert!(read_segment(download).await.is_empty());
}

// ─── Failures ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn network_failure_is_not_a_failed_piece() {
    let setup = setup(4096).await;
    let offline = setup.segment.nodes[2].id;
    setup.network.set_behavior(&offline, NodeBehavior::Offline);

    let download = get(&setup, &[0, 1, 2, 3, 4]).await.unwrap();

    assert!(download.failed_pieces.is_empty());
    assert_eq!(download.report.offlines, vec![offline]);
    assert_eq!(download.report.successes.len(), 4);
    assert_eq!(read_segment(download).await, setup.segment.data);
}

#[tokio::test]
async fn tampered_piece_among_too_few_is_irreparable() {
    let setup = setup(4096).await;
    let tampered = setup.segment.nodes[1].id;
    let offline = setup.segment.nodes[4].id;
    setup.network.set_behavior(&tampered, NodeBehavior::TamperedPiece);
    setup.network.set_behavior(&offline, NodeBehavior::Offline);

    let err = get(&setup, &[0, 1, 2, 3, 4]).await.unwrap_err();
    let EcError::Irreparable(err) = err else {
        panic!("expected irreparable, got {err}");
    };

    assert_eq!(err.pieces_available, 3);
    assert_eq!(err.pieces_required, 4);
    assert_eq!(
        err.failed_pieces,
        vec![RemotePiece {
            piece_num: 1,
            node_id: tampered
        }]
    );
    assert_eq!(err.report.fails, vec![tampered]);
    assert_eq!(err.report.offlines, vec![offline]);
    assert_eq!(err.errors.len(), 2);
    let message = err.to_string();
    assert!(message.contains(&format!("node id: {tampered}")));
    assert!(message.contains("does not match calculated hash"));
}

#[tokio::test]
async fn tampered_piece_is_reported_even_on_success() {
    let setup = setup(4096).await;
    let tampered = setup.segment.nodes[0].id;
    setup.network.set_behavior(&tampered, NodeBehavior::TamperedPiece);

    let download = get(&setup, &[0, 1, 2, 3, 4, 5, 6, 7]).await.unwrap();

    assert_eq!(
        download.failed_pieces,
        vec![RemotePiece {
            piece_num: 0,
            node_id: tampered
        }]
    );
    assert!(!download.report.successes.contains(&tampered));
    assert_eq!(read_segment(download).await, setup.segment.data);
}

#[tokio::test]
async fn forged_order_limit_is_a_verification_failure() {
    let setup = setup(2048).await;
    let forger = setup.segment.nodes[3].id;
    setup.network.set_behavior(&forger, NodeBehavior::ForgedLimit);

    let err = get(&setup, &[0, 1, 2, 3]).await.unwrap_err();
    let EcError::Irreparable(err) = err else {
        panic!("expected irreparable, got {err}");
    };
    assert_eq!(err.report.fails, vec![forger]);
    assert_eq!(err.errors.len(), 1);
    assert!(err.errors[0].error.is_verification_failure());
    assert_eq!(
        err.failed_pieces,
        vec![RemotePiece {
            piece_num: 3,
            node_id: forger
        }]
    );
}

#[tokio::test]
async fn missing_proof_and_short_piece_are_not_verification_failures() {
    let setup = setup(4096).await;
    let no_hash = setup.segment.nodes[0].id;
    let short = setup.segment.nodes[1].id;
    setup.network.set_behavior(&no_hash, NodeBehavior::MissingHash);
    setup.network.set_behavior(&short, NodeBehavior::ShortPiece);

    let download = get(&setup, &[0, 1, 2, 3, 4, 5]).await.unwrap();

    assert!(download.failed_pieces.is_empty());
    assert_eq!(download.report.unknown.len(), 2);
    assert!(download.report.unknown.contains(&no_hash));
    assert!(download.report.unknown.contains(&short));
    assert_eq!(read_segment(download).await, setup.segment.data);
}

#[tokio::test]
async fn every_piece_failing_reports_attempted_nodes() {
    let setup = setup(1024).await;
    for node in &setup.segment.nodes {
        setup.network.set_behavior(&node.id, NodeBehavior::Offline);
    }

    let err = get(&setup, &[0, 1, 2, 3, 4, 5, 6, 7]).await.unwrap_err();
    let EcError::Irreparable(err) = err else {
        panic!("expected irreparable, got {err}");
    };
    assert_eq!(err.pieces_available, 0);
    assert!(err.failed_pieces.is_empty());
    // Attempts stop once four verified pieces are out of reach.
    assert!(err.report.offlines.len() >= 5);
    assert_eq!(err.errors.len(), err.report.offlines.len());
}

#[tokio::test(start_paused = true)]
async fn slow_download_times_out_per_piece() {
    let setup = setup(4096).await;
    let slow = setup.segment.nodes[0].id;
    setup
        .network
        .set_behavior(&slow, NodeBehavior::Slow(Duration::from_secs(600)));
    let config = EcRepairerConfig {
        download_timeout: Duration::from_secs(5),
        in_memory_repair: true,
        ..EcRepairerConfig::default()
    };

    let started = tokio::time::Instant::now();
    let download = get_with(&setup, &[0, 1, 2, 3, 4, 5, 6, 7], config, &HashMap::new())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(600));
    assert_eq!(download.report.pending_audits, vec![slow]);
    assert!(download.failed_pieces.is_empty());
    assert_eq!(read_segment(download).await, setup.segment.data);
}

#[tokio::test(start_paused = true)]
async fn at_most_required_downloads_run_at_once() {
    let setup = setup(4096).await;
    for node in &setup.segment.nodes {
        setup
            .network
            .set_behavior(&node.id, NodeBehavior::Slow(Duration::from_secs(10)));
    }
    let config = EcRepairerConfig {
        in_memory_repair: true,
        ..EcRepairerConfig::default()
    };

    let started = tokio::time::Instant::now();
    let download = get_with(&setup, &[0, 1, 2, 3, 4, 5, 6, 7], config, &HashMap::new())
        .await
        .unwrap();

    // One round of four slow downloads, and nothing started after it.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(20));
    assert_eq!(setup.network.peak_concurrent_downloads(), 4);
    assert_eq!(setup.network.total_downloads(), 4);
    assert_eq!(download.report.successes.len(), 4);
    assert_eq!(read_segment(download).await, setup.segment.data);
}

// ─── Preconditions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn too_few_limits_fail_without_dialing() {
    let setup = setup(1024).await;
    let err = get(&setup, &[0, 1, 2]).await.unwrap_err();

    assert!(matches!(
        err,
        EcError::NotEnoughLimits {
            got: 3,
            required: 4
        }
    ));
    assert_eq!(setup.network.dial_count(), 0);
}

#[tokio::test]
async fn limit_count_must_match_total() {
    let setup = setup(1024).await;
    let (mut limits, key) = setup.segment.get_limits(&setup.satellite, &[0, 1, 2, 3, 4]);
    limits.pop();

    let err = repairer(&setup, EcRepairerConfig::default())
        .get(&limits, &HashMap::new(), &key, &setup.segment.scheme, 1024)
        .await
        .unwrap_err();

    assert!(matches!(err, EcError::LimitCountMismatch { got: 7, total: 8 }));
    assert_eq!(setup.network.dial_count(), 0);
}

// ─── Addressing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cached_address_is_preferred_with_fallback() {
    let setup = setup(4096).await;
    let stale = &setup.segment.nodes[0];
    let fresh = &setup.segment.nodes[1];
    setup.network.set_address_offline("192.0.2.1:28967");

    let cached = HashMap::from([
        (stale.id, "192.0.2.1:28967".to_string()),
        (fresh.id, "198.51.100.9:28967".to_string()),
    ]);
    let download = get_with(&setup, &[0, 1, 2, 3], EcRepairerConfig::default(), &cached)
        .await
        .unwrap();
    assert_eq!(read_segment(download).await, setup.segment.data);

    let dialed = setup.network.dialed();
    let stale_dials: Vec<_> = dialed.iter().filter(|url| url.id == stale.id).collect();
    assert_eq!(
        stale_dials,
        vec![
            &NodeUrl::new(stale.id, "192.0.2.1:28967"),
            &NodeUrl::new(stale.id, stale.address.as_str()),
        ]
    );
    let fresh_dials: Vec<_> = dialed.iter().filter(|url| url.id == fresh.id).collect();
    assert_eq!(fresh_dials, vec![&NodeUrl::new(fresh.id, "198.51.100.9:28967")]);
}
