//! Histograms recorded by repair uploads.
//!
//! The recorder is process-global, so everything runs in one test.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use segrepair_ec::{EcError, EcRepairer, EcRepairerConfig};
use segrepair_erasure::RedundancyScheme;
use segrepair_testkit::{
    MockNetwork, NodeBehavior, StoredSegment, TestSatellite, init_test_tracing, segment_data,
};
use segrepair_telemetry::metrics::{
    REPAIR_SEGMENT_PIECES_CANCELED, REPAIR_SEGMENT_PIECES_FAILED,
    REPAIR_SEGMENT_PIECES_SUCCESSFUL, REPAIR_SEGMENT_PIECES_TOTAL,
};

// ─── Recorder ──────────────────────────────────────────────────────────────

type Recorded = Arc<Mutex<Vec<(String, f64)>>>;

struct RecordedHistogram {
    name: String,
    recorded: Recorded,
}

impl HistogramFn for RecordedHistogram {
    fn record(&self, value: f64) {
        self.recorded.lock().push((self.name.clone(), value));
    }
}

#[derive(Clone, Default)]
struct TestRecorder {
    histograms: Recorded,
}

impl TestRecorder {
    fn install() -> &'static Self {
        static INSTANCE: OnceLock<TestRecorder> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let recorder = Self::default();
            metrics::set_global_recorder(recorder.clone())
                .unwrap_or_else(|_| panic!("metrics recorder already installed"));
            recorder
        })
    }

    fn take(&self) -> Vec<(String, f64)> {
        std::mem::take(&mut *self.histograms.lock())
    }
}

impl Recorder for TestRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(RecordedHistogram {
            name: key.name().to_string(),
            recorded: Arc::clone(&self.histograms),
        }))
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn segment_histograms_only_follow_successful_repairs() {
    init_test_tracing();
    let recorder = TestRecorder::install();

    let network = MockNetwork::new();
    let satellite = TestSatellite::new();
    let scheme = RedundancyScheme::new(4, 5, 6, 8, 256).unwrap();
    let segment = StoredSegment::store(&network, &satellite, scheme, segment_data(5000)).await;
    let repairer = EcRepairer::with_reed_solomon(
        Arc::new(network.clone()),
        satellite.signee(),
        EcRepairerConfig::default(),
    );
    let repair = |behavior: NodeBehavior| {
        let targets: Vec<_> = (0..8).map(|_| Some(network.add_node(behavior))).collect();
        let (limits, key) = segment.put_limits(&satellite, &targets);
        let repairer = repairer.clone();
        let scheme = segment.scheme;
        let data = segment.data.clone();
        async move {
            repairer
                .repair(
                    &limits,
                    &key,
                    &scheme,
                    Box::new(Cursor::new(data)),
                    Duration::from_secs(3600),
                    8,
                )
                .await
        }
    };
    recorder.take();

    let err = repair(NodeBehavior::RejectUpload).await.unwrap_err();
    assert!(matches!(err, EcError::AllUploadsFailed { .. }));
    assert!(recorder.take().is_empty());

    repair(NodeBehavior::Honest).await.unwrap();
    let mut recorded = recorder.take();
    recorded.sort_by(|a, b| a.0.cmp(&b.0));
    let mut expected = vec![
        (REPAIR_SEGMENT_PIECES_TOTAL.to_string(), 8.0),
        (REPAIR_SEGMENT_PIECES_SUCCESSFUL.to_string(), 8.0),
        (REPAIR_SEGMENT_PIECES_FAILED.to_string(), 0.0),
        (REPAIR_SEGMENT_PIECES_CANCELED.to_string(), 0.0),
    ];
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(recorded, expected);
}
