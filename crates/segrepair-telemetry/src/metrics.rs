//! Repair metrics.
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Bytes of verified piece data downloaded for repair.
pub const REPAIR_BYTES_DOWNLOADED: &str = "repair_bytes_downloaded";
/// Repair downloads that could not collect enough pieces.
pub const DOWNLOAD_FAILED_NOT_ENOUGH_PIECES: &str = "download_failed_not_enough_pieces_repair";
/// Piece slots (nil or not), per repaired segment.
pub const REPAIR_SEGMENT_PIECES_TOTAL: &str = "repair_segment_pieces_total";
/// Uploads that returned a piece hash, per repaired segment.
pub const REPAIR_SEGMENT_PIECES_SUCCESSFUL: &str = "repair_segment_pieces_successful";
/// Uploads that failed at the node, per repaired segment.
pub const REPAIR_SEGMENT_PIECES_FAILED: &str = "repair_segment_pieces_failed";
/// Uploads cut off by threshold or deadline, per repaired segment.
pub const REPAIR_SEGMENT_PIECES_CANCELED: &str = "repair_segment_pieces_canceled";

static METRICS_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Describe the repair metrics. Later calls do nothing.
pub fn init_metrics() {
    if METRICS_INITIALIZED.set(()).is_err() {
        return;
    }

    describe_counter!(
        REPAIR_BYTES_DOWNLOADED,
        metrics::Unit::Bytes,
        "Bytes of verified piece data downloaded for repair"
    );
    describe_counter!(
        DOWNLOAD_FAILED_NOT_ENOUGH_PIECES,
        "Repair downloads that ended with fewer than the required pieces"
    );
    describe_histogram!(
        REPAIR_SEGMENT_PIECES_TOTAL,
        "Piece slots per repaired segment"
    );
    describe_histogram!(
        REPAIR_SEGMENT_PIECES_SUCCESSFUL,
        "Successful piece uploads, per repaired segment"
    );
    describe_histogram!(
        REPAIR_SEGMENT_PIECES_FAILED,
        "Failed piece uploads, per repaired segment"
    );
    describe_histogram!(
        REPAIR_SEGMENT_PIECES_CANCELED,
        "Piece uploads cut off by threshold or deadline, per repaired segment"
    );
}

/// Increment a counter by 1.
pub fn increment_counter(name: &'static str, labels: &[(&'static str, &str)]) {
    increment_counter_by(name, 1, labels);
}

/// Increment a counter by a specific amount.
pub fn increment_counter_by(name: &'static str, value: u64, labels: &[(&'static str, &str)]) {
    let labels: Vec<(&'static str, String)> = labels
        .iter()
        .map(|(k, v)| (*k, (*v).to_string()))
        .collect();
    counter!(name, &labels).increment(value);
}

/// Record a histogram value.
pub fn record_histogram(name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
    let labels: Vec<(&'static str, String)> = labels
        .iter()
        .map(|(k, v)| (*k, (*v).to_string()))
        .collect();
    histogram!(name, &labels).record(value);
}

/// Per-segment upload tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentPieceCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub canceled: usize,
}

/// Record the outcome of one segment's repair uploads.
#[allow(clippy::cast_precision_loss)]
pub fn record_segment_pieces(counts: SegmentPieceCounts) {
    record_histogram(REPAIR_SEGMENT_PIECES_TOTAL, counts.total as f64, &[]);
    record_histogram(REPAIR_SEGMENT_PIECES_SUCCESSFUL, counts.successful as f64, &[]);
    record_histogram(REPAIR_SEGMENT_PIECES_FAILED, counts.failed as f64, &[]);
    record_histogram(REPAIR_SEGMENT_PIECES_CANCELED, counts.canceled as f64, &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        increment_counter(DOWNLOAD_FAILED_NOT_ENOUGH_PIECES, &[]);
        increment_counter_by(REPAIR_BYTES_DOWNLOADED, 4096, &[("action", "get_repair")]);
        record_segment_pieces(SegmentPieceCounts {
            total: 8,
            successful: 6,
            failed: 1,
            canceled: 1,
        });
    }
}
