//! Redundancy scheme and piece-size arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::ErasureError;
use crate::padding::PADDING_LEN_SIZE;

/// Largest total piece count the codec supports (GF(2^8)).
pub const MAX_TOTAL_PIECES: usize = 256;

/// Erasure parameters of a segment.
///
/// Data is cut into stripes of `required * share_size` bytes; each stripe
/// becomes one share of `share_size` bytes in every one of the `total`
/// pieces. Any `required` pieces reconstruct the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScheme", into = "RawScheme")]
pub struct RedundancyScheme {
    required: usize,
    repair: usize,
    optimal: usize,
    total: usize,
    share_size: usize,
}

#[derive(Serialize, Deserialize)]
struct RawScheme {
    required: usize,
    repair: usize,
    optimal: usize,
    total: usize,
    share_size: usize,
}

impl TryFrom<RawScheme> for RedundancyScheme {
    type Error = ErasureError;

    fn try_from(raw: RawScheme) -> Result<Self, Self::Error> {
        Self::new(raw.required, raw.repair, raw.optimal, raw.total, raw.share_size)
    }
}

impl From<RedundancyScheme> for RawScheme {
    fn from(s: RedundancyScheme) -> Self {
        Self {
            required: s.required,
            repair: s.repair,
            optimal: s.optimal,
            total: s.total,
            share_size: s.share_size,
        }
    }
}

impl RedundancyScheme {
    /// Build a validated scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ErasureError::InvalidScheme`] unless
    /// `0 < required <= repair <= optimal <= total <= 256` and `share_size > 0`.
    pub fn new(
        required: usize,
        repair: usize,
        optimal: usize,
        total: usize,
        share_size: usize,
    ) -> Result<Self, ErasureError> {
        if required == 0 {
            return Err(ErasureError::InvalidScheme("required count must be positive".into()));
        }
        if !(required <= repair && repair <= optimal && optimal <= total) {
            return Err(ErasureError::InvalidScheme(format!(
                "thresholds out of order: required {required}, repair {repair}, optimal {optimal}, total {total}"
            )));
        }
        if total > MAX_TOTAL_PIECES {
            return Err(ErasureError::InvalidScheme(format!(
                "total {total} exceeds {MAX_TOTAL_PIECES}"
            )));
        }
        if share_size == 0 {
            return Err(ErasureError::InvalidScheme("share size must be positive".into()));
        }
        Ok(Self {
            required,
            repair,
            optimal,
            total,
            share_size,
        })
    }

    /// Pieces needed to reconstruct (k).
    #[must_use]
    pub const fn required_count(&self) -> usize {
        self.required
    }

    /// Healthy-piece count at or below which a segment needs repair.
    #[must_use]
    pub const fn repair_threshold(&self) -> usize {
        self.repair
    }

    /// Piece count uploads aim for.
    #[must_use]
    pub const fn optimal_threshold(&self) -> usize {
        self.optimal
    }

    /// Pieces produced by encoding (n).
    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn share_size(&self) -> usize {
        self.share_size
    }

    /// Bytes of data per stripe (`required * share_size`).
    #[must_use]
    pub const fn stripe_size(&self) -> usize {
        self.required * self.share_size
    }

    /// Number of stripes needed for `data_size` bytes plus padding.
    #[must_use]
    pub fn stripe_count(&self, data_size: u64) -> u64 {
        (data_size + PADDING_LEN_SIZE as u64).div_ceil(self.stripe_size() as u64)
    }

    /// Size of each piece for a segment of `data_size` bytes.
    #[must_use]
    pub fn piece_size(&self, data_size: u64) -> u64 {
        self.stripe_count(data_size) * self.share_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_ordering() {
        assert!(RedundancyScheme::new(4, 6, 8, 10, 256).is_ok());
        assert!(RedundancyScheme::new(4, 4, 4, 4, 1).is_ok());
        assert!(RedundancyScheme::new(0, 6, 8, 10, 256).is_err());
        assert!(RedundancyScheme::new(4, 3, 8, 10, 256).is_err());
        assert!(RedundancyScheme::new(4, 6, 11, 10, 256).is_err());
        assert!(RedundancyScheme::new(4, 6, 8, 257, 256).is_err());
        assert!(RedundancyScheme::new(4, 6, 8, 10, 0).is_err());
    }

    #[test]
    fn piece_size_includes_padding() {
        let s = RedundancyScheme::new(4, 6, 8, 10, 16).unwrap();
        assert_eq!(s.stripe_size(), 64);

        // 60 bytes + 4 byte length fit exactly one stripe.
        assert_eq!(s.piece_size(60), 16);
        // One more byte spills into a second stripe.
        assert_eq!(s.piece_size(61), 32);
        // An exact multiple still needs room for the length.
        assert_eq!(s.piece_size(64), 32);
        assert_eq!(s.piece_size(0), 16);
    }

    #[test]
    fn serde_validates() {
        let s = RedundancyScheme::new(2, 3, 4, 5, 32).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(serde_json::from_str::<RedundancyScheme>(&json).unwrap(), s);

        let bad = r#"{"required":5,"repair":3,"optimal":4,"total":5,"share_size":32}"#;
        assert!(serde_json::from_str::<RedundancyScheme>(bad).is_err());
    }
}
