//! The repairer handle.

use std::fmt;
use std::sync::Arc;

use segrepair_erasure::{ErasureCodec, ReedSolomonCodec};
use segrepair_orders::Signee;
use segrepair_piecestore::Dialer;

use crate::config::EcRepairerConfig;

/// Downloads and uploads erasure-coded pieces for segment repair.
///
/// Cloning is cheap; clones share the dialer, satellite and codec. Each
/// [`get`](Self::get) and [`repair`](Self::repair) call keeps its own state,
/// so calls may run concurrently.
#[derive(Clone)]
pub struct EcRepairer {
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) satellite: Arc<dyn Signee>,
    pub(crate) codec: Arc<dyn ErasureCodec>,
    pub(crate) config: EcRepairerConfig,
}

impl EcRepairer {
    /// Create a repairer.
    ///
    /// `satellite` is the only party whose order limit signatures are
    /// trusted when nodes echo limits back.
    #[must_use]
    pub fn new(
        dialer: Arc<dyn Dialer>,
        satellite: Arc<dyn Signee>,
        codec: Arc<dyn ErasureCodec>,
        config: EcRepairerConfig,
    ) -> Self {
        Self {
            dialer,
            satellite,
            codec,
            config,
        }
    }

    /// Create a repairer using the built-in Reed-Solomon codec.
    #[must_use]
    pub fn with_reed_solomon(
        dialer: Arc<dyn Dialer>,
        satellite: Arc<dyn Signee>,
        config: EcRepairerConfig,
    ) -> Self {
        let codec = Arc::new(ReedSolomonCodec::new(config.piece_stream_buffer));
        Self::new(dialer, satellite, codec, config)
    }

    #[must_use]
    pub const fn config(&self) -> &EcRepairerConfig {
        &self.config
    }
}

impl fmt::Debug for EcRepairer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcRepairer")
            .field("satellite", &self.satellite.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
