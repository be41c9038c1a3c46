//! Tracing configuration for test output.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Uses `RUST_LOG` if set, otherwise shows repairer debug logs.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn repairs() {
///     segrepair_testkit::init_test_tracing();
///     // ...
/// }
/// ```
pub fn init_test_tracing() {
    init_test_tracing_with_filter(
        &std::env::var("RUST_LOG").unwrap_or_else(|_| "info,segrepair_ec=debug".to_string()),
    );
}

/// Initialize tracing with a specific filter.
pub fn init_test_tracing_with_filter(filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::new(filter);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_ansi(true)
                    .compact(),
            )
            .try_init();
    });
}
