//! Transport error types.

use thiserror::Error;

/// Errors surfaced by a storage node connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the node.
    #[error("dial {address}: {reason}")]
    Dial {
        /// Address that was dialed.
        address: String,
        /// Why the dial failed.
        reason: String,
    },

    /// Stream broke mid-transfer.
    #[error("transfer i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The node answered with something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The node refused the request (expired limit, unknown piece, ...).
    #[error("node rejected request: {0}")]
    Rejected(String),

    /// The transport gave up waiting.
    #[error("transport timed out")]
    Timeout,
}

impl TransportError {
    /// Whether the node could not be reached at all.
    #[must_use]
    pub const fn is_dial(&self) -> bool {
        matches!(self, Self::Dial { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dial_errors_are_dial_failures() {
        let dial = TransportError::Dial {
            address: "10.0.0.1:28967".into(),
            reason: "connection refused".into(),
        };
        assert!(dial.is_dial());
        assert_eq!(dial.to_string(), "dial 10.0.0.1:28967: connection refused");
        assert!(!TransportError::Timeout.is_dial());
        assert!(!TransportError::from(std::io::Error::other("reset")).is_dial());
    }
}
