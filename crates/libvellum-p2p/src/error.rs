use libvellum_core::{StoreError, VellumError};
use thiserror::Error;

/// Errors raised by the peer lifecycle and the sync engine
#[derive(Debug, Error)]
pub enum P2pError {
    #[error(transparent)]
    Core(#[from] VellumError),

    #[error("node is offline")]
    Offline,

    #[error("networking is disabled in the node config")]
    Disabled,

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("not connected to peer: {0}")]
    NotConnected(String),

    #[error("handshake with {peer} failed: {reason}")]
    HandshakeFailed { peer: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<StoreError> for P2pError {
    fn from(e: StoreError) -> Self {
        P2pError::Core(VellumError::Store(e))
    }
}

impl P2pError {
    /// Stable error code for structured output
    pub fn error_code(&self) -> &'static str {
        match self {
            P2pError::Core(e) => e.error_code(),
            P2pError::Offline => "offline",
            P2pError::Disabled => "disabled",
            P2pError::PeerUnreachable(_) => "peer_unreachable",
            P2pError::NotConnected(_) => "not_connected",
            P2pError::HandshakeFailed { .. } => "handshake_failed",
            P2pError::Cancelled => "cancelled",
            P2pError::Transport(_) => "transport_error",
        }
    }

    /// Whether the failure came from a missing snapshot in a local store
    pub fn is_not_found(&self) -> bool {
        matches!(self, P2pError::Core(e) if e.is_not_found())
    }
}
