// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for dispatch and transport

use thiserror::Error;

use crate::envelope::PeerRef;
use crate::status::StatusKind;

/// A transport call that did not complete
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommunicationError {
    /// No endpoint is registered for the peer
    #[error("peer {0} is unreachable")]
    Unreachable(PeerRef),

    /// The peer's endpoint exists but no longer accepts envelopes
    #[error("connection to {0} is closed")]
    Closed(PeerRef),
}

/// Errors raised while routing or handling an envelope
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Sending a reply or request failed
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    /// A payload could not be encoded
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_cbor::Error,
    },

    /// A payload body could not be decoded into its message type
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_cbor::Error,
    },

    /// A handler received an envelope of a kind it does not interpret
    #[error("expected a {expected} payload, got {found}")]
    TagMismatch { expected: String, found: String },

    /// The handler ran but its requested effect did not happen
    #[error("{0}")]
    Processing(String),
}

impl DispatchError {
    /// Status kind reported back to the sender of the failing envelope
    pub fn status_kind(&self) -> StatusKind {
        match self {
            DispatchError::Communication(_) => StatusKind::Error,
            DispatchError::Encode { .. } => StatusKind::Error,
            DispatchError::Decode { .. }
            | DispatchError::TagMismatch { .. }
            | DispatchError::Processing(_) => StatusKind::Failure,
        }
    }
}
