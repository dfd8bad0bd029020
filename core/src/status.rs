// SPDX-License-Identifier: MIT OR Apache-2.0

//! Informational status messages correlated to a causing envelope
//!
//! Statuses never trigger recovery on their own. They are delivered to the
//! sender of the causing envelope as ordinary envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::envelope::{Envelope, Message, PeerRef};
use crate::error::DispatchError;

/// Kind of status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// A communication or processing exception occurred
    Error,
    /// The peer deliberately declined the request
    Reject,
    /// The peer attempted the operation but it did not succeed
    Failure,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Error => write!(f, "error"),
            StatusKind::Reject => write!(f, "reject"),
            StatusKind::Failure => write!(f, "failure"),
        }
    }
}

/// Status report about an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub kind: StatusKind,
    /// Envelope that caused the report
    pub cause: Box<Envelope>,
    /// Human-readable description
    pub message: String,
}

impl Message for Status {
    const KIND: &'static str = "parley.status";
}

impl Status {
    pub fn new(kind: StatusKind, cause: Envelope, message: impl Into<String>) -> Self {
        Self {
            kind,
            cause: Box::new(cause),
            message: message.into(),
        }
    }

    pub fn error(cause: Envelope, message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, cause, message)
    }

    pub fn reject(cause: Envelope, message: impl Into<String>) -> Self {
        Self::new(StatusKind::Reject, cause, message)
    }

    pub fn failure(cause: Envelope, message: impl Into<String>) -> Self {
        Self::new(StatusKind::Failure, cause, message)
    }

    /// Status describing a dispatch error raised while handling `cause`
    pub fn from_error(cause: Envelope, err: &DispatchError) -> Self {
        Self::new(err.status_kind(), cause, err.to_string())
    }

    /// Peer the status should be delivered to
    pub fn recipient(&self) -> &PeerRef {
        self.cause.sender()
    }
}
