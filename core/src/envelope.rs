// SPDX-License-Identifier: MIT OR Apache-2.0

//! Envelopes, payloads and peer references

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cbor;
use crate::error::DispatchError;
use crate::tag::TypeTag;

/// A payload type with a logical name shared by every peer
pub trait Message: Serialize + DeserializeOwned {
    /// Logical type name the [`TypeTag`] is derived from
    const KIND: &'static str;
}

/// Transmittable address of one peer's room connection
///
/// A peer joining several rooms holds one `PeerRef` per room, each with its
/// own dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerRef {
    peer: String,
    room: String,
}

impl PeerRef {
    pub fn new(peer: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            room: room.into(),
        }
    }

    /// Identity of the owning peer
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Room this connection belongs to
    pub fn room(&self) -> &str {
        &self.room
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.peer, self.room)
    }
}

/// Encoded payload with its type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    tag: TypeTag,
    kind: String,
    body: Vec<u8>,
}

impl Payload {
    /// Encode a typed message
    pub fn encode<M: Message>(value: &M) -> Result<Self, DispatchError> {
        Ok(Self {
            tag: TypeTag::of::<M>(),
            kind: M::KIND.to_string(),
            body: cbor::to_cbor(M::KIND, value)?,
        })
    }

    /// Decode into a typed message, checking the tag first
    pub fn decode<M: Message>(&self) -> Result<M, DispatchError> {
        if self.tag != TypeTag::of::<M>() {
            return Err(DispatchError::TagMismatch {
                expected: M::KIND.to_string(),
                found: self.kind.clone(),
            });
        }
        cbor::from_cbor(M::KIND, &self.body)
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// The unit of communication: a payload and the peer that sent it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Payload,
    sender: PeerRef,
}

impl Envelope {
    /// Wrap a typed message sent by `sender`
    pub fn new<M: Message>(sender: PeerRef, value: &M) -> Result<Self, DispatchError> {
        Ok(Self {
            payload: Payload::encode(value)?,
            sender,
        })
    }

    /// Assemble from an already encoded payload
    pub fn from_parts(sender: PeerRef, payload: Payload) -> Self {
        Self { payload, sender }
    }

    pub fn tag(&self) -> TypeTag {
        self.payload.tag
    }

    pub fn kind(&self) -> &str {
        &self.payload.kind
    }

    pub fn sender(&self) -> &PeerRef {
        &self.sender
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether this envelope carries a message of type `M`
    pub fn is<M: Message>(&self) -> bool {
        self.payload.tag == TypeTag::of::<M>()
    }

    pub fn decode<M: Message>(&self) -> Result<M, DispatchError> {
        self.payload.decode()
    }

    /// JSON rendering with the decoded body, for logs and the CLI
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sender": self.sender.to_string(),
            "kind": self.payload.kind,
            "tag": self.payload.tag.to_string(),
            "body": cbor::body_to_json(&self.payload.body),
        })
    }
}
