// SPDX-License-Identifier: MIT OR Apache-2.0

//! CBOR helpers for payload bodies
//!
//! Payload bodies travel as CBOR; JSON is only used for human-readable dumps.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DispatchError;

/// Serialize a value to CBOR
pub fn to_cbor<T: Serialize>(kind: &str, value: &T) -> Result<Vec<u8>, DispatchError> {
    serde_cbor::to_vec(value).map_err(|source| DispatchError::Encode {
        kind: kind.to_string(),
        source,
    })
}

/// Deserialize a value from CBOR
pub fn from_cbor<T: DeserializeOwned>(kind: &str, data: &[u8]) -> Result<T, DispatchError> {
    serde_cbor::from_slice(data).map_err(|source| {
        tracing::debug!(kind, len = data.len(), "Failed to decode payload body: {}", source);
        DispatchError::Decode {
            kind: kind.to_string(),
            source,
        }
    })
}

/// Render a CBOR body as JSON for logs and dumps
pub fn body_to_json(data: &[u8]) -> Option<serde_json::Value> {
    let value: serde_cbor::Value = serde_cbor::from_slice(data).ok()?;
    serde_json::to_value(cbor_to_json(value)).ok()
}

fn cbor_to_json(value: serde_cbor::Value) -> serde_json::Value {
    use serde_cbor::Value as Cbor;
    use serde_json::Value as Json;

    match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(b),
        Cbor::Integer(i) => i64::try_from(i)
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(i.to_string())),
        Cbor::Float(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Cbor::Bytes(bytes) => Json::String(hex::encode(bytes)),
        Cbor::Text(text) => Json::String(text),
        Cbor::Array(items) => Json::Array(items.into_iter().map(cbor_to_json).collect()),
        Cbor::Map(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Cbor::Text(text) => text,
                        other => format!("{:?}", other),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        Cbor::Tag(_, inner) => cbor_to_json(*inner),
        _ => Json::Null,
    }
}
