// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable identifiers for logical payload types
//!
//! A [`TypeTag`] is derived from the logical name of a message type, never
//! from a payload value, so every peer computes the same tag for the same
//! kind of message without any prior registration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::envelope::Message;

/// Identifier for a logical payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(u64);

impl TypeTag {
    /// Tag for a message type
    pub fn of<M: Message>() -> Self {
        Self::for_kind(M::KIND)
    }

    /// Tag for a logical type name, cached per name
    pub fn for_kind(kind: &'static str) -> Self {
        if let Some(tag) = cache().read().get(kind) {
            return *tag;
        }

        let tag = Self::compute(kind);
        cache().write().insert(kind, tag);
        tag
    }

    /// Hash a kind name without touching the cache
    pub fn compute(kind: &str) -> Self {
        let hash = blake3::hash(kind.as_bytes());
        let mut id = [0u8; 8];
        id.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_le_bytes(id))
    }

    /// Raw identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

fn cache() -> &'static RwLock<HashMap<&'static str, TypeTag>> {
    static TAGS: OnceLock<RwLock<HashMap<&'static str, TypeTag>>> = OnceLock::new();
    TAGS.get_or_init(|| RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MapData, TextMessage};

    #[test]
    fn test_tag_is_stable_across_calls() {
        assert_eq!(TypeTag::of::<MapData>(), TypeTag::of::<MapData>());
        assert_eq!(TypeTag::of::<MapData>(), TypeTag::compute("parley.map"));
    }

    #[test]
    fn test_distinct_kinds_have_distinct_tags() {
        assert_ne!(TypeTag::of::<MapData>(), TypeTag::of::<TextMessage>());
    }

    #[test]
    fn test_display_is_hex() {
        let shown = TypeTag::of::<TextMessage>().to_string();
        assert_eq!(shown.len(), 16);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
