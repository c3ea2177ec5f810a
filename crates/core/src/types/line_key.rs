//! Deterministic cart line keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::id::{ProductId, VariationId};

/// Identifies one line of a cart.
///
/// Derived from the product, the optional variation and the selected
/// options, so adding the same selection twice lands on the same line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineKey(String);

impl LineKey {
    /// Compute the key for a selection.
    ///
    /// Options are hashed in key order, which `BTreeMap` guarantees.
    #[must_use]
    pub fn derive(
        product: ProductId,
        variation: Option<VariationId>,
        options: &BTreeMap<String, String>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(product.get().to_be_bytes());
        hasher.update(variation.map_or(0, |v| v.get()).to_be_bytes());
        for (name, value) in options {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        // 16 bytes is plenty for a per-cart key
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Wrap a client-supplied key without validation; unknown keys simply
    /// miss on lookup.
    #[must_use]
    pub fn from_client(raw: &str) -> Self {
        Self(raw.trim().to_owned())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
