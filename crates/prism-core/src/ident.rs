// SPDX-License-Identifier: Apache-2.0
//! Identifier and hashing utilities.
use blake3::Hasher;

/// Canonical 256-bit hash used throughout the engine for addressing blocks,
/// edges, domains, compiled programs, and patch snapshots.
pub type Hash = [u8; 32];

/// Strongly typed identifier for a block in a patch.
///
/// `BlockId` is an opaque 32-byte identifier (`Hash`). Blocks authored by a
/// host typically use stable, label-derived ids via [`make_block_id`]
/// (`blake3("block:" || label)`), but this is a convention, not a global
/// constraint: the compiler also mints content-addressed provider ids via
/// [`derived_provider_id`] for synthesized default-source blocks.
///
/// Tooling must not assume that every `BlockId` corresponds to a
/// human-readable label, or that ids are reversible back into strings.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub Hash);

impl BlockId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Identifier for a directed edge within a patch.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeId(pub Hash);

impl EdgeId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Strongly typed identifier for a field domain artifact.
///
/// Domain identity is what hot-swap classification compares: two domains are
/// "the same" exactly when their `DomainId`s are equal.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainId(pub Hash);

impl DomainId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Produces a stable, domain-separated block identifier (prefix `b"block:"`) using BLAKE3.
pub fn make_block_id(label: &str) -> BlockId {
    let mut hasher = Hasher::new();
    hasher.update(b"block:");
    hasher.update(label.as_bytes());
    BlockId(hasher.finalize().into())
}

/// Produces a stable, domain-separated edge identifier (prefix `b"edge:"`) using BLAKE3.
pub fn make_edge_id(label: &str) -> EdgeId {
    let mut hasher = Hasher::new();
    hasher.update(b"edge:");
    hasher.update(label.as_bytes());
    EdgeId(hasher.finalize().into())
}

/// Produces a stable, domain-separated domain identifier (prefix `b"domain:"`) using BLAKE3.
pub fn make_domain_id(label: &str) -> DomainId {
    let mut hasher = Hasher::new();
    hasher.update(b"domain:");
    hasher.update(label.as_bytes());
    DomainId(hasher.finalize().into())
}

/// Derives the id of the hidden provider block synthesized for an unwired
/// input slot.
///
/// The id is a pure function of `(consumer, slot)` so that repeated
/// compilations of the same patch mint identical provider blocks, and so that
/// provider state keys remain stable across hot swaps.
pub fn derived_provider_id(consumer: &BlockId, slot: &str) -> BlockId {
    let mut hasher = Hasher::new();
    hasher.update(b"default-source:");
    hasher.update(&consumer.0);
    hasher.update(b":");
    hasher.update(slot.as_bytes());
    BlockId(hasher.finalize().into())
}

/// Derives the id of the edge connecting a synthesized provider to its slot.
///
/// Deterministic for the same reason as [`derived_provider_id`]; the two are
/// minted together during default-source materialization.
pub fn derived_provider_edge_id(consumer: &BlockId, slot: &str) -> EdgeId {
    let mut hasher = Hasher::new();
    hasher.update(b"default-edge:");
    hasher.update(&consumer.0);
    hasher.update(b":");
    hasher.update(slot.as_bytes());
    EdgeId(hasher.finalize().into())
}

/// Renders the first eight bytes of a hash as lowercase hex.
///
/// Used by diagnostics and telemetry where a full 64-character id would
/// drown the message. Collisions across the 8-byte prefix are acceptable for
/// display purposes only.
#[must_use]
pub fn short_hex(h: &Hash) -> String {
    let mut short = [0u8; 8];
    short.copy_from_slice(&h[0..8]);
    hex::encode(short)
}
