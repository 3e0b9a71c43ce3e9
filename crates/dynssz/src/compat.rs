//! Capability interfaces for fast-path types.
//!
//! A custom type participates in the codec by implementing [`SszDelegate`].
//! The legacy group (`size_ssz`, `marshal_ssz_to`, `unmarshal_ssz`,
//! `hash_tree_root_with`) is required; the dynamic-spec-aware,
//! encoder/decoder-aware and view-aware groups are optional and return
//! `None` to fall through to the next level, per the selection order:
//!
//! 1. view-aware dynamic capability (when a view schema is in effect),
//! 2. plain dynamic capability,
//! 3. legacy fast path (only when no dynamic-spec override applies),
//! 4. reflection over the descriptor.
//!
//! Delegate errors are forwarded with their original text preserved.

use std::{any::Any, fmt, sync::Arc};

use crate::{
    decode::Decoder,
    encode::Encoder,
    error::SszError,
    hash::HashWalker,
    spec::SpecResolver,
    typedef::TypeDef,
};

/// Which capability groups a type implements. Declared on the vtable at
/// registration and copied into the descriptor's compatibility flags by
/// the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    /// Legacy `size_ssz`/`marshal_ssz*`.
    pub legacy_marshal: bool,
    /// Legacy `unmarshal_ssz`.
    pub legacy_unmarshal: bool,
    /// Legacy `hash_tree_root*`.
    pub legacy_hash: bool,
    /// `marshal_ssz_dyn`.
    pub dyn_marshal: bool,
    /// `unmarshal_ssz_dyn`.
    pub dyn_unmarshal: bool,
    /// `size_ssz_dyn`.
    pub dyn_size: bool,
    /// `hash_tree_root_dyn`.
    pub dyn_hash: bool,
    /// `marshal_ssz_encoder`.
    pub encoder_aware: bool,
    /// `unmarshal_ssz_decoder`.
    pub decoder_aware: bool,
    /// `marshal_ssz_view` / `size_ssz_view`.
    pub view_marshal: bool,
    /// `unmarshal_ssz_view`.
    pub view_unmarshal: bool,
    /// `hash_tree_root_view`.
    pub view_hash: bool,
}

impl CapabilityFlags {
    /// The full legacy group.
    pub fn legacy() -> Self {
        Self {
            legacy_marshal: true,
            legacy_unmarshal: true,
            legacy_hash: true,
            ..Self::default()
        }
    }

    /// The full dynamic-spec-aware group (plus legacy, which the dynamic
    /// methods usually wrap).
    pub fn dynamic() -> Self {
        Self {
            dyn_marshal: true,
            dyn_unmarshal: true,
            dyn_size: true,
            dyn_hash: true,
            ..Self::legacy()
        }
    }

    /// Whether some marshal path exists.
    pub fn has_marshal(&self) -> bool {
        self.legacy_marshal || self.dyn_marshal || self.encoder_aware
    }

    /// Whether some unmarshal path exists.
    pub fn has_unmarshal(&self) -> bool {
        self.legacy_unmarshal || self.dyn_unmarshal || self.decoder_aware
    }

    /// Whether some hash path exists.
    pub fn has_hash(&self) -> bool {
        self.legacy_hash || self.dyn_hash
    }
}

/// The capability surface of a fast-path type, object-safe so delegate
/// values can travel inside the dynamic value tree.
pub trait SszDelegate: fmt::Debug + Send + Sync {
    /// Self as `Any`, for equality checks across delegate values.
    fn as_any(&self) -> &dyn Any;

    /// Clones the delegate behind the object.
    fn clone_box(&self) -> Box<dyn SszDelegate>;

    /// Structural equality against another delegate value.
    fn delegate_eq(&self, other: &dyn SszDelegate) -> bool;

    // -- legacy fast path (required) --

    /// The exact encoded byte size.
    fn size_ssz(&self) -> usize;

    /// Appends the SSZ encoding to `dst`.
    fn marshal_ssz_to(&self, dst: &mut Vec<u8>) -> Result<(), SszError>;

    /// Decodes from `bytes`, replacing the receiver's contents.
    fn unmarshal_ssz(&mut self, bytes: &[u8]) -> Result<(), SszError>;

    /// Writes this value's chunks into `walker` and merkleizes them,
    /// leaving exactly one root chunk.
    fn hash_tree_root_with(&self, walker: &mut dyn HashWalker) -> Result<(), SszError>;

    /// The SSZ encoding as a fresh buffer.
    fn marshal_ssz(&self) -> Result<Vec<u8>, SszError> {
        let mut dst = Vec::with_capacity(self.size_ssz());
        self.marshal_ssz_to(&mut dst)?;
        Ok(dst)
    }

    /// The 32-byte root, through a fresh [`crate::hash::Hasher`].
    fn hash_tree_root(&self) -> Result<dynssz_primitives::Hash256, SszError> {
        let mut hasher = crate::hash::Hasher::new();
        self.hash_tree_root_with(&mut hasher)?;
        hasher.root()
    }

    // -- dynamic-spec-aware (optional; `None` falls through) --

    /// Size under dynamic specs.
    fn size_ssz_dyn(&self, _specs: &dyn SpecResolver) -> Option<usize> {
        None
    }

    /// Marshal under dynamic specs.
    fn marshal_ssz_dyn(
        &self,
        _specs: &dyn SpecResolver,
        _dst: &mut Vec<u8>,
    ) -> Option<Result<(), SszError>> {
        None
    }

    /// Unmarshal under dynamic specs.
    fn unmarshal_ssz_dyn(
        &mut self,
        _specs: &dyn SpecResolver,
        _bytes: &[u8],
    ) -> Option<Result<(), SszError>> {
        None
    }

    /// Hash-tree-root under dynamic specs.
    fn hash_tree_root_dyn(
        &self,
        _specs: &dyn SpecResolver,
        _walker: &mut dyn HashWalker,
    ) -> Option<Result<(), SszError>> {
        None
    }

    // -- encoder/decoder-aware (optional) --

    /// Marshal directly into an encoder sink.
    fn marshal_ssz_encoder(
        &self,
        _specs: &dyn SpecResolver,
        _enc: &mut dyn Encoder,
    ) -> Option<Result<(), SszError>> {
        None
    }

    /// Unmarshal directly from a decoder source.
    fn unmarshal_ssz_decoder(
        &mut self,
        _specs: &dyn SpecResolver,
        _dec: &mut dyn Decoder,
    ) -> Option<Result<(), SszError>> {
        None
    }

    // -- view-aware (optional; receive the schema handle) --

    /// Size under the given view schema.
    fn size_ssz_view(&self, _specs: &dyn SpecResolver, _view: &Arc<TypeDef>) -> Option<usize> {
        None
    }

    /// Marshal under the given view schema.
    fn marshal_ssz_view(
        &self,
        _specs: &dyn SpecResolver,
        _view: &Arc<TypeDef>,
        _dst: &mut Vec<u8>,
    ) -> Option<Result<(), SszError>> {
        None
    }

    /// Unmarshal under the given view schema.
    fn unmarshal_ssz_view(
        &mut self,
        _specs: &dyn SpecResolver,
        _view: &Arc<TypeDef>,
        _bytes: &[u8],
    ) -> Option<Result<(), SszError>> {
        None
    }

    /// Hash-tree-root under the given view schema.
    fn hash_tree_root_view(
        &self,
        _specs: &dyn SpecResolver,
        _view: &Arc<TypeDef>,
        _walker: &mut dyn HashWalker,
    ) -> Option<Result<(), SszError>> {
        None
    }
}
