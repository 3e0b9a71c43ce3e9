//! Dynamic SSZ encoding, decoding and hash-tree-root.
//!
//! `dynssz` compiles annotated type definitions into immutable
//! [`TypeDescriptor`]s and drives SimpleSerialize encoding, decoding,
//! sizing and Merkleization off them. Sizes and limits may reference
//! named constants (`dynssz-size`/`dynssz-max` annotations) resolved
//! against a caller-supplied [`SpecResolver`], so one type graph serves
//! any fork's preset without regeneration.
//!
//! ```rust
//! use dynssz::{DynSsz, FieldDef, NoSpecs, TypeDef, Value};
//!
//! # fn main() -> Result<(), dynssz::SszError> {
//! let block = TypeDef::container(
//!     "MiniBlock",
//!     vec![
//!         FieldDef::new("slot", TypeDef::uint64()),
//!         FieldDef::new("graffiti", TypeDef::slice(TypeDef::uint8()))
//!             .with_tags(r#"ssz-max:"32""#),
//!     ],
//! );
//!
//! let codec = DynSsz::new(NoSpecs);
//! let value = Value::Container(vec![
//!     Value::Uint64(7),
//!     Value::Bytes(b"hi".to_vec()),
//! ]);
//!
//! let bytes = codec.encode(&block, &value)?;
//! assert_eq!(codec.size(&block, &value)?, bytes.len());
//! assert_eq!(codec.decode(&block, &bytes)?, value);
//! let _root = codec.hash_tree_root(&block, &value)?;
//! # Ok(())
//! # }
//! ```
//!
//! Fast-path types implement [`SszDelegate`] and register a
//! [`CustomVtable`]; the codec prefers view-aware, then dynamic-spec
//! aware, then legacy implementations, falling back to the descriptor
//! walk. The companion `dynssz_codegen` crate emits such implementations
//! ahead of time.

pub mod cache;
pub mod compat;
mod compile;
pub mod decode;
pub mod descriptor;
pub mod encode;
mod error;
pub mod hash;
pub mod merkle;
mod pool;
mod size;
pub mod spec;
pub mod tags;
pub mod typedef;
pub mod value;

use std::{fmt, io, sync::Arc};

pub use cache::TypeCache;
pub use compat::{CapabilityFlags, SszDelegate};
pub use decode::{BufferDecoder, Decoder, StreamDecoder};
pub use descriptor::{SszKind, TypeDescriptor};
pub use dynssz_primitives::{FixedBytes, Hash256, U128, U256};
pub use encode::{BufferEncoder, Encoder, StreamEncoder};
pub use error::SszError;
pub use hash::{HashWalker, Hasher};
pub use spec::{MapResolver, NoSpecs, SpecResolver};
pub use tags::resolve_expr;
pub use typedef::{CustomVtable, FieldDef, HostKind, TypeDef};
pub use value::{BitSeq, CustomValue, Value};

use compile::Compiler;

/// The number of bytes used to represent an offset.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;

/// The number of bytes used to indicate the variant of a union.
pub const BYTES_PER_UNION_SELECTOR: usize = 1;

/// The highest possible union selector value; higher values are reserved
/// for backwards-compatible extensions.
pub const MAX_UNION_SELECTOR: u8 = 127;

/// Per-operation context threaded through the reflection walk.
pub(crate) struct Ctx<'a> {
    pub(crate) specs: &'a dyn SpecResolver,
    pub(crate) no_fast_ssz: bool,
}

type VerboseHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The codec: a spec resolver plus a descriptor cache.
///
/// Cloning is cheap-ish but unnecessary; a `DynSsz` is `Send + Sync` and
/// meant to be shared. Descriptors compile lazily on first use of a type
/// pair and stay cached until purged through [`DynSsz::type_cache`].
pub struct DynSsz {
    specs: Arc<dyn SpecResolver>,
    cache: TypeCache,
    no_fast_ssz: bool,
    verbose: Option<VerboseHook>,
}

impl fmt::Debug for DynSsz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynSsz")
            .field("cached_descriptors", &self.cache.len())
            .field("no_fast_ssz", &self.no_fast_ssz)
            .finish_non_exhaustive()
    }
}

impl DynSsz {
    /// A codec resolving dynamic annotations against `specs`.
    pub fn new(specs: impl SpecResolver + 'static) -> Self {
        Self {
            specs: Arc::new(specs),
            cache: TypeCache::new(),
            no_fast_ssz: false,
            verbose: None,
        }
    }

    /// Installs a callback receiving descriptor-build diagnostics.
    pub fn with_verbose(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.verbose = Some(Arc::new(hook));
        self
    }

    /// Disables the legacy fast path; dynamic-spec-aware delegates and
    /// the reflection walk are still used. Outputs never change, only the
    /// code path taken.
    pub fn without_legacy_fast_path(mut self) -> Self {
        self.no_fast_ssz = true;
        self
    }

    /// The descriptor cache, for introspection and purging.
    pub fn type_cache(&self) -> &TypeCache {
        &self.cache
    }

    /// Compiles (or fetches) the descriptor for `ty`.
    pub fn descriptor(&self, ty: &Arc<TypeDef>) -> Result<Arc<TypeDescriptor>, SszError> {
        self.descriptor_view(ty, ty)
    }

    /// Compiles (or fetches) the descriptor for runtime type `ty` under
    /// the field subset and ordering of `view`.
    pub fn descriptor_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        let verbose = self.verbose.as_deref();
        Compiler::new(self.specs.as_ref(), &self.cache, verbose).compile(ty, view)
    }

    fn ctx(&self) -> Ctx<'_> {
        Ctx {
            specs: self.specs.as_ref(),
            no_fast_ssz: self.no_fast_ssz,
        }
    }

    /// The exact encoded size of `value`.
    pub fn size(&self, ty: &Arc<TypeDef>, value: &Value) -> Result<usize, SszError> {
        let desc = self.descriptor(ty)?;
        size::size_value(&self.ctx(), &desc, value)
    }

    /// [`DynSsz::size`] under a view schema.
    pub fn size_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        value: &Value,
    ) -> Result<usize, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        size::size_value(&self.ctx(), &desc, value)
    }

    /// Encodes `value` into a fresh buffer.
    pub fn encode(&self, ty: &Arc<TypeDef>, value: &Value) -> Result<Vec<u8>, SszError> {
        let desc = self.descriptor(ty)?;
        self.encode_desc(&desc, value, Vec::new())
    }

    /// [`DynSsz::encode`] under a view schema.
    pub fn encode_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        value: &Value,
    ) -> Result<Vec<u8>, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.encode_desc(&desc, value, Vec::new())
    }

    /// Encodes `value`, appending to a preallocated buffer.
    pub fn encode_to(
        &self,
        ty: &Arc<TypeDef>,
        value: &Value,
        buf: Vec<u8>,
    ) -> Result<Vec<u8>, SszError> {
        let desc = self.descriptor(ty)?;
        self.encode_desc(&desc, value, buf)
    }

    /// [`DynSsz::encode_to`] under a view schema.
    pub fn encode_to_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        value: &Value,
        buf: Vec<u8>,
    ) -> Result<Vec<u8>, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.encode_desc(&desc, value, buf)
    }

    fn encode_desc(
        &self,
        desc: &Arc<TypeDescriptor>,
        value: &Value,
        mut buf: Vec<u8>,
    ) -> Result<Vec<u8>, SszError> {
        let ctx = self.ctx();
        buf.reserve(size::size_value(&ctx, desc, value)?);
        let mut enc = BufferEncoder::with_buffer(buf);
        encode::encode_value(&ctx, desc, value, &mut enc)?;
        Ok(enc.into_buffer())
    }

    /// Encodes `value` into an `io::Write` sink, returning the sink after
    /// a flush.
    pub fn encode_stream<W: io::Write>(
        &self,
        ty: &Arc<TypeDef>,
        value: &Value,
        sink: W,
    ) -> Result<W, SszError> {
        let desc = self.descriptor(ty)?;
        self.encode_stream_desc(&desc, value, sink)
    }

    /// [`DynSsz::encode_stream`] under a view schema.
    pub fn encode_stream_view<W: io::Write>(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        value: &Value,
        sink: W,
    ) -> Result<W, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.encode_stream_desc(&desc, value, sink)
    }

    fn encode_stream_desc<W: io::Write>(
        &self,
        desc: &Arc<TypeDescriptor>,
        value: &Value,
        sink: W,
    ) -> Result<W, SszError> {
        let ctx = self.ctx();
        let mut enc = StreamEncoder::new(sink);
        encode::encode_value(&ctx, desc, value, &mut enc)?;
        enc.finish()
    }

    /// Decodes a value of `ty` from `bytes`. The whole input must be
    /// consumed.
    pub fn decode(&self, ty: &Arc<TypeDef>, bytes: &[u8]) -> Result<Value, SszError> {
        let desc = self.descriptor(ty)?;
        self.decode_desc(&desc, bytes)
    }

    /// [`DynSsz::decode`] under a view schema.
    pub fn decode_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        bytes: &[u8],
    ) -> Result<Value, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.decode_desc(&desc, bytes)
    }

    fn decode_desc(
        &self,
        desc: &Arc<TypeDescriptor>,
        bytes: &[u8],
    ) -> Result<Value, SszError> {
        if !desc.flags.is_dynamic && bytes.len() != desc.size {
            return Err(SszError::InvalidByteLength {
                len: bytes.len(),
                expected: desc.size,
            });
        }
        let mut dec = BufferDecoder::new(bytes);
        let value = decode::decode_value(&self.ctx(), desc, &mut dec)?;
        if dec.remaining() != 0 {
            return Err(SszError::SizeMismatch {
                claimed: bytes.len(),
                consumed: bytes.len() - dec.remaining(),
            });
        }
        Ok(value)
    }

    /// Decodes a value of `ty` from an `io::Read` source delivering
    /// exactly `length` bytes of SSZ.
    pub fn decode_stream<R: io::Read>(
        &self,
        ty: &Arc<TypeDef>,
        source: R,
        length: usize,
    ) -> Result<Value, SszError> {
        let desc = self.descriptor(ty)?;
        self.decode_stream_desc(&desc, source, length)
    }

    /// [`DynSsz::decode_stream`] under a view schema.
    pub fn decode_stream_view<R: io::Read>(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        source: R,
        length: usize,
    ) -> Result<Value, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.decode_stream_desc(&desc, source, length)
    }

    fn decode_stream_desc<R: io::Read>(
        &self,
        desc: &Arc<TypeDescriptor>,
        source: R,
        length: usize,
    ) -> Result<Value, SszError> {
        if !desc.flags.is_dynamic && length != desc.size {
            return Err(SszError::InvalidByteLength {
                len: length,
                expected: desc.size,
            });
        }
        let mut dec = StreamDecoder::new(source, length);
        let value = decode::decode_value(&self.ctx(), desc, &mut dec)?;
        if dec.remaining() != 0 {
            return Err(SszError::SizeMismatch {
                claimed: length,
                consumed: length - dec.remaining(),
            });
        }
        Ok(value)
    }

    /// The 32-byte hash-tree-root of `value`.
    pub fn hash_tree_root(
        &self,
        ty: &Arc<TypeDef>,
        value: &Value,
    ) -> Result<Hash256, SszError> {
        let desc = self.descriptor(ty)?;
        self.hash_desc(&desc, value)
    }

    /// [`DynSsz::hash_tree_root`] under a view schema.
    pub fn hash_tree_root_view(
        &self,
        ty: &Arc<TypeDef>,
        view: &Arc<TypeDef>,
        value: &Value,
    ) -> Result<Hash256, SszError> {
        let desc = self.descriptor_view(ty, view)?;
        self.hash_desc(&desc, value)
    }

    fn hash_desc(
        &self,
        desc: &Arc<TypeDescriptor>,
        value: &Value,
    ) -> Result<Hash256, SszError> {
        let mut hasher = Hasher::new();
        hash::hash_value(&self.ctx(), desc, value, &mut hasher)?;
        hasher.root()
    }
}
