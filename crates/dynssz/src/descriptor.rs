//! Immutable type descriptors.
//!
//! A [`TypeDescriptor`] is the compiled form of one SSZ type: its kind,
//! fixed size or dynamism, limits, element/field structure, and the
//! compatibility flags recorded by the capability probe. Descriptors are
//! trees, built once per `(runtime, schema)` type pair and then shared;
//! they are never mutated after publication to the cache.

use std::sync::Arc;

use crate::{
    compat::CapabilityFlags,
    typedef::TypeDef,
};

/// The SSZ category a descriptor encodes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SszKind {
    /// One byte, 0 or 1.
    Bool,
    /// 1-byte little-endian integer.
    Uint8,
    /// 2-byte little-endian integer.
    Uint16,
    /// 4-byte little-endian integer.
    Uint32,
    /// 8-byte little-endian integer.
    Uint64,
    /// 16 raw little-endian bytes.
    Uint128,
    /// 32 raw little-endian bytes.
    Uint256,
    /// Fixed field tuple.
    Container,
    /// Container merkleized at `ssz-index` positions.
    ProgressiveContainer,
    /// Fixed-length element sequence.
    Vector,
    /// Bounded variable-length element sequence.
    List,
    /// Fixed-length packed bits.
    Bitvector,
    /// Bounded variable-length packed bits with a sentinel.
    Bitlist,
    /// List with progressive merkleization.
    ProgressiveList,
    /// Bitlist with progressive merkleization.
    ProgressiveBitlist,
    /// Transparent nominal shell around one type.
    TypeWrapper,
    /// One-byte selector plus variant body.
    CompatibleUnion,
    /// Served entirely by capability delegates.
    Custom,
}

impl SszKind {
    /// Whether values of this kind pack into chunks when merkleized as
    /// sequence elements.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            SszKind::Bool
                | SszKind::Uint8
                | SszKind::Uint16
                | SszKind::Uint32
                | SszKind::Uint64
                | SszKind::Uint128
                | SszKind::Uint256
        )
    }
}

/// Structural flags of a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFlags {
    /// The encoded size depends on the value.
    pub is_dynamic: bool,
    /// A list/bitlist capacity is present.
    pub has_limit: bool,
    /// A `dynssz-size` override is in effect here or below.
    pub has_dynamic_size: bool,
    /// A `dynssz-max` override is in effect here or below.
    pub has_dynamic_max: bool,
    /// A size expression was annotated (resolved or not).
    pub has_size_expr: bool,
    /// A max expression was annotated (resolved or not).
    pub has_max_expr: bool,
    /// The size/limit was given in bits.
    pub has_bit_size: bool,
}

/// Host-representation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostFlags {
    /// The runtime value is behind an ownership wrapper.
    pub is_pointer: bool,
    /// The runtime value is a byte array/slice (bulk copy shortcut).
    pub is_byte_array: bool,
    /// The runtime value is a string.
    pub is_string: bool,
    /// The runtime value is a timestamp.
    pub is_time: bool,
}

/// One container field as seen by the codec.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Schema field name.
    pub name: String,
    /// The field's compiled type.
    pub desc: Arc<TypeDescriptor>,
    /// Position of the field's value in the *runtime* container. Equal to
    /// the declaration index in normal use; differs under views.
    pub field_index: usize,
    /// Progressive container position.
    pub ssz_index: Option<u64>,
}

/// A reference to a dynamic container field.
#[derive(Debug, Clone, Copy)]
pub struct DynFieldRef {
    /// Index into the descriptor's field array.
    pub field: usize,
    /// Byte offset of the field's 4-byte offset slot in the fixed region.
    pub header_offset: usize,
}

/// The compiled, immutable description of one SSZ type.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// SSZ category.
    pub kind: SszKind,
    /// Fixed SSZ byte size; 0 when `flags.is_dynamic`.
    pub size: usize,
    /// Element count for vectors; fixed-region byte length for containers.
    pub length: usize,
    /// Bit count, when the length was annotated in bits.
    pub bit_length: Option<usize>,
    /// List/bitlist capacity (elements or bits).
    pub limit: Option<u64>,
    /// Element descriptor for sequences.
    pub element: Option<Arc<TypeDescriptor>>,
    /// Wrapped descriptor for type-wrappers.
    pub wrapped: Option<Arc<TypeDescriptor>>,
    /// Ordered container fields.
    pub fields: Vec<FieldDescriptor>,
    /// Dynamic fields with their fixed-region header offsets.
    pub dyn_fields: Vec<DynFieldRef>,
    /// Union variants; the selector is the 0-based position.
    pub variants: Vec<Arc<TypeDescriptor>>,
    /// Structural flags.
    pub flags: TypeFlags,
    /// Host-representation flags.
    pub host: HostFlags,
    /// Capability probe results.
    pub compat: CapabilityFlags,
    /// Retained `dynssz-size` source text.
    pub size_expr: Option<String>,
    /// Retained `dynssz-max` source text.
    pub max_expr: Option<String>,
    /// Where values physically live.
    pub runtime: Arc<TypeDef>,
    /// Whose annotations and field order define the wire layout. Equal to
    /// `runtime` in normal use; distinct for fork-dependent views.
    pub schema: Arc<TypeDef>,
}

impl TypeDescriptor {
    /// The fixed size of one element of the fixed region this descriptor
    /// contributes to a parent container: its own size when static, the
    /// 4-byte offset slot when dynamic.
    pub fn fixed_slot_size(&self) -> usize {
        if self.flags.is_dynamic {
            crate::BYTES_PER_LENGTH_OFFSET
        } else {
            self.size
        }
    }

    /// Capacity in elements (bits for bit kinds), failing when absent.
    pub fn limit_or_zero(&self) -> u64 {
        self.limit.unwrap_or(0)
    }

    /// Whether the legacy fast path may serve this descriptor: it must be
    /// implemented and no dynamic-spec override may apply anywhere below.
    pub fn legacy_fast_path_allowed(&self) -> bool {
        !self.flags.has_dynamic_size && !self.flags.has_dynamic_max
    }

    /// The nominal name the descriptor reports in diagnostics.
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }
}
