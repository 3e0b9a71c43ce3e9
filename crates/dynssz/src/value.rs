//! The dynamic value tree.
//!
//! Reflection-path operations act on [`Value`] trees shaped by the
//! nominal type graph. Container field values sit at their runtime
//! `field_index`, so a view descriptor can address a subset of a larger
//! runtime container without copying.

use std::sync::Arc;

use dynssz_primitives::{U128, U256};

use crate::{
    compat::SszDelegate,
    descriptor::{SszKind, TypeDescriptor},
    error::SszError,
};

/// A packed bit sequence with an explicit logical length.
///
/// Storage is little-endian within each byte: bit `i` lives at byte
/// `i / 8`, position `i % 8`. The sentinel bit of bitlists is *not*
/// stored; it is added on encode and stripped on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSeq {
    bytes: Vec<u8>,
    len: usize,
}

impl BitSeq {
    /// An empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// An all-zero sequence of `len` bits.
    pub fn with_len(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Wraps raw bitvector bytes of exactly `len` bits. Bits above `len`
    /// in the last byte must be zero.
    pub fn from_bitvector_bytes(bytes: Vec<u8>, len: usize) -> Result<Self, SszError> {
        if bytes.len() != len.div_ceil(8) {
            return Err(SszError::InvalidByteLength {
                len: bytes.len(),
                expected: len.div_ceil(8),
            });
        }
        if len % 8 != 0
            && let Some(last) = bytes.last()
            && last >> (len % 8) != 0
        {
            return Err(SszError::BitvectorPaddingNonZero);
        }
        Ok(Self { bytes, len })
    }

    /// Parses bitlist bytes: packed bits followed by a sentinel `1` bit.
    /// The sentinel is stripped from the stored form.
    pub fn from_bitlist_bytes(bytes: &[u8]) -> Result<Self, SszError> {
        let Some(&last) = bytes.last() else {
            return Err(SszError::BitlistNotTerminated);
        };
        if last == 0 {
            return Err(SszError::BitlistNotTerminated);
        }
        let sentinel = 7 - last.leading_zeros() as usize;
        let len = (bytes.len() - 1) * 8 + sentinel;
        let mut out = bytes.to_vec();
        // Clear the sentinel; resize down when it sat alone in the last byte.
        *out.last_mut().expect("non-empty") = last & !(1 << sentinel);
        out.truncate(len.div_ceil(8));
        Ok(Self { bytes: out, len })
    }

    /// Builds from booleans.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut seq = Self::with_len(bits.len());
        for (i, bit) in bits.iter().enumerate() {
            seq.set(i, *bit);
        }
        seq
    }

    /// The logical bit count.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bits are present.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads bit `i`. Out-of-range reads return `false`.
    pub fn get(&self, i: usize) -> bool {
        i < self.len && self.bytes[i / 8] & (1 << (i % 8)) != 0
    }

    /// Writes bit `i`.
    ///
    /// # Panics
    ///
    /// Panics when `i` is out of range.
    pub fn set(&mut self, i: usize, value: bool) {
        assert!(i < self.len, "bit index {i} out of range ({})", self.len);
        if value {
            self.bytes[i / 8] |= 1 << (i % 8);
        } else {
            self.bytes[i / 8] &= !(1 << (i % 8));
        }
    }

    /// Appends a bit.
    pub fn push(&mut self, value: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, value);
    }

    /// The packed data bytes, without any sentinel.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The bitlist wire form: data bits plus the sentinel bit.
    pub fn to_bitlist_bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if self.len % 8 == 0 {
            out.push(1);
        } else {
            out[self.len / 8] |= 1 << (self.len % 8);
        }
        out
    }
}

/// A fast-path value served by its [`SszDelegate`] implementation.
#[derive(Debug)]
pub struct CustomValue(Box<dyn SszDelegate>);

impl CustomValue {
    /// Wraps a delegate.
    pub fn new(delegate: Box<dyn SszDelegate>) -> Self {
        Self(delegate)
    }

    /// The delegate.
    pub fn delegate(&self) -> &dyn SszDelegate {
        self.0.as_ref()
    }

    pub(crate) fn delegate_mut(&mut self) -> &mut dyn SszDelegate {
        self.0.as_mut()
    }
}

impl Clone for CustomValue {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.delegate_eq(other.0.as_ref())
    }
}

/// A dynamically typed SSZ value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// An 8-bit integer.
    Uint8(u8),
    /// A 16-bit integer.
    Uint16(u16),
    /// A 32-bit integer.
    Uint32(u32),
    /// A 64-bit integer. Also carries timestamps (seconds).
    Uint64(u64),
    /// A 128-bit integer.
    Uint128(U128),
    /// A 256-bit integer.
    Uint256(U256),
    /// A byte sequence (byte arrays, byte slices, strings).
    Bytes(Vec<u8>),
    /// Packed bits for bitvectors and bitlists.
    Bits(BitSeq),
    /// A fixed-length sequence.
    Vector(Vec<Value>),
    /// A variable-length sequence.
    List(Vec<Value>),
    /// Field values at their runtime field indices.
    Container(Vec<Value>),
    /// A selected union variant.
    Union(u8, Box<Value>),
    /// An ownership wrapper; `None` encodes as the zero value.
    Optional(Option<Box<Value>>),
    /// A fast-path value.
    Custom(CustomValue),
}

impl Value {
    /// The zero value for a descriptor, used for nil optionals and for
    /// sizing the missing tail of under-filled vectors.
    pub fn default_for(desc: &Arc<TypeDescriptor>) -> Value {
        match desc.kind {
            SszKind::Bool => Value::Bool(false),
            SszKind::Uint8 => Value::Uint8(0),
            SszKind::Uint16 => Value::Uint16(0),
            SszKind::Uint32 => Value::Uint32(0),
            SszKind::Uint64 => Value::Uint64(0),
            SszKind::Uint128 => Value::Uint128(U128::ZERO),
            SszKind::Uint256 => Value::Uint256(U256::ZERO),
            SszKind::Bitvector => {
                Value::Bits(BitSeq::with_len(desc.bit_length.unwrap_or(0)))
            }
            SszKind::Bitlist | SszKind::ProgressiveBitlist => Value::Bits(BitSeq::new()),
            SszKind::Vector => {
                if desc.host.is_byte_array {
                    Value::Bytes(vec![0u8; desc.length])
                } else {
                    let element = desc.element.as_ref().expect("vector has element");
                    Value::Vector(
                        (0..desc.length).map(|_| Value::default_for(element)).collect(),
                    )
                }
            }
            SszKind::List | SszKind::ProgressiveList => {
                if desc.host.is_byte_array || desc.host.is_string {
                    Value::Bytes(Vec::new())
                } else {
                    Value::List(Vec::new())
                }
            }
            SszKind::Container | SszKind::ProgressiveContainer => {
                let slots = desc
                    .fields
                    .iter()
                    .map(|f| f.field_index + 1)
                    .max()
                    .unwrap_or(0);
                let mut values = vec![Value::Bool(false); slots];
                for field in &desc.fields {
                    values[field.field_index] = Value::default_for(&field.desc);
                }
                Value::Container(values)
            }
            SszKind::CompatibleUnion => {
                let variant = desc.variants.first().expect("union has variants");
                Value::Union(0, Box::new(Value::default_for(variant)))
            }
            SszKind::TypeWrapper => {
                Value::default_for(desc.wrapped.as_ref().expect("wrapper has inner"))
            }
            SszKind::Custom => {
                let vtable = desc
                    .runtime
                    .vtable()
                    .expect("custom descriptor has vtable");
                Value::Custom(CustomValue::new((vtable.fresh)()))
            }
        }
    }

    fn mismatch(&self, desc: &TypeDescriptor, expected: &str) -> SszError {
        SszError::ValueMismatch {
            type_name: desc.type_name().to_string(),
            detail: format!("expected {expected}, found {self:?}"),
        }
    }

    /// Reads a bool value.
    pub fn as_bool(&self, desc: &TypeDescriptor) -> Result<bool, SszError> {
        match self {
            Value::Bool(v) => Ok(*v),
            _ => Err(self.mismatch(desc, "bool")),
        }
    }

    /// Reads a u64-compatible integer (u8..u64 and timestamps widen).
    pub fn as_u64(&self, desc: &TypeDescriptor) -> Result<u64, SszError> {
        match self {
            Value::Uint8(v) => Ok(u64::from(*v)),
            Value::Uint16(v) => Ok(u64::from(*v)),
            Value::Uint32(v) => Ok(u64::from(*v)),
            Value::Uint64(v) => Ok(*v),
            _ => Err(self.mismatch(desc, "unsigned integer")),
        }
    }

    /// Reads a byte sequence.
    pub fn as_bytes(&self, desc: &TypeDescriptor) -> Result<&[u8], SszError> {
        match self {
            Value::Bytes(v) => Ok(v),
            _ => Err(self.mismatch(desc, "bytes")),
        }
    }

    /// Reads a bit sequence.
    pub fn as_bits(&self, desc: &TypeDescriptor) -> Result<&BitSeq, SszError> {
        match self {
            Value::Bits(v) => Ok(v),
            _ => Err(self.mismatch(desc, "bits")),
        }
    }

    /// Reads the elements of a vector or list.
    pub fn as_elements(&self, desc: &TypeDescriptor) -> Result<&[Value], SszError> {
        match self {
            Value::Vector(v) | Value::List(v) => Ok(v),
            _ => Err(self.mismatch(desc, "sequence")),
        }
    }

    /// Reads container field slots.
    pub fn as_container(&self, desc: &TypeDescriptor) -> Result<&[Value], SszError> {
        match self {
            Value::Container(v) => Ok(v),
            _ => Err(self.mismatch(desc, "container")),
        }
    }

    /// Reads a union selector and body.
    pub fn as_union(&self, desc: &TypeDescriptor) -> Result<(u8, &Value), SszError> {
        match self {
            Value::Union(selector, body) => Ok((*selector, body)),
            _ => Err(self.mismatch(desc, "union")),
        }
    }

    /// Reads a custom delegate.
    pub fn as_custom(&self, desc: &TypeDescriptor) -> Result<&CustomValue, SszError> {
        match self {
            Value::Custom(v) => Ok(v),
            _ => Err(self.mismatch(desc, "custom value")),
        }
    }
}
