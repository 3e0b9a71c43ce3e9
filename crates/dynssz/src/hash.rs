//! The hash-tree-root engine.
//!
//! [`HashWalker`] is the merkleization sink: callers append primitive
//! bytes and 32-byte chunks into a scratch region (opened with
//! [`HashWalker::index`]) and collapse the region to a single root chunk
//! with one of the merkleize operations. [`Hasher`] is the provided
//! implementation; the descriptor-driven `hash_value` walk drives it, and
//! fast-path delegates receive it directly.

use std::sync::Arc;

use dynssz_primitives::Hash256;

use crate::{
    Ctx,
    descriptor::{SszKind, TypeDescriptor},
    error::SszError,
    merkle::{
        BYTES_PER_CHUNK, merkleize_chunks, merkleize_progressive, mix_in_length,
    },
    size::field_slot,
    value::{BitSeq, Value},
};

/// The merkleization sink consumed by the hash-tree-root engine.
pub trait HashWalker {
    /// Appends a bool as a 1-byte little-endian value.
    fn append_bool(&mut self, v: bool) {
        self.append_uint8(u8::from(v));
    }

    /// Appends one byte.
    fn append_uint8(&mut self, v: u8);

    /// Appends a 32-bit little-endian value.
    fn append_uint32(&mut self, v: u32);

    /// Appends a 64-bit little-endian value.
    fn append_uint64(&mut self, v: u64);

    /// Appends raw bytes.
    fn append_bytes(&mut self, bytes: &[u8]);

    /// Appends one full 32-byte chunk.
    fn append_chunk(&mut self, chunk: &Hash256) {
        self.append_bytes(chunk.as_slice());
    }

    /// Packs a uint64 array and merkleizes it with a length mixin, using
    /// a capacity of `limit` elements.
    fn put_uint64_list(&mut self, values: &[u64], limit: u64) {
        let indx = self.index();
        for v in values {
            self.append_uint64(*v);
        }
        self.fill_up_to_32();
        let leaf_limit = (limit as usize * 8).div_ceil(BYTES_PER_CHUNK);
        self.merkleize_with_mixin(indx, values.len() as u64, leaf_limit);
    }

    /// Appends bitlist data bits and merkleizes with the bit-count mixin,
    /// using a capacity of `max_bits`.
    fn put_bitlist(&mut self, bits: &BitSeq, max_bits: u64) {
        let indx = self.index();
        self.append_bytes(bits.as_slice());
        self.fill_up_to_32();
        let leaf_limit = (max_bits as usize).div_ceil(BYTES_PER_CHUNK * 8);
        self.merkleize_with_mixin(indx, bits.len() as u64, leaf_limit);
    }

    /// Appends bitlist data bits and merkleizes progressively with the
    /// bit-count mixin.
    fn put_progressive_bitlist(&mut self, bits: &BitSeq) {
        let indx = self.index();
        self.append_bytes(bits.as_slice());
        self.fill_up_to_32();
        self.merkleize_progressive_with_mixin(indx, bits.len() as u64);
    }

    /// Zero-pads the scratch region to a chunk boundary.
    fn fill_up_to_32(&mut self);

    /// Opens a scratch region, returning its handle.
    fn index(&self) -> usize;

    /// Collapses the region opened at `indx` to one root chunk, padding
    /// the leaf count to the next power of two of `leaf_limit` (0 = the
    /// chunk count itself).
    fn merkleize(&mut self, indx: usize, leaf_limit: usize);

    /// Like [`HashWalker::merkleize`], then mixes in `length`.
    fn merkleize_with_mixin(&mut self, indx: usize, length: u64, leaf_limit: usize);

    /// Collapses the region progressively (1, 4, 16, ... leaf subtrees).
    fn merkleize_progressive(&mut self, indx: usize);

    /// Progressive merkleization followed by a length mixin.
    fn merkleize_progressive_with_mixin(&mut self, indx: usize, length: u64);
}

/// The default [`HashWalker`] over an in-memory chunk stack.
#[derive(Debug, Default)]
pub struct Hasher {
    buf: Vec<u8>,
}

impl Hasher {
    /// An empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// The final root. The walk must have collapsed everything to exactly
    /// one chunk.
    pub fn root(&self) -> Result<Hash256, SszError> {
        if self.buf.len() != BYTES_PER_CHUNK {
            return Err(SszError::SizeMismatch {
                claimed: BYTES_PER_CHUNK,
                consumed: self.buf.len(),
            });
        }
        Ok(Hash256::from_slice(&self.buf))
    }

    fn collapse(&mut self, indx: usize, root: Hash256) {
        self.buf.truncate(indx);
        self.buf.extend_from_slice(root.as_slice());
    }
}

impl HashWalker for Hasher {
    fn append_uint8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn append_uint32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn append_uint64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn fill_up_to_32(&mut self) {
        let rem = self.buf.len() % BYTES_PER_CHUNK;
        if rem != 0 {
            self.buf.resize(self.buf.len() + BYTES_PER_CHUNK - rem, 0);
        }
    }

    fn index(&self) -> usize {
        self.buf.len()
    }

    fn merkleize(&mut self, indx: usize, leaf_limit: usize) {
        self.fill_up_to_32();
        let root = merkleize_chunks(&self.buf[indx..], leaf_limit);
        self.collapse(indx, root);
    }

    fn merkleize_with_mixin(&mut self, indx: usize, length: u64, leaf_limit: usize) {
        self.fill_up_to_32();
        let root = merkleize_chunks(&self.buf[indx..], leaf_limit);
        self.collapse(indx, mix_in_length(&root, length));
    }

    fn merkleize_progressive(&mut self, indx: usize) {
        self.fill_up_to_32();
        let root = merkleize_progressive(&self.buf[indx..]);
        self.collapse(indx, root);
    }

    fn merkleize_progressive_with_mixin(&mut self, indx: usize, length: u64) {
        self.fill_up_to_32();
        let root = merkleize_progressive(&self.buf[indx..]);
        self.collapse(indx, mix_in_length(&root, length));
    }
}

/// Hashes `value` under `desc` into `walker`, leaving exactly one root
/// chunk on the region stack.
pub(crate) fn hash_value(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let default_storage;
    let value = match value {
        Value::Optional(Some(inner)) => inner.as_ref(),
        Value::Optional(None) => {
            default_storage = Value::default_for(desc);
            &default_storage
        }
        other => other,
    };

    match desc.kind {
        SszKind::Bool | SszKind::Uint8 | SszKind::Uint16 | SszKind::Uint32
        | SszKind::Uint64 | SszKind::Uint128 | SszKind::Uint256 => {
            append_basic(desc, value, walker)?;
            walker.fill_up_to_32();
            Ok(())
        }

        SszKind::Bitvector => {
            let bits = value.as_bits(desc)?;
            let indx = walker.index();
            walker.append_bytes(bits.as_slice());
            walker.fill_up_to_32();
            let leaf_limit = desc
                .bit_length
                .unwrap_or(0)
                .div_ceil(BYTES_PER_CHUNK * 8);
            walker.merkleize(indx, leaf_limit);
            Ok(())
        }

        SszKind::Bitlist => {
            let bits = value.as_bits(desc)?;
            walker.put_bitlist(bits, desc.limit_or_zero());
            Ok(())
        }

        SszKind::ProgressiveBitlist => {
            let bits = value.as_bits(desc)?;
            walker.put_progressive_bitlist(bits);
            Ok(())
        }

        SszKind::Vector => hash_vector(ctx, desc, value, walker),
        SszKind::List => hash_list(ctx, desc, value, walker),
        SszKind::ProgressiveList => hash_progressive_list(ctx, desc, value, walker),
        SszKind::Container => hash_container(ctx, desc, value, walker),
        SszKind::ProgressiveContainer => {
            hash_progressive_container(ctx, desc, value, walker)
        }

        SszKind::CompatibleUnion => {
            let (selector, body) = value.as_union(desc)?;
            let variant = desc
                .variants
                .get(selector as usize)
                .ok_or(SszError::InvalidUnionVariant { selector })?;
            let indx = walker.index();
            hash_value(ctx, variant, body, walker)?;
            // The selector mixes in as the final chunk.
            let mut chunk = [0u8; BYTES_PER_CHUNK];
            chunk[0] = selector;
            walker.append_bytes(&chunk);
            walker.merkleize(indx, 0);
            Ok(())
        }

        SszKind::TypeWrapper => hash_value(
            ctx,
            desc.wrapped.as_ref().expect("wrapper has inner"),
            value,
            walker,
        ),

        SszKind::Custom => hash_custom(ctx, desc, value, walker),
    }
}

/// Appends a basic value's packed little-endian bytes, without padding.
fn append_basic(
    desc: &TypeDescriptor,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    match desc.kind {
        SszKind::Bool => walker.append_bool(value.as_bool(desc)?),
        SszKind::Uint8 => walker.append_uint8(value.as_u64(desc)? as u8),
        SszKind::Uint16 => {
            let v = value.as_u64(desc)? as u16;
            walker.append_bytes(&v.to_le_bytes());
        }
        SszKind::Uint32 => walker.append_uint32(value.as_u64(desc)? as u32),
        SszKind::Uint64 => walker.append_uint64(value.as_u64(desc)?),
        SszKind::Uint128 => match value {
            Value::Uint128(v) => walker.append_bytes(&v.to_le_bytes::<16>()),
            other => walker.append_bytes(other.as_bytes(desc)?),
        },
        SszKind::Uint256 => match value {
            Value::Uint256(v) => walker.append_bytes(&v.to_le_bytes::<32>()),
            other => walker.append_bytes(other.as_bytes(desc)?),
        },
        _ => unreachable!("append_basic on non-basic kind"),
    }
    Ok(())
}

/// Appends the packed chunks of a sequence of basic elements, padding a
/// short vector tail with zero elements.
fn append_packed(
    desc: &Arc<TypeDescriptor>,
    element: &Arc<TypeDescriptor>,
    value: &Value,
    expect_len: Option<usize>,
    walker: &mut dyn HashWalker,
) -> Result<usize, SszError> {
    if desc.host.is_byte_array || desc.host.is_string {
        let bytes = value.as_bytes(desc)?;
        walker.append_bytes(bytes);
        if let Some(n) = expect_len
            && bytes.len() < n
        {
            walker.append_bytes(&vec![0u8; n - bytes.len()]);
        }
        return Ok(bytes.len());
    }
    let items = value.as_elements(desc)?;
    for item in items {
        append_basic(element, item, walker)?;
    }
    if let Some(n) = expect_len
        && items.len() < n
    {
        let default = Value::default_for(element);
        for _ in items.len()..n {
            append_basic(element, &default, walker)?;
        }
    }
    Ok(items.len())
}

fn hash_vector(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let element = desc.element.as_ref().expect("vector has element");
    let indx = walker.index();
    if element.kind.is_basic() {
        append_packed(desc, element, value, Some(desc.length), walker)?;
        walker.fill_up_to_32();
        let leaf_limit = (desc.length * element.size).div_ceil(BYTES_PER_CHUNK);
        walker.merkleize(indx, leaf_limit);
    } else {
        let items = value.as_elements(desc)?;
        for item in items {
            hash_value(ctx, element, item, walker)?;
        }
        if items.len() < desc.length {
            let default = Value::default_for(element);
            for _ in items.len()..desc.length {
                hash_value(ctx, element, &default, walker)?;
            }
        }
        walker.merkleize(indx, desc.length);
    }
    Ok(())
}

fn hash_list(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let element = desc.element.as_ref().expect("list has element");
    let indx = walker.index();
    if element.kind.is_basic() {
        let len = append_packed(desc, element, value, None, walker)?;
        walker.fill_up_to_32();
        let leaf_limit =
            (desc.limit_or_zero() as usize * element.size).div_ceil(BYTES_PER_CHUNK);
        walker.merkleize_with_mixin(indx, len as u64, leaf_limit);
    } else {
        let items = value.as_elements(desc)?;
        for item in items {
            hash_value(ctx, element, item, walker)?;
        }
        walker.merkleize_with_mixin(
            indx,
            items.len() as u64,
            desc.limit_or_zero() as usize,
        );
    }
    Ok(())
}

fn hash_progressive_list(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let element = desc.element.as_ref().expect("list has element");
    let indx = walker.index();
    let len = if element.kind.is_basic() {
        append_packed(desc, element, value, None, walker)?
    } else {
        let items = value.as_elements(desc)?;
        for item in items {
            hash_value(ctx, element, item, walker)?;
        }
        items.len()
    };
    walker.merkleize_progressive_with_mixin(indx, len as u64);
    Ok(())
}

fn hash_container(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let slots = value.as_container(desc)?;
    let indx = walker.index();
    for field in &desc.fields {
        let slot = field_slot(desc, slots, field.field_index)?;
        hash_value(ctx, &field.desc, slot, walker)?;
    }
    walker.merkleize(indx, 0);
    Ok(())
}

fn hash_progressive_container(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let slots = value.as_container(desc)?;
    let indx = walker.index();
    let max_index = desc
        .fields
        .iter()
        .filter_map(|f| f.ssz_index)
        .max()
        .unwrap_or(0) as usize;

    // Field roots sit at their ssz-index; gaps are zero chunks.
    let mut active = BitSeq::with_len(max_index + 1);
    let mut next_field = desc.fields.iter().peekable();
    for position in 0..=max_index {
        match next_field.peek() {
            Some(field) if field.ssz_index == Some(position as u64) => {
                let field = next_field.next().expect("peeked");
                let slot = field_slot(desc, slots, field.field_index)?;
                hash_value(ctx, &field.desc, slot, walker)?;
                active.set(position, true);
            }
            _ => walker.append_chunk(&Hash256::ZERO),
        }
    }
    walker.merkleize_progressive(indx);

    // Mix in the active-fields bitvector as the sibling chunk.
    let mut active_chunk = [0u8; BYTES_PER_CHUNK];
    active_chunk[..active.as_slice().len()].copy_from_slice(active.as_slice());
    walker.append_bytes(&active_chunk);
    walker.merkleize(indx, 0);
    Ok(())
}

fn hash_custom(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    walker: &mut dyn HashWalker,
) -> Result<(), SszError> {
    let delegate = value.as_custom(desc)?.delegate();
    let view_active = desc.runtime.id() != desc.schema.id();

    if view_active
        && desc.compat.view_hash
        && let Some(result) = delegate.hash_tree_root_view(ctx.specs, &desc.schema, walker)
    {
        return result;
    }
    if desc.compat.dyn_hash
        && let Some(result) = delegate.hash_tree_root_dyn(ctx.specs, walker)
    {
        return result;
    }
    if desc.compat.legacy_hash && !ctx.no_fast_ssz && desc.legacy_fast_path_allowed() {
        return delegate.hash_tree_root_with(walker);
    }
    Err(SszError::CustomTypeMissingImplementation {
        type_name: desc.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::hash32_concat;

    #[test]
    fn hasher_collapses_regions() {
        let mut hasher = Hasher::new();
        let indx = hasher.index();
        hasher.append_uint64(1);
        hasher.fill_up_to_32();
        hasher.append_uint64(2);
        hasher.fill_up_to_32();
        hasher.merkleize(indx, 0);

        let mut c1 = [0u8; 32];
        c1[0] = 1;
        let mut c2 = [0u8; 32];
        c2[0] = 2;
        assert_eq!(hasher.root().unwrap(), hash32_concat(&c1, &c2));
    }

    #[test]
    fn root_requires_single_chunk() {
        let mut hasher = Hasher::new();
        hasher.append_uint8(1);
        assert!(hasher.root().is_err());
    }

    #[test]
    fn put_uint64_list_mixes_length() {
        let mut hasher = Hasher::new();
        hasher.put_uint64_list(&[5, 6], 4);
        let mut packed = [0u8; 32];
        packed[0] = 5;
        packed[8] = 6;
        let root = merkleize_chunks(&packed, 1);
        assert_eq!(hasher.root().unwrap(), mix_in_length(&root, 2));
    }
}
