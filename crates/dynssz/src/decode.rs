//! Decoder sources and descriptor-driven decoding.
//!
//! [`BufferDecoder`] reads from a byte slice and supports lazy offset
//! reads (`decode_offset_at`) and skipping; [`StreamDecoder`] reads
//! forward from an `io::Read` through a small growable buffer, looping on
//! short reads and surfacing a truncated source as [`SszError::UnexpectedEof`].
//!
//! Both maintain a LIFO stack of scoped byte-length limits. `push_limit`
//! clamps the new window to the enclosing one so nested windows cannot
//! extend their parent; `pop_limit` reports how many bytes of the popped
//! window were not consumed, which the codec uses to verify that every
//! dynamic field's body fills its window exactly.

use std::{io, sync::Arc};

use itertools::process_results;
use smallvec::SmallVec;

use crate::{
    BYTES_PER_LENGTH_OFFSET, Ctx, pool,
    descriptor::{SszKind, TypeDescriptor},
    error::SszError,
    typedef::HostKind,
    value::{BitSeq, CustomValue, Value},
};

use dynssz_primitives::{U128, U256};

/// An SSZ byte source with scoped length limits.
pub trait Decoder {
    /// Absolute bytes consumed so far.
    fn position(&self) -> usize;

    /// Bytes left in the current window.
    fn remaining(&self) -> usize;

    /// Opens a window of `n` bytes, clamped to the enclosing window.
    fn push_limit(&mut self, n: usize);

    /// Closes the innermost window, returning its unconsumed byte count.
    fn pop_limit(&mut self) -> usize;

    /// Reads one bool byte; only 0 and 1 are accepted.
    fn decode_bool(&mut self) -> Result<bool, SszError> {
        match self.decode_uint8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(SszError::InvalidValueRange { value }),
        }
    }

    /// Reads one byte.
    fn decode_uint8(&mut self) -> Result<u8, SszError>;

    /// Reads a 16-bit little-endian integer.
    fn decode_uint16(&mut self) -> Result<u16, SszError>;

    /// Reads a 32-bit little-endian integer.
    fn decode_uint32(&mut self) -> Result<u32, SszError>;

    /// Reads a 64-bit little-endian integer.
    fn decode_uint64(&mut self) -> Result<u64, SszError>;

    /// Fills `into` from the source.
    fn decode_bytes(&mut self, into: &mut [u8]) -> Result<(), SszError>;

    /// Returns a view of the next `len` bytes. The view is invalidated by
    /// the next read.
    fn decode_bytes_ref(&mut self, len: usize) -> Result<&[u8], SszError>;

    /// Reads a 4-byte offset at the current position.
    fn decode_offset(&mut self) -> Result<usize, SszError> {
        Ok(self.decode_uint32()? as usize)
    }

    /// Reads a 4-byte offset at an absolute position without moving the
    /// cursor. Seekable only.
    fn decode_offset_at(&mut self, position: usize) -> Result<usize, SszError>;

    /// Advances past `n` bytes. Seekable only.
    fn skip_bytes(&mut self, n: usize) -> Result<(), SszError>;

    /// Whether `decode_offset_at` and `skip_bytes` are available.
    fn is_seekable(&self) -> bool;
}

/// A seekable decoder over a byte slice.
#[derive(Debug)]
pub struct BufferDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    limits: SmallVec<[usize; 8]>,
}

impl<'a> BufferDecoder<'a> {
    /// Wraps `data`; the initial window is the whole slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limits: SmallVec::new(),
        }
    }

    fn end(&self) -> usize {
        self.limits.last().copied().unwrap_or(self.data.len())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SszError> {
        if self.remaining() < n {
            return Err(SszError::UnexpectedEof {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

impl Decoder for BufferDecoder<'_> {
    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.end().saturating_sub(self.pos)
    }

    fn push_limit(&mut self, n: usize) {
        let end = (self.pos + n).min(self.end());
        self.limits.push(end);
    }

    fn pop_limit(&mut self) -> usize {
        let end = self.limits.pop().expect("pop_limit without push_limit");
        end.saturating_sub(self.pos)
    }

    fn decode_uint8(&mut self) -> Result<u8, SszError> {
        Ok(self.take(1)?[0])
    }

    fn decode_uint16(&mut self) -> Result<u16, SszError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn decode_uint32(&mut self) -> Result<u32, SszError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn decode_uint64(&mut self) -> Result<u64, SszError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    fn decode_bytes(&mut self, into: &mut [u8]) -> Result<(), SszError> {
        let src = self.take(into.len())?;
        into.copy_from_slice(src);
        Ok(())
    }

    fn decode_bytes_ref(&mut self, len: usize) -> Result<&[u8], SszError> {
        self.take(len)
    }

    fn decode_offset_at(&mut self, position: usize) -> Result<usize, SszError> {
        let end = position + BYTES_PER_LENGTH_OFFSET;
        if end > self.data.len() {
            return Err(SszError::UnexpectedEof {
                needed: BYTES_PER_LENGTH_OFFSET,
                available: self.data.len().saturating_sub(position),
            });
        }
        let b = &self.data[position..end];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn skip_bytes(&mut self, n: usize) -> Result<(), SszError> {
        self.take(n).map(|_| ())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

const STREAM_BUF_MIN: usize = 8;

/// A forward-only decoder over `io::Read`.
#[derive(Debug)]
pub struct StreamDecoder<R: io::Read> {
    source: R,
    buf: Vec<u8>,
    start: usize,
    filled: usize,
    consumed: usize,
    total: usize,
    limits: SmallVec<[usize; 8]>,
}

impl<R: io::Read> StreamDecoder<R> {
    /// Wraps `source`, which must deliver exactly `total` bytes of SSZ.
    pub fn new(source: R, total: usize) -> Self {
        Self {
            source,
            buf: vec![0u8; STREAM_BUF_MIN],
            start: 0,
            filled: 0,
            consumed: 0,
            total,
            limits: SmallVec::new(),
        }
    }

    fn end(&self) -> usize {
        self.limits.last().copied().unwrap_or(self.total)
    }

    fn buffered(&self) -> usize {
        self.filled - self.start
    }

    /// Ensures `n` bytes are buffered, compacting and growing the buffer
    /// as needed and looping on short reads.
    fn fill(&mut self, n: usize) -> Result<(), SszError> {
        if self.buffered() >= n {
            return Ok(());
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }
        if self.buf.len() < n {
            self.buf.resize(n, 0);
        }
        while self.filled < n {
            let read = self.source.read(&mut self.buf[self.filled..n])?;
            if read == 0 {
                return Err(SszError::UnexpectedEof {
                    needed: n,
                    available: self.filled,
                });
            }
            self.filled += read;
        }
        Ok(())
    }

    fn check_window(&self, n: usize) -> Result<(), SszError> {
        if self.remaining() < n {
            return Err(SszError::UnexpectedEof {
                needed: n,
                available: self.remaining(),
            });
        }
        Ok(())
    }
}

impl<R: io::Read> Decoder for StreamDecoder<R> {
    fn position(&self) -> usize {
        self.consumed
    }

    fn remaining(&self) -> usize {
        self.end().saturating_sub(self.consumed)
    }

    fn push_limit(&mut self, n: usize) {
        let end = (self.consumed + n).min(self.end());
        self.limits.push(end);
    }

    fn pop_limit(&mut self) -> usize {
        let end = self.limits.pop().expect("pop_limit without push_limit");
        end.saturating_sub(self.consumed)
    }

    fn decode_uint8(&mut self) -> Result<u8, SszError> {
        Ok(self.decode_bytes_ref(1)?[0])
    }

    fn decode_uint16(&mut self) -> Result<u16, SszError> {
        let b = self.decode_bytes_ref(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn decode_uint32(&mut self) -> Result<u32, SszError> {
        let b = self.decode_bytes_ref(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn decode_uint64(&mut self) -> Result<u64, SszError> {
        let b = self.decode_bytes_ref(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    fn decode_bytes(&mut self, into: &mut [u8]) -> Result<(), SszError> {
        self.check_window(into.len())?;
        // Drain buffered bytes first, then read straight into the
        // destination.
        let from_buf = self.buffered().min(into.len());
        into[..from_buf].copy_from_slice(&self.buf[self.start..self.start + from_buf]);
        self.start += from_buf;
        self.consumed += from_buf;
        let mut done = from_buf;
        while done < into.len() {
            let read = self.source.read(&mut into[done..])?;
            if read == 0 {
                return Err(SszError::UnexpectedEof {
                    needed: into.len(),
                    available: done,
                });
            }
            done += read;
            self.consumed += read;
        }
        Ok(())
    }

    fn decode_bytes_ref(&mut self, len: usize) -> Result<&[u8], SszError> {
        self.check_window(len)?;
        self.fill(len)?;
        let slice = &self.buf[self.start..self.start + len];
        self.start += len;
        self.consumed += len;
        Ok(slice)
    }

    fn decode_offset_at(&mut self, _position: usize) -> Result<usize, SszError> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "random-access offset read on a non-seekable decoder",
        )
        .into())
    }

    fn skip_bytes(&mut self, _n: usize) -> Result<(), SszError> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "skip on a non-seekable decoder",
        )
        .into())
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Opens a window of exactly `n` bytes, runs `f`, and verifies the window
/// was fully consumed. `pop_limit` runs on error paths too.
fn with_window<T>(
    dec: &mut dyn Decoder,
    n: usize,
    f: impl FnOnce(&mut dyn Decoder) -> Result<T, SszError>,
) -> Result<T, SszError> {
    if dec.remaining() < n {
        return Err(SszError::UnexpectedEof {
            needed: n,
            available: dec.remaining(),
        });
    }
    dec.push_limit(n);
    let result = f(dec);
    let leftover = dec.pop_limit();
    let value = result?;
    if leftover != 0 {
        return Err(SszError::SizeMismatch {
            claimed: n,
            consumed: n - leftover,
        });
    }
    Ok(value)
}

/// Decodes one value of `desc`. Dynamic values consume the entire current
/// window; static values consume exactly their fixed size.
pub(crate) fn decode_value(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    let value = decode_plain(ctx, desc, dec)?;
    // Pointer-wrapped slots are allocated around the decoded payload.
    if desc.host.is_pointer {
        Ok(Value::Optional(Some(Box::new(value))))
    } else {
        Ok(value)
    }
}

fn decode_plain(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    match desc.kind {
        SszKind::Bool => Ok(Value::Bool(dec.decode_bool()?)),
        SszKind::Uint8 => Ok(Value::Uint8(dec.decode_uint8()?)),
        SszKind::Uint16 => Ok(Value::Uint16(dec.decode_uint16()?)),
        SszKind::Uint32 => Ok(Value::Uint32(dec.decode_uint32()?)),
        SszKind::Uint64 => Ok(Value::Uint64(dec.decode_uint64()?)),
        SszKind::Uint128 => {
            let mut raw = [0u8; 16];
            dec.decode_bytes(&mut raw)?;
            if desc.runtime.kind() == HostKind::Uint128 {
                Ok(Value::Uint128(U128::from_le_bytes(raw)))
            } else {
                Ok(Value::Bytes(raw.to_vec()))
            }
        }
        SszKind::Uint256 => {
            let mut raw = [0u8; 32];
            dec.decode_bytes(&mut raw)?;
            if desc.runtime.kind() == HostKind::Uint256 {
                Ok(Value::Uint256(U256::from_le_bytes(raw)))
            } else {
                Ok(Value::Bytes(raw.to_vec()))
            }
        }

        SszKind::Bitvector => {
            let mut raw = vec![0u8; desc.size];
            dec.decode_bytes(&mut raw)?;
            let bits = BitSeq::from_bitvector_bytes(raw, desc.bit_length.unwrap_or(0))?;
            Ok(Value::Bits(bits))
        }

        SszKind::Bitlist | SszKind::ProgressiveBitlist => {
            let window = dec.remaining();
            if window == 0 {
                return Err(SszError::BitlistNotTerminated);
            }
            let raw = dec.decode_bytes_ref(window)?;
            let bits = BitSeq::from_bitlist_bytes(raw)?;
            if let Some(limit) = desc.limit
                && bits.len() as u64 > limit
            {
                return Err(SszError::ListTooBig {
                    len: bits.len(),
                    max: limit as usize,
                });
            }
            Ok(Value::Bits(bits))
        }

        SszKind::Vector => decode_vector(ctx, desc, dec),
        SszKind::List | SszKind::ProgressiveList => decode_list(ctx, desc, dec),
        SszKind::Container | SszKind::ProgressiveContainer => {
            decode_container(ctx, desc, dec)
        }

        SszKind::CompatibleUnion => {
            if dec.remaining() < 1 {
                return Err(SszError::UnexpectedEof {
                    needed: 1,
                    available: 0,
                });
            }
            let selector = dec.decode_uint8()?;
            let variant = desc
                .variants
                .get(selector as usize)
                .ok_or(SszError::InvalidUnionVariant { selector })?;
            let body = if variant.flags.is_dynamic {
                decode_value(ctx, variant, dec)?
            } else {
                let body = decode_value(ctx, variant, dec)?;
                if dec.remaining() != 0 {
                    return Err(SszError::SizeMismatch {
                        claimed: variant.size,
                        consumed: variant.size + dec.remaining(),
                    });
                }
                body
            };
            Ok(Value::Union(selector, Box::new(body)))
        }

        SszKind::TypeWrapper => {
            decode_value(ctx, desc.wrapped.as_ref().expect("wrapper has inner"), dec)
        }

        SszKind::Custom => decode_custom(ctx, desc, dec),
    }
}

fn decode_vector(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    let element = desc.element.as_ref().expect("vector has element");

    if !desc.flags.is_dynamic {
        if desc.host.is_byte_array {
            let mut raw = vec![0u8; desc.length];
            dec.decode_bytes(&mut raw)?;
            return Ok(Value::Bytes(raw));
        }
        let mut items = Vec::with_capacity(desc.length);
        for _ in 0..desc.length {
            items.push(decode_value(ctx, element, dec)?);
        }
        return Ok(Value::Vector(items));
    }

    // Dynamic elements: N offsets, then bodies. The first offset must be
    // exactly the offset table's size.
    let window = dec.remaining();
    let count = desc.length;
    let table = count * BYTES_PER_LENGTH_OFFSET;
    let items = decode_offset_delimited(ctx, element, dec, window, count, table)?;
    if items.len() != count {
        return Err(SszError::IncorrectVectorLength {
            len: items.len(),
            expected: count,
        });
    }
    Ok(Value::Vector(items))
}

fn decode_list(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    let window = dec.remaining();

    if desc.host.is_byte_array || desc.host.is_string {
        check_list_limit(desc, window)?;
        let mut raw = vec![0u8; window];
        dec.decode_bytes(&mut raw)?;
        return Ok(Value::Bytes(raw));
    }

    let element = desc.element.as_ref().expect("list has element");

    if !element.flags.is_dynamic {
        // Length is recovered by dividing total bytes by element size.
        if window % element.size != 0 {
            return Err(SszError::InvalidByteLength {
                len: window,
                expected: element.size,
            });
        }
        let count = window / element.size;
        check_list_limit(desc, count)?;
        let items = process_results(
            (0..count).map(|_| decode_value(ctx, element, dec)),
            |iter| iter.collect::<Vec<_>>(),
        )?;
        return Ok(Value::List(items));
    }

    if window == 0 {
        return Ok(Value::List(Vec::new()));
    }

    // The first offset, divided by 4, yields the element count.
    let first = dec.decode_offset()?;
    if first == 0
        || first % BYTES_PER_LENGTH_OFFSET != 0
        || first > window
    {
        return Err(SszError::IncorrectOffset {
            offset: first,
            limit: window,
        });
    }
    let count = first / BYTES_PER_LENGTH_OFFSET;
    check_list_limit(desc, count)?;
    let items = decode_offset_bodies(ctx, element, dec, window, count, first)?;
    Ok(Value::List(items))
}

fn check_list_limit(desc: &TypeDescriptor, len: usize) -> Result<(), SszError> {
    if let Some(limit) = desc.limit
        && len as u64 > limit
    {
        return Err(SszError::ListTooBig {
            len,
            max: limit as usize,
        });
    }
    Ok(())
}

/// Reads an offset table of exactly `count` entries whose first entry must
/// equal `table`, then decodes the bodies.
fn decode_offset_delimited(
    ctx: &Ctx<'_>,
    element: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
    window: usize,
    count: usize,
    table: usize,
) -> Result<Vec<Value>, SszError> {
    if count == 0 {
        if window != 0 {
            return Err(SszError::IncorrectOffset {
                offset: window,
                limit: 0,
            });
        }
        return Ok(Vec::new());
    }
    let first = dec.decode_offset()?;
    if first != table {
        return Err(SszError::IncorrectOffset {
            offset: first,
            limit: window,
        });
    }
    decode_offset_bodies(ctx, element, dec, window, count, first)
}

/// Decodes `count - 1` further offsets plus all element bodies. The first
/// offset `first` has already been read and validated against the table
/// size.
fn decode_offset_bodies(
    ctx: &Ctx<'_>,
    element: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
    window: usize,
    count: usize,
    first: usize,
) -> Result<Vec<Value>, SszError> {
    let mut offsets = pool::take_offsets();
    let result = (|| {
        offsets.push(first);
        for _ in 1..count {
            let offset = dec.decode_offset()?;
            if offset < *offsets.last().expect("non-empty") || offset > window {
                return Err(SszError::IncorrectOffset {
                    offset,
                    limit: window,
                });
            }
            offsets.push(offset);
        }
        let mut items = Vec::with_capacity(count);
        for (i, &offset) in offsets.iter().enumerate() {
            let next = offsets.get(i + 1).copied().unwrap_or(window);
            let body =
                with_window(dec, next - offset, |dec| decode_value(ctx, element, dec))?;
            items.push(body);
        }
        Ok(items)
    })();
    pool::give_offsets(offsets);
    result
}

fn decode_container(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    let slots = desc
        .fields
        .iter()
        .map(|f| f.field_index + 1)
        .max()
        .unwrap_or(0);
    let mut values = vec![Value::Bool(false); slots];

    if !desc.flags.is_dynamic {
        for field in &desc.fields {
            values[field.field_index] = decode_value(ctx, &field.desc, dec)?;
        }
        return Ok(Value::Container(values));
    }

    let window = dec.remaining();
    if window < desc.length {
        return Err(SszError::UnexpectedEof {
            needed: desc.length,
            available: window,
        });
    }
    let base = dec.position();

    if dec.is_seekable() {
        // Fixed-region pass: static fields decode in place, offset slots
        // are skipped and read lazily afterwards.
        for field in &desc.fields {
            if field.desc.flags.is_dynamic {
                dec.skip_bytes(BYTES_PER_LENGTH_OFFSET)?;
            } else {
                values[field.field_index] = decode_value(ctx, &field.desc, dec)?;
            }
        }
        for (i, dyn_ref) in desc.dyn_fields.iter().enumerate() {
            let offset = dec.decode_offset_at(base + dyn_ref.header_offset)?;
            validate_field_offset(desc, i, offset, None, window)?;
            let next = match desc.dyn_fields.get(i + 1) {
                Some(next_ref) => {
                    let next = dec.decode_offset_at(base + next_ref.header_offset)?;
                    validate_field_offset(desc, i + 1, next, Some(offset), window)?;
                    next
                }
                None => window,
            };
            let field = &desc.fields[dyn_ref.field];
            values[field.field_index] =
                with_window(dec, next - offset, |dec| decode_value(ctx, &field.desc, dec))?;
        }
    } else {
        // Offsets are captured up front into a pooled scratch vector.
        let mut offsets = pool::take_offsets();
        let result: Result<(), SszError> = (|| {
            for field in &desc.fields {
                if field.desc.flags.is_dynamic {
                    let offset = dec.decode_offset()?;
                    validate_field_offset(
                        desc,
                        offsets.len(),
                        offset,
                        offsets.last().copied(),
                        window,
                    )?;
                    offsets.push(offset);
                } else {
                    values[field.field_index] = decode_value(ctx, &field.desc, dec)?;
                }
            }
            for (i, dyn_ref) in desc.dyn_fields.iter().enumerate() {
                let offset = offsets[i];
                let next = offsets.get(i + 1).copied().unwrap_or(window);
                let field = &desc.fields[dyn_ref.field];
                values[field.field_index] = with_window(dec, next - offset, |dec| {
                    decode_value(ctx, &field.desc, dec)
                })?;
            }
            Ok(())
        })();
        pool::give_offsets(offsets);
        result?;
    }

    Ok(Value::Container(values))
}

/// Validates one dynamic-field offset: the first must equal the
/// fixed-region length, later ones must be non-decreasing, and none may
/// exceed the window.
fn validate_field_offset(
    desc: &TypeDescriptor,
    index: usize,
    offset: usize,
    prev: Option<usize>,
    window: usize,
) -> Result<(), SszError> {
    if index == 0 {
        if offset != desc.length {
            return Err(SszError::IncorrectOffset {
                offset,
                limit: window,
            });
        }
    } else if let Some(prev) = prev
        && offset < prev
    {
        return Err(SszError::IncorrectOffset {
            offset,
            limit: window,
        });
    }
    if offset > window {
        return Err(SszError::IncorrectOffset {
            offset,
            limit: window,
        });
    }
    Ok(())
}

fn decode_custom(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    dec: &mut dyn Decoder,
) -> Result<Value, SszError> {
    let vtable = desc.runtime.vtable().ok_or_else(|| {
        SszError::CustomTypeMissingImplementation {
            type_name: desc.type_name().to_string(),
        }
    })?;
    let mut delegate = (vtable.fresh)();
    let len = if desc.flags.is_dynamic {
        dec.remaining()
    } else {
        desc.size
    };
    let view_active = desc.runtime.id() != desc.schema.id();

    if view_active && desc.compat.view_unmarshal {
        let bytes = dec.decode_bytes_ref(len)?;
        if let Some(result) = delegate.unmarshal_ssz_view(ctx.specs, &desc.schema, bytes) {
            result?;
            return Ok(Value::Custom(CustomValue::new(delegate)));
        }
        return Err(SszError::CustomTypeMissingImplementation {
            type_name: desc.type_name().to_string(),
        });
    }
    if desc.compat.decoder_aware
        && let Some(result) = delegate.unmarshal_ssz_decoder(ctx.specs, dec)
    {
        result?;
        return Ok(Value::Custom(CustomValue::new(delegate)));
    }
    let bytes = dec.decode_bytes_ref(len)?;
    if desc.compat.dyn_unmarshal
        && let Some(result) = delegate.unmarshal_ssz_dyn(ctx.specs, bytes)
    {
        result?;
        return Ok(Value::Custom(CustomValue::new(delegate)));
    }
    if desc.compat.legacy_unmarshal && !ctx.no_fast_ssz && desc.legacy_fast_path_allowed() {
        delegate.unmarshal_ssz(bytes)?;
        return Ok(Value::Custom(CustomValue::new(delegate)));
    }
    Err(SszError::CustomTypeMissingImplementation {
        type_name: desc.type_name().to_string(),
    })
}
