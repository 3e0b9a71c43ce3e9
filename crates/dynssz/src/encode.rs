//! Encoder sinks and descriptor-driven encoding.
//!
//! Two sink flavors exist: [`BufferEncoder`] is seekable and backfills
//! offset slots after writing variable-region bodies; [`StreamEncoder`]
//! writes strictly forward into an `io::Write`, so dynamic-field offsets
//! are computed from the size pass before the fixed region is emitted.
//! Both produce identical bytes for the same descriptor and value.

use std::{io, sync::Arc};

use crate::{
    BYTES_PER_LENGTH_OFFSET, Ctx,
    descriptor::{SszKind, TypeDescriptor},
    error::SszError,
    pool::ZERO_BLOCK,
    size::{field_slot, size_value},
    value::Value,
};

/// An SSZ byte sink. All integers are little-endian.
pub trait Encoder {
    /// Writes a bool as one byte.
    fn encode_bool(&mut self, v: bool) -> Result<(), SszError> {
        self.encode_uint8(u8::from(v))
    }

    /// Writes one byte.
    fn encode_uint8(&mut self, v: u8) -> Result<(), SszError>;

    /// Writes a 16-bit little-endian integer.
    fn encode_uint16(&mut self, v: u16) -> Result<(), SszError>;

    /// Writes a 32-bit little-endian integer.
    fn encode_uint32(&mut self, v: u32) -> Result<(), SszError>;

    /// Writes a 64-bit little-endian integer.
    fn encode_uint64(&mut self, v: u64) -> Result<(), SszError>;

    /// Writes raw bytes.
    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError>;

    /// Writes a 4-byte offset at the current position.
    fn encode_offset(&mut self, offset: usize) -> Result<(), SszError>;

    /// Backfills a 4-byte offset at an earlier position. Seekable only.
    fn encode_offset_at(&mut self, position: usize, offset: usize) -> Result<(), SszError>;

    /// Writes `n` zero bytes.
    fn encode_zero_padding(&mut self, n: usize) -> Result<(), SszError> {
        let mut left = n;
        while left > 0 {
            let take = left.min(ZERO_BLOCK.len());
            self.encode_bytes(&ZERO_BLOCK[..take])?;
            left -= take;
        }
        Ok(())
    }

    /// Bytes written so far.
    fn position(&self) -> usize;

    /// Whether `encode_offset_at` is available.
    fn is_seekable(&self) -> bool;
}

fn offset_to_u32(offset: usize) -> Result<u32, SszError> {
    u32::try_from(offset).map_err(|_| SszError::IncorrectOffset {
        offset,
        limit: u32::MAX as usize,
    })
}

/// A random-access, growable buffer sink.
#[derive(Debug, Default)]
pub struct BufferEncoder {
    buf: Vec<u8>,
}

impl BufferEncoder {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses a preallocated buffer, appending after its current length.
    pub fn with_buffer(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// The bytes written so far.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Replaces the underlying buffer.
    pub fn set_buffer(&mut self, buf: Vec<u8>) {
        self.buf = buf;
    }

    /// Consumes the encoder, returning the buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }
}

impl Encoder for BufferEncoder {
    fn encode_uint8(&mut self, v: u8) -> Result<(), SszError> {
        self.buf.push(v);
        Ok(())
    }

    fn encode_uint16(&mut self, v: u16) -> Result<(), SszError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn encode_uint32(&mut self, v: u32) -> Result<(), SszError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn encode_uint64(&mut self, v: u64) -> Result<(), SszError> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn encode_offset(&mut self, offset: usize) -> Result<(), SszError> {
        self.encode_uint32(offset_to_u32(offset)?)
    }

    fn encode_offset_at(&mut self, position: usize, offset: usize) -> Result<(), SszError> {
        let bytes = offset_to_u32(offset)?.to_le_bytes();
        let limit = self.buf.len();
        let slot = self.buf.get_mut(position..position + BYTES_PER_LENGTH_OFFSET).ok_or(
            SszError::IncorrectOffset {
                offset: position,
                limit,
            },
        )?;
        slot.copy_from_slice(&bytes);
        Ok(())
    }

    fn position(&self) -> usize {
        self.buf.len()
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// A forward-only sink over `io::Write`.
///
/// Write failures latch: every later operation returns the original error
/// until the encoder is dropped.
#[derive(Debug)]
pub struct StreamEncoder<W: io::Write> {
    sink: W,
    written: usize,
    latched: Option<(io::ErrorKind, String)>,
}

impl<W: io::Write> StreamEncoder<W> {
    /// Wraps a sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            written: 0,
            latched: None,
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        if let Some((kind, msg)) = &self.latched {
            return Err(io::Error::new(*kind, msg.clone()).into());
        }
        match self.sink.write_all(bytes) {
            Ok(()) => {
                self.written += bytes.len();
                Ok(())
            }
            Err(e) => {
                self.latched = Some((e.kind(), e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Flushes and releases the sink.
    pub fn finish(mut self) -> Result<W, SszError> {
        if let Some((kind, msg)) = &self.latched {
            return Err(io::Error::new(*kind, msg.clone()).into());
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: io::Write> Encoder for StreamEncoder<W> {
    fn encode_uint8(&mut self, v: u8) -> Result<(), SszError> {
        self.write_all(&[v])
    }

    fn encode_uint16(&mut self, v: u16) -> Result<(), SszError> {
        self.write_all(&v.to_le_bytes())
    }

    fn encode_uint32(&mut self, v: u32) -> Result<(), SszError> {
        self.write_all(&v.to_le_bytes())
    }

    fn encode_uint64(&mut self, v: u64) -> Result<(), SszError> {
        self.write_all(&v.to_le_bytes())
    }

    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        self.write_all(bytes)
    }

    fn encode_offset(&mut self, offset: usize) -> Result<(), SszError> {
        self.encode_uint32(offset_to_u32(offset)?)
    }

    fn encode_offset_at(&mut self, _position: usize, _offset: usize) -> Result<(), SszError> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "offset backfill on a non-seekable encoder",
        )
        .into())
    }

    fn position(&self) -> usize {
        self.written
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Encodes `value` under `desc` into `enc`, in strict SSZ-canonical order.
pub(crate) fn encode_value(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    // Nil optionals encode as a freshly zero-valued instance.
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
        SszKind::Bool => enc.encode_bool(value.as_bool(desc)?),
        SszKind::Uint8 => enc.encode_uint8(value.as_u64(desc)? as u8),
        SszKind::Uint16 => enc.encode_uint16(value.as_u64(desc)? as u16),
        SszKind::Uint32 => enc.encode_uint32(value.as_u64(desc)? as u32),
        SszKind::Uint64 => enc.encode_uint64(value.as_u64(desc)?),
        SszKind::Uint128 => encode_wide_uint(desc, value, 16, enc),
        SszKind::Uint256 => encode_wide_uint(desc, value, 32, enc),

        SszKind::Bitvector => {
            let bits = value.as_bits(desc)?;
            let expected = desc.bit_length.unwrap_or(0);
            if bits.len() != expected {
                return Err(SszError::IncorrectVectorLength {
                    len: bits.len(),
                    expected,
                });
            }
            enc.encode_bytes(bits.as_slice())
        }

        SszKind::Bitlist | SszKind::ProgressiveBitlist => {
            let bits = value.as_bits(desc)?;
            if let Some(limit) = desc.limit
                && bits.len() as u64 > limit
            {
                return Err(SszError::ListTooBig {
                    len: bits.len(),
                    max: limit as usize,
                });
            }
            enc.encode_bytes(&bits.to_bitlist_bytes())
        }

        SszKind::Vector => encode_vector(ctx, desc, value, enc),
        SszKind::List | SszKind::ProgressiveList => encode_list(ctx, desc, value, enc),
        SszKind::Container | SszKind::ProgressiveContainer => {
            encode_container(ctx, desc, value, enc)
        }

        SszKind::CompatibleUnion => {
            let (selector, body) = value.as_union(desc)?;
            let variant = desc
                .variants
                .get(selector as usize)
                .ok_or(SszError::InvalidUnionVariant { selector })?;
            enc.encode_uint8(selector)?;
            encode_value(ctx, variant, body, enc)
        }

        SszKind::TypeWrapper => {
            encode_value(ctx, desc.wrapped.as_ref().expect("wrapper has inner"), value, enc)
        }

        SszKind::Custom => encode_custom(ctx, desc, value, enc),
    }
}

fn encode_wide_uint(
    desc: &TypeDescriptor,
    value: &Value,
    bytes: usize,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    match value {
        Value::Uint128(v) if bytes == 16 => enc.encode_bytes(&v.to_le_bytes::<16>()),
        Value::Uint256(v) if bytes == 32 => enc.encode_bytes(&v.to_le_bytes::<32>()),
        Value::Bytes(raw) => {
            if raw.len() != bytes {
                return Err(SszError::InvalidByteLength {
                    len: raw.len(),
                    expected: bytes,
                });
            }
            enc.encode_bytes(raw)
        }
        other => Err(SszError::ValueMismatch {
            type_name: desc.type_name().to_string(),
            detail: format!("expected {bytes}-byte integer, found {other:?}"),
        }),
    }
}

fn encode_vector(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    if desc.host.is_byte_array && !desc.flags.is_dynamic {
        let bytes = value.as_bytes(desc)?;
        if bytes.len() > desc.length {
            return Err(SszError::IncorrectVectorLength {
                len: bytes.len(),
                expected: desc.length,
            });
        }
        enc.encode_bytes(bytes)?;
        // Short byte arrays zero-pad to the declared length.
        return enc.encode_zero_padding(desc.length - bytes.len());
    }

    let element = desc.element.as_ref().expect("vector has element");
    let items = value.as_elements(desc)?;
    if items.len() > desc.length {
        return Err(SszError::IncorrectVectorLength {
            len: items.len(),
            expected: desc.length,
        });
    }

    if !element.flags.is_dynamic {
        for item in items {
            encode_value(ctx, element, item, enc)?;
        }
        if items.len() < desc.length {
            let default = Value::default_for(element);
            for _ in items.len()..desc.length {
                encode_value(ctx, element, &default, enc)?;
            }
        }
        Ok(())
    } else {
        let default = Value::default_for(element);
        let padded = items
            .iter()
            .chain(std::iter::repeat_n(&default, desc.length - items.len()));
        encode_dynamic_sequence(ctx, element, padded, desc.length, enc)
    }
}

fn encode_list(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    if desc.host.is_byte_array || desc.host.is_string {
        let bytes = value.as_bytes(desc)?;
        check_limit(desc, bytes.len())?;
        return enc.encode_bytes(bytes);
    }

    let element = desc.element.as_ref().expect("list has element");
    let items = value.as_elements(desc)?;
    check_limit(desc, items.len())?;

    if !element.flags.is_dynamic {
        for item in items {
            encode_value(ctx, element, item, enc)?;
        }
        Ok(())
    } else {
        encode_dynamic_sequence(ctx, element, items.iter(), items.len(), enc)
    }
}

fn check_limit(desc: &TypeDescriptor, len: usize) -> Result<(), SszError> {
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

/// Encodes a sequence of dynamic elements: `count` 4-byte offsets, then
/// the bodies in order.
fn encode_dynamic_sequence<'v>(
    ctx: &Ctx<'_>,
    element: &Arc<TypeDescriptor>,
    items: impl Iterator<Item = &'v Value> + Clone,
    count: usize,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    let base = enc.position();
    if enc.is_seekable() {
        for _ in 0..count {
            enc.encode_offset(0)?;
        }
        let mut slot = base;
        for item in items {
            let body_offset = enc.position() - base;
            enc.encode_offset_at(slot, body_offset)?;
            slot += BYTES_PER_LENGTH_OFFSET;
            encode_value(ctx, element, item, enc)?;
        }
    } else {
        let mut offset = count * BYTES_PER_LENGTH_OFFSET;
        for item in items.clone() {
            enc.encode_offset(offset)?;
            offset += size_value(ctx, element, item)?;
        }
        for item in items {
            encode_value(ctx, element, item, enc)?;
        }
    }
    Ok(())
}

fn encode_container(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    let slots = value.as_container(desc)?;
    let base = enc.position();

    if enc.is_seekable() {
        let mut slot_positions = Vec::with_capacity(desc.dyn_fields.len());
        for field in &desc.fields {
            let slot = field_slot(desc, slots, field.field_index)?;
            if field.desc.flags.is_dynamic {
                slot_positions.push(enc.position());
                enc.encode_offset(0)?;
            } else {
                encode_value(ctx, &field.desc, slot, enc)?;
            }
        }
        for (dyn_ref, slot_pos) in desc.dyn_fields.iter().zip(slot_positions) {
            let field = &desc.fields[dyn_ref.field];
            let slot = field_slot(desc, slots, field.field_index)?;
            let body_offset = enc.position() - base;
            enc.encode_offset_at(slot_pos, body_offset)?;
            encode_value(ctx, &field.desc, slot, enc)?;
        }
    } else {
        let mut offset = desc.length;
        let mut fixed_offsets = Vec::with_capacity(desc.dyn_fields.len());
        for dyn_ref in &desc.dyn_fields {
            let field = &desc.fields[dyn_ref.field];
            let slot = field_slot(desc, slots, field.field_index)?;
            fixed_offsets.push(offset);
            offset += size_value(ctx, &field.desc, slot)?;
        }
        let mut next_dyn = 0;
        for field in &desc.fields {
            let slot = field_slot(desc, slots, field.field_index)?;
            if field.desc.flags.is_dynamic {
                enc.encode_offset(fixed_offsets[next_dyn])?;
                next_dyn += 1;
            } else {
                encode_value(ctx, &field.desc, slot, enc)?;
            }
        }
        for dyn_ref in &desc.dyn_fields {
            let field = &desc.fields[dyn_ref.field];
            let slot = field_slot(desc, slots, field.field_index)?;
            encode_value(ctx, &field.desc, slot, enc)?;
        }
    }
    Ok(())
}

fn encode_custom(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
    enc: &mut dyn Encoder,
) -> Result<(), SszError> {
    let delegate = value.as_custom(desc)?.delegate();
    let view_active = desc.runtime.id() != desc.schema.id();

    if view_active && desc.compat.view_marshal {
        let mut buf = Vec::new();
        if let Some(result) = delegate.marshal_ssz_view(ctx.specs, &desc.schema, &mut buf) {
            result?;
            return enc.encode_bytes(&buf);
        }
    }
    if desc.compat.encoder_aware
        && let Some(result) = delegate.marshal_ssz_encoder(ctx.specs, enc)
    {
        return result;
    }
    if desc.compat.dyn_marshal {
        let mut buf = Vec::new();
        if let Some(result) = delegate.marshal_ssz_dyn(ctx.specs, &mut buf) {
            result?;
            return enc.encode_bytes(&buf);
        }
    }
    if desc.compat.legacy_marshal && !ctx.no_fast_ssz && desc.legacy_fast_path_allowed() {
        let mut buf = Vec::with_capacity(delegate.size_ssz());
        delegate.marshal_ssz_to(&mut buf)?;
        return enc.encode_bytes(&buf);
    }
    Err(SszError::CustomTypeMissingImplementation {
        type_name: desc.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_encoder_backfills_offsets() {
        let mut enc = BufferEncoder::new();
        enc.encode_offset(0).unwrap();
        enc.encode_uint64(7).unwrap();
        enc.encode_offset_at(0, 12).unwrap();
        assert_eq!(enc.buffer()[..4], [12, 0, 0, 0]);
        assert_eq!(enc.position(), 12);
        assert!(enc.is_seekable());
    }

    #[test]
    fn offset_backfill_out_of_range_fails() {
        let mut enc = BufferEncoder::new();
        enc.encode_uint8(1).unwrap();
        assert!(matches!(
            enc.encode_offset_at(0, 5),
            Err(SszError::IncorrectOffset { .. })
        ));
    }

    #[test]
    fn stream_encoder_latches_write_errors() {
        struct FailAfter(usize);
        impl std::io::Write for FailAfter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.0 == 0 {
                    return Err(std::io::Error::other("sink full"));
                }
                let n = buf.len().min(self.0);
                self.0 -= n;
                Ok(n)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut enc = StreamEncoder::new(FailAfter(4));
        enc.encode_uint32(1).unwrap();
        assert!(enc.encode_uint32(2).is_err());
        // Latched: later writes fail without touching the sink.
        assert!(enc.encode_uint8(3).is_err());
        assert!(enc.finish().is_err());
    }

    #[test]
    fn zero_padding_spans_blocks() {
        let mut enc = BufferEncoder::new();
        enc.encode_zero_padding(600).unwrap();
        assert_eq!(enc.position(), 600);
        assert!(enc.buffer().iter().all(|b| *b == 0));
    }
}
