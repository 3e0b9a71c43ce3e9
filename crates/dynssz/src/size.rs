//! Exact encoded-size computation.
//!
//! `size_value` returns the number of bytes `encode` will produce for a
//! value, without encoding. The streaming encoder also uses it to compute
//! offsets up front, so sizing must agree with encoding byte for byte.

use std::sync::Arc;

use crate::{
    BYTES_PER_LENGTH_OFFSET, BYTES_PER_UNION_SELECTOR, Ctx,
    descriptor::{SszKind, TypeDescriptor},
    error::SszError,
    value::Value,
};

/// Computes the exact encoded byte size of `value` under `desc`.
pub(crate) fn size_value(
    ctx: &Ctx<'_>,
    desc: &Arc<TypeDescriptor>,
    value: &Value,
) -> Result<usize, SszError> {
    // Nil optionals size as the zero value of the underlying type.
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
        SszKind::Bool
        | SszKind::Uint8
        | SszKind::Uint16
        | SszKind::Uint32
        | SszKind::Uint64
        | SszKind::Uint128
        | SszKind::Uint256
        | SszKind::Bitvector => Ok(desc.size),

        SszKind::Bitlist | SszKind::ProgressiveBitlist => {
            // Data bits plus the sentinel bit.
            Ok(value.as_bits(desc)?.len() / 8 + 1)
        }

        SszKind::Vector => {
            if !desc.flags.is_dynamic {
                return Ok(desc.size);
            }
            let element = desc.element.as_ref().expect("vector has element");
            let items = value.as_elements(desc)?;
            if items.len() > desc.length {
                return Err(SszError::IncorrectVectorLength {
                    len: items.len(),
                    expected: desc.length,
                });
            }
            let mut size = desc.length * BYTES_PER_LENGTH_OFFSET;
            for item in items {
                size += size_value(ctx, element, item)?;
            }
            // The missing tail sizes as default-constructed elements.
            if items.len() < desc.length {
                let default = Value::default_for(element);
                let default_size = size_value(ctx, element, &default)?;
                size += (desc.length - items.len()) * default_size;
            }
            Ok(size)
        }

        SszKind::List | SszKind::ProgressiveList => {
            if desc.host.is_byte_array || desc.host.is_string {
                return Ok(value.as_bytes(desc)?.len());
            }
            let element = desc.element.as_ref().expect("list has element");
            let items = value.as_elements(desc)?;
            if !element.flags.is_dynamic {
                return Ok(items.len() * element.size);
            }
            let mut size = items.len() * BYTES_PER_LENGTH_OFFSET;
            for item in items {
                size += size_value(ctx, element, item)?;
            }
            Ok(size)
        }

        SszKind::Container | SszKind::ProgressiveContainer => {
            if !desc.flags.is_dynamic {
                return Ok(desc.size);
            }
            let slots = value.as_container(desc)?;
            let mut size = desc.length;
            for dyn_ref in &desc.dyn_fields {
                let field = &desc.fields[dyn_ref.field];
                let slot = field_slot(desc, slots, field.field_index)?;
                size += size_value(ctx, &field.desc, slot)?;
            }
            Ok(size)
        }

        SszKind::CompatibleUnion => {
            let (selector, body) = value.as_union(desc)?;
            let variant = desc.variants.get(selector as usize).ok_or(
                SszError::InvalidUnionVariant { selector },
            )?;
            Ok(BYTES_PER_UNION_SELECTOR + size_value(ctx, variant, body)?)
        }

        SszKind::TypeWrapper => {
            size_value(ctx, desc.wrapped.as_ref().expect("wrapper has inner"), value)
        }

        SszKind::Custom => {
            let delegate = value.as_custom(desc)?.delegate();
            let view_active = desc.runtime.id() != desc.schema.id();
            if view_active
                && desc.compat.view_marshal
                && let Some(size) = delegate.size_ssz_view(ctx.specs, &desc.schema)
            {
                return Ok(size);
            }
            if desc.compat.dyn_size
                && let Some(size) = delegate.size_ssz_dyn(ctx.specs)
            {
                return Ok(size);
            }
            if desc.compat.legacy_marshal
                && !ctx.no_fast_ssz
                && desc.legacy_fast_path_allowed()
            {
                return Ok(delegate.size_ssz());
            }
            Err(SszError::CustomTypeMissingImplementation {
                type_name: desc.type_name().to_string(),
            })
        }
    }
}

/// Reads a runtime container slot, surfacing short value vectors as a
/// shape mismatch rather than a panic.
pub(crate) fn field_slot<'v>(
    desc: &TypeDescriptor,
    slots: &'v [Value],
    field_index: usize,
) -> Result<&'v Value, SszError> {
    slots.get(field_index).ok_or_else(|| SszError::ValueMismatch {
        type_name: desc.type_name().to_string(),
        detail: format!(
            "container value has {} slots, field index {field_index} out of range",
            slots.len()
        ),
    })
}
