//! The one-shot descriptor compiler.
//!
//! Given a `(runtime, schema)` pair of [`TypeDef`]s plus inherited size
//! hints, the compiler resolves the SSZ kind, validates hint/kind
//! compatibility, recurses into children with hint dimensions shifted
//! left, probes capabilities, and produces an immutable
//! [`TypeDescriptor`]. Only hint-free roots are admitted to the cache.

use std::sync::Arc;

use tracing::trace;

use crate::{
    BYTES_PER_LENGTH_OFFSET,
    cache::TypeCache,
    compat::CapabilityFlags,
    descriptor::{
        DynFieldRef, FieldDescriptor, HostFlags, SszKind, TypeDescriptor, TypeFlags,
    },
    error::SszError,
    spec::SpecResolver,
    tags::{FieldHints, TypeHint, parse_tags},
    typedef::{HostKind, TypeDef},
};

pub(crate) struct Compiler<'a> {
    specs: &'a dyn SpecResolver,
    cache: &'a TypeCache,
    verbose: Option<&'a (dyn Fn(&str) + Send + Sync)>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(
        specs: &'a dyn SpecResolver,
        cache: &'a TypeCache,
        verbose: Option<&'a (dyn Fn(&str) + Send + Sync)>,
    ) -> Self {
        Self {
            specs,
            cache,
            verbose,
        }
    }

    /// Compiles the root descriptor for a type pair.
    pub(crate) fn compile(
        &self,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        let mut stack = Vec::new();
        self.build(runtime, schema, &FieldHints::default(), &mut stack)
    }

    fn build(
        &self,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        // Hint-free nodes are root entries: cacheable and shared. Nodes
        // under parent-supplied hints depend on the parent and are not.
        let is_root = hints.is_empty();
        if is_root && let Some(cached) = self.cache.get(runtime, schema) {
            return Ok(cached);
        }

        let key = (runtime.id(), schema.id());
        if stack.contains(&key) {
            return Err(SszError::RecursiveType {
                type_name: runtime.name().to_string(),
            });
        }
        stack.push(key);
        let built = self.build_uncached(runtime, schema, hints, stack);
        stack.pop();
        let desc = built?;

        trace!(
            runtime = runtime.name(),
            schema = schema.name(),
            kind = ?desc.kind,
            size = desc.size,
            "descriptor built"
        );
        if let Some(verbose) = self.verbose {
            verbose(&format!(
                "built descriptor for {} (kind {:?}, size {})",
                runtime.name(),
                desc.kind,
                desc.size
            ));
        }

        if is_root {
            Ok(self.cache.insert(runtime, schema, desc))
        } else {
            Ok(desc)
        }
    }

    fn build_uncached(
        &self,
        outer_runtime: &Arc<TypeDef>,
        outer_schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        let (runtime, is_pointer) = outer_runtime.unwrap_optional();
        let (schema, _) = outer_schema.unwrap_optional();

        if runtime.kind() != schema.kind() {
            return Err(SszError::InvalidDescriptor {
                type_name: runtime.name().to_string(),
                detail: format!(
                    "runtime kind {:?} does not match schema kind {:?} of {}",
                    runtime.kind(),
                    schema.kind(),
                    schema.name()
                ),
            });
        }

        let kind = resolve_kind(&runtime, &schema, hints)?;

        let mut desc = TypeDescriptor {
            kind,
            size: 0,
            length: 0,
            bit_length: None,
            limit: None,
            element: None,
            wrapped: None,
            fields: Vec::new(),
            dyn_fields: Vec::new(),
            variants: Vec::new(),
            flags: TypeFlags::default(),
            host: HostFlags {
                is_pointer,
                is_byte_array: false,
                is_string: runtime.kind() == HostKind::Str,
                is_time: runtime.kind() == HostKind::Time,
            },
            compat: CapabilityFlags::default(),
            size_expr: hints.size().and_then(|h| h.expr.clone()),
            max_expr: hints.max().and_then(|h| h.expr.clone()),
            runtime: runtime.clone(),
            schema: schema.clone(),
        };
        desc.flags.has_size_expr = desc.size_expr.is_some();
        desc.flags.has_max_expr = desc.max_expr.is_some();
        desc.flags.has_dynamic_size = hints.size().is_some_and(|h| h.overridden);
        desc.flags.has_dynamic_max = hints.max().is_some_and(|h| h.overridden);

        match kind {
            SszKind::Bool
            | SszKind::Uint8
            | SszKind::Uint16
            | SszKind::Uint32
            | SszKind::Uint64
            | SszKind::Uint128
            | SszKind::Uint256 => {
                self.build_primitive(&mut desc, &runtime, hints)?;
            }
            SszKind::Bitvector => {
                self.build_bitvector(&mut desc, &runtime, hints)?;
            }
            SszKind::Bitlist | SszKind::ProgressiveBitlist => {
                self.build_bitlist(&mut desc, hints)?;
            }
            SszKind::Vector => {
                self.build_vector(&mut desc, &runtime, &schema, hints, stack)?;
            }
            SszKind::List | SszKind::ProgressiveList => {
                self.build_list(&mut desc, &runtime, &schema, hints, stack)?;
            }
            SszKind::Container | SszKind::ProgressiveContainer => {
                self.build_container(&mut desc, &runtime, &schema, stack)?;
            }
            SszKind::CompatibleUnion => {
                self.build_union(&mut desc, &runtime, &schema, stack)?;
            }
            SszKind::TypeWrapper => {
                self.build_wrapper(&mut desc, &runtime, &schema, hints, stack)?;
            }
            SszKind::Custom => {
                self.build_custom(&mut desc, &runtime, hints)?;
            }
        }

        if let Some(vtable) = runtime.vtable() {
            desc.compat = vtable.capabilities;
        }

        Ok(Arc::new(desc))
    }

    fn build_primitive(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        hints: &FieldHints,
    ) -> Result<(), SszError> {
        let size = match desc.kind {
            SszKind::Bool | SszKind::Uint8 => 1,
            SszKind::Uint16 => 2,
            SszKind::Uint32 => 4,
            SszKind::Uint64 => 8,
            SszKind::Uint128 => 16,
            SszKind::Uint256 => 32,
            _ => unreachable!("primitive kinds only"),
        };
        // Bit-unit hints belong to bitvectors and bitlists only, even
        // when the bit count would round to the right byte size.
        if hints.size().is_some_and(|h| h.bits) {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: format!("bit-unit size hint on non-bit kind {:?}", desc.kind),
            });
        }
        if let Some(hint) = hints.size()
            && let Some(v) = hint.value
            && v != size as u64
        {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: format!(
                    "size hint {v} contradicts {:?} (needs {size} bytes)",
                    desc.kind
                ),
            });
        }
        // uint128/uint256 over a host sequence must have enough room.
        if matches!(desc.kind, SszKind::Uint128 | SszKind::Uint256) {
            check_wide_uint_host(desc.kind, runtime)?;
            desc.host.is_byte_array = matches!(
                runtime.kind(),
                HostKind::Array | HostKind::Slice
            ) && runtime
                .element()
                .is_some_and(|e| e.kind() == HostKind::Uint8);
        }
        desc.size = size;
        Ok(())
    }

    fn build_bitvector(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        hints: &FieldHints,
    ) -> Result<(), SszError> {
        let Some(hint) = hints.size() else {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: "bitvector requires a size hint".to_string(),
            });
        };
        let Some(v) = hint.value else {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: "bitvector size cannot be dynamic (`?`)".to_string(),
            });
        };
        let bits = (if hint.bits { v } else { v * 8 }) as usize;
        desc.bit_length = Some(bits);
        desc.flags.has_bit_size = hint.bits;
        desc.size = bits.div_ceil(8);
        Ok(())
    }

    fn build_bitlist(
        &self,
        desc: &mut TypeDescriptor,
        hints: &FieldHints,
    ) -> Result<(), SszError> {
        match hints.max() {
            Some(hint) => {
                if let Some(v) = hint.value {
                    desc.limit = Some(if hint.bits { v } else { v * 8 });
                    desc.flags.has_limit = true;
                    desc.flags.has_bit_size = hint.bits;
                }
            }
            None if desc.kind == SszKind::Bitlist => {
                return Err(SszError::MissingMaxHint {
                    field: desc.schema.name().to_string(),
                });
            }
            // Progressive bitlists are conceptually unbounded; an
            // annotated max is still enforced at decode.
            None => {}
        }
        desc.flags.is_dynamic = true;
        Ok(())
    }

    fn build_vector(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<(), SszError> {
        if hints.size().is_some_and(|h| h.bits && h.value.is_some()) {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: "bit-unit size hint on a non-bit sequence".to_string(),
            });
        }
        let length = match runtime.kind() {
            HostKind::Array => runtime.len(),
            _ => {
                let fixed = hints.size().and_then(|h| h.value);
                match fixed {
                    Some(v) => v as usize,
                    None => {
                        return Err(SszError::InvalidTag {
                            field: runtime.name().to_string(),
                            detail: "vector over a slice requires a fixed size hint"
                                .to_string(),
                        });
                    }
                }
            }
        };
        if let (HostKind::Array, Some(hint)) = (runtime.kind(), hints.size())
            && let Some(v) = hint.value
            && v as usize != length
        {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: format!("size hint {v} contradicts array length {length}"),
            });
        }

        let element = self.build_element(desc, runtime, schema, hints, stack)?;
        desc.length = length;
        if element.flags.is_dynamic {
            desc.flags.is_dynamic = true;
        } else {
            desc.size = length * element.size;
        }
        desc.element = Some(element);
        Ok(())
    }

    fn build_list(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<(), SszError> {
        if hints.size().is_some_and(|h| h.bits && h.value.is_some())
            || hints.max().is_some_and(|h| h.bits && h.value.is_some())
        {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: "bit-unit hint on a non-bit sequence".to_string(),
            });
        }
        match hints.max() {
            Some(hint) => {
                if let Some(v) = hint.value {
                    desc.limit = Some(v);
                    desc.flags.has_limit = true;
                }
            }
            None if desc.kind == SszKind::List => {
                return Err(SszError::MissingMaxHint {
                    field: runtime.name().to_string(),
                });
            }
            None => {}
        }

        let element = if desc.host.is_string {
            // Strings are byte lists; no element def exists on the graph.
            self.build(&TypeDef::uint8(), &TypeDef::uint8(), &hints.shift(), stack)?
        } else {
            self.build_element(desc, runtime, schema, hints, stack)?
        };

        // A size hint pinning the length makes the list statically sized
        // when its element is static too.
        let pinned = hints.size().and_then(|h| h.value);
        match (pinned, element.flags.is_dynamic) {
            (Some(n), false) => {
                desc.length = n as usize;
                desc.size = n as usize * element.size;
            }
            _ => desc.flags.is_dynamic = true,
        }
        desc.element = Some(element);
        Ok(())
    }

    /// Builds a sequence element descriptor with one hint dimension
    /// consumed, and records the byte-array shortcut.
    fn build_element(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        let rt_elem = runtime.element().ok_or_else(|| SszError::InvalidDescriptor {
            type_name: runtime.name().to_string(),
            detail: "sequence host kind without an element type".to_string(),
        })?;
        let sch_elem = schema.element().unwrap_or(rt_elem);
        let element = self.build(rt_elem, sch_elem, &hints.shift(), stack)?;
        desc.host.is_byte_array = element.kind == SszKind::Uint8;
        self.inherit_child_flags(desc, &element);
        Ok(element)
    }

    fn build_container(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<(), SszError> {
        let mut fixed_len = 0usize;
        let mut static_size = 0usize;
        let mut indexed = 0usize;
        let mut last_index: Option<u64> = None;

        for (decl, field) in schema.fields().iter().enumerate() {
            let (field_index, rt_field) = if runtime.id() == schema.id() {
                (decl, field)
            } else {
                runtime.field_by_name(field.name()).ok_or_else(|| {
                    SszError::ViewFieldMissing {
                        field: field.name().to_string(),
                        type_name: runtime.name().to_string(),
                    }
                })?
            };

            let field_hints = parse_tags(field.name(), field.tags(), self.specs)?;
            let ssz_index = field_hints.index;
            if let Some(index) = ssz_index {
                // The active-fields chunk holds 256 bits.
                if index > 255 {
                    return Err(SszError::InvalidTag {
                        field: field.name().to_string(),
                        detail: format!("ssz-index {index} exceeds 255"),
                    });
                }
                indexed += 1;
                if let Some(prev) = last_index {
                    if index == prev {
                        return Err(SszError::DuplicateSszIndex { index });
                    }
                    if index < prev {
                        return Err(SszError::ProgressiveFieldOrder {
                            field: field.name().to_string(),
                        });
                    }
                }
                last_index = Some(index);
            }

            let child = self.build(rt_field.ty(), field.ty(), &field_hints, stack)?;
            self.inherit_child_flags(desc, &child);

            if child.flags.is_dynamic {
                desc.dyn_fields.push(DynFieldRef {
                    field: desc.fields.len(),
                    header_offset: fixed_len,
                });
                fixed_len += BYTES_PER_LENGTH_OFFSET;
            } else {
                fixed_len += child.size;
                static_size += child.size;
            }

            desc.fields.push(FieldDescriptor {
                name: field.name().to_string(),
                desc: child,
                field_index,
                ssz_index,
            });
        }

        if indexed != 0 && indexed != desc.fields.len() {
            let missing = desc
                .fields
                .iter()
                .find(|f| f.ssz_index.is_none())
                .map(|f| f.name.clone())
                .unwrap_or_default();
            return Err(SszError::ProgressiveFieldOrder { field: missing });
        }
        if desc.kind == SszKind::ProgressiveContainer && indexed == 0 {
            return Err(SszError::ProgressiveFieldOrder {
                field: schema.name().to_string(),
            });
        }
        if desc.kind == SszKind::Container && indexed != 0 {
            desc.kind = SszKind::ProgressiveContainer;
        }

        desc.length = fixed_len;
        if desc.dyn_fields.is_empty() {
            desc.size = static_size;
        } else {
            desc.flags.is_dynamic = true;
        }
        Ok(())
    }

    fn build_union(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<(), SszError> {
        if schema.fields().is_empty() {
            return Err(SszError::InvalidDescriptor {
                type_name: schema.name().to_string(),
                detail: "union with no variants".to_string(),
            });
        }
        for field in schema.fields() {
            let rt_field = if runtime.id() == schema.id() {
                field
            } else {
                runtime
                    .field_by_name(field.name())
                    .map(|(_, f)| f)
                    .ok_or_else(|| SszError::ViewFieldMissing {
                        field: field.name().to_string(),
                        type_name: runtime.name().to_string(),
                    })?
            };
            let field_hints = parse_tags(field.name(), field.tags(), self.specs)?;
            let variant = self.build(rt_field.ty(), field.ty(), &field_hints, stack)?;
            self.inherit_child_flags(desc, &variant);
            desc.variants.push(variant);
        }
        desc.flags.is_dynamic = true;
        Ok(())
    }

    fn build_wrapper(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        hints: &FieldHints,
        stack: &mut Vec<(u64, u64)>,
    ) -> Result<(), SszError> {
        let sch_field = schema.fields().first().ok_or_else(|| {
            SszError::InvalidDescriptor {
                type_name: schema.name().to_string(),
                detail: "wrapper with no wrapped field".to_string(),
            }
        })?;
        let rt_field = runtime.fields().first().unwrap_or(sch_field);

        // The wrapped field's own tags drive behavior; parent hints apply
        // only when the field has none.
        let field_hints = parse_tags(sch_field.name(), sch_field.tags(), self.specs)?;
        let effective = if field_hints.is_empty() && !hints.is_empty() {
            hints.clone()
        } else {
            field_hints
        };
        let wrapped = self.build(rt_field.ty(), sch_field.ty(), &effective, stack)?;
        self.inherit_child_flags(desc, &wrapped);
        desc.size = wrapped.size;
        desc.length = wrapped.length;
        desc.limit = wrapped.limit;
        desc.flags.is_dynamic = wrapped.flags.is_dynamic;
        desc.wrapped = Some(wrapped);
        Ok(())
    }

    fn build_custom(
        &self,
        desc: &mut TypeDescriptor,
        runtime: &Arc<TypeDef>,
        hints: &FieldHints,
    ) -> Result<(), SszError> {
        let Some(vtable) = runtime.vtable() else {
            return Err(SszError::CustomTypeMissingImplementation {
                type_name: runtime.name().to_string(),
            });
        };
        let caps = vtable.capabilities;
        if !caps.has_marshal() || !caps.has_unmarshal() || !caps.has_hash() {
            return Err(SszError::CustomTypeMissingImplementation {
                type_name: runtime.name().to_string(),
            });
        }
        if hints.size().is_some_and(|h| h.bits) {
            return Err(SszError::InvalidTag {
                field: runtime.name().to_string(),
                detail: "bit-unit size hint on a custom type".to_string(),
            });
        }
        match hints.size().and_then(|h| h.value) {
            Some(v) => desc.size = v as usize,
            None => desc.flags.is_dynamic = true,
        }
        Ok(())
    }

    fn inherit_child_flags(&self, desc: &mut TypeDescriptor, child: &TypeDescriptor) {
        desc.flags.has_dynamic_size |= child.flags.has_dynamic_size;
        desc.flags.has_dynamic_max |= child.flags.has_dynamic_max;
    }
}

fn check_wide_uint_host(kind: SszKind, runtime: &Arc<TypeDef>) -> Result<(), SszError> {
    let bytes = if kind == SszKind::Uint128 { 16 } else { 32 };
    let ok = match runtime.kind() {
        HostKind::Uint128 => kind == SszKind::Uint128,
        HostKind::Uint256 => kind == SszKind::Uint256,
        HostKind::Array => match runtime.element().map(|e| e.kind()) {
            Some(HostKind::Uint8) => runtime.len() >= bytes,
            Some(HostKind::Uint64) => runtime.len() >= bytes / 8,
            _ => false,
        },
        HostKind::Slice => matches!(
            runtime.element().map(|e| e.kind()),
            Some(HostKind::Uint8) | Some(HostKind::Uint64)
        ),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(SszError::InvalidDescriptor {
            type_name: runtime.name().to_string(),
            detail: format!(
                "{kind:?} requires a byte or uint64 sequence of at least {bytes} bytes"
            ),
        })
    }
}

/// Resolves the SSZ kind: explicit `ssz-type` first, then well-known host
/// kinds, then host defaults.
fn resolve_kind(
    runtime: &Arc<TypeDef>,
    schema: &Arc<TypeDef>,
    hints: &FieldHints,
) -> Result<SszKind, SszError> {
    let host = runtime.kind();
    if let Some(hint) = hints.type_hint
        && hint != TypeHint::Auto
    {
        return kind_from_hint(hint, runtime, schema);
    }

    Ok(match host {
        HostKind::Bool => SszKind::Bool,
        HostKind::Uint8 => SszKind::Uint8,
        HostKind::Uint16 => SszKind::Uint16,
        HostKind::Uint32 => SszKind::Uint32,
        HostKind::Uint64 | HostKind::Time => SszKind::Uint64,
        HostKind::Uint128 => SszKind::Uint128,
        HostKind::Uint256 => SszKind::Uint256,
        HostKind::Str => SszKind::List,
        HostKind::Bits => {
            if hints.size().is_some() {
                SszKind::Bitvector
            } else {
                SszKind::Bitlist
            }
        }
        HostKind::Array => SszKind::Vector,
        HostKind::Slice => {
            if hints.size().and_then(|h| h.value).is_some() {
                SszKind::Vector
            } else {
                SszKind::List
            }
        }
        HostKind::Struct => SszKind::Container,
        HostKind::Union => SszKind::CompatibleUnion,
        HostKind::Wrapper => SszKind::TypeWrapper,
        HostKind::Custom => SszKind::Custom,
    })
}

fn kind_from_hint(
    hint: TypeHint,
    runtime: &Arc<TypeDef>,
    schema: &Arc<TypeDef>,
) -> Result<SszKind, SszError> {
    use HostKind as H;
    let host = runtime.kind();
    let incompatible = |kind: &str| SszError::InvalidTag {
        field: schema.name().to_string(),
        detail: format!("ssz-type {kind} is incompatible with host kind {host:?}"),
    };
    Ok(match hint {
        TypeHint::Auto => unreachable!("auto handled by caller"),
        TypeHint::Bool if host == H::Bool => SszKind::Bool,
        TypeHint::Bool => return Err(incompatible("bool")),
        TypeHint::Uint8 if host == H::Uint8 => SszKind::Uint8,
        TypeHint::Uint8 => return Err(incompatible("uint8")),
        TypeHint::Uint16 if host == H::Uint16 => SszKind::Uint16,
        TypeHint::Uint16 => return Err(incompatible("uint16")),
        TypeHint::Uint32 if host == H::Uint32 => SszKind::Uint32,
        TypeHint::Uint32 => return Err(incompatible("uint32")),
        TypeHint::Uint64 if matches!(host, H::Uint64 | H::Time) => SszKind::Uint64,
        TypeHint::Uint64 => return Err(incompatible("uint64")),
        TypeHint::Uint128 => SszKind::Uint128,
        TypeHint::Uint256 => SszKind::Uint256,
        TypeHint::Container if host == H::Struct => SszKind::Container,
        TypeHint::Container => return Err(incompatible("container")),
        TypeHint::ProgressiveContainer if host == H::Struct => {
            SszKind::ProgressiveContainer
        }
        TypeHint::ProgressiveContainer => {
            return Err(incompatible("progressive-container"));
        }
        TypeHint::Vector if matches!(host, H::Array | H::Slice) => SszKind::Vector,
        TypeHint::Vector => return Err(incompatible("vector")),
        TypeHint::List if matches!(host, H::Slice | H::Str) => SszKind::List,
        TypeHint::List => return Err(incompatible("list")),
        TypeHint::ProgressiveList if matches!(host, H::Slice | H::Str) => {
            SszKind::ProgressiveList
        }
        TypeHint::ProgressiveList => return Err(incompatible("progressive-list")),
        TypeHint::Bitvector if host == H::Bits => SszKind::Bitvector,
        TypeHint::Bitvector => return Err(incompatible("bitvector")),
        TypeHint::Bitlist if host == H::Bits => SszKind::Bitlist,
        TypeHint::Bitlist => return Err(incompatible("bitlist")),
        TypeHint::ProgressiveBitlist if host == H::Bits => SszKind::ProgressiveBitlist,
        TypeHint::ProgressiveBitlist => {
            return Err(incompatible("progressive-bitlist"));
        }
        TypeHint::CompatibleUnion if host == H::Union => SszKind::CompatibleUnion,
        TypeHint::CompatibleUnion => return Err(incompatible("compatible-union")),
        TypeHint::Wrapper if host == H::Wrapper => SszKind::TypeWrapper,
        TypeHint::Wrapper => return Err(incompatible("wrapper")),
        TypeHint::Custom => SszKind::Custom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        spec::{MapResolver, NoSpecs},
        typedef::FieldDef,
    };

    fn compile(runtime: &Arc<TypeDef>) -> Result<Arc<TypeDescriptor>, SszError> {
        let cache = TypeCache::new();
        Compiler::new(&NoSpecs, &cache, None).compile(runtime, runtime)
    }

    #[test]
    fn static_container_layout() {
        let def = TypeDef::container(
            "Payload",
            vec![
                FieldDef::new("a", TypeDef::uint64()),
                FieldDef::new("b", TypeDef::uint32()),
                FieldDef::new("c", TypeDef::bool()),
                FieldDef::new("d", TypeDef::uint16()),
            ],
        );
        let desc = compile(&def).unwrap();
        assert_eq!(desc.kind, SszKind::Container);
        assert_eq!(desc.size, 15);
        assert_eq!(desc.length, 15);
        assert!(!desc.flags.is_dynamic);
        assert!(desc.dyn_fields.is_empty());
    }

    #[test]
    fn dynamic_field_gets_offset_slot() {
        let def = TypeDef::container(
            "Block",
            vec![
                FieldDef::new("slot", TypeDef::uint64()),
                FieldDef::new("payload", TypeDef::slice(TypeDef::uint8()))
                    .with_tags(r#"ssz-max:"1024""#),
            ],
        );
        let desc = compile(&def).unwrap();
        assert!(desc.flags.is_dynamic);
        assert_eq!(desc.length, 12);
        assert_eq!(desc.dyn_fields.len(), 1);
        assert_eq!(desc.dyn_fields[0].header_offset, 8);
        assert!(desc.fields[1].desc.flags.is_dynamic);
        assert_eq!(desc.fields[1].desc.limit, Some(1024));
    }

    #[test]
    fn vector_size_is_len_times_elem() {
        let def = TypeDef::byte_array(48);
        let desc = compile(&def).unwrap();
        assert_eq!(desc.kind, SszKind::Vector);
        assert_eq!(desc.size, 48);
        assert!(desc.host.is_byte_array);
    }

    #[test]
    fn multi_dimension_hints_shift() {
        // Vec<[u8; 32]> annotated as max 64 roots of 32 bytes.
        let def = TypeDef::container(
            "Roots",
            vec![
                FieldDef::new("roots", TypeDef::slice(TypeDef::byte_array(32)))
                    .with_tags(r#"ssz-max:"64" ssz-size:"?,32""#),
            ],
        );
        let desc = compile(&def).unwrap();
        let roots = &desc.fields[0].desc;
        assert_eq!(roots.kind, SszKind::List);
        assert_eq!(roots.limit, Some(64));
        let elem = roots.element.as_ref().unwrap();
        assert_eq!(elem.kind, SszKind::Vector);
        assert_eq!(elem.size, 32);
    }

    #[test]
    fn list_requires_max() {
        let def = TypeDef::container(
            "Naked",
            vec![FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))],
        );
        assert!(matches!(
            compile(&def),
            Err(SszError::MissingMaxHint { .. })
        ));
    }

    #[test]
    fn dynamic_spec_override_poisons_fast_path() {
        let specs = MapResolver::new().set("EPOCH_SLOTS", 64);
        let cache = TypeCache::new();
        let def = TypeDef::container(
            "State",
            vec![
                FieldDef::new("slots", TypeDef::slice(TypeDef::uint64()))
                    .with_tags(r#"ssz-max:"32" dynssz-max:"EPOCH_SLOTS""#),
            ],
        );
        let desc = Compiler::new(&specs, &cache, None).compile(&def, &def).unwrap();
        assert!(desc.flags.has_dynamic_max);
        assert!(!desc.legacy_fast_path_allowed());
        assert_eq!(desc.fields[0].desc.limit, Some(64));
    }

    #[test]
    fn progressive_indices_validated() {
        let good = TypeDef::container(
            "Prog",
            vec![
                FieldDef::new("a", TypeDef::uint64()).with_tags(r#"ssz-index:"0""#),
                FieldDef::new("b", TypeDef::uint32()).with_tags(r#"ssz-index:"2""#),
            ],
        );
        let desc = compile(&good).unwrap();
        assert_eq!(desc.kind, SszKind::ProgressiveContainer);

        let duplicate = TypeDef::container(
            "Dup",
            vec![
                FieldDef::new("a", TypeDef::uint64()).with_tags(r#"ssz-index:"1""#),
                FieldDef::new("b", TypeDef::uint32()).with_tags(r#"ssz-index:"1""#),
            ],
        );
        assert!(matches!(
            compile(&duplicate),
            Err(SszError::DuplicateSszIndex { index: 1 })
        ));

        let partial = TypeDef::container(
            "Partial",
            vec![
                FieldDef::new("a", TypeDef::uint64()).with_tags(r#"ssz-index:"0""#),
                FieldDef::new("b", TypeDef::uint32()),
            ],
        );
        assert!(matches!(
            compile(&partial),
            Err(SszError::ProgressiveFieldOrder { .. })
        ));

        let decreasing = TypeDef::container(
            "Desc",
            vec![
                FieldDef::new("a", TypeDef::uint64()).with_tags(r#"ssz-index:"3""#),
                FieldDef::new("b", TypeDef::uint32()).with_tags(r#"ssz-index:"1""#),
            ],
        );
        assert!(matches!(
            compile(&decreasing),
            Err(SszError::ProgressiveFieldOrder { .. })
        ));
    }

    #[test]
    fn nominal_recursion_is_rejected() {
        // A deferred container may reference itself through its own
        // field list; the compiler must refuse the cycle.
        let tree = TypeDef::container_deferred("Tree");
        tree.define_fields(vec![
            FieldDef::new("value", TypeDef::uint8()),
            FieldDef::new("children", TypeDef::slice(tree.clone()))
                .with_tags(r#"ssz-max:"16""#),
        ])
        .unwrap();
        assert!(matches!(
            compile(&tree),
            Err(SszError::RecursiveType { .. })
        ));
    }

    #[test]
    fn mutual_recursion_is_rejected() {
        let a = TypeDef::container_deferred("A");
        let b = TypeDef::container(
            "B",
            vec![FieldDef::new("back", TypeDef::slice(a.clone()))
                .with_tags(r#"ssz-max:"4""#)],
        );
        a.define_fields(vec![FieldDef::new("next", b)]).unwrap();
        assert!(matches!(
            compile(&a),
            Err(SszError::RecursiveType { .. })
        ));
    }

    #[test]
    fn shared_subtrees_compile() {
        // The same def appearing at several places is a DAG, not a
        // cycle, and compiles once through the cache.
        let leaf = TypeDef::container("Leaf", vec![FieldDef::new("x", TypeDef::uint8())]);
        let def = TypeDef::container(
            "Pair",
            vec![
                FieldDef::new("left", leaf.clone()),
                FieldDef::new("right", leaf.clone()),
                FieldDef::new("extra", TypeDef::slice(leaf))
                    .with_tags(r#"ssz-max:"16""#),
            ],
        );
        assert!(compile(&def).is_ok());
    }

    #[test]
    fn bit_unit_hints_require_bit_kinds() {
        // A bit count that rounds to the natural byte size is still an
        // error on a non-bit type.
        for tags in [r#"ssz-bitsize:"8""#, r#"ssz-bitsize:"1""#] {
            let def = TypeDef::container(
                "BadBool",
                vec![FieldDef::new("flag", TypeDef::bool()).with_tags(tags)],
            );
            assert!(matches!(compile(&def), Err(SszError::InvalidTag { .. })));
        }

        let def = TypeDef::container(
            "BadMax",
            vec![
                FieldDef::new("xs", TypeDef::slice(TypeDef::uint64()))
                    .with_tags(r#"ssz-bitmax:"64""#),
            ],
        );
        assert!(matches!(compile(&def), Err(SszError::InvalidTag { .. })));

        let def = TypeDef::container(
            "BadVec",
            vec![
                FieldDef::new("b", TypeDef::slice(TypeDef::uint8()))
                    .with_tags(r#"ssz-bitsize:"32""#),
            ],
        );
        assert!(matches!(compile(&def), Err(SszError::InvalidTag { .. })));

        // The same annotations are fine on an actual bit sequence.
        let def = TypeDef::container(
            "GoodBits",
            vec![FieldDef::new("bits", TypeDef::bits()).with_tags(r#"ssz-bitsize:"8""#)],
        );
        assert!(compile(&def).is_ok());
    }

    #[test]
    fn view_maps_field_indices() {
        let runtime = TypeDef::container(
            "Full",
            vec![
                FieldDef::new("a", TypeDef::uint64()),
                FieldDef::new("b", TypeDef::uint32()),
                FieldDef::new("c", TypeDef::uint16()),
            ],
        );
        let view = TypeDef::container(
            "Narrow",
            vec![
                FieldDef::new("c", TypeDef::uint16()),
                FieldDef::new("a", TypeDef::uint64()),
            ],
        );
        let cache = TypeCache::new();
        let desc = Compiler::new(&NoSpecs, &cache, None)
            .compile(&runtime, &view)
            .unwrap();
        assert_eq!(desc.fields[0].name, "c");
        assert_eq!(desc.fields[0].field_index, 2);
        assert_eq!(desc.fields[1].field_index, 0);
        assert_eq!(desc.size, 10);

        let bad_view = TypeDef::container(
            "Bad",
            vec![FieldDef::new("missing", TypeDef::uint8())],
        );
        assert!(matches!(
            Compiler::new(&NoSpecs, &cache, None).compile(&runtime, &bad_view),
            Err(SszError::ViewFieldMissing { .. })
        ));
    }

    #[test]
    fn root_descriptors_are_cached() {
        let cache = TypeCache::new();
        let def = TypeDef::container("Once", vec![FieldDef::new("x", TypeDef::uint64())]);
        let compiler = Compiler::new(&NoSpecs, &cache, None);
        let a = compiler.compile(&def, &def).unwrap();
        let b = compiler.compile(&def, &def).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2); // container + interned u64 leaf
    }

    #[test]
    fn bool_size_hint_conflict() {
        let def = TypeDef::container(
            "BadBool",
            vec![FieldDef::new("flag", TypeDef::bool()).with_tags(r#"ssz-size:"2""#)],
        );
        assert!(matches!(compile(&def), Err(SszError::InvalidTag { .. })));
    }
}
