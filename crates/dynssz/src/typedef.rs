//! The nominal type graph consumed by the descriptor compiler.
//!
//! Rust has no runtime reflection, so the "host type plus annotations"
//! input is an explicitly built graph of [`TypeDef`] nodes. Embedders (or
//! the code generator's build scripts) construct the graph once with the
//! builder functions below; the descriptor compiler walks it together with
//! the per-field tag strings.
//!
//! Every `TypeDef` gets a process-unique id at construction. The
//! descriptor cache keys on `(runtime id, schema id)` pairs, so primitive
//! defs are interned and shared.

use std::{
    fmt,
    sync::{
        Arc, LazyLock, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    compat::{CapabilityFlags, SszDelegate},
    error::SszError,
};

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The host-side shape of a type, before SSZ kind resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// `bool`.
    Bool,
    /// `u8`.
    Uint8,
    /// `u16`.
    Uint16,
    /// `u32`.
    Uint32,
    /// `u64`.
    Uint64,
    /// A 128-bit unsigned integer.
    Uint128,
    /// A 256-bit unsigned integer.
    Uint256,
    /// A point in time, carried as seconds since the epoch.
    Time,
    /// A UTF-8 string, encoded as its bytes.
    Str,
    /// A packed bit sequence (bitvector or bitlist, decided by hints).
    Bits,
    /// A fixed-length array of elements.
    Array,
    /// A growable sequence of elements.
    Slice,
    /// A struct with named fields.
    Struct,
    /// A tagged sum; fields enumerate the variants in selector order.
    Union,
    /// A transparent nominal shell around one field.
    Wrapper,
    /// An opaque type served entirely by its capability vtable.
    Custom,
}

/// A named, annotated member of a struct, union or wrapper.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    ty: Arc<TypeDef>,
    tags: String,
}

impl FieldDef {
    /// A field with no annotations.
    pub fn new(name: impl Into<String>, ty: Arc<TypeDef>) -> Self {
        Self {
            name: name.into(),
            ty,
            tags: String::new(),
        }
    }

    /// Attaches a raw tag string, e.g. `ssz-size:"32" dynssz-max:"LIMIT"`.
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's type.
    pub fn ty(&self) -> &Arc<TypeDef> {
        &self.ty
    }

    /// The raw annotation string.
    pub fn tags(&self) -> &str {
        &self.tags
    }
}

/// Factory and declared capabilities for a [`HostKind::Custom`] type.
///
/// `fresh` produces a default-constructed delegate for decoding;
/// `capabilities` records which fast-path groups the delegate actually
/// implements, which the compiler copies into the descriptor's
/// compatibility flags.
pub struct CustomVtable {
    /// Produces a new, default-valued delegate instance.
    pub fresh: Box<dyn Fn() -> Box<dyn SszDelegate> + Send + Sync>,
    /// The capability groups the delegate implements.
    pub capabilities: CapabilityFlags,
}

impl CustomVtable {
    /// A vtable for a `Default`-constructible delegate type.
    pub fn new<T>(capabilities: CapabilityFlags) -> Self
    where
        T: SszDelegate + Default + 'static,
    {
        Self {
            fresh: Box::new(|| {
                let delegate: Box<dyn SszDelegate> = Box::new(T::default());
                delegate
            }),
            capabilities,
        }
    }
}

impl fmt::Debug for CustomVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomVtable")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// One node of the nominal type graph.
///
/// Field lists live behind a write-once cell so a container can be
/// declared first and have its fields supplied afterwards (see
/// [`TypeDef::container_deferred`]); that is the only way a def can end
/// up referencing itself, and the descriptor compiler rejects such
/// recursion.
#[derive(Debug)]
pub struct TypeDef {
    id: u64,
    name: String,
    kind: HostKind,
    optional: bool,
    element: Option<Arc<TypeDef>>,
    len: usize,
    fields: OnceLock<Vec<FieldDef>>,
    vtable: Option<Arc<CustomVtable>>,
}

fn preset_fields(fields: Vec<FieldDef>) -> OnceLock<Vec<FieldDef>> {
    let cell = OnceLock::new();
    let _ = cell.set(fields);
    cell
}

macro_rules! interned_primitive {
    ($fn_name:ident, $static_name:ident, $kind:expr, $name:literal) => {
        /// The interned primitive def.
        pub fn $fn_name() -> Arc<TypeDef> {
            static $static_name: LazyLock<Arc<TypeDef>> =
                LazyLock::new(|| TypeDef::leaf($name, $kind));
            $static_name.clone()
        }
    };
}

impl TypeDef {
    fn leaf(name: &str, kind: HostKind) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.to_string(),
            kind,
            optional: false,
            element: None,
            len: 0,
            fields: preset_fields(Vec::new()),
            vtable: None,
        })
    }

    interned_primitive!(bool, BOOL, HostKind::Bool, "bool");
    interned_primitive!(uint8, UINT8, HostKind::Uint8, "u8");
    interned_primitive!(uint16, UINT16, HostKind::Uint16, "u16");
    interned_primitive!(uint32, UINT32, HostKind::Uint32, "u32");
    interned_primitive!(uint64, UINT64, HostKind::Uint64, "u64");
    interned_primitive!(uint128, UINT128, HostKind::Uint128, "U128");
    interned_primitive!(uint256, UINT256, HostKind::Uint256, "U256");
    interned_primitive!(time, TIME, HostKind::Time, "SystemTime");
    interned_primitive!(string, STRING, HostKind::Str, "String");
    interned_primitive!(bits, BITS, HostKind::Bits, "BitSeq");

    /// A fixed-length array of `len` elements.
    pub fn array(element: Arc<TypeDef>, len: usize) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: format!("[{}; {len}]", element.name),
            kind: HostKind::Array,
            optional: false,
            element: Some(element),
            len,
            fields: preset_fields(Vec::new()),
            vtable: None,
        })
    }

    /// A fixed-length byte array, `[u8; len]`.
    pub fn byte_array(len: usize) -> Arc<Self> {
        Self::array(Self::uint8(), len)
    }

    /// A growable sequence, `Vec<element>`.
    pub fn slice(element: Arc<TypeDef>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: format!("Vec<{}>", element.name),
            kind: HostKind::Slice,
            optional: false,
            element: Some(element),
            len: 0,
            fields: preset_fields(Vec::new()),
            vtable: None,
        })
    }

    /// A struct with named fields in declaration order.
    pub fn container(name: impl Into<String>, fields: Vec<FieldDef>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            kind: HostKind::Struct,
            optional: false,
            element: None,
            len: 0,
            fields: preset_fields(fields),
            vtable: None,
        })
    }

    /// A struct whose fields are supplied later through
    /// [`TypeDef::define_fields`], so a field may reference the def
    /// itself. The descriptor compiler rejects the resulting recursion;
    /// deferral exists so the rejection is reachable and diagnosable
    /// rather than a construction-time dead end.
    pub fn container_deferred(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            kind: HostKind::Struct,
            optional: false,
            element: None,
            len: 0,
            fields: OnceLock::new(),
            vtable: None,
        })
    }

    /// Supplies the field list of a deferred container. Fails when the
    /// fields were already defined.
    pub fn define_fields(&self, fields: Vec<FieldDef>) -> Result<(), SszError> {
        self.fields
            .set(fields)
            .map_err(|_| SszError::InvalidDescriptor {
                type_name: self.name.clone(),
                detail: "fields are already defined".to_string(),
            })
    }

    /// A tagged sum. Variant selectors equal field order, 0-based.
    pub fn union(name: impl Into<String>, variants: Vec<FieldDef>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            kind: HostKind::Union,
            optional: false,
            element: None,
            len: 0,
            fields: preset_fields(variants),
            vtable: None,
        })
    }

    /// A transparent newtype; `field`'s tags drive all SSZ behavior.
    pub fn wrapper(name: impl Into<String>, field: FieldDef) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            kind: HostKind::Wrapper,
            optional: false,
            element: None,
            len: 0,
            fields: preset_fields(vec![field]),
            vtable: None,
        })
    }

    /// An opaque type encoded and hashed through its vtable.
    pub fn custom(name: impl Into<String>, vtable: CustomVtable) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            kind: HostKind::Custom,
            optional: false,
            element: None,
            len: 0,
            fields: preset_fields(Vec::new()),
            vtable: Some(Arc::new(vtable)),
        })
    }

    /// An ownership wrapper around `inner`. A missing value encodes as the
    /// zero value of the underlying type; no null reaches the wire.
    pub fn optional(inner: Arc<TypeDef>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: format!("Option<{}>", inner.name),
            kind: inner.kind,
            optional: true,
            element: Some(inner),
            len: 0,
            fields: preset_fields(Vec::new()),
            vtable: None,
        })
    }

    /// The process-unique id of this def.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The nominal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host kind (of the wrapped type, for optionals).
    pub fn kind(&self) -> HostKind {
        self.kind
    }

    /// Whether this def is an optional wrapper.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Element type for arrays and slices, inner type for optionals.
    pub fn element(&self) -> Option<&Arc<TypeDef>> {
        self.element.as_ref()
    }

    /// Declared array length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether an array has zero declared length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Struct fields, union variants, or the wrapper's single field.
    /// Empty for a deferred container whose fields are not yet defined.
    pub fn fields(&self) -> &[FieldDef] {
        self.fields.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks up a field by name, returning its declaration index too.
    pub fn field_by_name(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.fields().iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// The capability vtable of a custom type.
    pub fn vtable(&self) -> Option<&Arc<CustomVtable>> {
        self.vtable.as_ref()
    }

    /// Strips optional indirection, returning the payload def and whether
    /// a wrapper was present.
    pub fn unwrap_optional(self: &Arc<Self>) -> (Arc<TypeDef>, bool) {
        if self.optional {
            let inner = self
                .element
                .clone()
                .expect("optional def always wraps an inner def");
            (inner, true)
        } else {
            (self.clone(), false)
        }
    }
}
