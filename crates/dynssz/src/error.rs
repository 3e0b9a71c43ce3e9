//! Error taxonomy for descriptor construction, coding and hashing.

use thiserror::Error;

/// Errors surfaced by descriptor compilation, encode/decode and hash-tree-root.
#[derive(Debug, Error)]
pub enum SszError {
    // -- input validation --
    /// The host kind cannot be expressed in SSZ (signed integers, maps, ...).
    #[error("unsupported host kind for type {type_name}: {detail}")]
    UnsupportedKind {
        /// Nominal name of the offending type.
        type_name: String,
        /// What made the kind unsupported.
        detail: String,
    },

    /// A list or bitlist field has no `ssz-max`/`dynssz-max` bound.
    #[error("missing max hint on unbounded field {field}")]
    MissingMaxHint {
        /// Field the hint is missing on.
        field: String,
    },

    /// A tag could not be parsed or contradicts the field's type.
    #[error("invalid tag on {field}: {detail}")]
    InvalidTag {
        /// Field carrying the tag.
        field: String,
        /// Parse or compatibility failure.
        detail: String,
    },

    /// The descriptor configuration is internally inconsistent.
    #[error("invalid descriptor for {type_name}: {detail}")]
    InvalidDescriptor {
        /// Nominal name of the type being compiled.
        type_name: String,
        /// The inconsistency.
        detail: String,
    },

    /// A schema ("view") field has no counterpart in the runtime type.
    #[error("view field {field} is missing from runtime type {type_name}")]
    ViewFieldMissing {
        /// Schema field name.
        field: String,
        /// Runtime type searched.
        type_name: String,
    },

    /// Nominal recursion in the host type graph implies unbounded size.
    #[error("recursive type {type_name} cannot be described in SSZ")]
    RecursiveType {
        /// The type that recursed into itself.
        type_name: String,
    },

    // -- bounds --
    /// Input ended before the required number of bytes was available.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes the decoder needed.
        needed: usize,
        /// Bytes left in the current window.
        available: usize,
    },

    /// An offset violated monotonicity, bounds, or the first-offset rule.
    #[error("incorrect offset {offset} (window of {limit} bytes)")]
    IncorrectOffset {
        /// The offending offset value.
        offset: usize,
        /// The window it had to fall within.
        limit: usize,
    },

    /// A decoded list exceeded its declared capacity.
    #[error("list length {len} exceeds limit {max}")]
    ListTooBig {
        /// Decoded element or bit count.
        len: usize,
        /// Declared capacity.
        max: usize,
    },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid value {value:#04x} for bool")]
    InvalidValueRange {
        /// The offending byte.
        value: u8,
    },

    /// A vector body had the wrong number of elements.
    #[error("incorrect vector length {len}, expected {expected}")]
    IncorrectVectorLength {
        /// Observed element count.
        len: usize,
        /// Declared element count.
        expected: usize,
    },

    /// A byte region had a length incompatible with its element size.
    #[error("invalid byte length {len}, expected {expected}")]
    InvalidByteLength {
        /// Observed byte count.
        len: usize,
        /// Required byte count (or multiple).
        expected: usize,
    },

    // -- semantic --
    /// A union selector did not name a variant.
    #[error("invalid union variant {selector}")]
    InvalidUnionVariant {
        /// The decoded selector byte.
        selector: u8,
    },

    /// A bitlist had no sentinel bit.
    #[error("bitlist is not terminated")]
    BitlistNotTerminated,

    /// A bitvector had non-zero bits beyond its declared length.
    #[error("bitvector padding bits are not zero")]
    BitvectorPaddingNonZero,

    /// Progressive container indices were not strictly increasing, or only
    /// some fields carried one.
    #[error("progressive container field order violation at {field}")]
    ProgressiveFieldOrder {
        /// Field where the ordering broke.
        field: String,
    },

    /// Two fields declared the same `ssz-index`.
    #[error("duplicate ssz-index {index}")]
    DuplicateSszIndex {
        /// The repeated index.
        index: u64,
    },

    // -- capability --
    /// A custom type lacks the capability surface the codec requires.
    #[error("custom type {type_name} is missing a marshal/hash implementation")]
    CustomTypeMissingImplementation {
        /// Nominal name of the custom type.
        type_name: String,
    },

    /// A fast-path delegate failed; the original message is preserved.
    #[error("delegate error: {0}")]
    Delegate(String),

    // -- internal defensive --
    /// The descriptor-claimed size disagreed with the bytes consumed.
    #[error("descriptor/codec size mismatch: claimed {claimed}, consumed {consumed}")]
    SizeMismatch {
        /// Size the descriptor claimed.
        claimed: usize,
        /// Bytes the codec actually consumed.
        consumed: usize,
    },

    /// The value's shape did not match its descriptor.
    #[error("value shape mismatch for {type_name}: {detail}")]
    ValueMismatch {
        /// Nominal name of the descriptor's type.
        type_name: String,
        /// What was expected vs found.
        detail: String,
    },

    /// An underlying source or sink failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SszError {
    /// Wraps an error text coming back from a user-supplied fast path,
    /// keeping the original message intact.
    pub fn delegate(msg: impl Into<String>) -> Self {
        SszError::Delegate(msg.into())
    }
}
