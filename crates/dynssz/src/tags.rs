//! Field annotation parsing.
//!
//! Annotations arrive as Go-style tag strings, e.g.
//! `ssz-size:"?,32" dynssz-max:"VALIDATOR_REGISTRY_LIMIT"`. Each tag value
//! is a comma-separated list with one entry per nesting dimension; `?`
//! marks a dimension as dynamic (for sizes) or unbounded (for maxes).
//!
//! `dynssz-*` entries may be arithmetic expressions over spec constants
//! (`MAX_COMMITTEES * SLOTS_PER_EPOCH`). An expression that resolves to a
//! value different from the static `ssz-*` default marks the dimension as
//! overridden, which poisons legacy fast paths downstream. Expressions
//! that do not resolve fall back to the static default; the source text is
//! retained either way so the code generator can re-emit it.

use crate::{error::SszError, spec::SpecResolver};

/// An explicit `ssz-type` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    /// Derive the kind from the host type.
    Auto,
    /// `bool`.
    Bool,
    /// `uint8`.
    Uint8,
    /// `uint16`.
    Uint16,
    /// `uint32`.
    Uint32,
    /// `uint64`.
    Uint64,
    /// `uint128`.
    Uint128,
    /// `uint256`.
    Uint256,
    /// `container`.
    Container,
    /// `list`.
    List,
    /// `vector`.
    Vector,
    /// `bitlist`.
    Bitlist,
    /// `bitvector`.
    Bitvector,
    /// `progressive-list`.
    ProgressiveList,
    /// `progressive-bitlist`.
    ProgressiveBitlist,
    /// `progressive-container`.
    ProgressiveContainer,
    /// `compatible-union`.
    CompatibleUnion,
    /// `wrapper`.
    Wrapper,
    /// `custom`.
    Custom,
}

impl TypeHint {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "auto" => Self::Auto,
            "bool" => Self::Bool,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "uint128" => Self::Uint128,
            "uint256" => Self::Uint256,
            "container" => Self::Container,
            "list" => Self::List,
            "vector" => Self::Vector,
            "bitlist" => Self::Bitlist,
            "bitvector" => Self::Bitvector,
            "progressive-list" => Self::ProgressiveList,
            "progressive-bitlist" => Self::ProgressiveBitlist,
            "progressive-container" => Self::ProgressiveContainer,
            "compatible-union" => Self::CompatibleUnion,
            "wrapper" => Self::Wrapper,
            "custom" => Self::Custom,
            _ => return None,
        })
    }
}

/// One dimension of a size or max annotation after spec resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeHint {
    /// The effective value; `None` for `?`.
    pub value: Option<u64>,
    /// Source text of a `dynssz-*` expression, kept for codegen.
    pub expr: Option<String>,
    /// Whether a spec lookup produced the value.
    pub resolved: bool,
    /// Whether the resolved value differs from the static default.
    pub overridden: bool,
    /// Whether the dimension is measured in bits.
    pub bits: bool,
}

impl SizeHint {
    fn fixed(value: u64, bits: bool) -> Self {
        Self {
            value: Some(value),
            bits,
            ..Self::default()
        }
    }

    fn open(bits: bool) -> Self {
        Self {
            bits,
            ..Self::default()
        }
    }
}

/// All hints parsed from one field's tag string.
#[derive(Debug, Clone, Default)]
pub struct FieldHints {
    /// Per-dimension sizes.
    pub sizes: Vec<SizeHint>,
    /// Per-dimension limits.
    pub maxes: Vec<SizeHint>,
    /// Progressive container field index.
    pub index: Option<u64>,
    /// Explicit kind override.
    pub type_hint: Option<TypeHint>,
}

impl FieldHints {
    /// Whether no annotation was present at all.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
            && self.maxes.is_empty()
            && self.index.is_none()
            && self.type_hint.is_none()
    }

    /// Drops the outermost dimension, producing the hints a sequence
    /// passes to its element type.
    pub fn shift(&self) -> FieldHints {
        FieldHints {
            sizes: self.sizes.iter().skip(1).cloned().collect(),
            maxes: self.maxes.iter().skip(1).cloned().collect(),
            index: None,
            type_hint: None,
        }
    }

    /// The outermost size dimension, if annotated.
    pub fn size(&self) -> Option<&SizeHint> {
        self.sizes.first()
    }

    /// The outermost max dimension, if annotated.
    pub fn max(&self) -> Option<&SizeHint> {
        self.maxes.first()
    }
}

/// Parses the tag string of `field` and resolves `dynssz-*` entries
/// against `specs`.
pub fn parse_tags(
    field: &str,
    tags: &str,
    specs: &dyn SpecResolver,
) -> Result<FieldHints, SszError> {
    let mut hints = FieldHints::default();
    let mut dyn_sizes: Option<(Vec<String>, bool)> = None;
    let mut dyn_maxes: Option<(Vec<String>, bool)> = None;

    for (key, value) in iter_tags(field, tags)? {
        match key {
            "ssz-size" => hints.sizes = parse_static_dims(field, value, false)?,
            "ssz-bitsize" => hints.sizes = parse_static_dims(field, value, true)?,
            "ssz-max" => hints.maxes = parse_static_dims(field, value, false)?,
            "ssz-bitmax" => hints.maxes = parse_static_dims(field, value, true)?,
            "dynssz-size" | "dynssz-bitsize" => {
                dyn_sizes = Some((
                    value.split(',').map(str::to_string).collect(),
                    key == "dynssz-bitsize",
                ));
            }
            "dynssz-max" | "dynssz-bitmax" => {
                dyn_maxes = Some((
                    value.split(',').map(str::to_string).collect(),
                    key == "dynssz-bitmax",
                ));
            }
            "ssz-index" => {
                hints.index = Some(value.trim().parse::<u64>().map_err(|e| {
                    SszError::InvalidTag {
                        field: field.to_string(),
                        detail: format!("ssz-index {value:?}: {e}"),
                    }
                })?);
            }
            "ssz-type" => {
                hints.type_hint =
                    Some(
                        TypeHint::parse(value.trim()).ok_or_else(|| SszError::InvalidTag {
                            field: field.to_string(),
                            detail: format!("unknown ssz-type {value:?}"),
                        })?,
                    );
            }
            _ => {}
        }
    }

    if let Some((exprs, bits)) = dyn_sizes {
        apply_dynamic_dims(field, &mut hints.sizes, &exprs, bits, specs)?;
    }
    if let Some((exprs, bits)) = dyn_maxes {
        apply_dynamic_dims(field, &mut hints.maxes, &exprs, bits, specs)?;
    }

    Ok(hints)
}

/// Splits a Go-style tag string into `(key, value)` pairs.
fn iter_tags<'a>(
    field: &str,
    tags: &'a str,
) -> Result<Vec<(&'a str, &'a str)>, SszError> {
    let mut out = Vec::new();
    let mut rest = tags.trim();
    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            return Err(SszError::InvalidTag {
                field: field.to_string(),
                detail: format!("expected key:\"value\" near {rest:?}"),
            });
        };
        let key = rest[..colon].trim();
        let after = &rest[colon + 1..];
        let Some(stripped) = after.strip_prefix('"') else {
            return Err(SszError::InvalidTag {
                field: field.to_string(),
                detail: format!("missing opening quote after {key}"),
            });
        };
        let Some(end) = stripped.find('"') else {
            return Err(SszError::InvalidTag {
                field: field.to_string(),
                detail: format!("unterminated value for {key}"),
            });
        };
        out.push((key, &stripped[..end]));
        rest = stripped[end + 1..].trim_start();
    }
    Ok(out)
}

fn parse_static_dims(field: &str, value: &str, bits: bool) -> Result<Vec<SizeHint>, SszError> {
    value
        .split(',')
        .map(|dim| {
            let dim = dim.trim();
            if dim == "?" {
                Ok(SizeHint::open(bits))
            } else {
                dim.parse::<u64>()
                    .map(|n| SizeHint::fixed(n, bits))
                    .map_err(|e| SszError::InvalidTag {
                        field: field.to_string(),
                        detail: format!("malformed integer {dim:?}: {e}"),
                    })
            }
        })
        .collect()
}

/// Overlays `dynssz-*` expressions onto the static dimensions in place.
fn apply_dynamic_dims(
    field: &str,
    dims: &mut Vec<SizeHint>,
    exprs: &[String],
    bits: bool,
    specs: &dyn SpecResolver,
) -> Result<(), SszError> {
    if dims.len() < exprs.len() {
        dims.resize(exprs.len(), SizeHint::default());
    }
    for (dim, expr) in dims.iter_mut().zip(exprs) {
        if bits {
            dim.bits = true;
        }
        let expr = expr.trim();
        if expr == "?" || expr.is_empty() {
            continue;
        }
        // A plain number behaves exactly like its ssz-* counterpart.
        if let Ok(n) = expr.parse::<u64>() {
            dim.value = Some(n);
            continue;
        }
        match eval_expr(field, expr, specs)? {
            Some(resolved) => {
                dim.resolved = true;
                dim.overridden = dim.value.is_some_and(|v| v != resolved);
                dim.value = Some(resolved);
            }
            None => {
                // Unresolvable: keep the static default.
            }
        }
        dim.expr = Some(expr.to_string());
    }
    Ok(())
}

/// Evaluates an arithmetic expression over spec constants. Returns
/// `Ok(None)` when a name does not resolve; syntax errors are hard errors.
pub fn eval_expr(
    field: &str,
    expr: &str,
    specs: &dyn SpecResolver,
) -> Result<Option<u64>, SszError> {
    let tokens = tokenize(field, expr)?;
    let mut parser = ExprParser {
        field,
        tokens: &tokens,
        pos: 0,
    };
    let value = parser.expr(specs)?;
    if parser.pos != tokens.len() {
        return Err(parser.syntax_error("trailing input"));
    }
    Ok(value)
}

/// Resolves `expr` against `specs`, falling back to `default` when the
/// expression does not resolve or fails to parse. Intended for generated
/// code re-emitting retained expression text.
pub fn resolve_expr(specs: &dyn SpecResolver, expr: &str, default: u64) -> u64 {
    eval_expr("<generated>", expr, specs)
        .ok()
        .flatten()
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(u64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(field: &str, expr: &str) -> Result<Vec<Token>, SszError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '0'..='9' => {
                let mut end = i;
                while let Some(&(j, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        end = j;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &expr[i..=end];
                tokens.push(Token::Num(text.parse().map_err(|e| SszError::InvalidTag {
                    field: field.to_string(),
                    detail: format!("malformed integer {text:?}: {e}"),
                })?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while let Some(&(j, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '.' {
                        end = j;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(expr[i..=end].to_string()));
            }
            other => {
                return Err(SszError::InvalidTag {
                    field: field.to_string(),
                    detail: format!("unexpected character {other:?} in expression"),
                });
            }
        }
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    field: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl ExprParser<'_> {
    fn syntax_error(&self, detail: &str) -> SszError {
        SszError::InvalidTag {
            field: self.field.to_string(),
            detail: format!("expression syntax: {detail}"),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self, specs: &dyn SpecResolver) -> Result<Option<u64>, SszError> {
        let mut acc = self.term(specs)?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus | Token::Minus => {
                    self.next();
                    let rhs = self.term(specs)?;
                    acc = combine(acc, rhs, |a, b| {
                        if matches!(op, Token::Plus) {
                            a.checked_add(b)
                        } else {
                            a.checked_sub(b)
                        }
                    })
                    .map_err(|d| self.syntax_error(d))?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn term(&mut self, specs: &dyn SpecResolver) -> Result<Option<u64>, SszError> {
        let mut acc = self.factor(specs)?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star | Token::Slash => {
                    self.next();
                    let rhs = self.factor(specs)?;
                    acc = combine(acc, rhs, |a, b| {
                        if matches!(op, Token::Star) {
                            a.checked_mul(b)
                        } else {
                            a.checked_div(b)
                        }
                    })
                    .map_err(|d| self.syntax_error(d))?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn factor(&mut self, specs: &dyn SpecResolver) -> Result<Option<u64>, SszError> {
        match self.next().cloned() {
            Some(Token::Num(n)) => Ok(Some(n)),
            Some(Token::Name(name)) => Ok(specs.resolve_spec_value(&name)),
            Some(Token::Open) => {
                let inner = self.expr(specs)?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.syntax_error("expected closing parenthesis")),
                }
            }
            _ => Err(self.syntax_error("expected number, name or parenthesis")),
        }
    }
}

fn combine(
    a: Option<u64>,
    b: Option<u64>,
    op: impl Fn(u64, u64) -> Option<u64>,
) -> Result<Option<u64>, &'static str> {
    match (a, b) {
        (Some(a), Some(b)) => op(a, b).map(Some).ok_or("arithmetic overflow"),
        // An unresolved name poisons the whole expression.
        _ => Ok(None),
    }
}
