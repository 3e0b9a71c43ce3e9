//! Dynamic specification resolution.
//!
//! Size and limit annotations may name constants such as
//! `VALIDATOR_REGISTRY_LIMIT` instead of literal numbers. A [`SpecResolver`]
//! supplies fork-specific values for those names at descriptor build time.
//! Descriptors remember whether a lookup succeeded and whether the resolved
//! value differs from the annotated default, so legacy fast paths are only
//! taken when no override applies.

use std::collections::HashMap;

/// Maps symbolic constant names to integer values.
pub trait SpecResolver: Send + Sync {
    /// Resolves `name`, returning `None` when the constant is unknown.
    fn resolve_spec_value(&self, name: &str) -> Option<u64>;
}

/// A resolver that knows no constants; every `dynssz-*` expression falls
/// back to its static `ssz-*` default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpecs;

impl SpecResolver for NoSpecs {
    fn resolve_spec_value(&self, _name: &str) -> Option<u64> {
        None
    }
}

/// A `HashMap`-backed resolver for tests and simple embedders.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    values: HashMap<String, u64>,
}

impl MapResolver {
    /// An empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constant, replacing any previous value for `name`.
    pub fn set(mut self, name: impl Into<String>, value: u64) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

impl From<HashMap<String, u64>> for MapResolver {
    fn from(values: HashMap<String, u64>) -> Self {
        Self { values }
    }
}

impl SpecResolver for MapResolver {
    fn resolve_spec_value(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_resolver_lookup() {
        let specs = MapResolver::new().set("MAX_THINGS", 64);
        assert_eq!(specs.resolve_spec_value("MAX_THINGS"), Some(64));
        assert_eq!(specs.resolve_spec_value("OTHER"), None);
        assert_eq!(NoSpecs.resolve_spec_value("MAX_THINGS"), None);
    }
}
