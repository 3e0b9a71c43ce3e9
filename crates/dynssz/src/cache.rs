//! The descriptor cache.
//!
//! Compiled descriptors are cached per `(runtime, schema)` type pair.
//! Lookup is read-mostly and takes a shared guard; builds insert under an
//! exclusive guard. Only root descriptors — those compiled with no
//! inherited hints — are admitted; nodes built under parent-supplied
//! hints are reconstructed inline on each parent build.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::{descriptor::TypeDescriptor, typedef::TypeDef};

/// Maps `(runtime id, schema id)` pairs to compiled descriptors.
#[derive(Debug, Default)]
pub struct TypeCache {
    map: RwLock<HashMap<(u64, u64), Arc<TypeDescriptor>>>,
}

impl TypeCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Looks up the descriptor for a type pair.
    pub fn get(
        &self,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
    ) -> Option<Arc<TypeDescriptor>> {
        self.map
            .read()
            .expect("descriptor cache poisoned")
            .get(&(runtime.id(), schema.id()))
            .cloned()
    }

    pub(crate) fn insert(
        &self,
        runtime: &Arc<TypeDef>,
        schema: &Arc<TypeDef>,
        desc: Arc<TypeDescriptor>,
    ) -> Arc<TypeDescriptor> {
        let mut map = self.map.write().expect("descriptor cache poisoned");
        // A racing build may have published first; the earlier entry wins
        // so every caller shares one descriptor.
        let entry = map
            .entry((runtime.id(), schema.id()))
            .or_insert_with(|| {
                debug!(
                    runtime = runtime.name(),
                    schema = schema.name(),
                    "descriptor cached"
                );
                desc
            });
        entry.clone()
    }

    /// Removes one `(runtime, schema)` entry.
    pub fn remove(&self, runtime: &Arc<TypeDef>, schema: &Arc<TypeDef>) {
        self.map
            .write()
            .expect("descriptor cache poisoned")
            .remove(&(runtime.id(), schema.id()));
    }

    /// Removes every entry whose runtime type matches.
    pub fn remove_runtime(&self, runtime: &Arc<TypeDef>) {
        self.map
            .write()
            .expect("descriptor cache poisoned")
            .retain(|(rt, _), _| *rt != runtime.id());
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.map.write().expect("descriptor cache poisoned").clear();
    }

    /// The number of cached descriptors.
    pub fn len(&self) -> usize {
        self.map.read().expect("descriptor cache poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
