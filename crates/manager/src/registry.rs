//! Adapter lookup by resource kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use lifecycle_core::{traits::ResourceStoreAdapter, types::ResourceKind, Error, Result};

/// One adapter per resource kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ResourceKind, Arc<dyn ResourceStoreAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ResourceStoreAdapter>) {
        let kind = adapter.kind();
        if self.adapters.insert(kind, adapter).is_some() {
            tracing::warn!(kind = %kind, "Replacing previously registered adapter");
        }
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn ResourceStoreAdapter>> {
        self.adapters.get(&kind)
    }

    /// Adapter for `kind`, or an `InvalidRequest` naming the missing kind.
    pub fn require(&self, kind: ResourceKind) -> Result<&Arc<dyn ResourceStoreAdapter>> {
        self.get(kind)
            .ok_or_else(|| Error::invalid_request(format!("no adapter registered for {}", kind)))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.adapters.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &Arc<dyn ResourceStoreAdapter>)> {
        self.adapters.iter().map(|(kind, adapter)| (*kind, adapter))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
