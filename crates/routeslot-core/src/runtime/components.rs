use crate::{
    assignment::AssignmentRegistry,
    engine::EngineSupervisor,
    provider::ProviderServer,
    proxy::{ProxySelector, ProxyStore},
    slots::SlotAllocator,
};
use std::sync::Arc;

/// Container for the initialized RouteSlot components.
#[derive(Clone)]
pub struct RouteSlotComponents {
    store: Arc<dyn ProxyStore>,
    allocator: Arc<SlotAllocator>,
    selector: Arc<ProxySelector>,
    registry: Arc<AssignmentRegistry>,
    provider_server: Arc<ProviderServer>,
    supervisor: Arc<EngineSupervisor>,
}

impl RouteSlotComponents {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProxyStore>,
        allocator: Arc<SlotAllocator>,
        selector: Arc<ProxySelector>,
        registry: Arc<AssignmentRegistry>,
        provider_server: Arc<ProviderServer>,
        supervisor: Arc<EngineSupervisor>,
    ) -> Self {
        Self { store, allocator, selector, registry, provider_server, supervisor }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProxyStore> {
        &self.store
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<SlotAllocator> {
        &self.allocator
    }

    #[must_use]
    pub fn selector(&self) -> &Arc<ProxySelector> {
        &self.selector
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<AssignmentRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn provider_server(&self) -> &Arc<ProviderServer> {
        &self.provider_server
    }

    #[must_use]
    pub fn supervisor(&self) -> &Arc<EngineSupervisor> {
        &self.supervisor
    }
}
