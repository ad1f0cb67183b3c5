use std::sync::Arc;

use leadstack_events::{DispatcherConfig, EventDispatcher};
use leadstack_saga::InMemorySagaStore;
use leadstack_validation::{RelationshipService, ValidationService};

/// Everything the maintenance commands operate on.
///
/// Built once at process start and passed by reference; there is no global
/// singleton to reach for. The saga store is wired into the dispatcher as its
/// saga hook so step-bearing events resolve their steps.
pub struct PlatformContext {
    pub dispatcher: Arc<EventDispatcher>,
    pub relationships: Arc<RelationshipService>,
    pub validation: Arc<ValidationService>,
    pub sagas: Arc<InMemorySagaStore>,
}

impl PlatformContext {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new(config));
        let relationships = Arc::new(RelationshipService::new());
        let validation = Arc::new(ValidationService::new(relationships.clone()));
        let sagas = Arc::new(InMemorySagaStore::new());
        dispatcher.set_saga_hook(sagas.clone());
        Self {
            dispatcher,
            relationships,
            validation,
            sagas,
        }
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::new()
    }
}
