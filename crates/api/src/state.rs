use std::sync::Arc;

use clinic_core::checklist::controller::ChecklistController;
use clinic_core::checklist::versioning::TemplateVersionManager;
use clinic_core::store::ChecklistStore;
use clinic_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub controller: ChecklistController,
    pub templates: TemplateVersionManager,
    pub config: Arc<ServerConfig>,
    pub event_bus: Arc<EventBus>,
    /// Present when checklists are stored in PostgreSQL.
    pub pool: Option<clinic_db::DbPool>,
}

impl AppState {
    /// Wire the engine to a store and route note requests onto the bus.
    pub fn new(
        store: Arc<dyn ChecklistStore>,
        event_bus: Arc<EventBus>,
        config: Arc<ServerConfig>,
        pool: Option<clinic_db::DbPool>,
    ) -> Self {
        Self {
            controller: ChecklistController::new(Arc::clone(&store), event_bus.clone()),
            templates: TemplateVersionManager::new(store),
            config,
            event_bus,
            pool,
        }
    }
}
