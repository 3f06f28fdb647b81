use std::sync::Arc;

use crate::config::PlatformConfig;
use crate::db::pool::ControlPool;
use crate::tasks::dispatcher::Dispatcher;
use crate::tenant::registry::TenantRegistry;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: PlatformConfig,
    pub db: ControlPool,
    pub registry: Arc<TenantRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: PlatformConfig,
        db: ControlPool,
        registry: Arc<TenantRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            db,
            registry,
            dispatcher,
        })
    }
}
