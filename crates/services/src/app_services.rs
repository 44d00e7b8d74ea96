use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::api::{HttpPsychologyApi, PsychologyApi};
use crate::catalog_service::CatalogService;
use crate::config::ApiConfig;
use crate::error::AppServicesError;
use crate::history_service::HistoryService;
use crate::identity::{DeviceRegistry, IdentityProvisioner, provisioner_for};
use crate::launch_service::LaunchService;
use crate::result_service::ResultService;
use crate::sessions::TestSessionService;

/// Assembles app-facing services over one storage backend and one API client.
#[derive(Clone)]
pub struct AppServices {
    identity: Arc<dyn IdentityProvisioner>,
    catalog: Arc<CatalogService>,
    sessions: Arc<TestSessionService>,
    results: Arc<ResultService>,
    history: Arc<HistoryService>,
    launch: Arc<LaunchService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP API.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the API
    /// client cannot be built from `config`.
    pub async fn new_sqlite(
        db_url: &str,
        config: &ApiConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let api: Arc<dyn PsychologyApi> = Arc::new(HttpPsychologyApi::new(config)?);
        Ok(Self::with_api(&storage, api, config, clock))
    }

    /// Build services over any storage and API implementation.
    #[must_use]
    pub fn with_api(
        storage: &Storage,
        api: Arc<dyn PsychologyApi>,
        config: &ApiConfig,
        clock: Clock,
    ) -> Self {
        let registry = DeviceRegistry::new(clock, Arc::clone(&storage.kv), Arc::clone(&api))
            .with_platform_device_id(config.platform_device_id.clone());
        let identity = provisioner_for(config.identity_policy, registry);

        Self {
            identity: Arc::clone(&identity),
            catalog: Arc::new(CatalogService::new(Arc::clone(&api))),
            sessions: Arc::new(TestSessionService::new(Arc::clone(&api), identity)),
            results: Arc::new(ResultService::new(Arc::clone(&api), Arc::clone(&storage.kv))),
            history: Arc::new(HistoryService::new(clock, Arc::clone(&storage.kv))),
            launch: Arc::new(LaunchService::new(Arc::clone(&storage.kv))),
        }
    }

    #[must_use]
    pub fn identity(&self) -> Arc<dyn IdentityProvisioner> {
        Arc::clone(&self.identity)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<TestSessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn results(&self) -> Arc<ResultService> {
        Arc::clone(&self.results)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn launch(&self) -> Arc<LaunchService> {
        Arc::clone(&self.launch)
    }
}
