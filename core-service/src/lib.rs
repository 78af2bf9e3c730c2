//! Core service façade and bootstrap helpers.
//!
//! This crate is the composition root. It wires host-provided bridge
//! implementations (HTTP, clock) and the validated [`CoreConfig`] into the
//! library store, the Supabase remote, the session holder and the sync
//! engine. Desktop apps typically enable the `desktop-shims` feature (which
//! depends on `bridge-desktop`) so no HTTP client has to be injected; mobile
//! hosts pass their own through [`CoreConfig`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    time::{Clock, SystemClock},
};
use core_auth::{AuthContext, AuthSession, SessionAuthContext, UserId};
use core_library::db::{self, DatabaseConfig};
use core_library::repositories::{
    SqliteEntryRepository, SqliteHistoryRepository, SqliteLibraryItemRepository,
    SqliteSourceRepository,
};
use core_library::{EntityId, SourceId};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::{
    ContentProvider, ContentProviderRegistry, DeletionService, LocalStores, RemoteService,
    SyncConfig, SyncOrchestrator, SyncRunReport,
};
use provider_supabase::{SupabaseAuthClient, SupabaseRemoteService};
use sqlx::SqlitePool;
use tracing::{info, warn};

#[cfg(feature = "desktop-shims")]
use bridge_desktop::ReqwestHttpClient;

/// Sessions expiring within this window are refreshed before a sync run.
const SESSION_REFRESH_BUFFER_SECS: i64 = 60;

/// Aggregated handle to the bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self { http_client, clock }
    }

    /// Resolve dependencies from the configuration, falling back to the
    /// desktop HTTP client when none was injected.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let http_client = match &config.http_client {
            Some(client) => Arc::clone(client),
            None => default_http_client()?,
        };
        Ok(Self::new(http_client, Arc::new(SystemClock)))
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = ReqwestHttpClient::new()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(CoreError::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "Inject one with CoreConfig::builder().http_client(..) or enable desktop-shims"
            .to_string(),
    })
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    pool: SqlitePool,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    session: Arc<SessionAuthContext>,
    auth_client: Arc<SupabaseAuthClient>,
    providers: Arc<ContentProviderRegistry>,
    stores: LocalStores,
    orchestrator: Arc<SyncOrchestrator>,
    deletion: Arc<DeletionService>,
}

impl CoreService {
    /// Open the database at `config.database_path` and build the service.
    ///
    /// ```ignore
    /// use core_runtime::config::{CoreConfig, RemoteConfig};
    ///
    /// let config = CoreConfig::builder()
    ///     .database_path("/data/reader.db")
    ///     .remote(RemoteConfig::new("https://project.supabase.co", "anon-key"))
    ///     .build()?;
    /// let core = core_service::CoreService::bootstrap(config).await?;
    /// core.sign_in("reader@example.com", "secret").await?;
    /// let report = core.sync().await?;
    /// ```
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(&config)?;
        let pool = db::create_pool(DatabaseConfig::new(&config.database_path)).await?;
        Ok(Self::assemble(config, deps, pool))
    }

    /// Build the service on an already opened pool.
    pub fn assemble(config: CoreConfig, deps: CoreDependencies, pool: SqlitePool) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);

        let session = Arc::new(
            SessionAuthContext::new(Arc::clone(&deps.clock)).with_event_bus(event_bus.clone()),
        );
        let auth: Arc<dyn AuthContext> = session.clone();

        let stores = LocalStores {
            sources: Arc::new(SqliteSourceRepository::new(pool.clone())),
            entries: Arc::new(SqliteEntryRepository::new(pool.clone())),
            library: Arc::new(SqliteLibraryItemRepository::new(pool.clone())),
            history: Arc::new(SqliteHistoryRepository::new(pool.clone())),
        };

        let remote: Arc<dyn RemoteService> = Arc::new(SupabaseRemoteService::new(
            Arc::clone(&deps.http_client),
            config.remote.clone(),
            Arc::clone(&auth),
        ));
        let auth_client = Arc::new(SupabaseAuthClient::new(
            Arc::clone(&deps.http_client),
            config.remote.clone(),
            Arc::clone(&deps.clock),
        ));

        let providers = Arc::new(ContentProviderRegistry::new());
        let sync_config = SyncConfig::from(&config.sync);

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&remote),
            stores.clone(),
            providers.clone(),
            Arc::clone(&auth),
            sync_config,
        )
        .with_event_bus(event_bus.clone());

        let deletion = DeletionService::new(
            stores.clone(),
            remote,
            auth,
            sync_config.remote_call_timeout,
        )
        .with_event_bus(event_bus.clone());

        info!(database = %config.database_path.display(), "Core service assembled");

        Self {
            config,
            pool,
            event_bus,
            clock: deps.clock,
            session,
            auth_client,
            providers,
            stores,
            orchestrator: Arc::new(orchestrator),
            deletion: Arc::new(deletion),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Local repositories, for host reads and writes between syncs.
    pub fn stores(&self) -> &LocalStores {
        &self.stores
    }

    pub async fn health_check(&self) -> Result<()> {
        Ok(db::health_check(&self.pool).await?)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId> {
        let session = self
            .auth_client
            .sign_in_with_password(email, password)
            .await?;
        let user_id = session.user_id();
        self.session.set_session(session).await;
        Ok(user_id)
    }

    /// Install a session the host persisted from an earlier launch.
    pub async fn restore_session(&self, session: AuthSession) -> Result<()> {
        if !session.is_valid(self.clock.now()) {
            // Expired access tokens are still refreshable.
            let refreshed = self.auth_client.refresh_session(&session.refresh_token).await?;
            self.session.set_session(refreshed).await;
        } else {
            self.session.set_session(session).await;
        }
        Ok(())
    }

    pub async fn current_session(&self) -> Option<AuthSession> {
        self.session.current_session().await
    }

    /// Cancel any active run of the user, then drop the session.
    pub async fn sign_out(&self) {
        if let Some(user_id) = self.session.user_id().await {
            self.orchestrator.cancel(&user_id);
        }
        self.session.clear_session().await;
    }

    /// Run a full sync for the signed-in user.
    ///
    /// A session close to expiry is refreshed first. If that fails the run
    /// still starts and aborts with `AuthRequired` once the session lapses.
    pub async fn sync(&self) -> Result<SyncRunReport> {
        if self.session.current_session().await.is_some() {
            let buffer = chrono::Duration::seconds(SESSION_REFRESH_BUFFER_SECS);
            if let Err(err) = self
                .auth_client
                .refresh_if_expiring(&self.session, buffer)
                .await
            {
                warn!(error = %err, "Could not refresh session before sync");
            }
        }

        Ok(self.orchestrator.run().await?)
    }

    /// Ask the signed-in user's active run to stop at its next checkpoint.
    pub async fn cancel_sync(&self) -> bool {
        match self.session.user_id().await {
            Some(user_id) => self.orchestrator.cancel(&user_id),
            None => false,
        }
    }

    pub async fn is_syncing(&self) -> bool {
        match self.session.user_id().await {
            Some(user_id) => self.orchestrator.is_running(&user_id),
            None => false,
        }
    }

    /// Register the content provider that hydrates items of `source_id`.
    pub async fn register_content_provider(
        &self,
        source_id: SourceId,
        provider: Arc<dyn ContentProvider>,
    ) {
        self.providers.register(source_id, provider).await;
    }

    pub async fn remove_library_item(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<()> {
        Ok(self.deletion.remove_library_item(source_id, entity_id).await?)
    }

    pub async fn uninstall_source(&self, source_id: &SourceId) -> Result<()> {
        self.providers.unregister(source_id).await;
        Ok(self.deletion.uninstall_source(source_id).await?)
    }

    pub async fn clear_history(&self, source_id: &SourceId, entity_id: &EntityId) -> Result<()> {
        Ok(self.deletion.clear_history(source_id, entity_id).await?)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
