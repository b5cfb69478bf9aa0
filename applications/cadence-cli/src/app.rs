/// Wiring of the sync core for the command line
use crate::config::AppConfig;
use anyhow::Context;
use cadence_core::{AppEvent, EventDispatcher, SessionContext, SyncTable};
use cadence_library::{FavoritesProjection, HistoryProjection, PlaylistProjection};
use cadence_migration::{FileLegacyStore, MigrationReport, Migrator};
use cadence_remote::{RemoteApi, RestClient};
use cadence_storage::sync_state::{self, SyncErrorEntry};
use cadence_storage::LocalStore;
use cadence_sync::{CycleOutcome, SyncEngine, SyncTrigger};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, built once from the configuration
pub struct App {
    pub config: AppConfig,
    pub store: LocalStore,
    pub session: SessionContext,
    pub events: EventDispatcher<AppEvent>,
    pub remote: Arc<dyn RemoteApi>,
    pub engine: Arc<SyncEngine>,
}

/// Local sync bookkeeping for the signed-in user
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub user_id: Option<String>,
    pub cursors: Vec<(SyncTable, DateTime<Utc>)>,
    pub pending_uploads: i64,
    pub recent_errors: Vec<SyncErrorEntry>,
}

impl App {
    /// Open the local store and connect the engine to the backend
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        ensure_database_dir(&config.storage.database_url).await?;
        let store = LocalStore::open(&config.storage.database_url)
            .await
            .context("Failed to open local store")?;
        tracing::info!("Database connected");

        let session = config.session();
        let events = EventDispatcher::new();
        let remote: Arc<dyn RemoteApi> = Arc::new(
            RestClient::new(config.remote_config(), session.clone())
                .context("Failed to create backend client")?,
        );
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::clone(&remote),
            session.clone(),
            events.clone(),
        ));

        Ok(Self {
            config,
            store,
            session,
            events,
            remote,
            engine,
        })
    }

    /// Run a single cycle now
    pub async fn sync_once(&self) -> anyhow::Result<CycleOutcome> {
        Ok(self.engine.run_cycle(SyncTrigger::Manual).await?)
    }

    /// Keep the engine and the projections running until `shutdown` resolves
    pub async fn watch(&self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let listener = self.events.register(|event| match event {
            AppEvent::SyncCompleted {
                failed_tables,
                applied,
                pushed,
            } => tracing::info!(?failed_tables, applied, pushed, "Sync completed"),
            AppEvent::SyncStateChanged { state } => tracing::debug!(%state, "Sync state"),
            other => tracing::info!(event = ?other, "Library updated"),
        });

        let playlists =
            PlaylistProjection::start(self.store.clone(), self.session.clone(), self.events.clone());
        let favorites =
            FavoritesProjection::start(self.store.clone(), self.session.clone(), self.events.clone());
        let history =
            HistoryProjection::start(self.store.clone(), self.session.clone(), self.events.clone());

        let handle = self.engine.start(self.config.sync_config());
        shutdown.await;

        tracing::info!("Shutting down");
        handle.shutdown().await;
        drop((playlists, favorites, history));
        self.events.deregister(listener);
        Ok(())
    }

    /// Upload the legacy collections, clearing them only after full success
    pub async fn migrate(&self, clear: bool) -> anyhow::Result<Option<MigrationReport>> {
        let legacy = Arc::new(FileLegacyStore::new(self.config.migration.legacy_dir.clone()));
        let migrator = Migrator::new(Arc::clone(&self.remote), self.session.clone(), legacy);

        if !migrator.has_legacy_data().await? {
            return Ok(None);
        }

        let report = migrator.migrate_all().await?;
        if clear {
            if report.success {
                migrator.clear_local_data().await?;
            } else {
                tracing::warn!(failed = report.failed(), "Migration incomplete, legacy data kept");
            }
        }
        Ok(Some(report))
    }

    pub async fn status(&self, error_limit: i64) -> anyhow::Result<StatusReport> {
        let user_id = self.session.user_id();
        let (cursors, pending_uploads) = match &user_id {
            Some(user_id) => (
                sync_state::cursors(&self.store, user_id).await?,
                self.store.pending_count(user_id).await?,
            ),
            None => (Vec::new(), 0),
        };

        Ok(StatusReport {
            user_id,
            cursors,
            pending_uploads,
            recent_errors: self.engine.recent_errors(error_limit).await?,
        })
    }
}

/// `SQLite` creates the file but not its directory
async fn ensure_database_dir(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}
