use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::archive::PageBytes;
use crate::config::AppConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::library;
use crate::metrics::Metrics;
use crate::types::{ScanEvent, SyncSummary};

/// A handle to a running library sync.
#[derive(Clone)]
pub struct JobHandle {
    /// Cancelling stops dispatching page scans; the sync then rolls back.
    pub cancel: CancellationToken,
    /// Progress, warnings and the final outcome of the sync.
    pub sender: broadcast::Sender<ScanEvent>,
}

/// Deregisters a running sync when dropped, including when the sync future is
/// dropped before it finishes. Dropping also cancels the job so detached page
/// workers stop.
struct JobGuard {
    jobs: Arc<RwLock<HashMap<i64, JobHandle>>>,
    library_id: i64,
    handle: JobHandle,
}

impl JobGuard {
    fn remove_from(jobs: &mut HashMap<i64, JobHandle>, library_id: i64, handle: &JobHandle) {
        // A later sync of the same library may already own the slot.
        if jobs.get(&library_id).is_some_and(|job| job.sender.same_channel(&handle.sender)) {
            jobs.remove(&library_id);
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.handle.cancel.cancel();
        if let Ok(mut jobs) = self.jobs.try_write() {
            Self::remove_from(&mut jobs, self.library_id, &self.handle);
            return;
        }
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(library_id = self.library_id, "no runtime to deregister sync job");
            return;
        };
        let jobs = Arc::clone(&self.jobs);
        let library_id = self.library_id;
        let handle = self.handle.clone();
        rt.spawn(async move {
            Self::remove_from(&mut *jobs.write().await, library_id, &handle);
        });
    }
}

/// The shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    /// Running syncs keyed by library id. At most one per library.
    pub jobs: Arc<RwLock<HashMap<i64, JobHandle>>>,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    /// Root token; cancelling it stops every running sync.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        Self {
            db,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            metrics: Metrics::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates a library for every configured root that is not registered yet.
    pub async fn register_configured_libraries(&self) -> CatalogResult<()> {
        for lib in &self.config.libraries {
            match library::find_library_by_root(&self.db, &lib.root).await? {
                Some(existing) => {
                    tracing::debug!(id = existing.id, root = %existing.root, "library already registered")
                }
                None => match library::create_library(&self.db, &lib.name, &lib.root).await {
                    Ok(_) => {}
                    Err(CatalogError::NotFound(msg)) => {
                        tracing::warn!(library = %lib.name, "skipping configured library: {}", msg)
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(())
    }

    /// Runs one scan + reconciliation of `library_id` and waits for it.
    ///
    /// Fails with `Conflict` when a sync of the same library is already running.
    pub async fn sync_library(&self, library_id: i64) -> CatalogResult<SyncSummary> {
        let lib = library::find_library(&self.db, library_id).await?;

        let guard = {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&library_id) {
                return Err(CatalogError::Conflict(format!("library {} is already syncing", lib.name)));
            }
            let (sender, _) = broadcast::channel(1024);
            let handle = JobHandle { cancel: self.shutdown.child_token(), sender };
            jobs.insert(library_id, handle.clone());
            JobGuard { jobs: Arc::clone(&self.jobs), library_id, handle }
        };
        let handle = &guard.handle;

        self.metrics.inc_syncs_started();
        let options = self.config.scan_options();
        let result = library::scan_library(&self.db, &lib, &options, &handle.sender, &handle.cancel).await;

        match &result {
            Ok(summary) => {
                self.metrics.record_completed(summary);
                let _ = handle.sender.send(ScanEvent::Done { summary: summary.clone() });
            }
            Err(CatalogError::Cancelled) => {
                self.metrics.inc_syncs_cancelled();
                let _ = handle.sender.send(ScanEvent::Cancelled);
            }
            Err(e) => {
                self.metrics.inc_syncs_failed();
                let _ = handle.sender.send(ScanEvent::Failed { message: e.to_string() });
            }
        }

        drop(guard);
        result
    }

    /// Syncs every registered library one after another. Failures are logged
    /// and do not stop the remaining libraries.
    pub async fn sync_all(&self) -> CatalogResult<Vec<(i64, CatalogResult<SyncSummary>)>> {
        let libraries = library::list_libraries(&self.db).await?;
        let mut results = Vec::with_capacity(libraries.len());
        for lib in libraries {
            if self.shutdown.is_cancelled() {
                break;
            }
            let res = self.sync_library(lib.id).await;
            if let Err(e) = &res {
                tracing::error!(library = %lib.name, "sync failed: {}", e);
            }
            results.push((lib.id, res));
        }
        Ok(results)
    }

    /// Returns false when no sync of `library_id` is running.
    pub async fn cancel_sync(&self, library_id: i64) -> bool {
        match self.jobs.read().await.get(&library_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cover image of a title, using the configured cover file name.
    pub async fn read_title_cover(&self, title_id: i64) -> CatalogResult<PageBytes> {
        library::read_title_cover(&self.db, title_id, &self.config.scanner.cover_file_name).await
    }

    pub async fn subscribe(&self, library_id: i64) -> Option<broadcast::Receiver<ScanEvent>> {
        self.jobs.read().await.get(&library_id).map(|job| job.sender.subscribe())
    }
}
