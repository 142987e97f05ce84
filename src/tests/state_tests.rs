#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::config::{AppConfig, LibraryConfig};
    use crate::error::CatalogError;
    use crate::library;
    use crate::state::AppState;
    use crate::tests::support::{sample_library, test_pool, ALPHA};
    use crate::types::ScanEvent;

    fn config_with(libraries: Vec<LibraryConfig>) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.scanner.concurrency = Some(2);
        cfg.libraries = libraries;
        cfg
    }

    #[tokio::test]
    async fn registers_configured_libraries_once() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        let missing = TempDir::new().unwrap();
        let cfg = config_with(vec![
            LibraryConfig { name: "Comics".into(), root: root.path().to_string_lossy().to_string() },
            LibraryConfig {
                name: "Gone".into(),
                root: missing.path().join("nope").to_string_lossy().to_string(),
            },
        ]);
        let state = AppState::new(pool.clone(), cfg);

        state.register_configured_libraries().await.unwrap();
        state.register_configured_libraries().await.unwrap();
        let libs = library::list_libraries(&pool).await.unwrap();
        assert_eq!(libs.len(), 1);
        assert_eq!(libs[0].name, "Comics");
    }

    #[tokio::test]
    async fn sync_all_updates_metrics() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        let cfg = config_with(vec![LibraryConfig {
            name: "Comics".into(),
            root: root.path().to_string_lossy().to_string(),
        }]);
        let state = AppState::new(pool, cfg);
        state.register_configured_libraries().await.unwrap();

        let results = state.sync_all().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());

        let snap = state.metrics.get_snapshot();
        assert_eq!(snap.syncs_started, 1);
        assert_eq!(snap.syncs_completed, 1);
        assert_eq!(snap.titles_changed, 1);
        assert_eq!(snap.books_changed, 2);
        assert_eq!(snap.pages_scanned, 8);
        assert!(state.jobs.read().await.is_empty());

        state.sync_all().await.unwrap();
        let snap = state.metrics.get_snapshot();
        assert_eq!(snap.syncs_completed, 2);
        assert_eq!(snap.pages_scanned, 8);
    }

    #[tokio::test]
    async fn concurrent_sync_of_same_library_conflicts() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        let state = AppState::new(pool.clone(), config_with(vec![]));
        let lib = library::create_library(&pool, "Comics", &root.path().to_string_lossy()).await.unwrap();

        // Pretend a sync is running
        let (sender, _) = tokio::sync::broadcast::channel(8);
        state.jobs.write().await.insert(
            lib.id,
            crate::state::JobHandle { cancel: state.shutdown.child_token(), sender },
        );

        let res = state.sync_library(lib.id).await;
        assert!(matches!(res, Err(CatalogError::Conflict(_))));
        assert!(state.subscribe(lib.id).await.is_some());
        assert!(state.cancel_sync(lib.id).await);
        assert!(!state.cancel_sync(lib.id + 1).await);
    }

    #[tokio::test]
    async fn dropped_sync_releases_its_slot() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        let state = AppState::new(pool.clone(), config_with(vec![]));
        let lib = library::create_library(&pool, "Comics", &root.path().to_string_lossy()).await.unwrap();

        // Hold the write lock so the sync stalls on its first catalog write
        let mut blocker = pool.begin().await.unwrap();
        sqlx::query("UPDATE libraries SET name = name").execute(&mut *blocker).await.unwrap();

        let task = {
            let state = state.clone();
            let id = lib.id;
            tokio::spawn(async move { state.sync_library(id).await })
        };
        let cancel = loop {
            if let Some(job) = state.jobs.read().await.get(&lib.id) {
                break job.cancel.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(!cancel.is_cancelled());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        for _ in 0..200 {
            if state.jobs.read().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(state.jobs.read().await.is_empty());
        assert!(cancel.is_cancelled());
        blocker.rollback().await.unwrap();

        let summary = state.sync_library(lib.id).await.unwrap();
        assert_eq!(summary.titles_added, 1);
        assert!(state.jobs.read().await.is_empty());
    }

    #[tokio::test]
    async fn title_cover_uses_configured_name() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        std::fs::copy(root.path().join(ALPHA).join("cover.jpg"), root.path().join(ALPHA).join("folder.jpg")).unwrap();
        let mut cfg = config_with(vec![]);
        cfg.scanner.cover_file_name = "folder.jpg".into();
        let state = AppState::new(pool.clone(), cfg);
        let lib = library::create_library(&pool, "Comics", &root.path().to_string_lossy()).await.unwrap();
        state.sync_library(lib.id).await.unwrap();

        let title = &library::find_titles(&pool, lib.id).await.unwrap()[0];
        let cover = state.read_title_cover(title.id).await.unwrap();
        assert_eq!(cover.extension, "jpg");
        std::fs::remove_file(root.path().join(ALPHA).join("folder.jpg")).unwrap();
        assert!(matches!(state.read_title_cover(title.id).await, Err(CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn shutdown_cancels_sync() {
        let (pool, _db) = test_pool().await;
        let root = sample_library();
        let state = AppState::new(pool.clone(), config_with(vec![]));
        let lib = library::create_library(&pool, "Comics", &root.path().to_string_lossy()).await.unwrap();

        state.shutdown.cancel();
        let res = state.sync_library(lib.id).await;
        assert!(matches!(res, Err(CatalogError::Cancelled)));
        let snap = state.metrics.get_snapshot();
        assert_eq!(snap.syncs_cancelled, 1);
        assert_eq!(library::find_titles(&pool, lib.id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn sync_of_unknown_library_fails_fast() {
        let (pool, _db) = test_pool().await;
        let state = AppState::new(pool, config_with(vec![]));
        assert!(matches!(state.sync_library(7).await, Err(CatalogError::NotFound(_))));
        assert_eq!(state.metrics.get_snapshot().syncs_started, 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(ScanEvent::TitleAdded { name: "A".into() }).unwrap();
        assert_eq!(json["type"], "title_added");
        assert_eq!(json["name"], "A");
        let json = serde_json::to_value(ScanEvent::Cancelled).unwrap();
        assert_eq!(json["type"], "cancelled");
    }
}
