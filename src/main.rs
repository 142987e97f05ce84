use std::time::Duration;

use comicvault::{config, db, state::AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_cfg = config::load()?;

    // Logging (stdout + tägliche Datei-Rotation im konfigurierten Verzeichnis)
    std::fs::create_dir_all(&app_cfg.logging.directory).ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender =
        tracing_appender::rolling::daily(&app_cfg.logging.directory, &app_cfg.logging.file_name);
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Guards am Leben halten, damit Non-Blocking Writer korrekt flushen
    let _log_guards = (stdout_guard, file_guard);

    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    let pool = db::connect(db_url, app_cfg.database.max_connections).await?;
    db::init_db(&pool).await?;

    let state = AppState::new(pool.clone(), app_cfg.clone());
    state.register_configured_libraries().await?;

    {
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    info!("ComicVault started, {} configured libraries", app_cfg.libraries.len());
    run_sync_pass(&state).await?;

    if let Some(secs) = app_cfg.scanner.rescan_interval_secs {
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        // first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => run_sync_pass(&state).await?,
            }
        }
    }

    pool.close().await;
    info!("ComicVault stopped");
    Ok(())
}

async fn run_sync_pass(state: &AppState) -> anyhow::Result<()> {
    let results = state.sync_all().await?;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(libraries = results.len(), failed, "sync pass finished");
    info!("metrics: {}", serde_json::to_string(&state.metrics.get_snapshot())?);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping syncs...");
}
