//! Trace retention: periodically removes sessions older than `trace.max_age_days`.

use std::sync::Arc;

use tokio::sync::broadcast;
use vitals_core::config::TraceConfig;
use vitals_core::{CleanupReport, TraceError, TraceStore};

/// Background loop. Returns immediately when `auto_cleanup` is off.
pub async fn run_retention_loop(
    store: Arc<dyn TraceStore>,
    config: TraceConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    if !config.auto_cleanup {
        tracing::info!("Trace retention disabled (trace.auto_cleanup = false)");
        return;
    }

    let minutes = config.cleanup_interval_minutes.max(1);
    let interval = tokio::time::Duration::from_secs(minutes * 60);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        interval_minutes = minutes,
        max_age_days = config.max_age_days,
        "Trace retention loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_retention_pass(store.as_ref(), config.max_age_days).await {
                    tracing::error!(error = %e, "Trace retention pass failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Trace retention loop shutting down");
                break;
            }
        }
    }
}

/// One non-dry-run cleanup.
pub async fn run_retention_pass(
    store: &dyn TraceStore,
    max_age_days: u32,
) -> Result<CleanupReport, TraceError> {
    let report = store.cleanup(max_age_days, false).await?;
    if !report.removed.is_empty() {
        tracing::info!(
            removed = report.removed.len(),
            kept = report.kept,
            "Expired trace sessions removed"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::models::{ClientRecord, TraceEvent};
    use vitals_core::FileTraceStore;

    // ========================================================================
    // TEST 1: a pass keeps fresh sessions
    // ========================================================================
    #[tokio::test]
    async fn test_retention_pass_keeps_fresh_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTraceStore::open(dir.path(), 100).unwrap();
        store
            .append(&TraceEvent::user_request("fresh", ClientRecord::default()))
            .await
            .unwrap();

        let report = run_retention_pass(&store, 30).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 1);
        assert!(store.get_session("fresh").await.is_ok());
    }

    // ========================================================================
    // TEST 2: disabled loop exits without waiting for shutdown
    // ========================================================================
    #[tokio::test]
    async fn test_disabled_loop_returns() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn TraceStore> = Arc::new(FileTraceStore::open(dir.path(), 100).unwrap());
        let config = TraceConfig {
            auto_cleanup: false,
            ..TraceConfig::default()
        };
        let (_tx, rx) = broadcast::channel(1);

        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            run_retention_loop(store, config, rx),
        )
        .await
        .expect("disabled loop should return immediately");
    }

    // ========================================================================
    // TEST 3: running loop stops on shutdown
    // ========================================================================
    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn TraceStore> = Arc::new(FileTraceStore::open(dir.path(), 100).unwrap());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_retention_loop(store, TraceConfig::default(), rx));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("loop should stop")
            .unwrap();
    }
}
