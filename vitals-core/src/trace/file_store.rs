use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{check_capacity, validate_session_id, TraceError, TraceStore};
use crate::models::event::TraceEvent;
use crate::models::session::Session;

const FILE_PREFIX: &str = "trace_";
const FILE_SUFFIX: &str = ".json";

/// One `trace_{session_id}.json` document per session.
///
/// Every append rewrites the document through a temp file that is fsynced and
/// renamed over the old one, so readers never observe a partial write.
pub struct FileTraceStore {
    dir: PathBuf,
    max_events: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileTraceStore {
    pub fn open(dir: impl Into<PathBuf>, max_events: usize) -> Result<Self, TraceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "File trace store ready");
        Ok(Self {
            dir,
            max_events,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, session_id, FILE_SUFFIX))
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of a deleted session unless another task still
    /// holds or waits on it.
    async fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // one count for the map, one for `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    async fn remove_file(&self, session_id: &str) -> Result<bool, TraceError> {
        match tokio::fs::remove_file(self.session_path(session_id)).await {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "Trace session deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_session(path: &Path) -> Result<Option<Session>, TraceError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_session(&self, session: &Session) -> Result<(), TraceError> {
        let path = self.session_path(&session.session_id);
        let tmp = self.dir.join(format!(
            ".{}{}.{}.tmp",
            FILE_PREFIX,
            session.session_id,
            uuid::Uuid::new_v4()
        ));

        let bytes = serde_json::to_vec_pretty(session)?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        // persist the rename itself
        tokio::fs::File::open(&self.dir).await?.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl TraceStore for FileTraceStore {
    async fn append(&self, event: &TraceEvent) -> Result<(), TraceError> {
        validate_session_id(&event.session_id)?;
        let lock = self.session_lock(&event.session_id).await;
        let _guard = lock.lock().await;

        let path = self.session_path(&event.session_id);
        let session = match Self::read_session(&path).await? {
            Some(mut session) => {
                check_capacity(
                    &event.session_id,
                    session.events.len(),
                    session.pending_requests(),
                    event.event_type(),
                    self.max_events,
                )?;
                session.push(event.clone());
                session
            }
            None => {
                check_capacity(&event.session_id, 0, 0, event.event_type(), self.max_events)?;
                Session::open(event.clone())
            }
        };

        self.write_session(&session).await?;
        tracing::debug!(
            session_id = %event.session_id,
            event_type = %event.event_type(),
            events = session.events.len(),
            "Trace event appended"
        );
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, TraceError> {
        validate_session_id(session_id)?;
        Self::read_session(&self.session_path(session_id))
            .await?
            .ok_or_else(|| TraceError::SessionNotFound(session_id.to_string()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, TraceError> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.remove_file(session_id).await
        };
        self.release_lock(session_id, lock).await;
        deleted
    }

    async fn delete_if_older(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, TraceError> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id).await;
        let deleted = {
            let _guard = lock.lock().await;
            match Self::read_session(&self.session_path(session_id)).await? {
                Some(session) if session.end_time < cutoff => self.remove_file(session_id).await,
                _ => Ok(false),
            }
        };
        self.release_lock(session_id, lock).await;
        deleted
    }

    async fn all_sessions(&self) -> Result<Vec<Session>, TraceError> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }

            match Self::read_session(&entry.path()).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Skipping unreadable trace file");
                }
            }
        }
        Ok(sessions)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::HealthCategory;
    use crate::models::evaluation::{EvaluationResult, RecordDigest};
    use crate::models::event::{EventType, Metadata};
    use crate::models::record::ClientRecord;
    use chrono::Duration;

    fn store(dir: &tempfile::TempDir, max_events: usize) -> FileTraceStore {
        FileTraceStore::open(dir.path(), max_events).unwrap()
    }

    fn request(session_id: &str, company: &str) -> TraceEvent {
        TraceEvent::user_request(
            session_id,
            ClientRecord {
                company_name: company.to_string(),
                campaign_objectives: "grow leads".to_string(),
                ..ClientRecord::default()
            },
        )
    }

    fn response(session_id: &str, company: &str) -> TraceEvent {
        TraceEvent::bot_response(
            session_id,
            EvaluationResult {
                category: HealthCategory::MightNeedAttention,
                confidence: 65,
                reasoning: "Spend is drifting".to_string(),
                budget_assessment: None,
                performance_assessment: None,
                client_satisfaction: None,
                recommendations: vec!["Rebalance spend".to_string()],
                risk_factors: vec![],
                positive_indicators: vec![],
                processing_time_secs: 1.2,
                record: RecordDigest {
                    company_name: company.to_string(),
                    ..RecordDigest::default()
                },
            },
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn test_append_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        let events = vec![
            request("s1", "Acme"),
            response("s1", "Acme"),
            request("s1", "Beta"),
        ];
        for event in &events {
            store.append(event).await.unwrap();
        }

        let session = store.get_session("s1").await.unwrap();
        assert_eq!(session.events, events);
        assert_eq!(session.start_time, events[0].timestamp);
        assert_eq!(session.end_time, events[2].timestamp);
        assert!(dir.path().join("trace_s1.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(&dir, 1000));

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let event = request("busy", &format!("Company {}", i));
                store.append(&event).await.unwrap();
                event.event_id
            }));
        }

        let mut expected = Vec::new();
        for handle in handles {
            expected.push(handle.await.unwrap());
        }

        let session = store.get_session("busy").await.unwrap();
        assert_eq!(session.events.len(), 40);
        for id in expected {
            assert!(session.events.iter().any(|e| e.event_id == id));
        }
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        match store.get_session("missing").await {
            Err(TraceError::SessionNotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("Expected SessionNotFound, got {:?}", other),
        }
        assert!(!store.delete_session("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);
        store.append(&request("gone", "Acme")).await.unwrap();

        assert!(store.delete_session("gone").await.unwrap());
        assert!(store.get_session("gone").await.is_err());
        assert!(!store.delete_session("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        let mut old = request("old", "Acme");
        old.timestamp = Utc::now() - Duration::days(45);
        store.append(&old).await.unwrap();
        store.append(&request("fresh", "Beta")).await.unwrap();

        let report = store.cleanup(30, true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.removed, vec!["old"]);
        assert_eq!(report.kept, 1);
        assert!(store.get_session("old").await.is_ok());
        assert_eq!(store.all_sessions().await.unwrap().len(), 2);

        let report = store.cleanup(30, false).await.unwrap();
        assert_eq!(report.removed, vec!["old"]);
        assert!(store.get_session("old").await.is_err());
        assert!(store.get_session("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_uses_last_event_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        let mut first = request("active", "Acme");
        first.timestamp = Utc::now() - Duration::days(90);
        store.append(&first).await.unwrap();
        store.append(&response("active", "Acme")).await.unwrap();

        let report = store.cleanup(30, false).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 1);
    }

    #[tokio::test]
    async fn test_cleanup_spares_session_appended_after_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        let mut old = request("revived", "Acme");
        old.timestamp = Utc::now() - Duration::days(45);
        store.append(&old).await.unwrap();
        let cutoff = Utc::now() - Duration::days(30);

        // the retention pass listed the session as stale, then a request landed
        store.append(&request("revived", "Acme")).await.unwrap();
        assert!(!store.delete_if_older("revived", cutoff).await.unwrap());
        assert_eq!(store.get_session("revived").await.unwrap().events.len(), 2);

        assert!(!store.delete_if_older("missing", cutoff).await.unwrap());
        assert!(store.delete_if_older("revived", Utc::now() + Duration::days(1)).await.unwrap());
        assert!(store.get_session("revived").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_releases_session_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);
        for id in ["a", "b", "c"] {
            store.append(&request(id, "Acme")).await.unwrap();
        }
        assert_eq!(store.locks.lock().await.len(), 3);

        store.delete_session("a").await.unwrap();
        store.delete_session("never-existed").await.unwrap();
        let report = store.cleanup(0, false).await.unwrap();
        assert_eq!(report.removed, vec!["b", "c"]);
        assert!(store.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_holds_slots_for_requests_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 4);

        store.append(&request("busy", "Acme")).await.unwrap();
        store.append(&request("busy", "Beta")).await.unwrap();
        let err = store.append(&request("busy", "Gamma")).await.unwrap_err();
        assert_eq!(err.kind(), "SessionCapacityExceeded");

        store.append(&response("busy", "Acme")).await.unwrap();
        store.append(&response("busy", "Beta")).await.unwrap();
        let session = store.get_session("busy").await.unwrap();
        assert_eq!(session.events.len(), 4);
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_capacity_rejects_unpaired_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 3);

        store.append(&request("full", "Acme")).await.unwrap();
        store.append(&response("full", "Acme")).await.unwrap();
        let err = store.append(&request("full", "Beta")).await.unwrap_err();
        assert_eq!(err.kind(), "SessionCapacityExceeded");

        let error = TraceEvent::error("full", "Beta", "InvalidRecord", "bad".to_string(), Metadata::new());
        store.append(&error).await.unwrap();
        assert!(store.append(&error).await.is_err());

        let session = store.get_session("full").await.unwrap();
        assert_eq!(session.events.len(), 3);
        assert_eq!(session.count(EventType::UserRequest), 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_session_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);
        let err = store.append(&request("../escape", "Acme")).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidSessionId");
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first_and_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);

        let mut older = request("older", "Acme");
        older.timestamp = Utc::now() - Duration::hours(2);
        store.append(&older).await.unwrap();
        store.append(&request("newer", "Beta")).await.unwrap();
        std::fs::write(dir.path().join("trace_broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let summaries = store.list_sessions().await.unwrap();
        let ids: Vec<&str> = summaries.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
        assert_eq!(summaries[1].companies_analyzed, vec!["Acme"]);
    }

    #[tokio::test]
    async fn test_export_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1000);
        store.append(&request("a", "Acme")).await.unwrap();
        store.append(&response("a", "Acme")).await.unwrap();
        store.append(&request("b", "Beta")).await.unwrap();

        let export = store.export_all().await.unwrap();
        assert_eq!(export.total_sessions, 2);
        assert_eq!(export.sessions.len(), 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.unique_companies, 2);
        assert_eq!(stats.category_distribution.get("might_need_attention"), Some(&1));
    }
}
