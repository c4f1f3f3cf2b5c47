use crate::dpia::DpiaAssessment;
use async_trait::async_trait;
use dataguard_core::{DataguardError, DataguardResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Append-only history of performed DPIA assessments.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn append(&self, assessment: &DpiaAssessment) -> DataguardResult<()>;

    /// Every assessment of an activity, oldest first.
    async fn history(&self, activity_id: Uuid) -> DataguardResult<Vec<DpiaAssessment>>;

    /// The most recent assessment of each activity of a tenant.
    async fn latest_for_tenant(&self, tenant_id: &str) -> DataguardResult<Vec<DpiaAssessment>>;
}

fn latest_per_activity<'a>(
    assessments: impl IntoIterator<Item = &'a DpiaAssessment>,
    tenant_id: &str,
) -> Vec<DpiaAssessment> {
    let mut latest: HashMap<Uuid, &DpiaAssessment> = HashMap::new();
    for a in assessments.into_iter().filter(|a| a.tenant_id == tenant_id) {
        // Later appends win ties on assessed_at.
        match latest.get(&a.activity_id) {
            Some(current) if current.assessed_at > a.assessed_at => {}
            _ => {
                latest.insert(a.activity_id, a);
            }
        }
    }
    let mut out: Vec<DpiaAssessment> = latest.into_values().cloned().collect();
    out.sort_by(|a, b| a.activity_name.cmp(&b.activity_name));
    out
}

/// In-process assessment history.
#[derive(Clone, Default)]
pub struct MemoryAssessmentStore {
    entries: Arc<RwLock<Vec<DpiaAssessment>>>,
}

impl MemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentStore for MemoryAssessmentStore {
    async fn append(&self, assessment: &DpiaAssessment) -> DataguardResult<()> {
        self.entries.write().await.push(assessment.clone());
        Ok(())
    }

    async fn history(&self, activity_id: Uuid) -> DataguardResult<Vec<DpiaAssessment>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|a| a.activity_id == activity_id)
            .cloned()
            .collect())
    }

    async fn latest_for_tenant(&self, tenant_id: &str) -> DataguardResult<Vec<DpiaAssessment>> {
        Ok(latest_per_activity(self.entries.read().await.iter(), tenant_id))
    }
}

/// Assessment history kept as one JSON document per line.
pub struct JsonlAssessmentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAssessmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> DataguardResult<Vec<DpiaAssessment>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    DataguardError::Store(format!(
                        "{} line {}: {e}",
                        self.path.display(),
                        n + 1
                    ))
                })
            })
            .collect()
    }
}

#[async_trait]
impl AssessmentStore for JsonlAssessmentStore {
    async fn append(&self, assessment: &DpiaAssessment) -> DataguardResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(assessment)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn history(&self, activity_id: Uuid) -> DataguardResult<Vec<DpiaAssessment>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|a| a.activity_id == activity_id)
            .collect())
    }

    async fn latest_for_tenant(&self, tenant_id: &str) -> DataguardResult<Vec<DpiaAssessment>> {
        let all = self.read_all().await?;
        Ok(latest_per_activity(all.iter(), tenant_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DpiaConfig;
    use crate::dpia::assess;
    use chrono::{Duration, Utc};
    use dataguard_core::{LegalBasis, ProcessingActivity};

    fn sample(tenant: &str, name: &str) -> ProcessingActivity {
        ProcessingActivity::new(tenant, name, "testing", LegalBasis::Contract)
    }

    #[tokio::test]
    async fn test_memory_history_is_append_only() {
        let store = MemoryAssessmentStore::new();
        let activity = sample("t1", "CRM");
        let now = Utc::now();
        let first = assess(&activity, &DpiaConfig::default(), now - Duration::days(10));
        let second = assess(&activity, &DpiaConfig::default(), now);
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        let history = store.history(activity.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);

        let latest = store.latest_for_tenant("t1").await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second.id);
        assert!(store.latest_for_tenant("t2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlAssessmentStore::new(dir.path().join("dpia").join("history.jsonl"));
        let a = sample("t1", "Payroll");
        let b = sample("t1", "Analytics");
        store
            .append(&assess(&a, &DpiaConfig::default(), Utc::now()))
            .await
            .unwrap();
        store
            .append(&assess(&b, &DpiaConfig::default(), Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.history(a.id).await.unwrap().len(), 1);
        let latest = store.latest_for_tenant("t1").await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].activity_name, "Analytics");
    }

    #[tokio::test]
    async fn test_jsonl_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlAssessmentStore::new(dir.path().join("absent.jsonl"));
        assert!(store.history(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_corrupt_line_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        tokio::fs::write(&path, "{oops\n").await.unwrap();
        let store = JsonlAssessmentStore::new(path);
        let err = store.latest_for_tenant("t1").await.unwrap_err();
        assert!(matches!(err, DataguardError::Store(_)));
    }
}
