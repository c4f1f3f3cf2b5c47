use dataguard_core::{
    AuditEvent, ConsentRecord, DataBreach, DataSubjectRequest, DataguardError, DataguardResult,
    EmployeeRecord, FormSubmission, NotificationRecord, ProcessingActivity, RetentionPolicy,
    SessionRecord, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable image of a [`MemoryStore`](crate::MemoryStore).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub activities: Vec<ProcessingActivity>,
    pub consents: Vec<ConsentRecord>,
    pub policies: Vec<RetentionPolicy>,
    pub users: Vec<UserRecord>,
    pub sessions: Vec<SessionRecord>,
    pub audit_events: Vec<AuditEvent>,
    pub form_submissions: Vec<FormSubmission>,
    pub notifications: Vec<NotificationRecord>,
    pub employees: Vec<EmployeeRecord>,
    pub breaches: Vec<DataBreach>,
    pub requests: Vec<DataSubjectRequest>,
}

impl Snapshot {
    /// Reads a snapshot file. A missing file yields an empty snapshot.
    pub async fn load(path: &Path) -> DataguardResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No snapshot file, starting empty");
            return Ok(Self::default());
        }
        let data = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&data).map_err(|e| {
            DataguardError::Store(format!(
                "Failed to parse snapshot {}: {e}",
                path.display()
            ))
        })
    }

    /// Writes the snapshot as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> DataguardResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dataguard_core::LegalBasis;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = Snapshot::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(snap.activities.is_empty());
        assert!(snap.policies.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let snap = Snapshot {
            activities: vec![ProcessingActivity::new(
                "t1",
                "CRM",
                "customer management",
                LegalBasis::Contract,
            )],
            ..Default::default()
        };
        snap.save(&path).await.unwrap();
        assert!(path.exists());

        let loaded = Snapshot::load(&path).await.unwrap();
        assert_eq!(loaded.activities.len(), 1);
        assert_eq!(loaded.activities[0].name, "CRM");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = Snapshot::load(&path).await.unwrap_err();
        assert!(matches!(err, DataguardError::Store(_)));
    }
}
