#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the dataguard-store crate.
//!
//! Covers optimistic consent appends, keyed scans under concurrent deletion,
//! scope leases and snapshot persistence of a populated store.

use chrono::{DateTime, Duration, Utc};
use dataguard_core::*;
use dataguard_store::*;
use uuid::Uuid;

fn consent(user: &str, granted: bool, at: DateTime<Utc>) -> ConsentRecord {
    ConsentRecord {
        id: Uuid::new_v4(),
        user_id: user.into(),
        tenant_id: "acme".into(),
        purpose: ConsentPurpose::Analytics,
        granted,
        granted_at: granted.then_some(at),
        revoked_at: (!granted).then_some(at),
        version: "v1".into(),
        source: ConsentSource::Banner,
        expires_at: None,
        metadata: ConsentMetadata::default(),
        created_at: at,
    }
}

fn form(tenant: &str, created_at: DateTime<Utc>) -> FormSubmission {
    FormSubmission {
        id: Uuid::new_v4(),
        tenant_id: tenant.into(),
        form_name: "contact".into(),
        data: serde_json::json!({ "message": "hello" }),
        created_at,
    }
}

// ---------------------------------------------------------------------------
// 1. Consent appends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_append_rejects_stale_expected_latest() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let first = consent("u1", true, now);
    let first_id = first.id;
    store.append_consent(first, None, false).await.unwrap();

    // A writer that read "no history" lost the race.
    let err = store
        .append_consent(consent("u1", false, now), None, true)
        .await
        .unwrap_err();
    assert!(matches!(err, DataguardError::Conflict(_)));

    let superseded = store
        .append_consent(consent("u1", false, now), Some(first_id), true)
        .await
        .unwrap();
    assert_eq!(superseded, 1);

    let key = ConsentKey::new("u1", "acme", ConsentPurpose::Analytics);
    let history = store.consent_history(&key).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].revoked_at.is_some());
    assert!(!store.latest_consent(&key).await.unwrap().unwrap().granted);
}

// ---------------------------------------------------------------------------
// 2. Keyed scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_paged_scan_survives_deletion_of_seen_rows() {
    let store = MemoryStore::new();
    let now = Utc::now();
    for i in 0..7 {
        store.insert_form_submission(form("acme", now - Duration::days(400 + i))).await;
    }
    store.insert_form_submission(form("acme", now)).await;
    store.insert_form_submission(form("globex", now - Duration::days(500))).await;

    let mut query = RecordQuery::new(
        Some("acme".into()),
        DataType::FormSubmission,
        now - Duration::days(365),
        3,
    );
    let mut seen = 0;
    loop {
        let page = store.scan_records(&query).await.unwrap();
        let Some(last) = page.last() else { break };
        query.after = Some(ScanCursor::of(last));
        let ids: Vec<Uuid> = page.iter().map(DataRecord::id).collect();
        seen += ids.len();
        store
            .delete_records(DataType::FormSubmission, &ids)
            .await
            .unwrap();
        if page.len() < 3 {
            break;
        }
    }
    assert_eq!(seen, 7);
    assert_eq!(store.count(DataType::FormSubmission).await, 2);

    let summary = store
        .summarize(Some("acme"), DataType::FormSubmission)
        .await
        .unwrap();
    assert_eq!(summary.total, 1);
}

// ---------------------------------------------------------------------------
// 3. Leases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lease_expires_and_can_be_taken_over() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let scope = PolicyScope {
        tenant_id: Some("acme".into()),
        data_type: DataType::Session,
    };
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(store
        .try_acquire_lease(&scope, a, now + Duration::minutes(5), now)
        .await
        .unwrap());
    assert!(!store
        .try_acquire_lease(&scope, b, now + Duration::minutes(5), now)
        .await
        .unwrap());

    // Past the first holder's expiry the scope is free again.
    let later = now + Duration::minutes(10);
    assert!(store
        .try_acquire_lease(&scope, b, later + Duration::minutes(5), later)
        .await
        .unwrap());

    // Releasing with a stale holder id is a no-op.
    store.release_lease(&scope, a).await.unwrap();
    assert!(!store
        .try_acquire_lease(&scope, a, later + Duration::minutes(5), later)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// 4. Snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_roundtrip_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let now = Utc::now();

    let store = MemoryStore::new();
    store
        .save_activity(&ProcessingActivity::new(
            "acme",
            "Newsletter",
            "Email marketing",
            LegalBasis::Consent,
        ))
        .await
        .unwrap();
    store
        .append_consent(consent("u1", true, now), None, false)
        .await
        .unwrap();
    store.insert_form_submission(form("acme", now)).await;
    store
        .log(AuditEvent::new(
            "acme",
            "admin",
            "RETENTION_POLICY_CREATED",
            "retention_policy",
            AuditCategory::Retention,
            Severity::Info,
        ))
        .await
        .unwrap();
    store.snapshot().await.save(&path).await.unwrap();

    let restored = MemoryStore::from_snapshot(Snapshot::load(&path).await.unwrap());
    assert_eq!(restored.list_activities("acme", true).await.unwrap().len(), 1);
    assert_eq!(restored.list_consents("acme", None).await.unwrap().len(), 1);
    assert_eq!(restored.count(DataType::FormSubmission).await, 1);
    let logs = restored.get_logs(&AuditFilter::tenant("acme")).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "RETENTION_POLICY_CREATED");
}
