use crate::snapshot::Snapshot;
use crate::store::{
    ActivityStore, ConsentStore, PolicyStore, RecordQuery, RecordStore, RecordSummary,
    ScanCursor, SubjectRightsStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataguard_core::{
    AuditEvent, AuditFilter, AuditSink, AuditStats, ConsentKey, ConsentRecord, DataBreach,
    DataRecord, DataSubjectRequest, DataType, DataguardError, DataguardResult, EmployeeRecord,
    FormSubmission, NotificationRecord, PolicyScope, ProcessingActivity, RetainedRow,
    RetentionPolicy, SessionRecord, UserRecord,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Lease {
    holder: Uuid,
    expires_at: DateTime<Utc>,
}

/// In-memory store backing every persistence contract.
///
/// Each collection sits behind its own `RwLock`; writes that must be atomic
/// (consent append + supersede, lease acquisition) happen under a single
/// write guard.
pub struct MemoryStore {
    activities: Arc<RwLock<Vec<ProcessingActivity>>>,
    consents: Arc<RwLock<Vec<ConsentRecord>>>,
    policies: Arc<RwLock<Vec<RetentionPolicy>>>,
    leases: Arc<RwLock<HashMap<PolicyScope, Lease>>>,
    users: Arc<RwLock<Vec<UserRecord>>>,
    sessions: Arc<RwLock<Vec<SessionRecord>>>,
    audit: Arc<RwLock<Vec<AuditEvent>>>,
    forms: Arc<RwLock<Vec<FormSubmission>>>,
    notifications: Arc<RwLock<Vec<NotificationRecord>>>,
    employees: Arc<RwLock<Vec<EmployeeRecord>>>,
    breaches: Arc<RwLock<Vec<DataBreach>>>,
    requests: Arc<RwLock<Vec<DataSubjectRequest>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Builds a store holding the snapshot's contents.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            activities: Arc::new(RwLock::new(snapshot.activities)),
            consents: Arc::new(RwLock::new(snapshot.consents)),
            policies: Arc::new(RwLock::new(snapshot.policies)),
            leases: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(snapshot.users)),
            sessions: Arc::new(RwLock::new(snapshot.sessions)),
            audit: Arc::new(RwLock::new(snapshot.audit_events)),
            forms: Arc::new(RwLock::new(snapshot.form_submissions)),
            notifications: Arc::new(RwLock::new(snapshot.notifications)),
            employees: Arc::new(RwLock::new(snapshot.employees)),
            breaches: Arc::new(RwLock::new(snapshot.breaches)),
            requests: Arc::new(RwLock::new(snapshot.requests)),
        }
    }

    /// Copies the current contents out. Leases are not persisted.
    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            activities: self.activities.read().await.clone(),
            consents: self.consents.read().await.clone(),
            policies: self.policies.read().await.clone(),
            users: self.users.read().await.clone(),
            sessions: self.sessions.read().await.clone(),
            audit_events: self.audit.read().await.clone(),
            form_submissions: self.forms.read().await.clone(),
            notifications: self.notifications.read().await.clone(),
            employees: self.employees.read().await.clone(),
            breaches: self.breaches.read().await.clone(),
            requests: self.requests.read().await.clone(),
        }
    }

    pub async fn insert_user(&self, user: UserRecord) {
        self.users.write().await.push(user);
    }

    pub async fn insert_session(&self, session: SessionRecord) {
        self.sessions.write().await.push(session);
    }

    pub async fn insert_form_submission(&self, form: FormSubmission) {
        self.forms.write().await.push(form);
    }

    pub async fn insert_notification(&self, notification: NotificationRecord) {
        self.notifications.write().await.push(notification);
    }

    pub async fn insert_employee(&self, employee: EmployeeRecord) {
        self.employees.write().await.push(employee);
    }

    pub async fn insert_breach(&self, breach: DataBreach) {
        self.breaches.write().await.push(breach);
    }

    pub async fn insert_request(&self, request: DataSubjectRequest) {
        self.requests.write().await.push(request);
    }

    /// Looks up a user by id.
    pub async fn user(&self, id: Uuid) -> Option<UserRecord> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    /// Number of stored rows of a data type across all tenants.
    pub async fn count(&self, data_type: DataType) -> usize {
        match data_type {
            DataType::User => self.users.read().await.len(),
            DataType::Session => self.sessions.read().await.len(),
            DataType::AuditLog => self.audit.read().await.len(),
            DataType::ConsentRecord => self.consents.read().await.len(),
            DataType::FormSubmission => self.forms.read().await.len(),
            DataType::Notification => self.notifications.read().await.len(),
        }
    }

    async fn scan_page(&self, query: &RecordQuery) -> Vec<DataRecord> {
        match query.data_type {
            DataType::User => scan_rows(&self.users, query, DataRecord::User).await,
            DataType::Session => scan_rows(&self.sessions, query, DataRecord::Session).await,
            DataType::AuditLog => scan_rows(&self.audit, query, DataRecord::AuditLog).await,
            DataType::ConsentRecord => {
                scan_rows(&self.consents, query, DataRecord::ConsentRecord).await
            }
            DataType::FormSubmission => {
                scan_rows(&self.forms, query, DataRecord::FormSubmission).await
            }
            DataType::Notification => {
                scan_rows(&self.notifications, query, DataRecord::Notification).await
            }
        }
    }

    async fn summary_of(&self, tenant_id: Option<&str>, data_type: DataType) -> RecordSummary {
        match data_type {
            DataType::User => summarize_rows(&self.users, tenant_id).await,
            DataType::Session => summarize_rows(&self.sessions, tenant_id).await,
            DataType::AuditLog => summarize_rows(&self.audit, tenant_id).await,
            DataType::ConsentRecord => summarize_rows(&self.consents, tenant_id).await,
            DataType::FormSubmission => summarize_rows(&self.forms, tenant_id).await,
            DataType::Notification => summarize_rows(&self.notifications, tenant_id).await,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of `rows` in cursor order. Only the rows returned are cloned.
async fn scan_rows<T: RetainedRow + Clone>(
    rows: &RwLock<Vec<T>>,
    query: &RecordQuery,
    wrap: fn(T) -> DataRecord,
) -> Vec<DataRecord> {
    let cursor = |r: &&T| ScanCursor {
        reference_time: r.reference_time(),
        id: r.row_id(),
    };
    if query.limit == 0 {
        return Vec::new();
    }
    let rows = rows.read().await;
    let mut page: Vec<&T> = rows
        .iter()
        .filter(|r| query.admits_row(r.row_tenant(), cursor(r)))
        .collect();
    if page.len() > query.limit {
        page.select_nth_unstable_by_key(query.limit - 1, cursor);
        page.truncate(query.limit);
    }
    page.sort_unstable_by_key(cursor);
    page.into_iter().cloned().map(wrap).collect()
}

async fn summarize_rows<T: RetainedRow>(
    rows: &RwLock<Vec<T>>,
    tenant_id: Option<&str>,
) -> RecordSummary {
    let mut summary = RecordSummary::default();
    for row in rows
        .read()
        .await
        .iter()
        .filter(|r| tenant_id.is_none_or(|t| r.row_tenant() == t))
    {
        let at = row.reference_time();
        summary.total += 1;
        summary.oldest = Some(summary.oldest.map_or(at, |o| o.min(at)));
        summary.newest = Some(summary.newest.map_or(at, |n| n.max(at)));
    }
    summary
}

async fn remove_ids<T>(rows: &RwLock<Vec<T>>, ids: &HashSet<Uuid>, id: fn(&T) -> Uuid) -> u64 {
    let mut rows = rows.write().await;
    let before = rows.len();
    rows.retain(|r| !ids.contains(&id(r)));
    (before - rows.len()) as u64
}

async fn replace<T: Clone>(
    rows: &RwLock<Vec<T>>,
    record: &T,
    id: fn(&T) -> Uuid,
) -> DataguardResult<()> {
    let mut rows = rows.write().await;
    let target = id(record);
    match rows.iter_mut().find(|r| id(r) == target) {
        Some(slot) => {
            *slot = record.clone();
            Ok(())
        }
        None => Err(DataguardError::NotFound(format!("record {target}"))),
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn get_activity(&self, id: Uuid) -> DataguardResult<Option<ProcessingActivity>> {
        Ok(self
            .activities
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_activities(
        &self,
        tenant_id: &str,
        active_only: bool,
    ) -> DataguardResult<Vec<ProcessingActivity>> {
        Ok(self
            .activities
            .read()
            .await
            .iter()
            .filter(|a| a.tenant_id == tenant_id && (!active_only || a.is_active))
            .cloned()
            .collect())
    }

    async fn save_activity(&self, activity: &ProcessingActivity) -> DataguardResult<()> {
        let mut activities = self.activities.write().await;
        match activities.iter_mut().find(|a| a.id == activity.id) {
            Some(slot) => *slot = activity.clone(),
            None => activities.push(activity.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl ConsentStore for MemoryStore {
    async fn latest_consent(&self, key: &ConsentKey) -> DataguardResult<Option<ConsentRecord>> {
        Ok(self
            .consents
            .read()
            .await
            .iter()
            .rev()
            .find(|c| c.key() == *key)
            .cloned())
    }

    async fn consent_history(&self, key: &ConsentKey) -> DataguardResult<Vec<ConsentRecord>> {
        Ok(self
            .consents
            .read()
            .await
            .iter()
            .filter(|c| c.key() == *key)
            .cloned()
            .collect())
    }

    async fn list_consents(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> DataguardResult<Vec<ConsentRecord>> {
        Ok(self
            .consents
            .read()
            .await
            .iter()
            .filter(|c| c.tenant_id == tenant_id && user_id.is_none_or(|u| c.user_id == u))
            .cloned()
            .collect())
    }

    async fn append_consent(
        &self,
        record: ConsentRecord,
        expected_latest: Option<Uuid>,
        supersede: bool,
    ) -> DataguardResult<usize> {
        let key = record.key();
        let mut consents = self.consents.write().await;

        let current = consents.iter().rev().find(|c| c.key() == key).map(|c| c.id);
        if current != expected_latest {
            return Err(DataguardError::Conflict(format!(
                "consent {key} changed concurrently"
            )));
        }

        let mut superseded = 0;
        if supersede {
            for existing in consents.iter_mut().filter(|c| c.key() == key) {
                existing.mark_revoked(record.created_at);
                superseded += 1;
            }
        }
        consents.push(record);
        Ok(superseded)
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn insert_policy(&self, policy: &RetentionPolicy) -> DataguardResult<()> {
        let mut policies = self.policies.write().await;
        if policies.iter().any(|p| p.id == policy.id) {
            return Err(DataguardError::Conflict(format!(
                "policy {} already exists",
                policy.id
            )));
        }
        policies.push(policy.clone());
        Ok(())
    }

    async fn get_policy(&self, id: Uuid) -> DataguardResult<Option<RetentionPolicy>> {
        Ok(self
            .policies
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_policies(
        &self,
        tenant_id: Option<&str>,
    ) -> DataguardResult<Vec<RetentionPolicy>> {
        Ok(self
            .policies
            .read()
            .await
            .iter()
            .filter(|p| tenant_id.is_none_or(|t| p.applies_to_tenant(t)))
            .cloned()
            .collect())
    }

    async fn update_policy(&self, policy: &RetentionPolicy) -> DataguardResult<()> {
        replace(&self.policies, policy, |p| p.id).await
    }

    async fn try_acquire_lease(
        &self,
        scope: &PolicyScope,
        holder: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DataguardResult<bool> {
        let mut leases = self.leases.write().await;
        if let Some(existing) = leases.get(scope) {
            if existing.holder != holder && existing.expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(scope.clone(), Lease { holder, expires_at });
        Ok(true)
    }

    async fn release_lease(&self, scope: &PolicyScope, holder: Uuid) -> DataguardResult<()> {
        let mut leases = self.leases.write().await;
        if leases.get(scope).is_some_and(|l| l.holder == holder) {
            leases.remove(scope);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn scan_records(&self, query: &RecordQuery) -> DataguardResult<Vec<DataRecord>> {
        Ok(self.scan_page(query).await)
    }

    async fn delete_records(&self, data_type: DataType, ids: &[Uuid]) -> DataguardResult<u64> {
        let ids: HashSet<Uuid> = ids.iter().copied().collect();
        let removed = match data_type {
            DataType::User => remove_ids(&self.users, &ids, |r| r.id).await,
            DataType::Session => remove_ids(&self.sessions, &ids, |r| r.id).await,
            DataType::AuditLog => remove_ids(&self.audit, &ids, |r| r.id).await,
            DataType::ConsentRecord => remove_ids(&self.consents, &ids, |r| r.id).await,
            DataType::FormSubmission => remove_ids(&self.forms, &ids, |r| r.id).await,
            DataType::Notification => remove_ids(&self.notifications, &ids, |r| r.id).await,
        };
        Ok(removed)
    }

    async fn update_record(&self, record: &DataRecord) -> DataguardResult<()> {
        match record {
            DataRecord::User(r) => replace(&self.users, r, |r| r.id).await,
            DataRecord::Session(r) => replace(&self.sessions, r, |r| r.id).await,
            DataRecord::AuditLog(r) => replace(&self.audit, r, |r| r.id).await,
            DataRecord::ConsentRecord(r) => replace(&self.consents, r, |r| r.id).await,
            DataRecord::FormSubmission(r) => replace(&self.forms, r, |r| r.id).await,
            DataRecord::Notification(r) => replace(&self.notifications, r, |r| r.id).await,
        }
    }

    async fn has_employee_link(&self, tenant_id: &str, user_id: Uuid) -> DataguardResult<bool> {
        Ok(self
            .employees
            .read()
            .await
            .iter()
            .any(|e| e.tenant_id == tenant_id && e.user_id == user_id))
    }

    async fn summarize(
        &self,
        tenant_id: Option<&str>,
        data_type: DataType,
    ) -> DataguardResult<RecordSummary> {
        Ok(self.summary_of(tenant_id, data_type).await)
    }
}

#[async_trait]
impl SubjectRightsStore for MemoryStore {
    async fn list_requests(&self, tenant_id: &str) -> DataguardResult<Vec<DataSubjectRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_breaches(&self, tenant_id: &str) -> DataguardResult<Vec<DataBreach>> {
        Ok(self
            .breaches
            .read()
            .await
            .iter()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn log(&self, event: AuditEvent) -> DataguardResult<()> {
        info!(
            tenant_id = %event.tenant_id,
            actor = %event.actor,
            action = %event.action,
            severity = %event.severity,
            "audit"
        );
        self.audit.write().await.push(event);
        Ok(())
    }

    async fn get_logs(&self, filter: &AuditFilter) -> DataguardResult<Vec<AuditEvent>> {
        let mut events: Vec<AuditEvent> = self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_stats(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> DataguardResult<AuditStats> {
        let filter = AuditFilter::tenant(tenant_id).since(since);
        let audit = self.audit.read().await;
        Ok(AuditStats::from_events(
            audit.iter().filter(|e| filter.matches(e)),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dataguard_core::{
        AuditCategory, ConsentMetadata, ConsentPurpose, ConsentSource, LegalBasis, Severity,
    };

    fn consent(granted: bool) -> ConsentRecord {
        let now = Utc::now();
        ConsentRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            tenant_id: "t1".into(),
            purpose: ConsentPurpose::Marketing,
            granted,
            granted_at: granted.then_some(now),
            revoked_at: (!granted).then_some(now),
            version: "2.1".into(),
            source: ConsentSource::Banner,
            expires_at: None,
            metadata: ConsentMetadata::default(),
            created_at: now,
        }
    }

    fn session(expires_in_days: i64) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            user_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
            created_at: now - Duration::days(30),
            expires_at: now + Duration::days(expires_in_days),
        }
    }

    #[tokio::test]
    async fn test_activity_tenant_listing() {
        let store = MemoryStore::new();
        let mut a = ProcessingActivity::new("t1", "CRM", "crm", LegalBasis::Contract);
        let b = ProcessingActivity::new("t2", "HR", "payroll", LegalBasis::LegalObligation);
        store.save_activity(&a).await.unwrap();
        store.save_activity(&b).await.unwrap();
        assert_eq!(store.list_activities("t1", true).await.unwrap().len(), 1);

        a.deactivate();
        store.save_activity(&a).await.unwrap();
        assert!(store.list_activities("t1", true).await.unwrap().is_empty());
        assert_eq!(store.list_activities("t1", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_consent_supersedes_all_prior() {
        let store = MemoryStore::new();
        let first = consent(true);
        let second = consent(true);
        let key = first.key();
        store.append_consent(first.clone(), None, false).await.unwrap();
        store
            .append_consent(second.clone(), Some(first.id), false)
            .await
            .unwrap();

        let revoke = consent(false);
        let superseded = store
            .append_consent(revoke.clone(), Some(second.id), true)
            .await
            .unwrap();
        assert_eq!(superseded, 2);

        let history = store.consent_history(&key).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|c| !c.granted));
        assert_eq!(
            store.latest_consent(&key).await.unwrap().unwrap().id,
            revoke.id
        );
    }

    #[tokio::test]
    async fn test_append_consent_detects_stale_writer() {
        let store = MemoryStore::new();
        let first = consent(true);
        store.append_consent(first.clone(), None, false).await.unwrap();
        let err = store
            .append_consent(consent(false), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DataguardError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_lease_exclusive_until_expiry() {
        let store = MemoryStore::new();
        let scope = PolicyScope {
            tenant_id: Some("t1".into()),
            data_type: DataType::Session,
        };
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store
            .try_acquire_lease(&scope, a, now + Duration::minutes(5), now)
            .await
            .unwrap());
        assert!(!store
            .try_acquire_lease(&scope, b, now + Duration::minutes(5), now)
            .await
            .unwrap());
        // expired lease can be taken over
        assert!(store
            .try_acquire_lease(&scope, b, now + Duration::minutes(20), now + Duration::minutes(6))
            .await
            .unwrap());
        // stale holder cannot release the new lease
        store.release_lease(&scope, a).await.unwrap();
        assert!(!store
            .try_acquire_lease(&scope, a, now + Duration::minutes(30), now + Duration::minutes(7))
            .await
            .unwrap());
        store.release_lease(&scope, b).await.unwrap();
        assert!(store
            .try_acquire_lease(&scope, a, now + Duration::minutes(30), now + Duration::minutes(7))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scan_pages_by_cursor() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.insert_session(session(-10)).await;
        }
        store.insert_session(session(10)).await;

        let mut query = RecordQuery::new(Some("t1".into()), DataType::Session, Utc::now(), 2);
        let mut seen = Vec::new();
        loop {
            let page = store.scan_records(&query).await.unwrap();
            let Some(last) = page.last() else { break };
            query.after = Some(ScanCursor::of(last));
            seen.extend(page.iter().map(DataRecord::id));
        }
        assert_eq!(seen.len(), 5);

        let deleted = store
            .delete_records(DataType::Session, &seen)
            .await
            .unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(store.count(DataType::Session).await, 1);
    }

    #[tokio::test]
    async fn test_scan_page_is_oldest_first_and_skips_excluded_tenants() {
        let store = MemoryStore::new();
        // Inserted newest first so the page has to be ordered, not sliced.
        for days in [-1, -5, -3, -9, -7] {
            store.insert_session(session(days)).await;
        }
        let mut other = session(-20);
        other.tenant_id = "t2".into();
        store.insert_session(other).await;

        let query = RecordQuery::new(None, DataType::Session, Utc::now(), 3)
            .excluding(["t2".to_string()]);
        let page = store.scan_records(&query).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page.iter().all(|r| r.tenant_id() == "t1"));
        let times: Vec<_> = page.iter().map(DataRecord::reference_time).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(times[2] < Utc::now() - Duration::days(4));

        let everyone = RecordQuery::new(None, DataType::Session, Utc::now(), 1);
        let oldest = store.scan_records(&everyone).await.unwrap();
        assert_eq!(oldest[0].tenant_id(), "t2");

        let empty = RecordQuery::new(None, DataType::Session, Utc::now(), 0);
        assert!(store.scan_records(&empty).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_record(&DataRecord::Session(session(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DataguardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_audit_sink_query_and_stats() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .log(
                AuditEvent::new("t1", "a", "OLD", "R", AuditCategory::System, Severity::Low)
                    .at(now - Duration::days(40)),
            )
            .await
            .unwrap();
        store
            .log(AuditEvent::new(
                "t1",
                "a",
                "NEW",
                "R",
                AuditCategory::Security,
                Severity::Critical,
            ))
            .await
            .unwrap();
        store
            .log(AuditEvent::new("t2", "a", "OTHER", "R", AuditCategory::System, Severity::Low))
            .await
            .unwrap();

        let logs = store.get_logs(&AuditFilter::tenant("t1")).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, "NEW");

        let stats = store
            .get_stats("t1", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.count(Severity::Critical), 1);

        // audit events are also retention-managed rows
        assert_eq!(store.count(DataType::AuditLog).await, 3);
    }

    #[tokio::test]
    async fn test_summarize() {
        let store = MemoryStore::new();
        store.insert_session(session(-5)).await;
        store.insert_session(session(5)).await;
        let summary = store.summarize(Some("t1"), DataType::Session).await.unwrap();
        assert_eq!(summary.total, 2);
        assert!(summary.oldest < summary.newest);
        let empty = store.summarize(Some("t9"), DataType::Session).await.unwrap();
        assert_eq!(empty, RecordSummary::default());
    }
}
