use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataguard_core::{
    ConsentKey, ConsentRecord, DataBreach, DataRecord, DataSubjectRequest, DataType,
    DataguardResult, PolicyScope, ProcessingActivity, RetentionPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity(&self, id: Uuid) -> DataguardResult<Option<ProcessingActivity>>;
    async fn list_activities(
        &self,
        tenant_id: &str,
        active_only: bool,
    ) -> DataguardResult<Vec<ProcessingActivity>>;
    /// Inserts or replaces by id.
    async fn save_activity(&self, activity: &ProcessingActivity) -> DataguardResult<()>;
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Most recently appended event for the key.
    async fn latest_consent(&self, key: &ConsentKey) -> DataguardResult<Option<ConsentRecord>>;

    /// Every event for the key, oldest first.
    async fn consent_history(&self, key: &ConsentKey) -> DataguardResult<Vec<ConsentRecord>>;

    /// Events of a tenant, optionally restricted to one user, oldest first.
    async fn list_consents(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> DataguardResult<Vec<ConsentRecord>>;

    /// Appends `record` as the new latest event for its key.
    ///
    /// Fails with `Conflict` unless the key's current latest id equals
    /// `expected_latest`. When `supersede` is set, every *other* event for the
    /// key is marked revoked at `record.created_at` in the same atomic step.
    /// Returns the number of superseded events.
    async fn append_consent(
        &self,
        record: ConsentRecord,
        expected_latest: Option<Uuid>,
        supersede: bool,
    ) -> DataguardResult<usize>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn insert_policy(&self, policy: &RetentionPolicy) -> DataguardResult<()>;
    async fn get_policy(&self, id: Uuid) -> DataguardResult<Option<RetentionPolicy>>;

    /// `None` lists every policy; `Some(t)` lists tenant `t`'s policies and global ones.
    async fn list_policies(&self, tenant_id: Option<&str>)
        -> DataguardResult<Vec<RetentionPolicy>>;

    /// Replaces an existing policy. `NotFound` if the id is unknown.
    async fn update_policy(&self, policy: &RetentionPolicy) -> DataguardResult<()>;

    /// Takes the execution lease for `scope` unless another holder owns an
    /// unexpired one. Returns whether `holder` now owns the lease.
    async fn try_acquire_lease(
        &self,
        scope: &PolicyScope,
        holder: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DataguardResult<bool>;

    /// Drops the lease if `holder` still owns it.
    async fn release_lease(&self, scope: &PolicyScope, holder: Uuid) -> DataguardResult<()>;
}

/// Position after the last record of a scan page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanCursor {
    pub reference_time: DateTime<Utc>,
    pub id: Uuid,
}

impl ScanCursor {
    /// Cursor positioned on `record`.
    pub fn of(record: &DataRecord) -> Self {
        Self {
            reference_time: record.reference_time(),
            id: record.id(),
        }
    }
}

/// One page of a keyed scan over a data type.
///
/// Rows are ordered by `(reference_time, id)` and restricted to
/// `reference_time < before`. Paging by cursor rather than offset keeps the
/// scan stable while earlier rows are deleted.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    /// `None` scans every tenant.
    pub tenant_id: Option<String>,
    /// Tenants skipped by an all-tenant scan.
    pub excluded_tenants: BTreeSet<String>,
    pub data_type: DataType,
    pub before: DateTime<Utc>,
    pub after: Option<ScanCursor>,
    pub limit: usize,
}

impl RecordQuery {
    /// First page.
    pub fn new(
        tenant_id: Option<String>,
        data_type: DataType,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Self {
        Self {
            tenant_id,
            excluded_tenants: BTreeSet::new(),
            data_type,
            before,
            after: None,
            limit,
        }
    }

    /// Leaves the rows of `tenants` out of the scan.
    pub fn excluding(mut self, tenants: impl IntoIterator<Item = String>) -> Self {
        self.excluded_tenants.extend(tenants);
        self
    }

    /// Whether `record` falls inside this page's window (ignoring `limit`).
    pub fn admits(&self, record: &DataRecord) -> bool {
        record.data_type() == self.data_type
            && self.admits_row(record.tenant_id(), ScanCursor::of(record))
    }

    /// [`admits`](Self::admits) for a row of `data_type` already known.
    pub fn admits_row(&self, tenant_id: &str, cursor: ScanCursor) -> bool {
        self.tenant_id.as_deref().is_none_or(|t| tenant_id == t)
            && !self.excluded_tenants.contains(tenant_id)
            && cursor.reference_time < self.before
            && self.after.is_none_or(|c| cursor > c)
    }
}

/// Size and age of the stored rows of one data type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub total: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn scan_records(&self, query: &RecordQuery) -> DataguardResult<Vec<DataRecord>>;

    /// Hard-deletes rows. Returns how many existed.
    async fn delete_records(&self, data_type: DataType, ids: &[Uuid]) -> DataguardResult<u64>;

    /// Replaces a row by id. `NotFound` if it no longer exists.
    async fn update_record(&self, record: &DataRecord) -> DataguardResult<()>;

    async fn has_employee_link(&self, tenant_id: &str, user_id: Uuid) -> DataguardResult<bool>;

    async fn summarize(
        &self,
        tenant_id: Option<&str>,
        data_type: DataType,
    ) -> DataguardResult<RecordSummary>;
}

#[async_trait]
pub trait SubjectRightsStore: Send + Sync {
    async fn list_requests(&self, tenant_id: &str) -> DataguardResult<Vec<DataSubjectRequest>>;
    async fn list_breaches(&self, tenant_id: &str) -> DataguardResult<Vec<DataBreach>>;
}
