//! Retention policy execution.
//!
//! A run selects records of the policy's data type whose reference time is
//! older than `now - retention_days`, narrows them with the type's disposition
//! rule and the policy's conditions, then deletes or anonymizes them. Runs of
//! the same (tenant, data type) scope are serialized by a lease in the policy
//! store. Scans are paged by cursor.

use crate::config::RetentionConfig;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use dataguard_core::records::{ANONYMIZED_EMAIL_DOMAIN, ANONYMIZED_NAME};
use dataguard_core::{
    AuditCategory, AuditEvent, AuditSink, DataRecord, DataType, DataguardError, DataguardResult,
    RetentionCondition, RetentionPolicy, Severity, UserRecord,
};
use dataguard_store::{PolicyStore, RecordQuery, RecordStore, ScanCursor};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const SYSTEM_ACTOR: &str = "system";
const GLOBAL_TENANT: &str = "global";

/// Lifecycle of a [`RetentionJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Record of one policy execution. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionJob {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub tenant_id: Option<String>,
    pub data_type: DataType,
    pub status: JobStatus,
    /// `false` when the policy only reports matches.
    pub auto_delete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub records_deleted: u64,
    pub records_anonymized: u64,
    pub errors: Vec<String>,
}

impl RetentionJob {
    pub fn new(policy: &RetentionPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy_id: policy.id,
            tenant_id: policy.tenant_id.clone(),
            data_type: policy.data_type,
            status: JobStatus::Pending,
            auto_delete: policy.auto_delete,
            started_at: None,
            completed_at: None,
            records_processed: 0,
            records_deleted: 0,
            records_anonymized: 0,
            errors: Vec::new(),
        }
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> DataguardResult<()> {
        if self.status != from {
            return Err(DataguardError::InvalidState(format!(
                "retention job {} is {}, cannot move to {to}",
                self.id, self.status
            )));
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> DataguardResult<()> {
        self.transition(JobStatus::Pending, JobStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> DataguardResult<()> {
        self.transition(JobStatus::Running, JobStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, now: DateTime<Utc>, reason: impl Into<String>) -> DataguardResult<()> {
        self.transition(JobStatus::Running, JobStatus::Failed)?;
        self.errors.push(reason.into());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A due policy that a batch did not run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPolicy {
    pub policy_id: Uuid,
    pub scope: String,
    pub reason: String,
}

/// Outcome of [`RetentionEngine::execute_retention_policies`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionBatch {
    pub jobs: Vec<RetentionJob>,
    pub skipped: Vec<SkippedPolicy>,
}

impl RetentionBatch {
    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count()
    }

    pub fn total_deleted(&self) -> u64 {
        self.jobs.iter().map(|j| j.records_deleted).sum()
    }

    pub fn total_anonymized(&self) -> u64 {
        self.jobs.iter().map(|j| j.records_anonymized).sum()
    }
}

/// Input for [`RetentionEngine::create_retention_policy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRetentionPolicy {
    pub tenant_id: Option<String>,
    pub data_type: DataType,
    pub retention_days: Option<u32>,
    #[serde(default = "default_true")]
    pub auto_delete: bool,
    #[serde(default)]
    pub conditions: Vec<RetentionCondition>,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl NewRetentionPolicy {
    pub fn new(tenant_id: Option<&str>, data_type: DataType, retention_days: Option<u32>) -> Self {
        Self {
            tenant_id: tenant_id.map(str::to_string),
            data_type,
            retention_days,
            auto_delete: true,
            conditions: Vec::new(),
            description: String::new(),
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.auto_delete = false;
        self
    }

    pub fn with_condition(mut self, condition: RetentionCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    fn into_policy(self, now: DateTime<Utc>) -> RetentionPolicy {
        RetentionPolicy {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            data_type: self.data_type,
            retention_days: self.retention_days,
            auto_delete: self.auto_delete,
            is_active: true,
            conditions: self.conditions,
            description: self.description,
            last_executed: None,
            next_execution: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored volume of one data type for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataInventory {
    pub data_type: DataType,
    pub total: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Records the governing policy would act on if it ran now.
    pub due_deletion_count: u64,
    pub policy_id: Option<Uuid>,
    pub retention_days: Option<u32>,
}

/// Tenant retention posture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionReport {
    pub tenant_id: String,
    pub generated_at: DateTime<Utc>,
    pub inventory: Vec<DataInventory>,
    pub total_due: u64,
    /// Active policies whose scheduled execution has passed.
    pub overdue_policies: Vec<Uuid>,
    /// Data types governed by at least one active policy.
    pub covered_data_types: usize,
}

/// Replaces every identifying field of a user with the anonymization sentinel.
///
/// The e-mail is derived from the user id so repeated runs are stable, and it
/// lands on a reserved domain that [`UserRecord::is_anonymized`] recognises.
pub fn anonymize_user(user: &UserRecord, now: DateTime<Utc>) -> UserRecord {
    let digest = Sha256::digest(user.id.as_bytes());
    UserRecord {
        email: format!(
            "anonymized-{}@{ANONYMIZED_EMAIL_DOMAIN}",
            hex::encode(&digest[..8])
        ),
        name: ANONYMIZED_NAME.to_string(),
        phone: None,
        bio: None,
        avatar_url: None,
        is_active: false,
        anonymized_at: Some(now),
        ..user.clone()
    }
}

/// Per-type disposition filter applied on top of the cutoff.
fn is_candidate(record: &DataRecord) -> bool {
    match record {
        DataRecord::User(u) => !u.is_anonymized() && !u.is_active,
        DataRecord::Session(_) => true,
        DataRecord::AuditLog(e) => e.severity <= Severity::Low,
        DataRecord::ConsentRecord(c) => !c.granted && !c.metadata.is_redacted(),
        DataRecord::FormSubmission(_) => true,
        DataRecord::Notification(n) => n.is_read,
    }
}

fn selects(policy: &RetentionPolicy, record: &DataRecord) -> bool {
    is_candidate(record) && policy.conditions.iter().all(|c| c.matches(record))
}

/// Parses a 7-field cron expression (sec min hour dom month dow year).
pub fn parse_schedule(expr: &str) -> DataguardResult<Schedule> {
    Schedule::from_str(expr)
        .map_err(|e| DataguardError::Config(format!("Invalid cron expression '{expr}': {e}")))
}

/// Executes retention policies against the record store.
pub struct RetentionEngine {
    policies: Arc<dyn PolicyStore>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
    config: RetentionConfig,
    schedule: Schedule,
}

impl RetentionEngine {
    /// Fails with `Config` if the sweep schedule does not parse.
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
        config: RetentionConfig,
    ) -> DataguardResult<Self> {
        let schedule = parse_schedule(&config.sweep_schedule)?;
        Ok(Self {
            policies,
            records,
            audit,
            config,
            schedule,
        })
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// First sweep time on or after the start of the day following `now`.
    pub fn next_sweep_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = now
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .unwrap_or(now);
        self.schedule
            .after(&(tomorrow - Duration::seconds(1)))
            .next()
            .unwrap_or(tomorrow + Duration::hours(2))
    }

    pub async fn create_retention_policy(
        &self,
        policy: NewRetentionPolicy,
        actor_id: &str,
    ) -> DataguardResult<RetentionPolicy> {
        self.create_retention_policy_at(policy, actor_id, Utc::now())
            .await
    }

    /// [`create_retention_policy`](Self::create_retention_policy) at `now`.
    pub async fn create_retention_policy_at(
        &self,
        policy: NewRetentionPolicy,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<RetentionPolicy> {
        let policy = policy.into_policy(now);
        policy.validate()?;
        self.policies.insert_policy(&policy).await?;

        self.audit
            .log(
                AuditEvent::new(
                    policy.tenant_id.as_deref().unwrap_or(GLOBAL_TENANT),
                    actor_id,
                    "RETENTION_POLICY_CREATED",
                    "RetentionPolicy",
                    AuditCategory::Retention,
                    Severity::Low,
                )
                .with_resource_id(policy.id)
                .with_details(serde_json::json!({
                    "data_type": policy.data_type,
                    "retention_days": policy.retention_days,
                    "auto_delete": policy.auto_delete,
                }))
                .at(now),
            )
            .await?;

        info!(policy_id = %policy.id, scope = %policy.scope(), "Retention policy created");
        Ok(policy)
    }

    /// Creates a default policy for every data type the tenant has no policy
    /// of its own for. Returns the policies created; idempotent.
    pub async fn initialize_tenant_policies(
        &self,
        tenant_id: &str,
    ) -> DataguardResult<Vec<RetentionPolicy>> {
        self.initialize_tenant_policies_at(tenant_id, Utc::now())
            .await
    }

    /// [`initialize_tenant_policies`](Self::initialize_tenant_policies) at `now`.
    pub async fn initialize_tenant_policies_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<RetentionPolicy>> {
        let existing: BTreeSet<DataType> = self
            .policies
            .list_policies(Some(tenant_id))
            .await?
            .into_iter()
            .filter(|p| p.tenant_id.as_deref() == Some(tenant_id))
            .map(|p| p.data_type)
            .collect();

        let mut created = Vec::new();
        for data_type in DataType::ALL {
            if existing.contains(&data_type) {
                continue;
            }
            let mut policy = NewRetentionPolicy::new(
                Some(tenant_id),
                data_type,
                self.config.default_days.days_for(data_type),
            );
            policy.description = format!("Default {data_type} retention");
            created.push(
                self.create_retention_policy_at(policy, SYSTEM_ACTOR, now)
                    .await?,
            );
        }
        info!(
            tenant_id,
            created = created.len(),
            "Tenant retention policies initialized"
        );
        Ok(created)
    }

    /// Runs every due policy. `None` runs all tenants' and global policies;
    /// `Some(t)` runs only policies owned by `t`.
    pub async fn execute_retention_policies(
        &self,
        tenant_id: Option<&str>,
    ) -> DataguardResult<RetentionBatch> {
        self.execute_retention_policies_at(tenant_id, Utc::now())
            .await
    }

    /// [`execute_retention_policies`](Self::execute_retention_policies) at `now`.
    pub async fn execute_retention_policies_at(
        &self,
        tenant_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DataguardResult<RetentionBatch> {
        let due: Vec<RetentionPolicy> = self
            .policies
            .list_policies(tenant_id)
            .await?
            .into_iter()
            .filter(|p| tenant_id.is_none_or(|t| p.tenant_id.as_deref() == Some(t)))
            .filter(|p| p.is_due(now))
            .collect();
        info!(
            tenant_id = tenant_id.unwrap_or(GLOBAL_TENANT),
            due = due.len(),
            "Retention sweep started"
        );

        let runs = due.into_iter().map(|policy| async move {
            let id = policy.id;
            let scope = policy.scope();
            (id, scope, self.run_policy(policy, now).await)
        });

        let mut batch = RetentionBatch::default();
        for (policy_id, scope, result) in join_all(runs).await {
            match result {
                Ok(job) => batch.jobs.push(job),
                Err(e) => {
                    error!(
                        policy_id = %policy_id,
                        scope = %scope,
                        error = %e,
                        "Retention policy not run"
                    );
                    batch.skipped.push(SkippedPolicy {
                        policy_id,
                        scope: scope.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            jobs = batch.jobs.len(),
            failed = batch.failed(),
            skipped = batch.skipped.len(),
            deleted = batch.total_deleted(),
            anonymized = batch.total_anonymized(),
            "Retention sweep finished"
        );
        Ok(batch)
    }

    /// Runs one policy now, due or not.
    ///
    /// `tenant_id` is the caller's tenant; `None` is the system caller and may
    /// run any policy. A tenant may only run its own policies.
    pub async fn execute_retention_policy(
        &self,
        tenant_id: Option<&str>,
        policy_id: Uuid,
    ) -> DataguardResult<RetentionJob> {
        self.execute_retention_policy_at(tenant_id, policy_id, Utc::now())
            .await
    }

    /// [`execute_retention_policy`](Self::execute_retention_policy) at `now`.
    pub async fn execute_retention_policy_at(
        &self,
        tenant_id: Option<&str>,
        policy_id: Uuid,
        now: DateTime<Utc>,
    ) -> DataguardResult<RetentionJob> {
        let policy = self
            .policies
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| DataguardError::NotFound(format!("retention policy {policy_id}")))?;

        if let Some(tenant) = tenant_id {
            if policy.tenant_id.as_deref() != Some(tenant) {
                return Err(DataguardError::Forbidden(format!(
                    "retention policy {policy_id} does not belong to tenant {tenant}"
                )));
            }
        }
        if !policy.is_active {
            return Err(DataguardError::InvalidState(format!(
                "retention policy {policy_id} is inactive"
            )));
        }
        self.run_policy(policy, now).await
    }

    async fn run_policy(
        &self,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> DataguardResult<RetentionJob> {
        let scope = policy.scope();
        let holder = Uuid::new_v4();
        let lease_until = now + Duration::seconds(self.config.lease_seconds);
        if !self
            .policies
            .try_acquire_lease(&scope, holder, lease_until, now)
            .await?
        {
            warn!(policy_id = %policy.id, scope = %scope, "Retention scope already running");
            return Err(DataguardError::Conflict(format!(
                "retention for {scope} is already running"
            )));
        }

        let mut job = RetentionJob::new(&policy);
        let outcome = self.run_leased(&policy, &mut job, now).await;
        let released = self.policies.release_lease(&scope, holder).await;
        outcome?;
        released?;
        Ok(job)
    }

    async fn run_leased(
        &self,
        policy: &RetentionPolicy,
        job: &mut RetentionJob,
        now: DateTime<Utc>,
    ) -> DataguardResult<()> {
        job.start(now)?;
        debug!(policy_id = %policy.id, scope = %policy.scope(), "Retention run started");

        match self.sweep(policy, job, now).await {
            Ok(()) => job.complete(now)?,
            Err(e) => {
                error!(policy_id = %policy.id, error = %e, "Retention run failed");
                job.fail(now, e.to_string())?;
            }
        }

        let mut scheduled = policy.clone();
        scheduled.last_executed = Some(now);
        scheduled.next_execution = Some(self.next_sweep_after(now));
        scheduled.updated_at = now;
        self.policies.update_policy(&scheduled).await?;

        let severity = if job.status == JobStatus::Failed {
            Severity::Medium
        } else {
            Severity::Info
        };
        self.audit
            .log(
                AuditEvent::new(
                    policy.tenant_id.as_deref().unwrap_or(GLOBAL_TENANT),
                    SYSTEM_ACTOR,
                    "RETENTION_EXECUTED",
                    "RetentionPolicy",
                    AuditCategory::Retention,
                    severity,
                )
                .with_resource_id(policy.id)
                .with_details(serde_json::json!({
                    "job_id": job.id,
                    "data_type": policy.data_type,
                    "status": job.status,
                    "processed": job.records_processed,
                    "deleted": job.records_deleted,
                    "anonymized": job.records_anonymized,
                    "errors": job.errors,
                }))
                .at(now),
            )
            .await?;

        info!(
            policy_id = %policy.id,
            data_type = %policy.data_type,
            status = %job.status,
            processed = job.records_processed,
            deleted = job.records_deleted,
            anonymized = job.records_anonymized,
            "Retention run finished"
        );
        Ok(())
    }

    async fn sweep(
        &self,
        policy: &RetentionPolicy,
        job: &mut RetentionJob,
        now: DateTime<Utc>,
    ) -> DataguardResult<()> {
        let Some(cutoff) = policy.cutoff(now) else {
            debug!(policy_id = %policy.id, "Policy never expires records");
            return Ok(());
        };
        let page_size = self.config.page_size.max(1);
        let mut query = RecordQuery::new(
            policy.tenant_id.clone(),
            policy.data_type,
            cutoff,
            page_size,
        );
        if policy.tenant_id.is_none() {
            let overridden = self.tenants_with_own_policy(policy.data_type).await?;
            if !overridden.is_empty() {
                debug!(
                    policy_id = %policy.id,
                    tenants = overridden.len(),
                    "Global policy skips tenants with their own policy"
                );
            }
            query = query.excluding(overridden);
        }

        loop {
            let page = self.records.scan_records(&query).await?;
            let Some(last) = page.last() else { break };
            query.after = Some(ScanCursor::of(last));
            let exhausted = page.len() < page_size;

            let mut doomed = Vec::new();
            for record in page {
                if !selects(policy, &record) {
                    continue;
                }
                job.records_processed += 1;
                if !policy.auto_delete {
                    continue;
                }
                match record {
                    DataRecord::User(user) => {
                        if self.records.has_employee_link(&user.tenant_id, user.id).await? {
                            debug!(user_id = %user.id, "Skipping user with employee record");
                            continue;
                        }
                        let anonymized = anonymize_user(&user, now);
                        self.records.update_record(&DataRecord::User(anonymized)).await?;
                        job.records_anonymized += 1;
                    }
                    DataRecord::ConsentRecord(mut consent) => {
                        consent.metadata.redact();
                        self.records
                            .update_record(&DataRecord::ConsentRecord(consent))
                            .await?;
                        job.records_anonymized += 1;
                    }
                    other => doomed.push(other.id()),
                }
            }

            if !doomed.is_empty() {
                job.records_deleted += self
                    .records
                    .delete_records(policy.data_type, &doomed)
                    .await?;
            }
            if exhausted {
                break;
            }
        }
        Ok(())
    }

    /// Tenants whose own active policy governs `data_type` in place of a
    /// global one.
    async fn tenants_with_own_policy(
        &self,
        data_type: DataType,
    ) -> DataguardResult<BTreeSet<String>> {
        Ok(self
            .policies
            .list_policies(None)
            .await?
            .into_iter()
            .filter(|p| p.is_active && p.data_type == data_type)
            .filter_map(|p| p.tenant_id)
            .collect())
    }

    async fn count_due(
        &self,
        policy: &RetentionPolicy,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<u64> {
        let Some(cutoff) = policy.cutoff(now) else {
            return Ok(0);
        };
        let page_size = self.config.page_size.max(1);
        let mut query = RecordQuery::new(
            Some(tenant_id.to_string()),
            policy.data_type,
            cutoff,
            page_size,
        );
        let mut due = 0;
        loop {
            let page = self.records.scan_records(&query).await?;
            let Some(last) = page.last() else { break };
            query.after = Some(ScanCursor::of(last));
            due += page.iter().filter(|r| selects(policy, r)).count() as u64;
            if page.len() < page_size {
                break;
            }
        }
        Ok(due)
    }

    /// Inventory of every data type for a tenant. Read-only.
    pub async fn generate_retention_report(
        &self,
        tenant_id: &str,
    ) -> DataguardResult<RetentionReport> {
        self.generate_retention_report_at(tenant_id, Utc::now()).await
    }

    /// [`generate_retention_report`](Self::generate_retention_report) at `now`.
    pub async fn generate_retention_report_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<RetentionReport> {
        let policies: Vec<RetentionPolicy> = self
            .policies
            .list_policies(Some(tenant_id))
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect();

        let mut inventory = Vec::with_capacity(DataType::ALL.len());
        for data_type in DataType::ALL {
            // The tenant's own policy wins over a global one.
            let governing = policies
                .iter()
                .filter(|p| p.data_type == data_type)
                .max_by_key(|p| p.tenant_id.is_some());
            let summary = self.records.summarize(Some(tenant_id), data_type).await?;
            let due_deletion_count = match governing {
                Some(policy) => self.count_due(policy, tenant_id, now).await?,
                None => 0,
            };
            inventory.push(DataInventory {
                data_type,
                total: summary.total,
                oldest: summary.oldest,
                newest: summary.newest,
                due_deletion_count,
                policy_id: governing.map(|p| p.id),
                retention_days: governing.and_then(|p| p.retention_days),
            });
        }

        let covered_data_types = policies
            .iter()
            .map(|p| p.data_type)
            .collect::<BTreeSet<_>>()
            .len();

        Ok(RetentionReport {
            tenant_id: tenant_id.to_string(),
            generated_at: now,
            total_due: inventory.iter().map(|i| i.due_deletion_count).sum(),
            overdue_policies: policies
                .iter()
                .filter(|p| p.is_due(now))
                .map(|p| p.id)
                .collect(),
            covered_data_types,
            inventory,
        })
    }

    /// Policies visible to a tenant (its own and global ones).
    pub async fn list_policies(&self, tenant_id: &str) -> DataguardResult<Vec<RetentionPolicy>> {
        self.policies.list_policies(Some(tenant_id)).await
    }
}
