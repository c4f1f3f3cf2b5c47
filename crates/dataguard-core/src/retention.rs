use crate::audit::AuditCategory;
use crate::consent::ConsentPurpose;
use crate::records::DataRecord;
use crate::{DataguardError, DataguardResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A retention-managed data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    User,
    Session,
    AuditLog,
    ConsentRecord,
    FormSubmission,
    Notification,
}

impl DataType {
    /// Every known data type.
    pub const ALL: [DataType; 6] = [
        DataType::User,
        DataType::Session,
        DataType::AuditLog,
        DataType::ConsentRecord,
        DataType::FormSubmission,
        DataType::Notification,
    ];

    /// The canonical name, as stored on policies.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::User => "User",
            DataType::Session => "Session",
            DataType::AuditLog => "AuditLog",
            DataType::ConsentRecord => "ConsentRecord",
            DataType::FormSubmission => "FormSubmission",
            DataType::Notification => "Notification",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = DataguardError;

    fn from_str(s: &str) -> DataguardResult<Self> {
        DataType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| DataguardError::Validation(format!("unknown data type '{s}'")))
    }
}

/// An extra selection condition narrowing which records a policy touches.
///
/// Each variant belongs to exactly one [`DataType`]; see [`RetentionCondition::data_type`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum RetentionCondition {
    /// Users holding this role.
    Role { role: String },
    /// Audit entries in this category.
    AuditCategory { category: AuditCategory },
    /// Submissions of this form.
    FormName { form_name: String },
    /// Notifications of this kind.
    NotificationKind { kind: String },
    /// Consent events for this purpose.
    ConsentPurpose { purpose: ConsentPurpose },
}

impl RetentionCondition {
    /// The data type this condition can be evaluated against.
    pub fn data_type(&self) -> DataType {
        match self {
            RetentionCondition::Role { .. } => DataType::User,
            RetentionCondition::AuditCategory { .. } => DataType::AuditLog,
            RetentionCondition::FormName { .. } => DataType::FormSubmission,
            RetentionCondition::NotificationKind { .. } => DataType::Notification,
            RetentionCondition::ConsentPurpose { .. } => DataType::ConsentRecord,
        }
    }

    /// Whether `record` satisfies the condition. Records of another type never do.
    pub fn matches(&self, record: &DataRecord) -> bool {
        match (self, record) {
            (RetentionCondition::Role { role }, DataRecord::User(u)) => {
                u.role.eq_ignore_ascii_case(role)
            }
            (RetentionCondition::AuditCategory { category }, DataRecord::AuditLog(e)) => {
                e.category == *category
            }
            (RetentionCondition::FormName { form_name }, DataRecord::FormSubmission(f)) => {
                f.form_name == *form_name
            }
            (RetentionCondition::NotificationKind { kind }, DataRecord::Notification(n)) => {
                n.kind == *kind
            }
            (RetentionCondition::ConsentPurpose { purpose }, DataRecord::ConsentRecord(c)) => {
                c.purpose == *purpose
            }
            _ => false,
        }
    }
}

/// The unit a retention run is serialized on: one data type within one tenant
/// (or the global scope when `tenant_id` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyScope {
    pub tenant_id: Option<String>,
    pub data_type: DataType,
}

impl std::fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tenant_id {
            Some(t) => write!(f, "{t}/{}", self.data_type),
            None => write!(f, "global/{}", self.data_type),
        }
    }
}

/// Retention rule for one data type, tenant-scoped or global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: Uuid,
    /// `None` applies the policy to every tenant.
    pub tenant_id: Option<String>,
    pub data_type: DataType,
    /// `None` means records of this type never expire.
    pub retention_days: Option<u32>,
    pub auto_delete: bool,
    pub is_active: bool,
    #[serde(default)]
    pub conditions: Vec<RetentionCondition>,
    #[serde(default)]
    pub description: String,
    pub last_executed: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetentionPolicy {
    /// The lease scope of this policy.
    pub fn scope(&self) -> PolicyScope {
        PolicyScope {
            tenant_id: self.tenant_id.clone(),
            data_type: self.data_type,
        }
    }

    /// Records referenced before the returned instant are past retention.
    /// `None` when the policy never expires records.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.retention_days
            .map(|days| now - Duration::days(i64::from(days)))
    }

    /// Whether an active policy is due for a sweep at `now`. A policy that was
    /// never scheduled is due immediately.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_execution.is_none_or(|next| next <= now)
    }

    /// Whether the policy governs records of `tenant_id`.
    pub fn applies_to_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref().is_none_or(|t| t == tenant_id)
    }

    /// Rejects conditions that cannot be evaluated against the policy's data type.
    pub fn validate(&self) -> DataguardResult<()> {
        if self.retention_days == Some(0) {
            return Err(DataguardError::Validation(
                "retention_days must be at least 1 (use null for no expiry)".into(),
            ));
        }
        for condition in &self.conditions {
            if condition.data_type() != self.data_type {
                return Err(DataguardError::Validation(format!(
                    "condition {condition:?} applies to {} records, not {}",
                    condition.data_type(),
                    self.data_type
                )));
            }
        }
        Ok(())
    }
}
