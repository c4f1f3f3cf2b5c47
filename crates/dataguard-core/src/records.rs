use crate::audit::{AuditEvent, Severity};
use crate::consent::ConsentRecord;
use crate::retention::DataType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// E-mail domain used for anonymized user accounts. `.invalid` is reserved
/// (RFC 2606) and can never belong to a real mailbox.
pub const ANONYMIZED_EMAIL_DOMAIN: &str = "anonymized.invalid";

/// Display name written over anonymized users.
pub const ANONYMIZED_NAME: &str = "Anonymized User";

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub anonymized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Whether the account already carries the anonymization sentinel.
    pub fn is_anonymized(&self) -> bool {
        self.anonymized_at.is_some()
            || self
                .email
                .rsplit_once('@')
                .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(ANONYMIZED_EMAIL_DOMAIN))
    }
}

/// An authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A submitted public form (contact, newsletter, booking enquiry…).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: Uuid,
    pub tenant_id: String,
    pub form_name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// An employee record. A linked user account carries an independent legal
/// retention obligation and is never anonymized by retention sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub position: String,
}

/// A personal data breach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBreach {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub authority_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub affected_subjects: u64,
}

impl DataBreach {
    /// Hours in the supervisory-authority notification window (Art. 33).
    pub const NOTIFICATION_WINDOW_HOURS: i64 = 72;

    /// Deadline for notifying the supervisory authority.
    pub fn notification_deadline(&self) -> DateTime<Utc> {
        self.detected_at + Duration::hours(Self::NOTIFICATION_WINDOW_HOURS)
    }

    /// A high-severity breach detected within the window that nobody has reported yet.
    pub fn awaits_notification(&self, now: DateTime<Utc>) -> bool {
        self.authority_notified_at.is_none()
            && self.severity.requires_action()
            && self.detected_at >= now - Duration::hours(Self::NOTIFICATION_WINDOW_HOURS)
    }
}

/// Type of a data subject request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DsrType {
    Access,
    Rectification,
    Erasure,
    Restriction,
    Portability,
    Objection,
}

/// Lifecycle of a data subject request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DsrStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

/// A data subject rights request (GDPR Arts. 15–21).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSubjectRequest {
    pub id: Uuid,
    pub tenant_id: String,
    pub subject_id: String,
    pub request_type: DsrType,
    pub status: DsrStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DataSubjectRequest {
    /// Days allowed to answer a request (Art. 12(3)).
    pub const RESPONSE_DAYS: i64 = 30;

    /// Whether the request is still waiting for an answer.
    pub fn is_open(&self) -> bool {
        matches!(self.status, DsrStatus::Pending | DsrStatus::InProgress)
    }

    /// Response deadline.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(Self::RESPONSE_DAYS)
    }

    /// Open and past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at() < now
    }

    /// Days between submission and completion, for completed requests.
    pub fn response_days(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_seconds() as f64 / 86_400.0)
    }
}

/// A row of any retention-managed data type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "record")]
pub enum DataRecord {
    User(UserRecord),
    Session(SessionRecord),
    AuditLog(AuditEvent),
    ConsentRecord(ConsentRecord),
    FormSubmission(FormSubmission),
    Notification(NotificationRecord),
}

impl DataRecord {
    /// Primary key.
    pub fn id(&self) -> Uuid {
        match self {
            DataRecord::User(r) => r.id,
            DataRecord::Session(r) => r.id,
            DataRecord::AuditLog(r) => r.id,
            DataRecord::ConsentRecord(r) => r.id,
            DataRecord::FormSubmission(r) => r.id,
            DataRecord::Notification(r) => r.id,
        }
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> &str {
        match self {
            DataRecord::User(r) => &r.tenant_id,
            DataRecord::Session(r) => &r.tenant_id,
            DataRecord::AuditLog(r) => &r.tenant_id,
            DataRecord::ConsentRecord(r) => &r.tenant_id,
            DataRecord::FormSubmission(r) => &r.tenant_id,
            DataRecord::Notification(r) => &r.tenant_id,
        }
    }

    /// The data type of this row.
    pub fn data_type(&self) -> DataType {
        match self {
            DataRecord::User(_) => DataType::User,
            DataRecord::Session(_) => DataType::Session,
            DataRecord::AuditLog(_) => DataType::AuditLog,
            DataRecord::ConsentRecord(_) => DataType::ConsentRecord,
            DataRecord::FormSubmission(_) => DataType::FormSubmission,
            DataRecord::Notification(_) => DataType::Notification,
        }
    }

    /// The instant compared against a retention cutoff.
    pub fn reference_time(&self) -> DateTime<Utc> {
        match self {
            DataRecord::User(r) => r.reference_time(),
            DataRecord::Session(r) => r.reference_time(),
            DataRecord::AuditLog(r) => r.reference_time(),
            DataRecord::ConsentRecord(r) => r.reference_time(),
            DataRecord::FormSubmission(r) => r.reference_time(),
            DataRecord::Notification(r) => r.reference_time(),
        }
    }
}

/// Columns a keyed retention scan orders and filters on.
pub trait RetainedRow {
    /// Primary key.
    fn row_id(&self) -> Uuid;
    /// Owning tenant.
    fn row_tenant(&self) -> &str;
    /// Last login for users, expiry for sessions, revocation for consent
    /// events, creation otherwise.
    fn reference_time(&self) -> DateTime<Utc>;
}

macro_rules! retained_row {
    ($ty:ty, |$r:ident| $reference:expr) => {
        impl RetainedRow for $ty {
            fn row_id(&self) -> Uuid {
                self.id
            }
            fn row_tenant(&self) -> &str {
                &self.tenant_id
            }
            fn reference_time(&self) -> DateTime<Utc> {
                let $r = self;
                $reference
            }
        }
    };
}

retained_row!(UserRecord, |r| r.last_login_at.unwrap_or(r.created_at));
retained_row!(SessionRecord, |r| r.expires_at);
retained_row!(AuditEvent, |r| r.timestamp);
retained_row!(ConsentRecord, |r| r.revoked_at.unwrap_or(r.created_at));
retained_row!(FormSubmission, |r| r.created_at);
retained_row!(NotificationRecord, |r| r.created_at);

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            email: email.into(),
            name: "Ada".into(),
            phone: None,
            bio: None,
            avatar_url: None,
            role: "customer".into(),
            is_active: false,
            last_login_at: None,
            anonymized_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_anonymized_detection() {
        assert!(!user("ada@example.com").is_anonymized());
        assert!(user("anonymized-1f2e@anonymized.invalid").is_anonymized());
        let mut u = user("ada@example.com");
        u.anonymized_at = Some(Utc::now());
        assert!(u.is_anonymized());
    }

    #[test]
    fn test_breach_notification_window() {
        let now = Utc::now();
        let mut breach = DataBreach {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            title: "Leaked export".into(),
            severity: Severity::High,
            detected_at: now - Duration::hours(10),
            authority_notified_at: None,
            affected_subjects: 120,
        };
        assert!(breach.awaits_notification(now));
        assert_eq!(breach.notification_deadline(), now + Duration::hours(62));

        breach.detected_at = now - Duration::hours(80);
        assert!(!breach.awaits_notification(now));

        breach.detected_at = now;
        breach.severity = Severity::Medium;
        assert!(!breach.awaits_notification(now));
    }

    #[test]
    fn test_dsr_overdue() {
        let now = Utc::now();
        let mut req = DataSubjectRequest {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            subject_id: "u1".into(),
            request_type: DsrType::Erasure,
            status: DsrStatus::Pending,
            created_at: now - Duration::days(31),
            completed_at: None,
        };
        assert!(req.is_overdue(now));
        req.status = DsrStatus::Completed;
        req.completed_at = Some(req.created_at + Duration::days(12));
        assert!(!req.is_overdue(now));
        assert_eq!(req.response_days(), Some(12.0));
    }

    #[test]
    fn test_session_reference_time_is_expiry() {
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            user_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
            created_at: now - Duration::days(120),
            expires_at: now - Duration::days(90),
        };
        let record = DataRecord::Session(session);
        assert_eq!(record.reference_time(), now - Duration::days(90));
        assert_eq!(record.data_type(), DataType::Session);
    }
}
