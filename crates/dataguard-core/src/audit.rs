use crate::DataguardResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Severity of an audit event, breach or alert. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Whether an event at this severity requires follow-up by an administrator.
    pub fn requires_action(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Coarse grouping of audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Authentication,
    DataAccess,
    DataModification,
    DataProtection,
    Consent,
    Retention,
    Security,
    System,
}

/// One structured, append-only audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub category: AuditCategory,
    pub severity: Severity,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an event stamped with the current time and no details.
    pub fn new(
        tenant_id: impl Into<String>,
        actor: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        category: AuditCategory,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            details: serde_json::Value::Null,
            category,
            severity,
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the id of the resource the event refers to.
    pub fn with_resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Attaches structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Overrides the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Query parameters for [`AuditSink::get_logs`].
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant_id: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_severity: Option<Severity>,
    pub category: Option<AuditCategory>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Filter for all events of a tenant.
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Restricts to events at or after `since`.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Caps the number of returned events.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event satisfies this filter.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        event.tenant_id == self.tenant_id
            && self.since.is_none_or(|s| event.timestamp >= s)
            && self.until.is_none_or(|u| event.timestamp < u)
            && self.min_severity.is_none_or(|m| event.severity >= m)
            && self.category.is_none_or(|c| event.category == c)
    }
}

/// Aggregate counts over a window of audit events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub by_severity: HashMap<Severity, u64>,
    pub by_category: HashMap<AuditCategory, u64>,
}

impl AuditStats {
    /// Builds stats from an iterator of events.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a AuditEvent>) -> Self {
        let mut stats = AuditStats::default();
        for event in events {
            stats.total += 1;
            *stats.by_severity.entry(event.severity).or_default() += 1;
            *stats.by_category.entry(event.category).or_default() += 1;
        }
        stats
    }

    /// Number of events recorded at `severity`.
    pub fn count(&self, severity: Severity) -> u64 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Append-only audit logger with read-back access.
///
/// Compliance services both emit events through it and read them back for
/// scoring and the recent-activity view.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends an event.
    async fn log(&self, event: AuditEvent) -> DataguardResult<()>;

    /// Returns matching events, newest first.
    async fn get_logs(&self, filter: &AuditFilter) -> DataguardResult<Vec<AuditEvent>>;

    /// Aggregates events of a tenant recorded at or after `since`.
    async fn get_stats(&self, tenant_id: &str, since: DateTime<Utc>)
        -> DataguardResult<AuditStats>;
}
