//! Core types and error definitions for the Dataguard GDPR compliance engine.
//!
//! This crate provides the foundational types shared across all Dataguard crates:
//! the unified error enum, the tenant-owned data model the compliance services
//! reason about, and the audit collaborator contract.
//!
//! # Main types
//!
//! - [`DataguardError`]: Unified error enum for all Dataguard subsystems.
//! - [`DataguardResult`]: Convenience alias for `Result<T, DataguardError>`.
//! - [`ProcessingActivity`]: A documented data use (GDPR Art. 30 record).
//! - [`ConsentRecord`]: One append-only consent event.
//! - [`RetentionPolicy`]: Retention rule for one [`DataType`].
//! - [`DataRecord`]: A row of any retention-managed data type.
//! - [`AuditSink`]: Append-only structured audit logger with query access.

/// Processing activities and their risk flags.
pub mod activity;
/// Audit events and the audit collaborator trait.
pub mod audit;
/// Consent purposes, metadata and records.
pub mod consent;
/// Retention-managed records and data subject rights entities.
pub mod records;
/// Retention policies, data types and selection conditions.
pub mod retention;

pub use activity::{LegalBasis, ProcessingActivity, RiskFlags};
pub use audit::{AuditCategory, AuditEvent, AuditFilter, AuditSink, AuditStats, Severity};
pub use consent::{ConsentKey, ConsentMetadata, ConsentPurpose, ConsentRecord, ConsentSource};
pub use records::{
    DataBreach, DataRecord, DataSubjectRequest, DsrStatus, DsrType, EmployeeRecord,
    FormSubmission, NotificationRecord, RetainedRow, SessionRecord, UserRecord,
};
pub use retention::{DataType, PolicyScope, RetentionCondition, RetentionPolicy};

// --- Error types ---

/// Top-level error type for the Dataguard engine.
///
/// Lookup failures (`NotFound`, `Forbidden`) are raised to the caller and never
/// retried; `Conflict` signals a lost race on a keyed write or a held lease.
#[derive(Debug, thiserror::Error)]
pub enum DataguardError {
    /// The referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The referenced entity belongs to a different tenant.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed structural validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A concurrent writer or lease holder won the race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A state machine was asked to make an illegal transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An error from the persistence collaborator.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`DataguardError`].
pub type DataguardResult<T> = Result<T, DataguardError>;

impl DataguardError {
    /// Whether the error is a lookup failure that should be surfaced as-is.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Forbidden(_))
    }
}

/// Ensures an entity owned by `owner` may be accessed from `tenant_id`.
///
/// Returns [`DataguardError::Forbidden`] naming the entity on mismatch.
pub fn ensure_tenant(owner: &str, tenant_id: &str, entity: &str) -> DataguardResult<()> {
    if owner == tenant_id {
        Ok(())
    } else {
        Err(DataguardError::Forbidden(format!(
            "{entity} does not belong to tenant {tenant_id}"
        )))
    }
}
