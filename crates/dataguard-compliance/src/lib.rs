//! GDPR compliance services for Dataguard.
//!
//! Scores processing activities (DPIA), keeps the consent ledger, executes
//! retention policies and aggregates all of it into a tenant compliance
//! dashboard. Every service is an explicit instance built from injected
//! persistence and audit collaborators.
//!
//! # Main types
//!
//! - [`DpiaAssessor`]: Weighted nine-criteria risk scoring with assessment history.
//! - [`ConsentLedger`]: Append-only per-purpose consent events.
//! - [`RetentionEngine`]: Cutoff-based delete/anonymize sweeps under a scope lease.
//! - [`DashboardAggregator`]: Six-category compliance score plus auxiliary views.
//! - [`ComplianceConfig`]: Versioned, legally mutable tables loaded from TOML.

/// Versioned configuration tables.
pub mod config;
/// Consent ledger and GDPR consent request validation.
pub mod consent;
/// Compliance score aggregation.
pub mod dashboard;
/// Data Protection Impact Assessment scoring.
pub mod dpia;
/// Consent change hooks.
pub mod hooks;
/// DPIA assessment history storage.
pub mod persistence;
/// Shared risk and status classifications.
pub mod report;
/// Retention policy execution.
pub mod retention;

pub use config::{ComplianceConfig, ConsentConfig, DefaultRetention, DpiaConfig, RetentionConfig};
pub use consent::{
    validate_gdpr_consent, ConsentDashboard, ConsentLedger, ConsentReport, ConsentRequest,
    ConsentValidation, ConsentView, NewConsent, PurposeStats,
};
pub use dashboard::{
    overall_score, ActivityItem, Alert, CategoryScore, ComplianceDashboard, ComplianceScore,
    DashboardAggregator, ScoreCategory, TaskKind, UpcomingTask,
};
pub use dpia::{
    assess, risk_level_for, suggest_flags, Criterion, CriterionScore, DpiaAssessment,
    DpiaAssessor, DpiaReport,
};
pub use hooks::{ComplianceEvent, ComplianceHook, ComplianceHookChain, FeatureToggleHook};
pub use persistence::{AssessmentStore, JsonlAssessmentStore, MemoryAssessmentStore};
pub use report::{ComplianceStatus, RiskLevel};
pub use retention::{
    anonymize_user, DataInventory, JobStatus, NewRetentionPolicy, RetentionBatch,
    RetentionEngine, RetentionJob, RetentionReport, SkippedPolicy,
};
