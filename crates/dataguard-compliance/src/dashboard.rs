//! Composite compliance posture of a tenant.
//!
//! Six category scores start at 100 and lose points for findings; the overall
//! score is their weighted mean. The aggregator owns no state and writes
//! nothing. A category that cannot be evaluated scores 0 and is reported as a
//! critical issue instead of failing the whole dashboard.

use crate::consent::ConsentLedger;
use crate::dpia::DpiaAssessor;
use crate::report::{ComplianceStatus, RiskLevel};
use crate::retention::RetentionEngine;
use chrono::{DateTime, Duration, Utc};
use dataguard_core::{AuditFilter, AuditSink, DataSubjectRequest, DataguardResult, Severity};
use dataguard_store::{ActivityStore, SubjectRightsStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum number of documented active processing activities.
const MIN_DOCUMENTED_ACTIVITIES: usize = 5;
/// Days of audit history the trail and consent categories look at.
const TRAILING_WINDOW_DAYS: i64 = 30;
const RECENT_ACTIVITY_DAYS: i64 = 7;
const RECENT_ACTIVITY_LIMIT: usize = 50;
/// Horizon for DPIA reviews listed as upcoming tasks.
const REVIEW_HORIZON_DAYS: i64 = 30;
/// Open requests older than this are listed as tasks.
const PENDING_REQUEST_DAYS: i64 = 30;

/// A scored area of compliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    DataProtection,
    ConsentManagement,
    RetentionPolicies,
    SubjectRights,
    RiskAssessment,
    AuditTrail,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 6] = [
        ScoreCategory::DataProtection,
        ScoreCategory::ConsentManagement,
        ScoreCategory::RetentionPolicies,
        ScoreCategory::SubjectRights,
        ScoreCategory::RiskAssessment,
        ScoreCategory::AuditTrail,
    ];

    /// Weight in percent. The weights of all categories sum to 100.
    pub fn weight_percent(&self) -> u32 {
        match self {
            ScoreCategory::DataProtection => 20,
            ScoreCategory::ConsentManagement => 20,
            ScoreCategory::RetentionPolicies => 15,
            ScoreCategory::SubjectRights => 15,
            ScoreCategory::RiskAssessment => 20,
            ScoreCategory::AuditTrail => 10,
        }
    }

    /// [`weight_percent`](Self::weight_percent) as a fraction.
    pub fn weight(&self) -> f64 {
        f64::from(self.weight_percent()) / 100.0
    }

    /// Display name used in deductions and issues.
    pub fn label(&self) -> &'static str {
        match self {
            ScoreCategory::DataProtection => "Data protection",
            ScoreCategory::ConsentManagement => "Consent management",
            ScoreCategory::RetentionPolicies => "Retention policies",
            ScoreCategory::SubjectRights => "Data subject rights",
            ScoreCategory::RiskAssessment => "Risk assessment",
            ScoreCategory::AuditTrail => "Audit trail",
        }
    }
}

/// Weighted overall score: `round(Σ score × weight)`.
pub fn overall_score(scores: &[(ScoreCategory, u8)]) -> u8 {
    let weighted: u32 = scores
        .iter()
        .map(|(c, s)| c.weight_percent() * u32::from(*s))
        .sum();
    (f64::from(weighted) / 100.0).round().min(100.0) as u8
}

/// Overall risk classification of a compliance score.
pub fn risk_level_for_score(overall: u8) -> RiskLevel {
    if overall < 50 {
        RiskLevel::Critical
    } else if overall < 70 {
        RiskLevel::High
    } else if overall < 85 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Score of one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: ScoreCategory,
    pub score: u8,
    pub weight: f64,
    pub deductions: Vec<String>,
    /// Set when the category could not be evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Weighted compliance score of a tenant with its category breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceScore {
    /// `0..=100`, see [`overall_score`].
    pub overall: u8,
    pub risk_level: RiskLevel,
    /// One entry per [`ScoreCategory`], in [`ScoreCategory::ALL`] order.
    pub categories: Vec<CategoryScore>,
    pub recommendations: Vec<String>,
    /// Categories scoring below 50 or failing to evaluate.
    pub critical_issues: Vec<String>,
}

impl ComplianceScore {
    /// Score of one category.
    pub fn category(&self, category: ScoreCategory) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// An audit event shown in the recent activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    /// Id of the underlying audit event.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub severity: Severity,
    /// HIGH or CRITICAL events need someone to look at them.
    pub action_required: bool,
}

/// What an [`UpcomingTask`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// An activity never assessed, or whose next review is within 30 days.
    DpiaReview,
    /// An open data subject request older than 30 days.
    SubjectRequest,
    /// A retention policy whose scheduled run has passed.
    RetentionRun,
}

/// Pending compliance work, ordered by `due_at` on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingTask {
    pub kind: TaskKind,
    pub title: String,
    pub due_at: DateTime<Utc>,
    /// Activity, request or policy id, depending on `kind`.
    pub reference_id: Uuid,
}

/// A condition shown prominently on the dashboard, most severe first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Everything the compliance overview shows for a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceDashboard {
    pub tenant_id: String,
    pub generated_at: DateTime<Utc>,
    pub score: ComplianceScore,
    pub recent_activity: Vec<ActivityItem>,
    pub upcoming_tasks: Vec<UpcomingTask>,
    pub alerts: Vec<Alert>,
}

/// Running deductions for one category.
struct Deductions {
    score: i32,
    notes: Vec<String>,
}

impl Deductions {
    fn new() -> Self {
        Self {
            score: 100,
            notes: Vec::new(),
        }
    }

    fn deduct(&mut self, points: i32, reason: String) {
        self.score -= points;
        self.notes.push(format!("-{points}: {reason}"));
    }

    fn finish(self) -> (u8, Vec<String>) {
        (self.score.clamp(0, 100) as u8, self.notes)
    }
}

fn score_data_protection(active_activities: usize) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    if active_activities < MIN_DOCUMENTED_ACTIVITIES {
        d.deduct(
            30,
            format!("only {active_activities} documented processing activities (Art. 30 record)"),
        );
    }
    d.finish()
}

/// `withdrawal_rate` is a percentage over the trailing window.
fn score_consent_management(withdrawal_rate: f64, expired: u64) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    if withdrawal_rate > 30.0 {
        d.deduct(30, format!("withdrawal rate {withdrawal_rate:.1}% over 30 days"));
    } else if withdrawal_rate > 15.0 {
        d.deduct(15, format!("withdrawal rate {withdrawal_rate:.1}% over 30 days"));
    }
    if expired > 100 {
        d.deduct(25, format!("{expired} expired consents still marked granted"));
    } else if expired > 50 {
        d.deduct(10, format!("{expired} expired consents still marked granted"));
    }
    d.finish()
}

fn score_retention_policies(covered_types: usize, due_records: u64) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    if covered_types < 5 {
        d.deduct(40, format!("retention policies cover only {covered_types} data types"));
    } else if covered_types < 10 {
        d.deduct(20, format!("retention policies cover only {covered_types} data types"));
    }
    if due_records > 1000 {
        d.deduct(30, format!("{due_records} records past their retention period"));
    } else if due_records > 100 {
        d.deduct(15, format!("{due_records} records past their retention period"));
    }
    d.finish()
}

fn score_subject_rights(average_response_days: f64, overdue: usize) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    let average = average_response_days;
    if average > 30.0 {
        d.deduct(40, format!("average response time {average:.1} days"));
    } else if average > 15.0 {
        d.deduct(20, format!("average response time {average:.1} days"));
    }
    if overdue > 5 {
        d.deduct(30, format!("{overdue} overdue data subject requests"));
    } else if overdue > 0 {
        d.deduct(10, format!("{overdue} overdue data subject requests"));
    }
    d.finish()
}

fn score_risk_assessment(high_risk: usize, status: ComplianceStatus) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    if high_risk > 5 {
        d.deduct(40, format!("{high_risk} HIGH or CRITICAL risk activities"));
    } else if high_risk > 2 {
        d.deduct(20, format!("{high_risk} HIGH or CRITICAL risk activities"));
    }
    match status {
        ComplianceStatus::NonCompliant => {
            d.deduct(50, "DPIA status is NON_COMPLIANT".to_string());
        }
        ComplianceStatus::NeedsReview => {
            d.deduct(25, "DPIA status is NEEDS_REVIEW".to_string());
        }
        ComplianceStatus::Compliant => {}
    }
    d.finish()
}

fn score_audit_trail(events: u64, critical_events: u64) -> (u8, Vec<String>) {
    let mut d = Deductions::new();
    if events < 100 {
        d.deduct(30, format!("only {events} audit events in 30 days"));
    }
    if critical_events > 10 {
        d.deduct(25, format!("{critical_events} CRITICAL audit events in 30 days"));
    }
    d.finish()
}

/// Derives the compliance dashboard from the other compliance services.
pub struct DashboardAggregator {
    activities: Arc<dyn ActivityStore>,
    rights: Arc<dyn SubjectRightsStore>,
    audit: Arc<dyn AuditSink>,
    dpia: Arc<DpiaAssessor>,
    consent: Arc<ConsentLedger>,
    retention: Arc<RetentionEngine>,
}

impl DashboardAggregator {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        rights: Arc<dyn SubjectRightsStore>,
        audit: Arc<dyn AuditSink>,
        dpia: Arc<DpiaAssessor>,
        consent: Arc<ConsentLedger>,
        retention: Arc<RetentionEngine>,
    ) -> Self {
        Self {
            activities,
            rights,
            audit,
            dpia,
            consent,
            retention,
        }
    }

    async fn data_protection(&self, tenant_id: &str) -> DataguardResult<(u8, Vec<String>)> {
        let active = self.activities.list_activities(tenant_id, true).await?.len();
        Ok(score_data_protection(active))
    }

    async fn consent_management(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<(u8, Vec<String>)> {
        let report = self
            .consent
            .generate_consent_report_at(
                tenant_id,
                now - Duration::days(TRAILING_WINDOW_DAYS),
                now,
                now,
            )
            .await?;
        let expired = self.consent.count_expired_grants(tenant_id, now).await?;
        Ok(score_consent_management(report.totals.withdrawal_rate, expired))
    }

    async fn retention_policies(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<(u8, Vec<String>)> {
        let report = self
            .retention
            .generate_retention_report_at(tenant_id, now)
            .await?;
        Ok(score_retention_policies(report.covered_data_types, report.total_due))
    }

    async fn subject_rights(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<(u8, Vec<String>)> {
        let requests = self.rights.list_requests(tenant_id).await?;
        let response_days: Vec<f64> = requests
            .iter()
            .filter_map(DataSubjectRequest::response_days)
            .collect();
        let average = if response_days.is_empty() {
            0.0
        } else {
            response_days.iter().sum::<f64>() / response_days.len() as f64
        };
        let overdue = requests.iter().filter(|r| r.is_overdue(now)).count();
        Ok(score_subject_rights(average, overdue))
    }

    async fn risk_assessment(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<(u8, Vec<String>)> {
        let report = self.dpia.generate_dpia_report_at(tenant_id, now).await?;
        Ok(score_risk_assessment(report.high_risk_count, report.overall_status))
    }

    async fn audit_trail(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<(u8, Vec<String>)> {
        let stats = self
            .audit
            .get_stats(tenant_id, now - Duration::days(TRAILING_WINDOW_DAYS))
            .await?;
        Ok(score_audit_trail(stats.total, stats.count(Severity::Critical)))
    }

    pub async fn calculate_compliance_score(&self, tenant_id: &str) -> ComplianceScore {
        self.calculate_compliance_score_at(tenant_id, Utc::now())
            .await
    }

    /// Scores all six categories concurrently. Never fails.
    pub async fn calculate_compliance_score_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceScore {
        let (data_protection, consent, retention, rights, risk, audit) = tokio::join!(
            self.data_protection(tenant_id),
            self.consent_management(tenant_id, now),
            self.retention_policies(tenant_id, now),
            self.subject_rights(tenant_id, now),
            self.risk_assessment(tenant_id, now),
            self.audit_trail(tenant_id, now),
        );

        let mut critical_issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut categories = Vec::with_capacity(ScoreCategory::ALL.len());

        for (category, result) in [
            (ScoreCategory::DataProtection, data_protection),
            (ScoreCategory::ConsentManagement, consent),
            (ScoreCategory::RetentionPolicies, retention),
            (ScoreCategory::SubjectRights, rights),
            (ScoreCategory::RiskAssessment, risk),
            (ScoreCategory::AuditTrail, audit),
        ] {
            let scored = match result {
                Ok((score, deductions)) => CategoryScore {
                    category,
                    score,
                    weight: category.weight(),
                    deductions,
                    error: None,
                },
                Err(e) => {
                    warn!(
                        tenant_id,
                        category = category.label(),
                        error = %e,
                        "Category evaluation failed"
                    );
                    critical_issues
                        .push(format!("{} could not be evaluated: {e}", category.label()));
                    CategoryScore {
                        category,
                        score: 0,
                        weight: category.weight(),
                        deductions: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            if scored.error.is_none() {
                if scored.score < 50 {
                    critical_issues.push(format!(
                        "{} score is critically low ({}/100)",
                        category.label(),
                        scored.score
                    ));
                } else if scored.score < 70 {
                    recommendations.push(format!(
                        "Improve {} ({}/100): {}",
                        category.label().to_lowercase(),
                        scored.score,
                        scored.deductions.join("; ")
                    ));
                }
            }
            categories.push(scored);
        }

        let pairs: Vec<(ScoreCategory, u8)> =
            categories.iter().map(|c| (c.category, c.score)).collect();
        let overall = overall_score(&pairs);
        let risk_level = risk_level_for_score(overall);

        match risk_level {
            RiskLevel::Critical => {
                recommendations.push(
                    "Escalate to the Data Protection Officer and management immediately".into(),
                );
                recommendations.push("Prepare a remediation plan with owners and deadlines".into());
            }
            RiskLevel::High => {
                recommendations.push("Schedule a compliance review within the next month".into());
            }
            RiskLevel::Medium => {
                recommendations.push("Address open findings in the next review cycle".into());
            }
            RiskLevel::Low => {
                recommendations
                    .push("Maintain current controls and monitor for regressions".into());
            }
        }

        ComplianceScore {
            overall,
            risk_level,
            categories,
            recommendations,
            critical_issues,
        }
    }

    async fn recent_activity(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<ActivityItem>> {
        let filter = AuditFilter::tenant(tenant_id)
            .since(now - Duration::days(RECENT_ACTIVITY_DAYS))
            .limit(RECENT_ACTIVITY_LIMIT);
        Ok(self
            .audit
            .get_logs(&filter)
            .await?
            .into_iter()
            .map(|e| ActivityItem {
                id: e.id,
                timestamp: e.timestamp,
                action_required: e.severity.requires_action(),
                actor: e.actor,
                action: e.action,
                resource: e.resource,
                severity: e.severity,
            })
            .collect())
    }

    async fn upcoming_tasks(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<UpcomingTask>> {
        let (activities, latest, requests, policies) = tokio::join!(
            self.activities.list_activities(tenant_id, true),
            self.dpia.latest_assessments(tenant_id),
            self.rights.list_requests(tenant_id),
            self.retention.list_policies(tenant_id),
        );
        let latest: HashMap<Uuid, DateTime<Utc>> = latest?
            .into_iter()
            .map(|a| (a.activity_id, a.next_review))
            .collect();

        let mut tasks = Vec::new();
        let horizon = now + Duration::days(REVIEW_HORIZON_DAYS);
        for activity in activities? {
            // Never assessed means due now.
            let due_at = latest.get(&activity.id).copied().unwrap_or(now);
            if due_at <= horizon {
                tasks.push(UpcomingTask {
                    kind: TaskKind::DpiaReview,
                    title: format!("DPIA review: {}", activity.name),
                    due_at,
                    reference_id: activity.id,
                });
            }
        }

        let stale = now - Duration::days(PENDING_REQUEST_DAYS);
        for request in requests?
            .into_iter()
            .filter(|r| r.is_open() && r.created_at < stale)
        {
            tasks.push(UpcomingTask {
                kind: TaskKind::SubjectRequest,
                title: format!("{:?} request from {}", request.request_type, request.subject_id),
                due_at: request.due_at(),
                reference_id: request.id,
            });
        }

        for policy in policies?.into_iter().filter(|p| p.is_due(now)) {
            tasks.push(UpcomingTask {
                kind: TaskKind::RetentionRun,
                title: format!("Run {} retention policy", policy.data_type),
                due_at: policy.next_execution.unwrap_or(policy.created_at),
                reference_id: policy.id,
            });
        }

        tasks.sort_by_key(|t| t.due_at);
        Ok(tasks)
    }

    async fn alerts(
        &self,
        tenant_id: &str,
        score: &ComplianceScore,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<Alert>> {
        let (expired, breaches) = tokio::join!(
            self.consent.count_expired_grants(tenant_id, now),
            self.rights.list_breaches(tenant_id),
        );

        let mut alerts = Vec::new();
        if score.risk_level == RiskLevel::Critical {
            alerts.push(Alert {
                severity: Severity::Critical,
                title: "Critical compliance risk".into(),
                message: format!("Overall compliance score is {}/100", score.overall),
            });
        }
        if !score.critical_issues.is_empty() {
            alerts.push(Alert {
                severity: Severity::High,
                title: "Critical compliance issues".into(),
                message: score.critical_issues.join("; "),
            });
        }
        let expired = expired?;
        if expired > 0 {
            alerts.push(Alert {
                severity: Severity::Medium,
                title: "Expired consents".into(),
                message: format!("{expired} consents have expired and need renewal"),
            });
        }
        for breach in breaches?.into_iter().filter(|b| b.awaits_notification(now)) {
            alerts.push(Alert {
                severity: breach.severity,
                title: format!("Unreported breach: {}", breach.title),
                message: format!(
                    "Supervisory authority must be notified by {} (Art. 33)",
                    breach.notification_deadline().format("%Y-%m-%d %H:%M UTC")
                ),
            });
        }

        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(alerts)
    }

    pub async fn generate_dashboard(&self, tenant_id: &str) -> ComplianceDashboard {
        self.generate_dashboard_at(tenant_id, Utc::now()).await
    }

    /// Builds the full dashboard. Auxiliary views that fail are shown empty.
    pub async fn generate_dashboard_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceDashboard {
        let score = self.calculate_compliance_score_at(tenant_id, now).await;

        let (recent_activity, upcoming_tasks, alerts) = tokio::join!(
            self.recent_activity(tenant_id, now),
            self.upcoming_tasks(tenant_id, now),
            self.alerts(tenant_id, &score, now),
        );

        let recent_activity = recent_activity.unwrap_or_else(|e| {
            warn!(tenant_id, error = %e, "Recent activity unavailable");
            Vec::new()
        });
        let upcoming_tasks = upcoming_tasks.unwrap_or_else(|e| {
            warn!(tenant_id, error = %e, "Upcoming tasks unavailable");
            Vec::new()
        });
        let alerts = alerts.unwrap_or_else(|e| {
            warn!(tenant_id, error = %e, "Alerts unavailable");
            Vec::new()
        });

        info!(
            tenant_id,
            overall = score.overall,
            risk_level = %score.risk_level,
            tasks = upcoming_tasks.len(),
            alerts = alerts.len(),
            "Compliance dashboard generated"
        );

        ComplianceDashboard {
            tenant_id: tenant_id.to_string(),
            generated_at: now,
            score,
            recent_activity,
            upcoming_tasks,
            alerts,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let total: u32 = ScoreCategory::ALL.iter().map(ScoreCategory::weight_percent).sum();
        assert_eq!(total, 100);
        let sum: f64 = ScoreCategory::ALL.iter().map(ScoreCategory::weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_is_rounded_weighted_sum() {
        let all = |s: u8| -> Vec<(ScoreCategory, u8)> {
            ScoreCategory::ALL.iter().map(|c| (*c, s)).collect()
        };
        assert_eq!(overall_score(&all(100)), 100);
        assert_eq!(overall_score(&all(0)), 0);
        assert_eq!(overall_score(&all(73)), 73);

        let mixed = [
            (ScoreCategory::DataProtection, 70),
            (ScoreCategory::ConsentManagement, 85),
            (ScoreCategory::RetentionPolicies, 60),
            (ScoreCategory::SubjectRights, 100),
            (ScoreCategory::RiskAssessment, 55),
            (ScoreCategory::AuditTrail, 75),
        ];
        // 14 + 17 + 9 + 15 + 11 + 7.5 = 73.5
        assert_eq!(overall_score(&mixed), 74);
    }

    #[test]
    fn test_overall_risk_levels() {
        assert_eq!(risk_level_for_score(49), RiskLevel::Critical);
        assert_eq!(risk_level_for_score(50), RiskLevel::High);
        assert_eq!(risk_level_for_score(69), RiskLevel::High);
        assert_eq!(risk_level_for_score(70), RiskLevel::Medium);
        assert_eq!(risk_level_for_score(84), RiskLevel::Medium);
        assert_eq!(risk_level_for_score(85), RiskLevel::Low);
    }

    #[test]
    fn test_data_protection_needs_five_activities() {
        assert_eq!(score_data_protection(4).0, 70);
        assert_eq!(score_data_protection(5), (100, Vec::new()));
    }

    #[test]
    fn test_consent_withdrawal_rate_thresholds() {
        assert_eq!(score_consent_management(15.0, 0).0, 100);
        assert_eq!(score_consent_management(15.1, 0).0, 85);
        assert_eq!(score_consent_management(30.0, 0).0, 85);
        let (score, notes) = score_consent_management(30.1, 0);
        assert_eq!(score, 70);
        assert_eq!(notes, vec!["-30: withdrawal rate 30.1% over 30 days".to_string()]);
    }

    #[test]
    fn test_consent_expired_volume_thresholds() {
        assert_eq!(score_consent_management(0.0, 50).0, 100);
        assert_eq!(score_consent_management(0.0, 51).0, 90);
        assert_eq!(score_consent_management(0.0, 100).0, 90);
        assert_eq!(score_consent_management(0.0, 101).0, 75);
        // Both deductions stack.
        assert_eq!(score_consent_management(40.0, 101).0, 45);
    }

    #[test]
    fn test_retention_coverage_and_due_thresholds() {
        assert_eq!(score_retention_policies(4, 0).0, 60);
        assert_eq!(score_retention_policies(5, 0).0, 80);
        assert_eq!(score_retention_policies(9, 0).0, 80);
        assert_eq!(score_retention_policies(10, 0).0, 100);
        assert_eq!(score_retention_policies(10, 100).0, 100);
        assert_eq!(score_retention_policies(10, 101).0, 85);
        assert_eq!(score_retention_policies(10, 1000).0, 85);
        assert_eq!(score_retention_policies(10, 1001).0, 70);
    }

    #[test]
    fn test_subject_rights_thresholds() {
        assert_eq!(score_subject_rights(15.0, 0).0, 100);
        assert_eq!(score_subject_rights(15.5, 0).0, 80);
        assert_eq!(score_subject_rights(30.0, 0).0, 80);
        assert_eq!(score_subject_rights(30.5, 0).0, 60);
        assert_eq!(score_subject_rights(0.0, 1).0, 90);
        assert_eq!(score_subject_rights(0.0, 5).0, 90);
        assert_eq!(score_subject_rights(0.0, 6).0, 70);
        assert_eq!(score_subject_rights(31.0, 6).0, 30);
    }

    #[test]
    fn test_risk_assessment_thresholds() {
        assert_eq!(score_risk_assessment(2, ComplianceStatus::Compliant).0, 100);
        assert_eq!(score_risk_assessment(3, ComplianceStatus::Compliant).0, 80);
        assert_eq!(score_risk_assessment(5, ComplianceStatus::Compliant).0, 80);
        assert_eq!(score_risk_assessment(6, ComplianceStatus::Compliant).0, 60);
        assert_eq!(score_risk_assessment(0, ComplianceStatus::NeedsReview).0, 75);
        assert_eq!(score_risk_assessment(0, ComplianceStatus::NonCompliant).0, 50);
        assert_eq!(score_risk_assessment(6, ComplianceStatus::NonCompliant).0, 10);
    }

    #[test]
    fn test_audit_trail_thresholds() {
        assert_eq!(score_audit_trail(99, 0).0, 70);
        assert_eq!(score_audit_trail(100, 0).0, 100);
        assert_eq!(score_audit_trail(100, 10).0, 100);
        let (score, notes) = score_audit_trail(100, 11);
        assert_eq!(score, 75);
        assert_eq!(notes, vec!["-25: 11 CRITICAL audit events in 30 days".to_string()]);
        assert_eq!(score_audit_trail(0, 11).0, 45);
    }

    #[test]
    fn test_deductions_clamp_at_zero() {
        let mut d = Deductions::new();
        d.deduct(50, "a".into());
        d.deduct(40, "b".into());
        d.deduct(30, "c".into());
        let (score, notes) = d.finish();
        assert_eq!(score, 0);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0], "-50: a");
    }
}
