//! Data Protection Impact Assessment scoring.
//!
//! An activity is scored against nine weighted criteria (weights sum to 100).
//! Each criterion evaluates to a raw sub-score in `0..=10`; its contribution
//! is `weight × raw / 10` and the final score is
//! `round(100 × Σ contributions / Σ weights)`.

use crate::config::DpiaConfig;
use crate::persistence::AssessmentStore;
use crate::report::{ComplianceStatus, RiskLevel};
use chrono::{DateTime, Months, Utc};
use dataguard_core::{
    ensure_tenant, AuditCategory, AuditEvent, AuditSink, DataguardError, DataguardResult,
    LegalBasis, ProcessingActivity, RiskFlags, Severity,
};
use dataguard_store::ActivityStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Score at or above which an activity is CRITICAL.
pub const CRITICAL_THRESHOLD: u8 = 85;
/// Score at or above which an activity is HIGH.
pub const HIGH_THRESHOLD: u8 = 70;
/// Score at or above which an activity is MEDIUM.
pub const MEDIUM_THRESHOLD: u8 = 50;

/// Raw sub-score at which a criterion also yields a required action.
const HIGH_PRIORITY_RAW: u8 = 8;

/// Maps a DPIA score to its risk level.
pub fn risk_level_for(score: u8) -> RiskLevel {
    if score >= CRITICAL_THRESHOLD {
        RiskLevel::Critical
    } else if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Months until the next review for a risk level.
pub fn review_interval_months(level: RiskLevel) -> u32 {
    match level {
        RiskLevel::Critical => 3,
        RiskLevel::High => 6,
        RiskLevel::Medium => 12,
        RiskLevel::Low => 24,
    }
}

const VULNERABLE_SUBJECTS: &[&str] = &[
    "child", "minor", "student", "pupil", "patient", "elderly", "employee", "worker", "asylum",
    "refugee", "disabled", "vulnerable",
];

const SPECIAL_CATEGORIES: &[&str] = &[
    "health", "medical", "biometric", "genetic", "racial", "ethnic", "political", "religio",
    "philosoph", "trade union", "sexual", "criminal",
];

fn mentions_any(values: &[String], needles: &[&str]) -> usize {
    values
        .iter()
        .filter(|v| {
            let v = v.to_lowercase();
            needles.iter().any(|n| v.contains(n))
        })
        .count()
}

/// Whether the activity processes special-category data, by flag or by a
/// declared Art. 9 data category.
pub fn processes_special_categories(activity: &ProcessingActivity) -> bool {
    activity.flags.sensitive_data
        || mentions_any(&activity.data_categories, SPECIAL_CATEGORIES) > 0
}

/// One of the nine DPIA criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    SystematicEvaluation,
    LargeScaleSpecialCategory,
    PublicMonitoring,
    VulnerableSubjects,
    CrossBorderTransfer,
    NewTechnology,
    DataCombination,
    ServiceDenial,
    InadequateSecurity,
}

impl Criterion {
    /// All criteria in evaluation order.
    pub const ALL: [Criterion; 9] = [
        Criterion::SystematicEvaluation,
        Criterion::LargeScaleSpecialCategory,
        Criterion::PublicMonitoring,
        Criterion::VulnerableSubjects,
        Criterion::CrossBorderTransfer,
        Criterion::NewTechnology,
        Criterion::DataCombination,
        Criterion::ServiceDenial,
        Criterion::InadequateSecurity,
    ];

    /// Share of the overall score, in percent. The nine weights sum to 100.
    pub fn weight(&self) -> u32 {
        match self {
            Criterion::SystematicEvaluation => 15,
            Criterion::LargeScaleSpecialCategory => 20,
            Criterion::PublicMonitoring => 12,
            Criterion::VulnerableSubjects => 10,
            Criterion::CrossBorderTransfer => 8,
            Criterion::NewTechnology => 8,
            Criterion::DataCombination => 7,
            Criterion::ServiceDenial => 10,
            Criterion::InadequateSecurity => 10,
        }
    }

    /// Raw sub-score at which the criterion yields a recommendation.
    pub fn threshold(&self) -> u8 {
        match self {
            Criterion::SystematicEvaluation
            | Criterion::LargeScaleSpecialCategory
            | Criterion::PublicMonitoring
            | Criterion::InadequateSecurity => 6,
            Criterion::VulnerableSubjects
            | Criterion::CrossBorderTransfer
            | Criterion::NewTechnology => 5,
            Criterion::DataCombination | Criterion::ServiceDenial => 7,
        }
    }

    /// Human-readable name used in assessments and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Criterion::SystematicEvaluation => "Systematic and extensive evaluation",
            Criterion::LargeScaleSpecialCategory => "Large-scale special category processing",
            Criterion::PublicMonitoring => "Systematic monitoring of publicly accessible areas",
            Criterion::VulnerableSubjects => "Processing of vulnerable data subjects",
            Criterion::CrossBorderTransfer => "Transfers without adequate protection",
            Criterion::NewTechnology => "Innovative use of new technology",
            Criterion::DataCombination => "Matching or combining datasets",
            Criterion::ServiceDenial => "Risk of denial of a service or contract",
            Criterion::InadequateSecurity => "Inadequate security measures",
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Criterion::SystematicEvaluation => {
                "Provide meaningful human review of automated evaluations and explain the logic involved"
            }
            Criterion::LargeScaleSpecialCategory => {
                "Minimise special category data and document the Art. 9 condition relied upon"
            }
            Criterion::PublicMonitoring => {
                "Limit monitoring to what is necessary and post clear notices in monitored areas"
            }
            Criterion::VulnerableSubjects => {
                "Apply additional safeguards and age- or context-appropriate transparency for vulnerable subjects"
            }
            Criterion::CrossBorderTransfer => {
                "Put Standard Contractual Clauses and a transfer impact assessment in place for non-adequate countries"
            }
            Criterion::NewTechnology => {
                "Assess the technology's failure modes and run a pilot before full deployment"
            }
            Criterion::DataCombination => {
                "Document each data source and verify that combining them is compatible with the original purposes"
            }
            Criterion::ServiceDenial => {
                "Offer a way to contest decisions that may deny a service or contract"
            }
            Criterion::InadequateSecurity => {
                "Implement encryption, access control and logging appropriate to the risk (Art. 32)"
            }
        }
    }

    fn required_action(&self) -> &'static str {
        match self {
            Criterion::SystematicEvaluation => {
                "Implement human-in-the-loop review for automated decisions"
            }
            Criterion::LargeScaleSpecialCategory => {
                "Reduce or pseudonymise special category data processed at scale"
            }
            Criterion::PublicMonitoring => {
                "Justify and restrict systematic monitoring of public areas"
            }
            Criterion::VulnerableSubjects => {
                "Establish dedicated safeguards for vulnerable data subjects"
            }
            Criterion::CrossBorderTransfer => {
                "Suspend or legitimise transfers to non-adequate countries"
            }
            Criterion::NewTechnology => "Complete a technology risk review before go-live",
            Criterion::DataCombination => "Map and justify every combined data source",
            Criterion::ServiceDenial => "Provide a contestation and human appeal process",
            Criterion::InadequateSecurity => {
                "Deploy baseline technical and organisational security measures"
            }
        }
    }

    /// Raw sub-score in `0..=10` for `activity`.
    pub fn evaluate(&self, activity: &ProcessingActivity, config: &DpiaConfig) -> u8 {
        let flags = &activity.flags;
        let sensitive = processes_special_categories(activity);
        let raw: u8 = match self {
            Criterion::SystematicEvaluation => {
                if flags.automated_decision_making {
                    10
                } else if flags.systematic_monitoring {
                    6
                } else {
                    0
                }
            }
            Criterion::LargeScaleSpecialCategory => {
                match (sensitive, flags.large_scale_processing) {
                    (true, true) => 10,
                    (true, false) => 6,
                    (false, true) => 5,
                    (false, false) => 0,
                }
            }
            Criterion::PublicMonitoring => {
                if flags.systematic_monitoring && flags.publicly_accessible {
                    10
                } else if flags.systematic_monitoring || flags.large_scale_processing {
                    8
                } else if flags.publicly_accessible {
                    6
                } else {
                    0
                }
            }
            Criterion::VulnerableSubjects => {
                if mentions_any(&activity.data_subjects, VULNERABLE_SUBJECTS) > 0 {
                    10
                } else if sensitive {
                    8
                } else {
                    0
                }
            }
            Criterion::CrossBorderTransfer => {
                let unsafe_transfers = activity
                    .third_countries
                    .iter()
                    .filter(|c| !config.is_adequate(c))
                    .count();
                match unsafe_transfers {
                    0 if activity.third_countries.is_empty() => 0,
                    0 => 2,
                    1 => 6,
                    _ => 10,
                }
            }
            Criterion::NewTechnology => {
                if flags.new_technology {
                    10
                } else if flags.automated_decision_making {
                    8
                } else {
                    0
                }
            }
            Criterion::DataCombination => {
                let mut raw = 0;
                if flags.large_scale_processing {
                    raw += 5;
                }
                if flags.automated_decision_making {
                    raw += 3;
                }
                if sensitive {
                    raw += 2;
                }
                if activity.data_categories.len() >= 4 {
                    raw += 3;
                }
                if activity.recipients.len() >= 3 {
                    raw += 2;
                }
                raw
            }
            Criterion::ServiceDenial => {
                let contractual = activity.legal_basis == LegalBasis::Contract;
                if flags.automated_decision_making && (sensitive || contractual) {
                    10
                } else if flags.automated_decision_making {
                    8
                } else if contractual && flags.large_scale_processing {
                    4
                } else {
                    0
                }
            }
            Criterion::InadequateSecurity => match activity.security_measures.len() {
                0 => 10,
                1 | 2 => 6,
                3 | 4 => 3,
                _ => 0,
            },
        };
        raw.min(10)
    }
}

/// Result of one criterion for one activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub raw: u8,
    pub weight: u32,
    pub contribution: f64,
}

/// A derived DPIA result. Recomputed on every call; each performed
/// assessment is also appended, immutably, to the assessment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpiaAssessment {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub tenant_id: String,
    pub activity_name: String,
    pub score: u8,
    pub risk_level: RiskLevel,
    pub compliance_status: ComplianceStatus,
    pub criteria: Vec<CriterionScore>,
    pub recommendations: Vec<String>,
    pub required_actions: Vec<String>,
    pub assessed_at: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
    #[serde(default)]
    pub assessed_by: Option<String>,
    /// Adequacy list version used for the cross-border criterion.
    pub adequacy_version: String,
}

impl DpiaAssessment {
    pub fn is_high_risk(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }
}

fn compliance_status(score: u8, required_actions: usize) -> ComplianceStatus {
    if score >= HIGH_THRESHOLD && required_actions > 3 {
        ComplianceStatus::NonCompliant
    } else if score >= MEDIUM_THRESHOLD || required_actions > 0 {
        ComplianceStatus::NeedsReview
    } else {
        ComplianceStatus::Compliant
    }
}

fn risk_level_guidance(
    level: RiskLevel,
    recommendations: &mut Vec<String>,
    actions: &mut Vec<String>,
) {
    match level {
        RiskLevel::Critical => {
            recommendations
                .push("Consider suspending the processing until residual risks are reduced".into());
            actions.push(
                "MANDATORY: Consult the supervisory authority before starting or continuing the processing (Art. 36 GDPR)"
                    .into(),
            );
            actions.push(
                "MANDATORY: Commission an independent audit of technical and organisational measures"
                    .into(),
            );
        }
        RiskLevel::High => {
            recommendations
                .push("Involve the Data Protection Officer in reviewing mitigation measures".into());
            recommendations.push("Re-assess once mitigation measures are implemented".into());
        }
        RiskLevel::Medium => {
            recommendations
                .push("Monitor the processing and review this assessment periodically".into());
        }
        RiskLevel::Low => {
            recommendations
                .push("Maintain current safeguards and review at the next scheduled date".into());
        }
    }
}

fn legal_basis_guidance(basis: LegalBasis, recommendations: &mut Vec<String>) {
    match basis {
        LegalBasis::Consent => {
            recommendations.push(
                "Verify that consent is freely given, specific, informed and unambiguous".into(),
            );
            recommendations
                .push("Make withdrawing consent as easy as giving it (Art. 7(3))".into());
        }
        LegalBasis::LegitimateInterests => {
            recommendations.push("Document the legitimate interests balancing test".into());
            recommendations
                .push("Inform data subjects of their right to object (Art. 21)".into());
        }
        _ => {}
    }
}

/// Scores `activity` at `now`. Pure: no I/O, no audit.
pub fn assess(
    activity: &ProcessingActivity,
    config: &DpiaConfig,
    now: DateTime<Utc>,
) -> DpiaAssessment {
    let mut criteria = Vec::with_capacity(Criterion::ALL.len());
    let mut recommendations = Vec::new();
    let mut required_actions = Vec::new();
    let mut weighted_raw: u32 = 0;
    let mut total_weight: u32 = 0;

    for criterion in Criterion::ALL {
        let raw = criterion.evaluate(activity, config);
        let weight = criterion.weight();
        weighted_raw += weight * u32::from(raw);
        total_weight += weight;

        if raw >= criterion.threshold() {
            recommendations.push(criterion.recommendation().to_string());
        }
        if raw >= HIGH_PRIORITY_RAW {
            required_actions.push(format!("HIGH PRIORITY: {}", criterion.required_action()));
        }
        criteria.push(CriterionScore {
            criterion,
            raw,
            weight,
            contribution: f64::from(weight) * f64::from(raw) / 10.0,
        });
    }

    // Σ contributions = Σ(weight × raw) / 10
    let score = if total_weight == 0 {
        0
    } else {
        (100.0 * f64::from(weighted_raw) / (10.0 * f64::from(total_weight))).round() as u8
    };
    let risk_level = risk_level_for(score);

    risk_level_guidance(risk_level, &mut recommendations, &mut required_actions);
    legal_basis_guidance(activity.legal_basis, &mut recommendations);

    let compliance_status = compliance_status(score, required_actions.len());
    let next_review = now
        .checked_add_months(Months::new(review_interval_months(risk_level)))
        .unwrap_or(now);

    DpiaAssessment {
        id: Uuid::new_v4(),
        activity_id: activity.id,
        tenant_id: activity.tenant_id.clone(),
        activity_name: activity.name.clone(),
        score,
        risk_level,
        compliance_status,
        criteria,
        recommendations,
        required_actions,
        assessed_at: now,
        next_review,
        assessed_by: None,
        adequacy_version: config.adequacy_version.clone(),
    }
}

static ADM_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(automat\w*\s+decision\w*|algorithm\w*|scoring|credit check\w*|eligibility)\b")
        .ok()
});
static LARGE_SCALE_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(large[- ]scale|nationwide|millions?|all (users|customers)|mass)\b").ok()
});
static SENSITIVE_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(health|medical|biometric\w*|genetic|religio\w*|ethnic\w*|political|sexual|trade union|criminal)\b")
        .ok()
});
static PUBLIC_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(publicly|public (area|space|place)s?|cctv|street|open to the public)\b")
        .ok()
});
static NEW_TECH_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ai|artificial intelligence|machine learning|facial recognition|iot|blockchain|new technolog\w*)\b")
        .ok()
});
static MONITORING_HINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(monitor\w*|track\w*|surveillance|geolocat\w*|behaviou?ral)\b").ok()
});

fn hinted(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Suggests risk flags from keywords in the activity's purpose and description.
///
/// This is an assist for whoever documents the activity. The returned flags
/// are never applied automatically; the structured flags stay authoritative.
pub fn suggest_flags(activity: &ProcessingActivity) -> RiskFlags {
    let text = format!("{} {} {}", activity.name, activity.purpose, activity.description);
    RiskFlags {
        automated_decision_making: hinted(&ADM_HINT, &text),
        large_scale_processing: hinted(&LARGE_SCALE_HINT, &text),
        sensitive_data: hinted(&SENSITIVE_HINT, &text),
        publicly_accessible: hinted(&PUBLIC_HINT, &text),
        new_technology: hinted(&NEW_TECH_HINT, &text),
        systematic_monitoring: hinted(&MONITORING_HINT, &text),
    }
}

/// Tenant-wide DPIA summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpiaReport {
    pub tenant_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_activities: usize,
    pub average_score: f64,
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    pub high_risk_count: usize,
    pub overall_status: ComplianceStatus,
    pub assessments: Vec<DpiaAssessment>,
}

/// Performs DPIAs against stored activities and keeps the assessment history.
pub struct DpiaAssessor {
    activities: Arc<dyn ActivityStore>,
    audit: Arc<dyn AuditSink>,
    history: Arc<dyn AssessmentStore>,
    config: DpiaConfig,
}

impl DpiaAssessor {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        audit: Arc<dyn AuditSink>,
        history: Arc<dyn AssessmentStore>,
        config: DpiaConfig,
    ) -> Self {
        Self {
            activities,
            audit,
            history,
            config,
        }
    }

    pub fn config(&self) -> &DpiaConfig {
        &self.config
    }

    async fn tenant_activity(
        &self,
        tenant_id: &str,
        activity_id: Uuid,
    ) -> DataguardResult<ProcessingActivity> {
        let activity = self
            .activities
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| DataguardError::NotFound(format!("processing activity {activity_id}")))?;
        ensure_tenant(
            &activity.tenant_id,
            tenant_id,
            &format!("processing activity {activity_id}"),
        )?;
        Ok(activity)
    }

    /// Assesses one activity, records the result in the history and emits
    /// one audit event.
    pub async fn perform_dpia(
        &self,
        tenant_id: &str,
        activity_id: Uuid,
        actor_id: &str,
    ) -> DataguardResult<DpiaAssessment> {
        self.perform_dpia_at(tenant_id, activity_id, actor_id, Utc::now())
            .await
    }

    /// [`perform_dpia`](Self::perform_dpia) at a given instant.
    pub async fn perform_dpia_at(
        &self,
        tenant_id: &str,
        activity_id: Uuid,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<DpiaAssessment> {
        let activity = self.tenant_activity(tenant_id, activity_id).await?;
        let mut assessment = assess(&activity, &self.config, now);
        assessment.assessed_by = Some(actor_id.to_string());

        self.history.append(&assessment).await?;

        let severity = match assessment.risk_level {
            RiskLevel::Critical => Severity::High,
            RiskLevel::High => Severity::Medium,
            RiskLevel::Medium => Severity::Low,
            RiskLevel::Low => Severity::Info,
        };
        self.audit
            .log(
                AuditEvent::new(
                    tenant_id,
                    actor_id,
                    "DPIA_PERFORMED",
                    "ProcessingActivity",
                    AuditCategory::DataProtection,
                    severity,
                )
                .with_resource_id(activity_id)
                .with_details(serde_json::json!({
                    "assessment_id": assessment.id,
                    "activity_name": activity.name,
                    "score": assessment.score,
                    "risk_level": assessment.risk_level,
                }))
                .at(now),
            )
            .await?;

        info!(
            tenant_id,
            activity_id = %activity_id,
            score = assessment.score,
            risk_level = %assessment.risk_level,
            "DPIA performed"
        );
        Ok(assessment)
    }

    /// Recomputes assessments for every active activity of the tenant. No writes.
    pub async fn get_tenant_dpias(&self, tenant_id: &str) -> DataguardResult<Vec<DpiaAssessment>> {
        self.get_tenant_dpias_at(tenant_id, Utc::now()).await
    }

    /// [`get_tenant_dpias`](Self::get_tenant_dpias) at a given instant.
    pub async fn get_tenant_dpias_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<DpiaAssessment>> {
        let activities = self.activities.list_activities(tenant_id, true).await?;
        debug!(tenant_id, count = activities.len(), "Recomputing tenant DPIAs");
        Ok(activities
            .iter()
            .map(|a| assess(a, &self.config, now))
            .collect())
    }

    pub async fn generate_dpia_report(&self, tenant_id: &str) -> DataguardResult<DpiaReport> {
        self.generate_dpia_report_at(tenant_id, Utc::now()).await
    }

    /// [`generate_dpia_report`](Self::generate_dpia_report) at a given instant.
    pub async fn generate_dpia_report_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<DpiaReport> {
        let assessments = self.get_tenant_dpias_at(tenant_id, now).await?;

        let mut by_risk_level = BTreeMap::new();
        for a in &assessments {
            *by_risk_level.entry(a.risk_level).or_insert(0) += 1;
        }
        let average_score = if assessments.is_empty() {
            0.0
        } else {
            assessments.iter().map(|a| f64::from(a.score)).sum::<f64>() / assessments.len() as f64
        };

        Ok(DpiaReport {
            tenant_id: tenant_id.to_string(),
            generated_at: now,
            total_activities: assessments.len(),
            average_score,
            high_risk_count: assessments.iter().filter(|a| a.is_high_risk()).count(),
            overall_status: ComplianceStatus::worst(
                assessments.iter().map(|a| a.compliance_status),
            ),
            by_risk_level,
            assessments,
        })
    }

    /// Every performed assessment of an activity, oldest first.
    pub async fn assessment_history(
        &self,
        tenant_id: &str,
        activity_id: Uuid,
    ) -> DataguardResult<Vec<DpiaAssessment>> {
        self.tenant_activity(tenant_id, activity_id).await?;
        self.history.history(activity_id).await
    }

    /// The assessment that was in force for an activity at `at`.
    pub async fn assessment_in_force(
        &self,
        tenant_id: &str,
        activity_id: Uuid,
        at: DateTime<Utc>,
    ) -> DataguardResult<Option<DpiaAssessment>> {
        let history = self.assessment_history(tenant_id, activity_id).await?;
        Ok(history.into_iter().filter(|a| a.assessed_at <= at).next_back())
    }

    /// Latest performed assessment per activity of the tenant.
    pub async fn latest_assessments(
        &self,
        tenant_id: &str,
    ) -> DataguardResult<Vec<DpiaAssessment>> {
        self.history.latest_for_tenant(tenant_id).await
    }
}
