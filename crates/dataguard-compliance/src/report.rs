use serde::{Deserialize, Serialize};

/// Risk classification shared by DPIA assessments and the compliance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Overall compliance status of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NeedsReview,
    NonCompliant,
}

impl ComplianceStatus {
    /// The worse of the statuses; `Compliant` for an empty iterator.
    pub fn worst(statuses: impl IntoIterator<Item = ComplianceStatus>) -> ComplianceStatus {
        statuses
            .into_iter()
            .max()
            .unwrap_or(ComplianceStatus::Compliant)
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceStatus::Compliant => write!(f, "COMPLIANT"),
            ComplianceStatus::NeedsReview => write!(f, "NEEDS_REVIEW"),
            ComplianceStatus::NonCompliant => write!(f, "NON_COMPLIANT"),
        }
    }
}

/// Percentage helper that yields `0.0` for an empty denominator.
pub(crate) fn percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status() {
        assert_eq!(ComplianceStatus::worst([]), ComplianceStatus::Compliant);
        assert_eq!(
            ComplianceStatus::worst([ComplianceStatus::Compliant, ComplianceStatus::NeedsReview]),
            ComplianceStatus::NeedsReview
        );
        assert_eq!(
            ComplianceStatus::worst([
                ComplianceStatus::NonCompliant,
                ComplianceStatus::NeedsReview
            ]),
            ComplianceStatus::NonCompliant
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(RiskLevel::Critical.to_string(), "CRITICAL");
        assert_eq!(ComplianceStatus::NeedsReview.to_string(), "NEEDS_REVIEW");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ComplianceStatus::NonCompliant).unwrap();
        assert_eq!(json, "\"NON_COMPLIANT\"");
        let level: RiskLevel = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
