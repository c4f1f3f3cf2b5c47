use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GDPR Article 6 legal basis for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegalBasis {
    /// Art. 6(1)(a).
    Consent,
    /// Art. 6(1)(b).
    Contract,
    /// Art. 6(1)(c).
    LegalObligation,
    /// Art. 6(1)(d).
    VitalInterests,
    /// Art. 6(1)(e).
    PublicTask,
    /// Art. 6(1)(f).
    LegitimateInterests,
}

impl std::fmt::Display for LegalBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LegalBasis::Consent => "consent",
            LegalBasis::Contract => "contract",
            LegalBasis::LegalObligation => "legal obligation",
            LegalBasis::VitalInterests => "vital interests",
            LegalBasis::PublicTask => "public task",
            LegalBasis::LegitimateInterests => "legitimate interests",
        };
        f.write_str(label)
    }
}

/// Structured risk indicators captured when the activity is documented.
///
/// These flags are the system of record for DPIA scoring. Keyword heuristics
/// over the free-text description may *suggest* values but never overwrite them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFlags {
    /// Decisions with legal or similarly significant effect are taken
    /// without human involvement (Art. 22).
    pub automated_decision_making: bool,
    /// Processing covers a large number of subjects or a wide area.
    pub large_scale_processing: bool,
    /// Special-category (Art. 9) or criminal-offence (Art. 10) data.
    pub sensitive_data: bool,
    /// Data is collected in, or exposed to, publicly accessible spaces.
    pub publicly_accessible: bool,
    /// Innovative technology such as biometrics, AI or IoT.
    pub new_technology: bool,
    /// Subjects are observed, tracked or profiled over time.
    pub systematic_monitoring: bool,
}

impl RiskFlags {
    /// Number of flags set.
    pub fn count(&self) -> usize {
        [
            self.automated_decision_making,
            self.large_scale_processing,
            self.sensitive_data,
            self.publicly_accessible,
            self.new_technology,
            self.systematic_monitoring,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }

    /// Flags set in either `self` or `other`.
    pub fn union(&self, other: &RiskFlags) -> RiskFlags {
        RiskFlags {
            automated_decision_making: self.automated_decision_making
                || other.automated_decision_making,
            large_scale_processing: self.large_scale_processing || other.large_scale_processing,
            sensitive_data: self.sensitive_data || other.sensitive_data,
            publicly_accessible: self.publicly_accessible || other.publicly_accessible,
            new_technology: self.new_technology || other.new_technology,
            systematic_monitoring: self.systematic_monitoring || other.systematic_monitoring,
        }
    }
}

/// A tenant-owned record of processing activity (GDPR Art. 30).
///
/// Activities are never deleted; they are deactivated via `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingActivity {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub purpose: String,
    pub legal_basis: LegalBasis,
    #[serde(default)]
    pub data_categories: Vec<String>,
    #[serde(default)]
    pub data_subjects: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub third_countries: Vec<String>,
    #[serde(default)]
    pub retention_period: String,
    #[serde(default)]
    pub security_measures: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flags: RiskFlags,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl ProcessingActivity {
    /// Creates an active activity with empty lists and no risk flags.
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        purpose: impl Into<String>,
        legal_basis: LegalBasis,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            purpose: purpose.into(),
            legal_basis,
            data_categories: Vec::new(),
            data_subjects: Vec::new(),
            recipients: Vec::new(),
            third_countries: Vec::new(),
            retention_period: String::new(),
            security_measures: Vec::new(),
            description: String::new(),
            flags: RiskFlags::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the risk flags.
    pub fn with_flags(mut self, flags: RiskFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replaces the security measures.
    pub fn with_security_measures<I, S>(mut self, measures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_measures = measures.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the activity inactive. Activities are never removed.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }
}
