use dataguard_core::{ConsentPurpose, DataType, DataguardError, DataguardResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Versioned, legally mutable configuration for the compliance services.
///
/// Every section has defaults, so an empty TOML document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub dpia: DpiaConfig,
    pub consent: ConsentConfig,
    pub retention: RetentionConfig,
}

impl ComplianceConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> DataguardResult<Self> {
        toml::from_str(s).map_err(|e| DataguardError::Config(format!("Invalid config: {e}")))
    }

    /// Reads and parses a TOML file.
    pub async fn load(path: &Path) -> DataguardResult<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&data)
    }
}

/// Third-country adequacy list used by the cross-border transfer criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DpiaConfig {
    /// Identifies the adequacy list in force; stamped onto every assessment.
    pub adequacy_version: String,
    /// Country names or ISO 3166 alpha-2 codes, matched case-insensitively.
    pub adequate_countries: Vec<String>,
}

impl Default for DpiaConfig {
    fn default() -> Self {
        Self {
            adequacy_version: "eu-adequacy-2023-07".into(),
            adequate_countries: [
                "Andorra",
                "AD",
                "Argentina",
                "AR",
                "Canada",
                "CA",
                "Faroe Islands",
                "FO",
                "Guernsey",
                "GG",
                "Israel",
                "IL",
                "Isle of Man",
                "IM",
                "Japan",
                "JP",
                "Jersey",
                "JE",
                "New Zealand",
                "NZ",
                "Republic of Korea",
                "South Korea",
                "KR",
                "Switzerland",
                "CH",
                "United Kingdom",
                "UK",
                "GB",
                "Uruguay",
                "UY",
                "United States",
                "USA",
                "US",
            ]
            .iter()
            .map(|c| (*c).to_string())
            .collect(),
        }
    }
}

impl DpiaConfig {
    /// Whether transfers to `country` are covered by an adequacy decision.
    pub fn is_adequate(&self, country: &str) -> bool {
        let country = country.trim();
        self.adequate_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }
}

/// Default consent lifetime per purpose, in days. `0` means the consent never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub expiry_version: String,
    pub essential: u32,
    pub analytics: u32,
    pub marketing: u32,
    pub profiling: u32,
    pub personalization: u32,
    pub third_party: u32,
    pub cookies: u32,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            expiry_version: "2024-01".into(),
            essential: 0,
            analytics: 730,
            marketing: 730,
            profiling: 730,
            personalization: 365,
            third_party: 365,
            cookies: 365,
        }
    }
}

impl ConsentConfig {
    /// Default lifetime for `purpose`; `None` when it never expires.
    pub fn expiry_days(&self, purpose: ConsentPurpose) -> Option<u32> {
        let days = match purpose {
            ConsentPurpose::Essential => self.essential,
            ConsentPurpose::Analytics => self.analytics,
            ConsentPurpose::Marketing => self.marketing,
            ConsentPurpose::Profiling => self.profiling,
            ConsentPurpose::Personalization => self.personalization,
            ConsentPurpose::ThirdParty => self.third_party,
            ConsentPurpose::Cookies => self.cookies,
        };
        (days > 0).then_some(days)
    }
}

/// Retention defaults and sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub default_days: DefaultRetention,
    /// 7-field cron expression (sec min hour dom month dow year). The next
    /// sweep is the first fire time on or after the start of the following day.
    pub sweep_schedule: String,
    /// Rows fetched per scan page.
    pub page_size: usize,
    /// How long a sweep may hold its (tenant, data type) lease.
    pub lease_seconds: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_days: DefaultRetention::default(),
            sweep_schedule: "0 0 2 * * * *".into(),
            page_size: 500,
            lease_seconds: 3600,
        }
    }
}

/// Bootstrap retention horizon per data type, in days. `0` means never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRetention {
    pub user: u32,
    pub session: u32,
    pub audit_log: u32,
    pub consent_record: u32,
    pub form_submission: u32,
    pub notification: u32,
}

impl Default for DefaultRetention {
    fn default() -> Self {
        Self {
            user: 2555,
            session: 90,
            audit_log: 2555,
            consent_record: 1095,
            form_submission: 1095,
            notification: 365,
        }
    }
}

impl DefaultRetention {
    /// Default horizon for `data_type`; `None` when records never expire.
    pub fn days_for(&self, data_type: DataType) -> Option<u32> {
        let days = match data_type {
            DataType::User => self.user,
            DataType::Session => self.session,
            DataType::AuditLog => self.audit_log,
            DataType::ConsentRecord => self.consent_record,
            DataType::FormSubmission => self.form_submission,
            DataType::Notification => self.notification,
        };
        (days > 0).then_some(days)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ComplianceConfig::from_toml_str("").unwrap();
        assert_eq!(config.retention.page_size, 500);
        assert_eq!(config.retention.default_days.days_for(DataType::User), Some(2555));
        assert_eq!(config.retention.default_days.days_for(DataType::Session), Some(90));
        assert_eq!(config.consent.expiry_days(ConsentPurpose::Essential), None);
        assert_eq!(config.consent.expiry_days(ConsentPurpose::Marketing), Some(730));
        assert_eq!(config.consent.expiry_days(ConsentPurpose::Cookies), Some(365));
    }

    #[test]
    fn test_overrides() {
        let config = ComplianceConfig::from_toml_str(
            r#"
            [dpia]
            adequacy_version = "custom-1"
            adequate_countries = ["Norway"]

            [consent]
            marketing = 0

            [retention]
            page_size = 50
            [retention.default_days]
            session = 30
            "#,
        )
        .unwrap();
        assert!(config.dpia.is_adequate("norway"));
        assert!(!config.dpia.is_adequate("Japan"));
        assert_eq!(config.consent.expiry_days(ConsentPurpose::Marketing), None);
        assert_eq!(config.consent.expiry_days(ConsentPurpose::Analytics), Some(730));
        assert_eq!(config.retention.page_size, 50);
        assert_eq!(config.retention.default_days.days_for(DataType::Session), Some(30));
        assert_eq!(config.retention.default_days.days_for(DataType::User), Some(2555));
    }

    #[test]
    fn test_adequacy_case_insensitive() {
        let dpia = DpiaConfig::default();
        assert!(dpia.is_adequate("japan"));
        assert!(dpia.is_adequate(" CH "));
        assert!(!dpia.is_adequate("Brazil"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ComplianceConfig::from_toml_str("[retention\npage_size = ").unwrap_err();
        assert!(matches!(err, DataguardError::Config(_)));
    }
}
