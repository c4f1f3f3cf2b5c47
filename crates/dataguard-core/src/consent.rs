use crate::{DataguardError, DataguardResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// A category of processing for which consent is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentPurpose {
    /// Strictly necessary processing; never consent-gated.
    Essential,
    Analytics,
    Marketing,
    Personalization,
    ThirdParty,
    Profiling,
    Cookies,
}

impl ConsentPurpose {
    /// Every purpose, in declaration order.
    pub const ALL: [ConsentPurpose; 7] = [
        ConsentPurpose::Essential,
        ConsentPurpose::Analytics,
        ConsentPurpose::Marketing,
        ConsentPurpose::Personalization,
        ConsentPurpose::ThirdParty,
        ConsentPurpose::Profiling,
        ConsentPurpose::Cookies,
    ];

    /// The canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentPurpose::Essential => "ESSENTIAL",
            ConsentPurpose::Analytics => "ANALYTICS",
            ConsentPurpose::Marketing => "MARKETING",
            ConsentPurpose::Personalization => "PERSONALIZATION",
            ConsentPurpose::ThirdParty => "THIRD_PARTY",
            ConsentPurpose::Profiling => "PROFILING",
            ConsentPurpose::Cookies => "COOKIES",
        }
    }

    /// Whether processing for this purpose may be gated on consent at all.
    pub fn is_consentable(&self) -> bool {
        !matches!(self, ConsentPurpose::Essential)
    }
}

impl std::fmt::Display for ConsentPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentPurpose {
    type Err = DataguardError;

    fn from_str(s: &str) -> DataguardResult<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ConsentPurpose::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| DataguardError::Validation(format!("unknown consent purpose '{s}'")))
    }
}

/// Where a consent decision was captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentSource {
    Banner,
    #[default]
    Settings,
    Registration,
    Api,
    Import,
    Admin,
}

/// Evidence captured alongside a consent decision.
///
/// `extra` keys prefixed with `purpose_` describe the purposes presented to the
/// subject in the same interaction; more than one signals bundled consent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ConsentMetadata {
    /// Number of `purpose_*` keys in `extra`.
    pub fn bundled_purpose_count(&self) -> usize {
        self.extra.keys().filter(|k| k.starts_with("purpose_")).count()
    }

    /// Whether all identifying evidence has already been removed.
    pub fn is_redacted(&self) -> bool {
        self.ip_address.is_none()
            && self.user_agent.is_none()
            && self.locale.is_none()
            && self.extra.is_empty()
    }

    /// Removes network, user-agent and free-form evidence.
    pub fn redact(&mut self) {
        *self = ConsentMetadata::default();
    }
}

/// Identity of a consent ledger stream: one user, one tenant, one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsentKey {
    pub user_id: String,
    pub tenant_id: String,
    pub purpose: ConsentPurpose,
}

impl ConsentKey {
    /// Builds a key.
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        purpose: ConsentPurpose,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            purpose,
        }
    }
}

impl std::fmt::Display for ConsentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.user_id, self.purpose)
    }
}

/// One append-only consent event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub purpose: ConsentPurpose,
    pub granted: bool,
    pub granted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub version: String,
    #[serde(default)]
    pub source: ConsentSource,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: ConsentMetadata,
    pub created_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// The ledger stream this event belongs to.
    pub fn key(&self) -> ConsentKey {
        ConsentKey::new(&self.user_id, &self.tenant_id, self.purpose)
    }

    /// Whether this event, read as the current one, grants consent at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.granted && self.expires_at.is_none_or(|e| e > now)
    }

    /// Whether the grant has lapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e < now)
    }

    /// Marks the event as superseded by a later decision.
    pub fn mark_revoked(&mut self, at: DateTime<Utc>) {
        self.granted = false;
        if self.revoked_at.is_none() {
            self.revoked_at = Some(at);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(granted: bool, expires_at: Option<DateTime<Utc>>) -> ConsentRecord {
        let now = Utc::now();
        ConsentRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            tenant_id: "t1".into(),
            purpose: ConsentPurpose::Analytics,
            granted,
            granted_at: granted.then_some(now),
            revoked_at: (!granted).then_some(now),
            version: "1.0".into(),
            source: ConsentSource::Banner,
            expires_at,
            metadata: ConsentMetadata::default(),
            created_at: now,
        }
    }

    #[test]
    fn test_purpose_from_str() {
        assert_eq!(
            "analytics".parse::<ConsentPurpose>().unwrap(),
            ConsentPurpose::Analytics
        );
        assert_eq!(
            "third-party".parse::<ConsentPurpose>().unwrap(),
            ConsentPurpose::ThirdParty
        );
        assert!("telemetry".parse::<ConsentPurpose>().is_err());
        assert!(!ConsentPurpose::Essential.is_consentable());
    }

    #[test]
    fn test_validity_and_expiry() {
        let now = Utc::now();
        assert!(record(true, None).is_valid_at(now));
        assert!(record(true, Some(now + Duration::days(1))).is_valid_at(now));
        let lapsed = record(true, Some(now - Duration::days(1)));
        assert!(!lapsed.is_valid_at(now));
        assert!(lapsed.is_expired_at(now));
        assert!(!record(false, None).is_valid_at(now));
    }

    #[test]
    fn test_mark_revoked_keeps_first_revocation() {
        let mut r = record(false, None);
        let first = r.revoked_at;
        r.mark_revoked(Utc::now() + Duration::days(3));
        assert_eq!(r.revoked_at, first);

        let mut g = record(true, None);
        g.mark_revoked(Utc::now());
        assert!(!g.granted);
        assert!(g.revoked_at.is_some());
        assert!(g.granted_at.is_some());
    }

    #[test]
    fn test_metadata_redaction() {
        let mut meta = ConsentMetadata {
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("Mozilla/5.0".into()),
            ..Default::default()
        };
        meta.extra.insert("purpose_analytics".into(), "true".into());
        meta.extra.insert("purpose_marketing".into(), "true".into());
        assert_eq!(meta.bundled_purpose_count(), 2);
        assert!(!meta.is_redacted());
        meta.redact();
        assert!(meta.is_redacted());
    }
}
