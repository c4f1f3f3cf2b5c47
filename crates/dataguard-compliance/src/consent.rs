//! Append-only consent ledger.
//!
//! Every decision is a new [`ConsentRecord`]; the latest record for a
//! (user, tenant, purpose) key is the current one. A decision that flips the
//! granted state revokes every other record of the key in the same atomic
//! store write. Writers are serialized per key in-process, and the store
//! rejects an append whose expected latest record is stale.

use crate::config::ConsentConfig;
use crate::hooks::{ComplianceEvent, ComplianceHookChain};
use crate::report::percent;
use chrono::{DateTime, Duration, Utc};
use dataguard_core::{
    AuditCategory, AuditEvent, AuditSink, ConsentKey, ConsentMetadata, ConsentPurpose,
    ConsentRecord, ConsentSource, DataguardError, DataguardResult, Severity,
};
use dataguard_store::ConsentStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A consent decision to record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsent {
    pub user_id: String,
    pub tenant_id: String,
    pub purpose: ConsentPurpose,
    pub granted: bool,
    pub version: String,
    #[serde(default)]
    pub source: ConsentSource,
    #[serde(default)]
    pub metadata: ConsentMetadata,
}

impl NewConsent {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        purpose: ConsentPurpose,
        granted: bool,
        version: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            purpose,
            granted,
            version: version.into(),
            source: ConsentSource::default(),
            metadata: ConsentMetadata::default(),
        }
    }

    pub fn with_source(mut self, source: ConsentSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_metadata(mut self, metadata: ConsentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn key(&self) -> ConsentKey {
        ConsentKey::new(&self.user_id, &self.tenant_id, self.purpose)
    }
}

/// Latest-event view of one purpose for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentView {
    pub purpose: ConsentPurpose,
    pub granted: bool,
    /// Whether the consent currently permits processing (granted and unexpired).
    pub is_valid: bool,
    pub granted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: String,
    pub source: ConsentSource,
    pub needs_renewal: bool,
    pub updated_at: DateTime<Utc>,
}

impl ConsentView {
    fn from_record(record: &ConsentRecord, now: DateTime<Utc>) -> Self {
        Self {
            purpose: record.purpose,
            granted: record.granted,
            is_valid: record.is_valid_at(now),
            granted_at: record.granted_at,
            revoked_at: record.revoked_at,
            expires_at: record.expires_at,
            version: record.version.clone(),
            source: record.source,
            needs_renewal: record.expires_at.is_some_and(|e| e < now),
            updated_at: record.created_at,
        }
    }
}

/// Per-user consent overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentDashboard {
    pub user_id: String,
    pub tenant_id: String,
    pub consents: Vec<ConsentView>,
    /// Consentable purposes the user has never decided on.
    pub missing_purposes: Vec<ConsentPurpose>,
    pub active_count: usize,
    pub renewal_due: usize,
}

/// Consent metrics for one purpose, or the totals across purposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurposeStats {
    pub grants: u64,
    pub withdrawals: u64,
    pub withdrawal_rate: f64,
    pub renewals: u64,
    pub renewal_rate: f64,
    /// Mean days between grant and revocation of records revoked in range.
    pub average_lifetime_days: Option<f64>,
    /// Current records still marked granted whose expiry has passed.
    pub expired_grants: u64,
}

/// Consent activity of a tenant over a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentReport {
    pub tenant_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub by_purpose: BTreeMap<ConsentPurpose, PurposeStats>,
    pub totals: PurposeStats,
}

#[derive(Default)]
struct Tally {
    grants: u64,
    withdrawals: u64,
    renewals: u64,
    lifetime_days: Vec<f64>,
    expired_grants: u64,
}

impl Tally {
    fn absorb(&mut self, other: &Tally) {
        self.grants += other.grants;
        self.withdrawals += other.withdrawals;
        self.renewals += other.renewals;
        self.lifetime_days.extend_from_slice(&other.lifetime_days);
        self.expired_grants += other.expired_grants;
    }

    fn stats(&self) -> PurposeStats {
        let average_lifetime_days = (!self.lifetime_days.is_empty())
            .then(|| self.lifetime_days.iter().sum::<f64>() / self.lifetime_days.len() as f64);
        PurposeStats {
            grants: self.grants,
            withdrawals: self.withdrawals,
            withdrawal_rate: percent(self.withdrawals, self.grants),
            renewals: self.renewals,
            renewal_rate: percent(self.renewals, self.grants),
            average_lifetime_days,
            expired_grants: self.expired_grants,
        }
    }
}

/// A consent request as received from a client, before it is trusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub purpose: String,
    /// Must be a JSON boolean to count as an unambiguous decision.
    pub granted: serde_json::Value,
    pub version: Option<String>,
    pub source: Option<ConsentSource>,
    #[serde(default)]
    pub metadata: ConsentMetadata,
}

/// Outcome of [`validate_gdpr_consent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentValidation {
    pub is_valid: bool,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Checks a consent request against GDPR Art. 4(11) and Art. 7 without
/// touching storage. Never fails; problems are reported as violations.
pub fn validate_gdpr_consent(request: &ConsentRequest) -> ConsentValidation {
    let mut violations = Vec::new();
    let mut recommendations = Vec::new();

    match request.purpose.parse::<ConsentPurpose>() {
        Ok(ConsentPurpose::Essential) => violations.push(
            "ESSENTIAL processing cannot be made conditional on consent; rely on another legal basis"
                .to_string(),
        ),
        Ok(_) => {}
        Err(_) => violations.push(format!("Unknown consent purpose: {:?}", request.purpose)),
    }

    if request.version.as_deref().is_none_or(|v| v.trim().is_empty()) {
        violations
            .push("Consent must reference the privacy policy version it was given for".into());
    }

    match &request.granted {
        serde_json::Value::Bool(true) => {
            recommendations.push(
                "Make sure the consent was an affirmative act (no pre-ticked boxes)".into(),
            );
        }
        serde_json::Value::Bool(false) => {}
        other => violations.push(format!(
            "Consent decision must be an explicit boolean, got {other}"
        )),
    }

    let bundled = request.metadata.bundled_purpose_count();
    if bundled > 1 {
        violations.push(format!(
            "Bundled consent: {bundled} purposes collected in a single request; consent must be granular per purpose"
        ));
    }

    if request.source.is_none() {
        recommendations
            .push("Record where the consent was collected (banner, settings, API)".into());
    }
    if request.metadata.ip_address.is_none() && request.metadata.user_agent.is_none() {
        recommendations
            .push("Capture IP address or user agent as evidence of the consent (Art. 7(1))".into());
    }

    ConsentValidation {
        is_valid: violations.is_empty(),
        violations,
        recommendations,
    }
}

/// Per-key serialization. `write` covers read-latest-then-append; `emit` is
/// taken before `write` is released so toggle events leave in write order.
#[derive(Default)]
struct KeyLock {
    write: tokio::sync::Mutex<()>,
    emit: tokio::sync::Mutex<()>,
}

type KeyLocks = parking_lot::Mutex<HashMap<ConsentKey, Arc<KeyLock>>>;

/// Records and evaluates per-purpose consent.
pub struct ConsentLedger {
    store: Arc<dyn ConsentStore>,
    audit: Arc<dyn AuditSink>,
    hooks: Arc<ComplianceHookChain>,
    config: ConsentConfig,
    key_locks: KeyLocks,
}

impl ConsentLedger {
    pub fn new(
        store: Arc<dyn ConsentStore>,
        audit: Arc<dyn AuditSink>,
        hooks: Arc<ComplianceHookChain>,
        config: ConsentConfig,
    ) -> Self {
        Self {
            store,
            audit,
            hooks,
            config,
            key_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    fn key_lock(&self, key: &ConsentKey) -> Arc<KeyLock> {
        let mut locks = self.key_locks.lock();
        // Entries only the map still references are idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Appends a consent decision and returns the stored record.
    pub async fn record_consent(&self, consent: NewConsent) -> DataguardResult<ConsentRecord> {
        self.record_consent_at(consent, Utc::now()).await
    }

    /// [`record_consent`](Self::record_consent) with an explicit clock.
    pub async fn record_consent_at(
        &self,
        consent: NewConsent,
        now: DateTime<Utc>,
    ) -> DataguardResult<ConsentRecord> {
        if consent.user_id.trim().is_empty() || consent.tenant_id.trim().is_empty() {
            return Err(DataguardError::Validation(
                "consent requires a user and a tenant".into(),
            ));
        }

        let key = consent.key();
        let lock = self.key_lock(&key);
        let write_guard = lock.write.lock().await;

        let latest = self.store.latest_consent(&key).await?;
        let supersede = latest.as_ref().is_some_and(|l| l.granted != consent.granted);
        let changed = latest.as_ref().is_none_or(|l| l.granted != consent.granted);

        let expires_at = if consent.granted {
            self.config
                .expiry_days(consent.purpose)
                .map(|days| now + Duration::days(i64::from(days)))
        } else {
            None
        };

        let record = ConsentRecord {
            id: Uuid::new_v4(),
            user_id: consent.user_id,
            tenant_id: consent.tenant_id,
            purpose: consent.purpose,
            granted: consent.granted,
            granted_at: consent.granted.then_some(now),
            revoked_at: (!consent.granted).then_some(now),
            version: consent.version,
            source: consent.source,
            expires_at,
            metadata: consent.metadata,
            created_at: now,
        };

        let superseded = self
            .store
            .append_consent(record.clone(), latest.as_ref().map(|l| l.id), supersede)
            .await?;

        let action = if record.granted {
            "CONSENT_GRANTED"
        } else {
            "CONSENT_WITHDRAWN"
        };
        self.audit
            .log(
                AuditEvent::new(
                    &record.tenant_id,
                    &record.user_id,
                    action,
                    "ConsentRecord",
                    AuditCategory::Consent,
                    Severity::Info,
                )
                .with_resource_id(record.id)
                .with_details(serde_json::json!({
                    "purpose": record.purpose,
                    "version": record.version,
                    "source": record.source,
                    "superseded": superseded,
                }))
                .at(now),
            )
            .await?;

        let toggle = if changed {
            ComplianceEvent::for_consent(
                record.purpose,
                &record.user_id,
                &record.tenant_id,
                record.granted,
                now,
            )
        } else {
            None
        };
        let emit_guard = match toggle {
            Some(_) => Some(lock.emit.lock().await),
            None => None,
        };
        drop(write_guard);
        if let Some(event) = toggle {
            self.hooks.emit(event).await;
        }
        drop(emit_guard);

        info!(
            tenant_id = %record.tenant_id,
            user_id = %record.user_id,
            purpose = %record.purpose,
            granted = record.granted,
            superseded,
            "Consent recorded"
        );
        Ok(record)
    }

    /// Records several decisions for one user. Each purpose is its own ledger
    /// stream; the first failure aborts the remaining ones.
    pub async fn record_bulk_consent(
        &self,
        user_id: &str,
        tenant_id: &str,
        decisions: &[(ConsentPurpose, bool)],
        version: &str,
        source: ConsentSource,
        metadata: ConsentMetadata,
    ) -> DataguardResult<Vec<ConsentRecord>> {
        self.record_bulk_consent_at(
            user_id,
            tenant_id,
            decisions,
            version,
            source,
            metadata,
            Utc::now(),
        )
        .await
    }

    /// [`record_bulk_consent`](Self::record_bulk_consent) with an explicit clock.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_bulk_consent_at(
        &self,
        user_id: &str,
        tenant_id: &str,
        decisions: &[(ConsentPurpose, bool)],
        version: &str,
        source: ConsentSource,
        metadata: ConsentMetadata,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<ConsentRecord>> {
        let mut records = Vec::with_capacity(decisions.len());
        for (purpose, granted) in decisions {
            let consent = NewConsent::new(user_id, tenant_id, *purpose, *granted, version)
                .with_source(source)
                .with_metadata(metadata.clone());
            records.push(self.record_consent_at(consent, now).await?);
        }
        debug!(tenant_id, user_id, count = records.len(), "Bulk consent recorded");
        Ok(records)
    }

    /// Withdraws consent for a purpose. `NotFound` if the user never decided on it.
    pub async fn withdraw_consent(
        &self,
        user_id: &str,
        tenant_id: &str,
        purpose: ConsentPurpose,
    ) -> DataguardResult<ConsentRecord> {
        self.withdraw_consent_at(user_id, tenant_id, purpose, Utc::now())
            .await
    }

    /// [`withdraw_consent`](Self::withdraw_consent) with an explicit clock.
    pub async fn withdraw_consent_at(
        &self,
        user_id: &str,
        tenant_id: &str,
        purpose: ConsentPurpose,
        now: DateTime<Utc>,
    ) -> DataguardResult<ConsentRecord> {
        let key = ConsentKey::new(user_id, tenant_id, purpose);
        let latest = self
            .store
            .latest_consent(&key)
            .await?
            .ok_or_else(|| DataguardError::NotFound(format!("consent {key}")))?;
        let consent = NewConsent::new(user_id, tenant_id, purpose, false, latest.version)
            .with_source(ConsentSource::Settings);
        self.record_consent_at(consent, now).await
    }

    /// Whether the latest decision grants consent and has not expired.
    pub async fn has_valid_consent(
        &self,
        user_id: &str,
        tenant_id: &str,
        purpose: ConsentPurpose,
    ) -> DataguardResult<bool> {
        self.has_valid_consent_at(user_id, tenant_id, purpose, Utc::now())
            .await
    }

    /// [`has_valid_consent`](Self::has_valid_consent) with an explicit clock.
    pub async fn has_valid_consent_at(
        &self,
        user_id: &str,
        tenant_id: &str,
        purpose: ConsentPurpose,
        now: DateTime<Utc>,
    ) -> DataguardResult<bool> {
        let key = ConsentKey::new(user_id, tenant_id, purpose);
        Ok(self
            .store
            .latest_consent(&key)
            .await?
            .is_some_and(|r| r.is_valid_at(now)))
    }

    /// One latest-event view per purpose the user has decided on.
    pub async fn get_user_consents(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> DataguardResult<Vec<ConsentView>> {
        self.get_user_consents_at(user_id, tenant_id, Utc::now())
            .await
    }

    /// [`get_user_consents`](Self::get_user_consents) with an explicit clock.
    pub async fn get_user_consents_at(
        &self,
        user_id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<Vec<ConsentView>> {
        let history = self.store.list_consents(tenant_id, Some(user_id)).await?;
        let mut latest: BTreeMap<ConsentPurpose, &ConsentRecord> = BTreeMap::new();
        for record in &history {
            latest.insert(record.purpose, record);
        }
        Ok(latest
            .values()
            .map(|r| ConsentView::from_record(r, now))
            .collect())
    }

    pub async fn get_user_consent_dashboard(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> DataguardResult<ConsentDashboard> {
        self.get_user_consent_dashboard_at(user_id, tenant_id, Utc::now())
            .await
    }

    /// [`get_user_consent_dashboard`](Self::get_user_consent_dashboard) with an explicit clock.
    pub async fn get_user_consent_dashboard_at(
        &self,
        user_id: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<ConsentDashboard> {
        let consents = self.get_user_consents_at(user_id, tenant_id, now).await?;
        let decided: HashSet<ConsentPurpose> = consents.iter().map(|c| c.purpose).collect();
        let missing_purposes = ConsentPurpose::ALL
            .iter()
            .copied()
            .filter(|p| p.is_consentable() && !decided.contains(p))
            .collect();

        Ok(ConsentDashboard {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            active_count: consents.iter().filter(|c| c.is_valid).count(),
            renewal_due: consents.iter().filter(|c| c.needs_renewal).count(),
            missing_purposes,
            consents,
        })
    }

    /// Current records of the tenant still marked granted but past expiry.
    pub async fn count_expired_grants(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> DataguardResult<u64> {
        let records = self.store.list_consents(tenant_id, None).await?;
        Ok(latest_by_key(&records)
            .values()
            .filter(|r| r.granted && r.is_expired_at(now))
            .count() as u64)
    }

    /// Groups consent events of the tenant with a decision inside `[from, to]`.
    pub async fn generate_consent_report(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DataguardResult<ConsentReport> {
        self.generate_consent_report_at(tenant_id, from, to, Utc::now())
            .await
    }

    /// [`generate_consent_report`](Self::generate_consent_report) with an explicit clock.
    pub async fn generate_consent_report_at(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DataguardResult<ConsentReport> {
        if from > to {
            return Err(DataguardError::Validation(format!(
                "report range starts after it ends ({from} > {to})"
            )));
        }
        let mut records = self.store.list_consents(tenant_id, None).await?;
        records.sort_by_key(|r| (r.created_at, r.id));

        let in_range = |t: DateTime<Utc>| t >= from && t <= to;
        let mut tallies: BTreeMap<ConsentPurpose, Tally> = BTreeMap::new();
        let mut granted_before: HashSet<ConsentKey> = HashSet::new();

        for record in &records {
            let tally = tallies.entry(record.purpose).or_default();
            match (record.granted_at, record.revoked_at) {
                (Some(granted_at), revoked_at) => {
                    let key = record.key();
                    if in_range(granted_at) {
                        tally.grants += 1;
                        if granted_before.contains(&key) {
                            tally.renewals += 1;
                        }
                    }
                    granted_before.insert(key);
                    if let Some(revoked_at) = revoked_at.filter(|r| in_range(*r)) {
                        let secs = (revoked_at - granted_at).num_seconds().max(0);
                        tally.lifetime_days.push(secs as f64 / 86_400.0);
                    }
                }
                (None, Some(revoked_at)) if in_range(revoked_at) => tally.withdrawals += 1,
                _ => {}
            }
        }

        for record in latest_by_key(&records).values() {
            if record.granted && record.is_expired_at(now) {
                tallies.entry(record.purpose).or_default().expired_grants += 1;
            }
        }

        let mut total = Tally::default();
        for tally in tallies.values() {
            total.absorb(tally);
        }

        Ok(ConsentReport {
            tenant_id: tenant_id.to_string(),
            from,
            to,
            generated_at: now,
            by_purpose: tallies.iter().map(|(p, t)| (*p, t.stats())).collect(),
            totals: total.stats(),
        })
    }
}

fn latest_by_key(records: &[ConsentRecord]) -> HashMap<ConsentKey, &ConsentRecord> {
    let mut latest: HashMap<ConsentKey, &ConsentRecord> = HashMap::new();
    for record in records {
        latest
            .entry(record.key())
            .and_modify(|current| {
                if record.created_at >= current.created_at {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hooks::FeatureToggleHook;
    use dataguard_core::AuditFilter;
    use dataguard_store::MemoryStore;

    fn ledger() -> (ConsentLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = ConsentLedger::new(
            store.clone(),
            store.clone(),
            Arc::new(ComplianceHookChain::new()),
            ConsentConfig::default(),
        );
        (ledger, store)
    }

    fn grant(purpose: ConsentPurpose, granted: bool) -> NewConsent {
        NewConsent::new("u1", "t1", purpose, granted, "v1")
    }

    #[tokio::test]
    async fn test_grant_then_withdraw_leaves_one_current() {
        let (ledger, store) = ledger();
        let now = Utc::now();
        ledger
            .record_consent_at(grant(ConsentPurpose::Marketing, true), now)
            .await
            .unwrap();
        assert!(ledger
            .has_valid_consent_at("u1", "t1", ConsentPurpose::Marketing, now)
            .await
            .unwrap());

        ledger
            .record_consent_at(grant(ConsentPurpose::Marketing, false), now + Duration::hours(1))
            .await
            .unwrap();
        assert!(!ledger
            .has_valid_consent_at("u1", "t1", ConsentPurpose::Marketing, now + Duration::hours(2))
            .await
            .unwrap());

        let history = store
            .consent_history(&ConsentKey::new("u1", "t1", ConsentPurpose::Marketing))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|r| r.granted).count(), 0);
        assert!(history[0].revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_expiry_defaults_per_purpose() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        let essential = ledger
            .record_consent_at(grant(ConsentPurpose::Essential, true), now)
            .await
            .unwrap();
        assert!(essential.expires_at.is_none());

        let analytics = ledger
            .record_consent_at(grant(ConsentPurpose::Analytics, true), now)
            .await
            .unwrap();
        assert_eq!(analytics.expires_at, Some(now + Duration::days(730)));

        let cookies = ledger
            .record_consent_at(grant(ConsentPurpose::Cookies, true), now)
            .await
            .unwrap();
        assert_eq!(cookies.expires_at, Some(now + Duration::days(365)));
    }

    #[tokio::test]
    async fn test_expired_grant_is_not_valid() {
        let (ledger, _) = ledger();
        let long_ago = Utc::now() - Duration::days(800);
        ledger
            .record_consent_at(grant(ConsentPurpose::Analytics, true), long_ago)
            .await
            .unwrap();
        assert!(!ledger
            .has_valid_consent("u1", "t1", ConsentPurpose::Analytics)
            .await
            .unwrap());
        assert_eq!(
            ledger.count_expired_grants("t1", Utc::now()).await.unwrap(),
            1
        );

        let views = ledger.get_user_consents("u1", "t1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].needs_renewal);
        assert!(!views[0].is_valid);
    }

    #[tokio::test]
    async fn test_withdraw_without_history_is_not_found() {
        let (ledger, _) = ledger();
        let err = ledger
            .withdraw_consent("u1", "t1", ConsentPurpose::Profiling)
            .await
            .unwrap_err();
        assert!(matches!(err, DataguardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_withdraw_keeps_policy_version() {
        let (ledger, _) = ledger();
        ledger
            .record_consent(grant(ConsentPurpose::Profiling, true))
            .await
            .unwrap();
        let record = ledger
            .withdraw_consent("u1", "t1", ConsentPurpose::Profiling)
            .await
            .unwrap();
        assert!(!record.granted);
        assert_eq!(record.version, "v1");
        assert_eq!(record.source, ConsentSource::Settings);
    }

    #[tokio::test]
    async fn test_audit_action_names() {
        let (ledger, store) = ledger();
        ledger
            .record_consent(grant(ConsentPurpose::Marketing, true))
            .await
            .unwrap();
        ledger
            .withdraw_consent("u1", "t1", ConsentPurpose::Marketing)
            .await
            .unwrap();
        let logs = store.get_logs(&AuditFilter::tenant("t1")).await.unwrap();
        let actions: Vec<&str> = logs.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["CONSENT_WITHDRAWN", "CONSENT_GRANTED"]);
    }

    #[tokio::test]
    async fn test_toggle_hooks_fire_on_change_only() {
        let store = Arc::new(MemoryStore::new());
        let toggles = Arc::new(FeatureToggleHook::new());
        let mut chain = ComplianceHookChain::new();
        chain.add(toggles.clone());
        let ledger = ConsentLedger::new(
            store.clone(),
            store,
            Arc::new(chain),
            ConsentConfig::default(),
        );

        ledger
            .record_consent(grant(ConsentPurpose::Analytics, true))
            .await
            .unwrap();
        assert_eq!(
            toggles.is_enabled("t1", "u1", ConsentPurpose::Analytics),
            Some(true)
        );
        ledger
            .record_consent(grant(ConsentPurpose::Analytics, false))
            .await
            .unwrap();
        assert_eq!(
            toggles.is_enabled("t1", "u1", ConsentPurpose::Analytics),
            Some(false)
        );
        ledger
            .record_consent(grant(ConsentPurpose::Profiling, true))
            .await
            .unwrap();
        assert_eq!(toggles.toggle_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes_keep_one_current() {
        let (ledger, store) = ledger();
        let ledger = Arc::new(ledger);
        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_consent(grant(ConsentPurpose::Marketing, i % 2 == 0))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let history = store
            .consent_history(&ConsentKey::new("u1", "t1", ConsentPurpose::Marketing))
            .await
            .unwrap();
        assert_eq!(history.len(), 16);
        // Nothing before the last withdrawal may still be granted.
        let last_withdrawal = history.iter().rposition(|r| r.granted_at.is_none()).unwrap();
        assert!(history[..last_withdrawal].iter().all(|r| !r.granted));
    }

    #[tokio::test]
    async fn test_dashboard_lists_missing_purposes() {
        let (ledger, _) = ledger();
        ledger
            .record_bulk_consent(
                "u1",
                "t1",
                &[
                    (ConsentPurpose::Analytics, true),
                    (ConsentPurpose::Marketing, false),
                ],
                "v2",
                ConsentSource::Banner,
                ConsentMetadata::default(),
            )
            .await
            .unwrap();
        let dashboard = ledger.get_user_consent_dashboard("u1", "t1").await.unwrap();
        assert_eq!(dashboard.consents.len(), 2);
        assert_eq!(dashboard.active_count, 1);
        assert!(!dashboard.missing_purposes.contains(&ConsentPurpose::Essential));
        assert!(!dashboard.missing_purposes.contains(&ConsentPurpose::Analytics));
        assert!(dashboard.missing_purposes.contains(&ConsentPurpose::Cookies));
        assert_eq!(dashboard.missing_purposes.len(), 4);
    }

    #[tokio::test]
    async fn test_report_rates() {
        let (ledger, _) = ledger();
        let start = Utc::now() - Duration::days(60);
        for (i, user) in ["a", "b", "c", "d"].iter().enumerate() {
            ledger
                .record_consent_at(
                    NewConsent::new(*user, "t1", ConsentPurpose::Marketing, true, "v1"),
                    start + Duration::days(i as i64),
                )
                .await
                .unwrap();
        }
        // One withdrawal after ten days of consent.
        ledger
            .withdraw_consent_at("a", "t1", ConsentPurpose::Marketing, start + Duration::days(10))
            .await
            .unwrap();
        // One renewal for b.
        ledger
            .record_consent_at(
                NewConsent::new("b", "t1", ConsentPurpose::Marketing, true, "v2"),
                start + Duration::days(20),
            )
            .await
            .unwrap();

        let report = ledger
            .generate_consent_report("t1", start - Duration::days(1), Utc::now())
            .await
            .unwrap();
        let marketing = &report.by_purpose[&ConsentPurpose::Marketing];
        assert_eq!(marketing.grants, 5);
        assert_eq!(marketing.withdrawals, 1);
        assert_eq!(marketing.withdrawal_rate, 20.0);
        assert_eq!(marketing.renewals, 1);
        assert_eq!(marketing.renewal_rate, 20.0);
        assert_eq!(marketing.average_lifetime_days, Some(10.0));
        assert_eq!(report.totals.grants, 5);
    }

    #[tokio::test]
    async fn test_report_rejects_inverted_range() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        let err = ledger
            .generate_consent_report("t1", now, now - Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DataguardError::Validation(_)));
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        let result = validate_gdpr_consent(&ConsentRequest {
            purpose: "marketing".into(),
            granted: serde_json::Value::Bool(false),
            version: Some("2024-01".into()),
            source: Some(ConsentSource::Banner),
            metadata: ConsentMetadata {
                ip_address: Some("203.0.113.7".into()),
                ..Default::default()
            },
        });
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let mut metadata = ConsentMetadata::default();
        metadata.extra.insert("purpose_marketing".into(), "yes".into());
        metadata.extra.insert("purpose_analytics".into(), "yes".into());
        let result = validate_gdpr_consent(&ConsentRequest {
            purpose: "ESSENTIAL".into(),
            granted: serde_json::json!("yes"),
            version: None,
            source: None,
            metadata,
        });
        assert!(!result.is_valid);
        assert_eq!(result.violations.len(), 4);
        assert!(result.violations.iter().any(|v| v.starts_with("Bundled consent")));
        assert!(!result.recommendations.is_empty());
    }

    #[test]
    fn test_validate_unknown_purpose() {
        let result = validate_gdpr_consent(&ConsentRequest {
            purpose: "telepathy".into(),
            granted: serde_json::Value::Bool(true),
            version: Some("v1".into()),
            ..Default::default()
        });
        assert!(!result.is_valid);
        assert!(result.violations[0].contains("Unknown consent purpose"));
    }

    /// Hook that parks inside `on_event` until released.
    #[derive(Default)]
    struct GateHook {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl crate::hooks::ComplianceHook for GateHook {
        async fn on_event(&self, _event: &ComplianceEvent) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[tokio::test]
    async fn test_slow_hook_does_not_block_writers_of_the_same_key() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(GateHook::default());
        let mut hooks = ComplianceHookChain::new();
        hooks.add(gate.clone());
        let ledger = Arc::new(ConsentLedger::new(
            store.clone(),
            store.clone(),
            Arc::new(hooks),
            ConsentConfig::default(),
        ));

        let first = tokio::spawn({
            let ledger = ledger.clone();
            async move {
                ledger
                    .record_consent(grant(ConsentPurpose::Analytics, true))
                    .await
            }
        });
        gate.entered.notified().await;

        // The first write's hook is still parked; a repeated decision on the
        // same key appends without waiting for it.
        let repeat = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            ledger.record_consent(grant(ConsentPurpose::Analytics, true)),
        )
        .await
        .expect("writer blocked behind hook")
        .unwrap();
        assert!(repeat.granted);

        gate.release.notify_one();
        first.await.unwrap().unwrap();
        let key = ConsentKey::new("u1", "t1", ConsentPurpose::Analytics);
        assert_eq!(store.consent_history(&key).await.unwrap().len(), 2);
    }
}
