use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataguard_core::ConsentPurpose;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Feature toggles driven by consent changes. Other subsystems subscribe to
/// these to switch tracking, campaigns or personalization on and off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComplianceEvent {
    AnalyticsToggled {
        user_id: String,
        tenant_id: String,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
    MarketingToggled {
        user_id: String,
        tenant_id: String,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
    PersonalizationToggled {
        user_id: String,
        tenant_id: String,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
    CookiesToggled {
        user_id: String,
        tenant_id: String,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ComplianceEvent {
    /// The toggle event for a consent change, if the purpose drives one.
    pub fn for_consent(
        purpose: ConsentPurpose,
        user_id: &str,
        tenant_id: &str,
        enabled: bool,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let user_id = user_id.to_string();
        let tenant_id = tenant_id.to_string();
        match purpose {
            ConsentPurpose::Analytics => Some(Self::AnalyticsToggled {
                user_id,
                tenant_id,
                enabled,
                timestamp,
            }),
            ConsentPurpose::Marketing => Some(Self::MarketingToggled {
                user_id,
                tenant_id,
                enabled,
                timestamp,
            }),
            ConsentPurpose::Personalization => Some(Self::PersonalizationToggled {
                user_id,
                tenant_id,
                enabled,
                timestamp,
            }),
            ConsentPurpose::Cookies => Some(Self::CookiesToggled {
                user_id,
                tenant_id,
                enabled,
                timestamp,
            }),
            _ => None,
        }
    }

    /// The consent purpose that drove this toggle.
    pub fn purpose(&self) -> ConsentPurpose {
        match self {
            Self::AnalyticsToggled { .. } => ConsentPurpose::Analytics,
            Self::MarketingToggled { .. } => ConsentPurpose::Marketing,
            Self::PersonalizationToggled { .. } => ConsentPurpose::Personalization,
            Self::CookiesToggled { .. } => ConsentPurpose::Cookies,
        }
    }

    fn parts(&self) -> (&str, &str, bool) {
        match self {
            Self::AnalyticsToggled {
                user_id,
                tenant_id,
                enabled,
                ..
            }
            | Self::MarketingToggled {
                user_id,
                tenant_id,
                enabled,
                ..
            }
            | Self::PersonalizationToggled {
                user_id,
                tenant_id,
                enabled,
                ..
            }
            | Self::CookiesToggled {
                user_id,
                tenant_id,
                enabled,
                ..
            } => (user_id, tenant_id, *enabled),
        }
    }
}

/// Receiver of consent-driven toggle events.
///
/// Delivery is fire-and-forget: a hook cannot fail the consent write that
/// triggered it.
#[async_trait]
pub trait ComplianceHook: Send + Sync {
    async fn on_event(&self, event: &ComplianceEvent);
}

/// Composite hook that dispatches events to multiple hooks.
pub struct ComplianceHookChain {
    hooks: Vec<Arc<dyn ComplianceHook>>,
}

impl ComplianceHookChain {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the chain.
    pub fn add(&mut self, hook: Arc<dyn ComplianceHook>) {
        self.hooks.push(hook);
    }

    /// Emit an event to all hooks in the chain.
    pub async fn emit(&self, event: ComplianceEvent) {
        debug!(purpose = %event.purpose(), hooks = self.hooks.len(), "Dispatching consent toggle");
        for hook in &self.hooks {
            hook.on_event(&event).await;
        }
    }

    /// Get the number of hooks in the chain.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl Default for ComplianceHookChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook that keeps the current toggle state per (tenant, user, purpose), for
/// subsystems that poll rather than subscribe.
#[derive(Default)]
pub struct FeatureToggleHook {
    toggles: RwLock<HashMap<(String, String, ConsentPurpose), bool>>,
}

impl FeatureToggleHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current toggle, `None` if no change was ever observed.
    pub fn is_enabled(
        &self,
        tenant_id: &str,
        user_id: &str,
        purpose: ConsentPurpose,
    ) -> Option<bool> {
        self.toggles
            .read()
            .get(&(tenant_id.to_string(), user_id.to_string(), purpose))
            .copied()
    }

    pub fn toggle_count(&self) -> usize {
        self.toggles.read().len()
    }
}

#[async_trait]
impl ComplianceHook for FeatureToggleHook {
    async fn on_event(&self, event: &ComplianceEvent) {
        let (user_id, tenant_id, enabled) = event.parts();
        self.toggles.write().insert(
            (tenant_id.to_string(), user_id.to_string(), event.purpose()),
            enabled,
        );
    }
}
