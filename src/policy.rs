//! `PolicyEngine::admit`: the single entry point every endpoint routes
//! admission through, evaluating the ordered rules from the component
//! design in the ordered sequence the spec requires — first failure
//! short-circuits the rest.
//!
//! Mirrors the single-entry-point admission shape of the inherited
//! request-limiting code, but is plan-tier-driven rather than RPM/budget
//! driven: that code's `LimitGuard`/`check_and_acquire` shape is the
//! grounding for "one function gates everything", not its literal fields.

use crate::config::Settings;
use crate::directory::Plan;
use crate::error::{GatewayError, GatewayResult};
use crate::keyvault::AdminKeyStore;

pub struct AdmitRequest<'a> {
    pub plan: Plan,
    pub smart_mode: bool,
    pub pinned_provider: Option<&'a str>,
    pub daily_ai_request_count: u32,
    pub requested_max_tokens: Option<u32>,
}

pub struct AdmitOutcome {
    pub model: String,
    pub provider: String,
    pub max_tokens: u32,
    /// Full ordered cascade for the streaming endpoint, filtered to
    /// providers with an active admin key.
    pub cascade: Vec<(String, String)>,
}

pub struct PolicyEngine<'a> {
    settings: &'a Settings,
    key_store: &'a dyn AdminKeyStore,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(settings: &'a Settings, key_store: &'a dyn AdminKeyStore) -> Self {
        Self { settings, key_store }
    }

    pub fn admit(&self, req: &AdmitRequest) -> GatewayResult<AdmitOutcome> {
        // Rule 1: unknown plans coerce to `free` at the directory layer
        // already (Plan::from_str); a known Plan variant is guaranteed here.
        let plan_key = req.plan.as_str();
        let limits = self
            .settings
            .plans
            .get(plan_key)
            .cloned()
            .unwrap_or_default();

        // Rule 2
        if req.smart_mode && !limits.smart_mode_allowed {
            return Err(GatewayError::SmartModeNotAvailable);
        }

        // Rule 3
        if let Some(daily_limit) = limits.daily_ai_requests {
            if req.daily_ai_request_count >= daily_limit {
                return Err(GatewayError::DailyLimitReached);
            }
        }

        let active_providers = self.key_store.active_providers()?;

        // Rule 4
        if let Some(pinned) = req.pinned_provider {
            if !active_providers.iter().any(|p| p == pinned) {
                return Err(GatewayError::ProviderNotConfigured(pinned.to_string()));
            }
        }

        let mode = if req.smart_mode { "smart" } else { "standard" };
        let catalog = self
            .settings
            .model_catalog
            .get(mode)
            .cloned()
            .unwrap_or_default();

        // Rule 5
        let chosen = if let Some(pinned) = req.pinned_provider {
            catalog.iter().find(|e| e.provider == pinned)
        } else {
            catalog.first()
        }
        .ok_or_else(|| GatewayError::UnsupportedModel(mode.to_string()))?;

        // Rule 6
        let max_tokens = req
            .requested_max_tokens
            .map(|t| t.min(limits.max_tokens))
            .unwrap_or(limits.max_tokens);

        // Rule 7
        let cascade: Vec<(String, String)> = catalog
            .into_iter()
            .filter(|e| active_providers.iter().any(|p| p == &e.provider))
            .map(|e| (e.provider, e.model_id))
            .collect();
        if cascade.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        Ok(AdmitOutcome {
            model: chosen.model_id.clone(),
            provider: chosen.provider.clone(),
            max_tokens,
            cascade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvault::AdminKeyStore;

    struct FakeKeyStore(Vec<String>);
    impl AdminKeyStore for FakeKeyStore {
        fn active_key(&self, provider: &str) -> GatewayResult<Option<String>> {
            Ok(self.0.iter().find(|p| *p == provider).map(|_| "key".to_string()))
        }
        fn active_providers(&self) -> GatewayResult<Vec<String>> {
            Ok(self.0.clone())
        }
        fn set_key(&self, _provider: &str, _plaintext: &str) -> GatewayResult<()> {
            Ok(())
        }
        fn invalidate(&self, _provider: &str) {}
    }

    #[test]
    fn smart_mode_denied_for_free_plan() {
        let settings = Settings::default();
        let store = FakeKeyStore(vec!["openai".to_string()]);
        let engine = PolicyEngine::new(&settings, &store);
        let req = AdmitRequest {
            plan: Plan::Free,
            smart_mode: true,
            pinned_provider: None,
            daily_ai_request_count: 0,
            requested_max_tokens: None,
        };
        assert!(matches!(engine.admit(&req), Err(GatewayError::SmartModeNotAvailable)));
    }

    #[test]
    fn daily_limit_enforced_for_free_plan() {
        let settings = Settings::default();
        let store = FakeKeyStore(vec!["openai".to_string()]);
        let engine = PolicyEngine::new(&settings, &store);
        let req = AdmitRequest {
            plan: Plan::Free,
            smart_mode: false,
            pinned_provider: None,
            daily_ai_request_count: 50,
            requested_max_tokens: None,
        };
        assert!(matches!(engine.admit(&req), Err(GatewayError::DailyLimitReached)));
    }

    #[test]
    fn no_providers_configured_yields_no_providers_error() {
        let settings = Settings::default();
        let store = FakeKeyStore(vec![]);
        let engine = PolicyEngine::new(&settings, &store);
        let req = AdmitRequest {
            plan: Plan::Pro,
            smart_mode: false,
            pinned_provider: None,
            daily_ai_request_count: 0,
            requested_max_tokens: None,
        };
        assert!(matches!(engine.admit(&req), Err(GatewayError::NoProviders)));
    }
}
