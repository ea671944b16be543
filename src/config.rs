//! Layered TOML settings with self-healing defaults, the same load/save
//! idiom the inherited codebase uses: read if present, fill in anything
//! missing or malformed, persist the healed copy.

use dirs::data_dir;
use std::{collections::HashMap, fs, path::PathBuf};

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Settings {
    pub cors_allowed_origins: Vec<String>,
    pub providers: HashMap<String, ProviderConfig>,
    pub plans: HashMap<String, PlanLimits>,
    /// `(plan, mode)` -> ordered cascade of `(provider, modelId)`.
    pub model_catalog: HashMap<String, Vec<CatalogEntry>>,
    pub bind_addr: String,
    pub upstream_connect_timeout_secs: u64,
    pub upstream_idle_read_timeout_secs: u64,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PlanLimits {
    /// `None` means unlimited.
    pub daily_ai_requests: Option<u32>,
    pub max_tokens: u32,
    pub smart_mode_allowed: bool,
    pub device_limit: Option<u32>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            daily_ai_requests: Some(50),
            max_tokens: 1024,
            smart_mode_allowed: false,
            device_limit: Some(3),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
pub struct CatalogEntry {
    pub provider: String,
    pub model_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cors_allowed_origins: vec!["http://localhost".to_string()],
            providers: default_providers(),
            plans: default_plans(),
            model_catalog: default_catalog(),
            bind_addr: "0.0.0.0:8787".to_string(),
            upstream_connect_timeout_secs: 10,
            upstream_idle_read_timeout_secs: 60,
        }
    }
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut m = HashMap::new();
    m.insert(
        "openai".to_string(),
        ProviderConfig { base_url: "https://api.openai.com/v1/chat/completions".to_string() },
    );
    m.insert(
        "grok".to_string(),
        ProviderConfig { base_url: "https://api.x.ai/v1/chat/completions".to_string() },
    );
    m.insert(
        "anthropic".to_string(),
        ProviderConfig { base_url: "https://api.anthropic.com/v1/messages".to_string() },
    );
    m.insert(
        "gemini".to_string(),
        ProviderConfig {
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        },
    );
    m
}

fn default_plans() -> HashMap<String, PlanLimits> {
    let mut m = HashMap::new();
    m.insert(
        "free".to_string(),
        PlanLimits { daily_ai_requests: Some(50), max_tokens: 1024, smart_mode_allowed: false, device_limit: Some(1) },
    );
    m.insert(
        "pro".to_string(),
        PlanLimits { daily_ai_requests: None, max_tokens: 2048, smart_mode_allowed: false, device_limit: Some(3) },
    );
    m.insert(
        "enterprise".to_string(),
        PlanLimits { daily_ai_requests: None, max_tokens: 4096, smart_mode_allowed: true, device_limit: Some(10) },
    );
    m
}

fn default_catalog() -> HashMap<String, Vec<CatalogEntry>> {
    let mut m = HashMap::new();
    m.insert(
        "standard".to_string(),
        vec![
            CatalogEntry { provider: "openai".to_string(), model_id: "gpt-4.1".to_string() },
            CatalogEntry { provider: "anthropic".to_string(), model_id: "claude-3-5-sonnet-20241022".to_string() },
            CatalogEntry { provider: "gemini".to_string(), model_id: "gemini-1.5-pro".to_string() },
            CatalogEntry { provider: "grok".to_string(), model_id: "grok-2-latest".to_string() },
        ],
    );
    m.insert(
        "smart".to_string(),
        vec![
            CatalogEntry { provider: "anthropic".to_string(), model_id: "claude-3-7-sonnet-20250219".to_string() },
            CatalogEntry { provider: "openai".to_string(), model_id: "o1-preview".to_string() },
            CatalogEntry { provider: "gemini".to_string(), model_id: "gemini-1.5-pro".to_string() },
        ],
    );
    m
}

fn settings_path() -> PathBuf {
    if let Ok(p) = std::env::var("RELAY_GATEWAY_CONFIG_PATH") {
        return PathBuf::from(p);
    }
    let mut p = data_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("relay-gateway");
    fs::create_dir_all(&p).ok();
    p.push("settings.toml");
    p
}

pub fn load() -> Settings {
    let p = settings_path();
    let mut cfg = if p.exists() {
        let s = fs::read_to_string(&p).unwrap_or_default();
        toml::from_str(&s).unwrap_or_else(|e| {
            crate::logger::error("config", &format!("failed to parse settings.toml: {e}, using defaults"));
            Settings::default()
        })
    } else {
        Settings::default()
    };

    let mut changed = false;
    if cfg.providers.is_empty() {
        cfg.providers = default_providers();
        changed = true;
    }
    if cfg.plans.is_empty() {
        cfg.plans = default_plans();
        changed = true;
    }
    if cfg.model_catalog.is_empty() {
        cfg.model_catalog = default_catalog();
        changed = true;
    }
    if cfg.cors_allowed_origins.is_empty() {
        cfg.cors_allowed_origins = vec!["http://localhost".to_string()];
        changed = true;
    }

    if changed {
        let _ = save(&cfg);
    }
    cfg
}

pub fn save(cfg: &Settings) -> Result<(), String> {
    let p = settings_path();
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config directory: {e}"))?;
    }
    let s = toml::to_string_pretty(cfg).map_err(|e| format!("failed to serialize settings: {e}"))?;
    fs::write(&p, &s).map_err(|e| format!("failed to write {p:?}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plans_match_documented_table() {
        let plans = default_plans();
        assert_eq!(plans["free"].daily_ai_requests, Some(50));
        assert_eq!(plans["pro"].max_tokens, 2048);
        assert!(plans["enterprise"].smart_mode_allowed);
        assert!(!plans["free"].smart_mode_allowed);
    }

    #[test]
    fn unknown_plan_falls_back_to_default_limits() {
        let plans = default_plans();
        assert!(!plans.contains_key("nonexistent"));
    }
}
