//! Shared application state handed to every axum handler.

use std::sync::Arc;

use crate::auth::AuthGateway;
use crate::config::Settings;
use crate::context_injector::KnowledgeStore;
use crate::directory::UserDirectory;
use crate::keyvault::AdminKeyStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub directory: Arc<dyn UserDirectory>,
    pub key_store: Arc<dyn AdminKeyStore>,
    pub knowledge_store: Arc<dyn KnowledgeStore>,
    pub auth: Arc<AuthGateway>,
}

/// Extracts the bearer token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|s| s.trim().to_string())
}
