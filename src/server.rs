//! Router assembly and the standalone `serve()` entry point, in the same
//! shape the inherited binary builds and runs its axum app.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::AuthGateway;
use crate::config::Settings;
use crate::context_injector::LexicalKnowledgeStore;
use crate::directory::SqliteUserDirectory;
use crate::keyvault::SqliteAdminKeyStore;
use crate::routes;
use crate::state::AppState;

pub fn build_state(settings: Settings) -> AppState {
    let directory: Arc<dyn crate::directory::UserDirectory> = Arc::new(SqliteUserDirectory::new());
    let key_store: Arc<dyn crate::keyvault::AdminKeyStore> = Arc::new(SqliteAdminKeyStore::new());
    let knowledge_store: Arc<dyn crate::context_injector::KnowledgeStore> =
        Arc::new(LexicalKnowledgeStore::new());
    let auth = Arc::new(AuthGateway::new(directory.clone()));

    AppState {
        settings: Arc::new(settings),
        directory,
        key_store,
        knowledge_store,
        auth,
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_allowed_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/auth/device/code", post(routes::auth::device_code))
        .route("/api/auth/device/poll", post(routes::auth::device_poll))
        .route("/api/auth/macos/login", post(routes::auth::login))
        .route("/api/auth/macos/register", post(routes::auth::register))
        .route("/api/auth/macos/refresh", post(routes::auth::refresh))
        .route("/api/auth/macos/logout", post(routes::auth::logout))
        .route("/api/license/validate", post(routes::license::validate))
        .route("/api/proxy/ai/generate", post(routes::proxy::generate))
        .route(
            "/api/proxy/ai/stream",
            post(routes::proxy::stream).options(routes::proxy::stream_options),
        )
        .route("/api/proxy/transcription/token", post(routes::proxy::transcription_token))
        .layer(cors)
        .with_state(state)
}

pub async fn serve() {
    crate::db::init();
    let settings = crate::config::load();
    let bind_addr = settings.bind_addr.clone();
    let state = build_state(settings);
    let router = app(state);

    let addr: SocketAddr = bind_addr.parse().unwrap_or_else(|_| "0.0.0.0:8787".parse().unwrap());
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    crate::logger::info("server", &format!("listening on {addr}"));
    axum::serve(listener, router).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_ok() {
        crate::secrets::init_for_test();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = build_state(Settings::default());
        let router = app(state);
        let handle = tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], true);
        drop(handle);
    }
}
