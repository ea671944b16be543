//! `/api/proxy/*`: the authenticated proxy surface — non-streaming
//! single-provider requests, the streaming cascade, and STT token vending.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::cascade::{self, CascadeRequest};
use crate::context_injector::{self, RetrieveOptions};
use crate::directory::Plan;
use crate::error::{GatewayError, GatewayResult};
use crate::policy::{AdmitRequest, PolicyEngine};
use crate::providers::{self, BuildRequestParams, StreamEvent};
use crate::sse::drain_sse_lines;
use crate::state::{bearer_token, AppState};
use crate::usage::{self, UsageEvent};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    pub provider: Option<String>,
    #[serde(default)]
    pub smart_mode: bool,
    pub system_prompt: String,
    pub user_message: String,
    pub screenshot: Option<String>,
    pub max_tokens: Option<u32>,
}

struct AuthorizedCaller {
    user_id: String,
    plan: Plan,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> GatewayResult<AuthorizedCaller> {
    let token = bearer_token(headers).ok_or_else(|| GatewayError::Unauthorized("missing bearer token".into()))?;
    let identity = state.auth.verify(&token)?;
    let user = state
        .directory
        .find_by_id(&identity.user_id)?
        .ok_or(GatewayError::UserNotFound)?;
    Ok(AuthorizedCaller { user_id: user.id, plan: user.plan })
}

/// `POST /api/proxy/ai/generate`: admits the request, opens exactly the
/// cascade's first entry, and buffers the full response rather than
/// streaming it — the client wants one JSON object back.
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AiRequest>,
) -> GatewayResult<impl IntoResponse> {
    let caller = authorize(&state, &headers)?;
    let daily_count = usage::count_today(&caller.user_id, "ai_request")?;

    let outcome = {
        let engine = PolicyEngine::new(&state.settings, state.key_store.as_ref());
        engine.admit(&AdmitRequest {
            plan: caller.plan,
            smart_mode: body.smart_mode,
            pinned_provider: body.provider.as_deref(),
            daily_ai_request_count: daily_count,
            requested_max_tokens: body.max_tokens,
        })?
    };

    let provider_cfg = state
        .settings
        .providers
        .get(&outcome.provider)
        .ok_or_else(|| GatewayError::ProviderNotConfigured(outcome.provider.clone()))?;
    let api_key = state
        .key_store
        .active_key(&outcome.provider)?
        .ok_or_else(|| GatewayError::ProviderNotConfigured(outcome.provider.clone()))?;
    let adapter = providers::for_provider(&outcome.provider)?;

    let params = BuildRequestParams {
        system_prompt: &body.system_prompt,
        user_message: &body.user_message,
        image_base64: body.screenshot.as_deref(),
        max_tokens: outcome.max_tokens,
        smart_mode: body.smart_mode,
    };
    let spec = adapter.build_request(&provider_cfg.base_url, &outcome.model, &api_key, &params);

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(state.settings.upstream_connect_timeout_secs))
        .build()
        .map_err(|e| GatewayError::ServerError(e.to_string()))?;

    let start = Instant::now();
    let mut builder = client.post(&spec.url);
    for (name, value) in &spec.headers {
        builder = builder.header(name, value);
    }
    let response = builder
        .json(&spec.body)
        .send()
        .await
        .map_err(|e| GatewayError::ProviderError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let preview: String = response.text().await.unwrap_or_default().chars().take(200).collect();
        return Err(GatewayError::ProviderError(format!("{status} {preview}")));
    }

    let mut byte_stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut content = String::new();
    use futures_util::StreamExt;
    loop {
        let chunk = match byte_stream.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Err(GatewayError::ProviderError(e.to_string())),
            None => break,
        };
        let mut done = false;
        for line in drain_sse_lines(&mut buffer, &chunk) {
            match adapter.parse_stream_event(&line) {
                StreamEvent::Delta(text) => content.push_str(&text),
                StreamEvent::Done => done = true,
                StreamEvent::Ignore => {}
            }
        }
        if done {
            break;
        }
    }
    let latency_ms = start.elapsed().as_millis() as u64;

    let user_id = caller.user_id.clone();
    let provider = outcome.provider.clone();
    let model = outcome.model.clone();
    let smart_mode = body.smart_mode;
    tokio::spawn(async move {
        usage::record(&UsageEvent {
            user_id: &user_id,
            action: "ai_request",
            provider: Some(&provider),
            model: Some(&model),
            prompt_tokens: 0,
            completion_tokens: 0,
            price_usd: 0.0,
        });
        if smart_mode {
            usage::record(&UsageEvent {
                user_id: &user_id,
                action: "smart_mode",
                provider: Some(&provider),
                model: Some(&model),
                prompt_tokens: 0,
                completion_tokens: 0,
                price_usd: 0.0,
            });
        }
    });

    Ok(Json(json!({
        "content": content,
        "provider": outcome.provider,
        "model": outcome.model,
        "latencyMs": latency_ms,
    })))
}

/// `POST /api/proxy/ai/stream`: admits the request, optionally injects
/// knowledge context, and hands the cascade's byte stream straight to the
/// client as SSE.
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AiRequest>,
) -> GatewayResult<Response> {
    let caller = authorize(&state, &headers)?;
    let daily_count = usage::count_today(&caller.user_id, "ai_request")?;

    let outcome = {
        let engine = PolicyEngine::new(&state.settings, state.key_store.as_ref());
        engine.admit(&AdmitRequest {
            plan: caller.plan,
            smart_mode: body.smart_mode,
            pinned_provider: body.provider.as_deref(),
            daily_ai_request_count: daily_count,
            requested_max_tokens: body.max_tokens,
        })?
    };

    let mut system_prompt = body.system_prompt.clone();
    let mut used_atom_ids: Vec<String> = Vec::new();
    if caller.plan == Plan::Enterprise {
        match state
            .knowledge_store
            .retrieve(&caller.user_id, &body.user_message, &RetrieveOptions::default())
        {
            Ok(atoms) => {
                used_atom_ids = atoms.iter().map(|a| a.id.clone()).collect();
                system_prompt = context_injector::build_system_prompt(&system_prompt, &atoms);
            }
            Err(e) => {
                crate::logger::error("context_injector", &format!("retrieval failed for user={}: {e}", caller.user_id));
            }
        }
    }

    let cascade_mode = if body.smart_mode { "smart" } else { "standard" };
    let cascade_req = CascadeRequest {
        cascade: outcome.cascade,
        system_prompt,
        user_message: body.user_message,
        image_base64: body.screenshot,
        max_tokens: outcome.max_tokens,
        smart_mode: body.smart_mode,
    };

    let user_id = caller.user_id.clone();
    let provider = outcome.provider.clone();
    let model = outcome.model.clone();
    let smart_mode = body.smart_mode;
    let knowledge_store = state.knowledge_store.clone();
    let on_done = move || {
        tokio::spawn(async move {
            usage::record(&UsageEvent {
                user_id: &user_id,
                action: "ai_request",
                provider: Some(&provider),
                model: Some(&model),
                prompt_tokens: 0,
                completion_tokens: 0,
                price_usd: 0.0,
            });
            if smart_mode {
                usage::record(&UsageEvent {
                    user_id: &user_id,
                    action: "smart_mode",
                    provider: Some(&provider),
                    model: Some(&model),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    price_usd: 0.0,
                });
            }
            if !used_atom_ids.is_empty() {
                if let Err(e) = knowledge_store.record_usage(&used_atom_ids) {
                    crate::logger::error("context_injector", &format!("record_usage failed: {e}"));
                }
            }
        });
    };

    let body_stream = cascade::run(cascade_req, state.key_store.as_ref(), &state.settings, on_done);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .header("x-cascade-mode", cascade_mode)
        .body(Body::from_stream(body_stream))
        .map_err(|e| GatewayError::ServerError(e.to_string()))?;

    Ok(response)
}

pub async fn stream_options() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct TranscriptionTokenRequest {
    pub provider: String,
}

pub async fn transcription_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TranscriptionTokenRequest>,
) -> GatewayResult<impl IntoResponse> {
    let caller = authorize(&state, &headers)?;
    let minted = crate::transcription::mint(&caller.user_id, &body.provider, state.key_store.as_ref())?;
    Ok(Json(json!({
        "token": minted.token,
        "expiresAt": minted.expires_at,
    })))
}
