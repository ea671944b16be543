//! `POST /api/license/validate`: returns the caller's plan and today's usage
//! against it, so the client can show remaining quota without guessing.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::error::{GatewayError, GatewayResult};
use crate::state::{bearer_token, AppState};
use crate::usage;

pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> GatewayResult<impl IntoResponse> {
    let token = bearer_token(&headers).ok_or_else(|| GatewayError::Unauthorized("missing bearer token".into()))?;
    let identity = state.auth.verify(&token)?;
    let user = state
        .directory
        .find_by_id(&identity.user_id)?
        .ok_or(GatewayError::UserNotFound)?;

    let limits = state.settings.plans.get(user.plan.as_str()).cloned().unwrap_or_default();
    let used_today = usage::count_today(&user.id, "ai_request")?;

    Ok(Json(json!({
        "plan": user.plan,
        "dailyLimit": limits.daily_ai_requests,
        "dailyUsed": used_today,
        "maxTokens": limits.max_tokens,
        "smartModeAllowed": limits.smart_mode_allowed,
    })))
}
