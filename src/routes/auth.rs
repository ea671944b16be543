//! `/api/auth/*`: device-code flow and credential login/register/refresh/logout.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::auth::gateway::PollResult;
use crate::error::{GatewayError, GatewayResult};
use crate::state::{bearer_token, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCodeRequest {
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
}

pub async fn device_code(
    State(state): State<AppState>,
    Json(body): Json<DeviceCodeRequest>,
) -> GatewayResult<impl IntoResponse> {
    let resp = state.auth.request_device_code(&body.device_id, &body.device_name, &body.platform)?;
    Ok(Json(json!({
        "userCode": resp.user_code,
        "deviceCode": resp.device_code,
        "expiresIn": resp.expires_in,
        "interval": resp.interval,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePollRequest {
    pub device_code: String,
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
}

pub async fn device_poll(
    State(state): State<AppState>,
    Json(body): Json<DevicePollRequest>,
) -> GatewayResult<impl IntoResponse> {
    let outcome = state.auth.poll_device_code(
        &body.device_code,
        &body.device_id,
        &body.device_name,
        &body.platform,
        &state.settings,
    )?;
    Ok(match outcome {
        PollResult::AuthorizationPending => Json(json!({ "status": "authorization_pending" })),
        PollResult::SlowDown => Json(json!({ "status": "slow_down" })),
        PollResult::Expired => Json(json!({ "status": "expired" })),
        PollResult::Denied => Json(json!({ "status": "denied" })),
        PollResult::Authorized(tokens) => Json(json!({
            "accessToken": tokens.access_token,
            "refreshToken": tokens.refresh_token,
            "expiresIn": tokens.expires_in,
            "user": tokens.user,
        })),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> GatewayResult<impl IntoResponse> {
    let tokens = state.auth.credential_login(
        &body.email,
        &body.password,
        &body.device_id,
        &body.device_name,
        &body.platform,
        &state.settings,
    )?;
    Ok(Json(json!({
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
        "user": tokens.user,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> GatewayResult<impl IntoResponse> {
    let tokens = state.auth.register(
        &body.name,
        &body.email,
        &body.password,
        &body.device_id,
        &body.device_name,
        &body.platform,
        &state.settings,
    )?;
    Ok(Json(json!({
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
        "user": tokens.user,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> GatewayResult<impl IntoResponse> {
    let (access_token, refresh_token, expires_in) = state.auth.refresh(&body.refresh_token)?;
    Ok(Json(json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "expiresIn": expires_in,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub all_devices: bool,
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LogoutRequest>,
) -> GatewayResult<impl IntoResponse> {
    let token = bearer_token(&headers).ok_or_else(|| GatewayError::Unauthorized("missing bearer token".into()))?;
    let identity = state.auth.verify(&token)?;
    let device_id = if body.all_devices { None } else { Some(identity.device_id.as_str()) };
    state.auth.logout(&identity.user_id, device_id)?;
    Ok(Json(json!({ "ok": true })))
}
