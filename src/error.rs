//! Canonical gateway error type.
//!
//! Every fallible operation in this crate ultimately returns a
//! `GatewayError`. Internal error sources (rusqlite, serde_json, io)
//! convert into it via `#[from]` so call sites use `?` instead of
//! `.unwrap()`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("refresh token already used or revoked")]
    TokenRevoked,
    #[error("account uses oauth login, password login unavailable")]
    OAuthUser,
    #[error("account is blocked")]
    AccountBlocked,
    #[error("an account with this email already exists")]
    EmailExists,
    #[error("an oauth account already exists for this email")]
    OAuthAccountExists,
    #[error("device limit reached for this account")]
    DeviceLimit,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("user not found")]
    UserNotFound,

    #[error("daily request limit reached")]
    DailyLimitReached,
    #[error("smart mode is not available on the current plan")]
    SmartModeNotAvailable,
    #[error("provider {0} is not configured")]
    ProviderNotConfigured(String),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("no providers available for this request")]
    NoProviders,

    #[error("upstream provider error: {0}")]
    ProviderError(String),
    #[error("all providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("internal server error: {0}")]
    ServerError(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// The canonical identifier used in the JSON `error.type` field and in
    /// post-first-byte SSE error frames.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::InvalidToken => "invalid_token",
            GatewayError::TokenRevoked => "token_revoked",
            GatewayError::OAuthUser => "oauth_user",
            GatewayError::AccountBlocked => "account_blocked",
            GatewayError::EmailExists => "email_exists",
            GatewayError::OAuthAccountExists => "oauth_account_exists",
            GatewayError::DeviceLimit => "device_limit",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::UserNotFound => "user_not_found",
            GatewayError::DailyLimitReached => "daily_limit_reached",
            GatewayError::SmartModeNotAvailable => "smart_mode_not_available",
            GatewayError::ProviderNotConfigured(_) => "provider_not_configured",
            GatewayError::UnsupportedProvider(_) => "unsupported_provider",
            GatewayError::UnsupportedModel(_) => "unsupported_model",
            GatewayError::NoProviders => "no_providers",
            GatewayError::ProviderError(_) => "provider_error",
            GatewayError::AllProvidersFailed(_) => "all_providers_failed",
            GatewayError::ServerError(_)
            | GatewayError::Database(_)
            | GatewayError::Serialization(_)
            | GatewayError::Io(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_)
            | GatewayError::InvalidToken
            | GatewayError::TokenRevoked
            | GatewayError::OAuthUser => StatusCode::UNAUTHORIZED,
            GatewayError::AccountBlocked
            | GatewayError::DeviceLimit
            | GatewayError::DailyLimitReached
            | GatewayError::SmartModeNotAvailable => StatusCode::FORBIDDEN,
            GatewayError::EmailExists
            | GatewayError::OAuthAccountExists
            | GatewayError::InvalidRequest(_)
            | GatewayError::UnsupportedProvider(_)
            | GatewayError::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
            GatewayError::UserNotFound => StatusCode::NOT_FOUND,
            GatewayError::ProviderNotConfigured(_)
            | GatewayError::NoProviders
            | GatewayError::AllProvidersFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ProviderError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ServerError(_)
            | GatewayError::Database(_)
            | GatewayError::Serialization(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the terminal SSE error frame emitted when a failure happens
    /// after the first streamed byte (never goes through `IntoResponse`
    /// since the response headers are already committed).
    pub fn to_sse_frame(&self) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "error": self.kind(), "message": self.to_string() })
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            crate::logger::error("gateway_error", &format!("{} ({})", self, self.kind()));
        } else {
            crate::logger::debug("gateway_error", &format!("{} ({})", self, self.kind()));
        }

        (
            status,
            Json(serde_json::json!({
                "error": { "type": self.kind(), "message": self.to_string() }
            })),
        )
            .into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
