//! `AuthGateway`: the public operations wiring JWT verification, password
//! hashing, the device-code state machine and refresh-token rotation into
//! the seven operations the external interfaces call.

use std::sync::Arc;

use crate::auth::{device_code, jwt, password, refresh};
use crate::config::Settings;
use crate::directory::{User, UserDirectory};
use crate::error::{GatewayError, GatewayResult};

pub struct VerifiedIdentity {
    pub user_id: String,
    pub device_id: String,
}

pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: User,
}

pub enum PollResult {
    AuthorizationPending,
    SlowDown,
    Expired,
    Denied,
    Authorized(Tokens),
}

pub struct AuthGateway {
    directory: Arc<dyn UserDirectory>,
}

impl AuthGateway {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub fn verify(&self, token: &str) -> GatewayResult<VerifiedIdentity> {
        let v = jwt::verify(token)?;
        let user = self
            .directory
            .find_by_id(&v.user_id)?
            .ok_or(GatewayError::InvalidToken)?;
        if user.role == crate::directory::Role::Blocked {
            return Err(GatewayError::AccountBlocked);
        }
        Ok(VerifiedIdentity { user_id: v.user_id, device_id: v.device_id })
    }

    pub fn request_device_code(
        &self,
        device_id: &str,
        device_name: &str,
        platform: &str,
    ) -> GatewayResult<device_code::DeviceCodeResponse> {
        device_code::request(device_id, device_name, platform)
    }

    pub fn approve_device_code(&self, user_code: &str, user_id: &str) -> GatewayResult<()> {
        device_code::approve(user_code, user_id)
    }

    /// Polls a device-code grant. On `Authorized`, mints and returns tokens
    /// in the same call — the spec's `poll` is the single transition to
    /// `consumed` and the single place tokens are produced.
    pub fn poll_device_code(
        &self,
        device_code_value: &str,
        device_id: &str,
        device_name: &str,
        platform: &str,
        settings: &Settings,
    ) -> GatewayResult<PollResult> {
        match device_code::poll(device_code_value)? {
            device_code::PollOutcome::AuthorizationPending => Ok(PollResult::AuthorizationPending),
            device_code::PollOutcome::SlowDown => Ok(PollResult::SlowDown),
            device_code::PollOutcome::Expired => Ok(PollResult::Expired),
            device_code::PollOutcome::Denied => Ok(PollResult::Denied),
            device_code::PollOutcome::Authorized { user_id } => {
                let tokens = self.issue_tokens_for_binding(&user_id, device_id, device_name, platform, settings)?;
                Ok(PollResult::Authorized(tokens))
            }
        }
    }

    pub fn credential_login(
        &self,
        email: &str,
        password_plain: &str,
        device_id: &str,
        device_name: &str,
        platform: &str,
        settings: &Settings,
    ) -> GatewayResult<Tokens> {
        let user = self
            .directory
            .find_by_email(email)?
            .ok_or(GatewayError::UserNotFound)?;
        if user.role == crate::directory::Role::Blocked {
            return Err(GatewayError::AccountBlocked);
        }
        let Some(ref stored_hash) = user.password_hash else {
            return Err(GatewayError::OAuthUser);
        };
        if !password::verify(password_plain, stored_hash) {
            return Err(GatewayError::Unauthorized("invalid credentials".into()));
        }
        self.issue_tokens_for_binding(&user.id, device_id, device_name, platform, settings)
    }

    pub fn register(
        &self,
        name: &str,
        email: &str,
        password_plain: &str,
        device_id: &str,
        device_name: &str,
        platform: &str,
        settings: &Settings,
    ) -> GatewayResult<Tokens> {
        if let Some(existing) = self.directory.find_by_email(email)? {
            return Err(if existing.password_hash.is_none() {
                GatewayError::OAuthAccountExists
            } else {
                GatewayError::EmailExists
            });
        }
        let hash = password::hash(password_plain)?;
        let user = self.directory.create(name, email, Some(&hash))?;
        self.issue_tokens_for_binding(&user.id, device_id, device_name, platform, settings)
    }

    pub fn refresh(&self, presented_refresh_token: &str) -> GatewayResult<(String, String, i64)> {
        let rotated = refresh::rotate(presented_refresh_token)?;
        let (access_token, expires_in) = jwt::mint(&rotated.user_id, &rotated.device_id)?;
        Ok((access_token, rotated.refresh_token, expires_in))
    }

    pub fn logout(&self, user_id: &str, device_id: Option<&str>) -> GatewayResult<()> {
        refresh::revoke(user_id, device_id)
    }

    fn issue_tokens_for_binding(
        &self,
        user_id: &str,
        device_id: &str,
        device_name: &str,
        platform: &str,
        settings: &Settings,
    ) -> GatewayResult<Tokens> {
        let user = self
            .directory
            .find_by_id(user_id)?
            .ok_or(GatewayError::UserNotFound)?;
        let device_limit = settings
            .plans
            .get(user.plan.as_str())
            .and_then(|p| p.device_limit);
        let refresh_token = refresh::bind_device(user_id, device_id, device_name, platform, device_limit)?;
        let (access_token, expires_in) = jwt::mint(user_id, device_id)?;
        Ok(Tokens { access_token, refresh_token, expires_in, user })
    }
}

