//! Device-code grant state machine: `pending -> authorized -> consumed`,
//! with `expired`/`denied` terminal states reachable by timer or operator
//! action. The poll endpoint is the only state-changing read.

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::open_conn;
use crate::error::{GatewayError, GatewayResult};

/// Crockford-like alphabet with ambiguous characters (I, L, O, U, 0, 1)
/// removed, so a human reading a user code aloud never confuses digits
/// and letters.
const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ23456789";
const USER_CODE_LEN: usize = 8;
const DEVICE_CODE_BYTES: usize = 32;
const EXPIRES_IN_SECS: i64 = 600;
const POLL_INTERVAL_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantState {
    Pending,
    Authorized,
    Consumed,
    Expired,
    Denied,
}

impl GrantState {
    fn as_str(&self) -> &'static str {
        match self {
            GrantState::Pending => "pending",
            GrantState::Authorized => "authorized",
            GrantState::Consumed => "consumed",
            GrantState::Expired => "expired",
            GrantState::Denied => "denied",
        }
    }

    fn from_str(s: &str) -> GrantState {
        match s {
            "authorized" => GrantState::Authorized,
            "consumed" => GrantState::Consumed,
            "expired" => GrantState::Expired,
            "denied" => GrantState::Denied,
            _ => GrantState::Pending,
        }
    }
}

pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub expires_in: i64,
    pub interval: i64,
}

pub enum PollOutcome {
    AuthorizationPending,
    SlowDown,
    Authorized { user_id: String },
    Expired,
    Denied,
}

fn random_user_code() -> String {
    let mut rng = rand::thread_rng();
    (0..USER_CODE_LEN)
        .map(|_| *USER_CODE_ALPHABET.choose(&mut rng).unwrap() as char)
        .collect()
}

fn random_device_code() -> String {
    let bytes: [u8; DEVICE_CODE_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// `requestDeviceCode`: idempotent within the pending window for a given
/// `device_id` — a device that re-requests before its first grant expires
/// gets the same grant back rather than accumulating duplicates.
pub fn request(device_id: &str, device_name: &str, platform: &str) -> GatewayResult<DeviceCodeResponse> {
    let conn = open_conn();
    let now = chrono::Utc::now().timestamp();

    let existing: Option<(String, String, i64)> = conn
        .query_row(
            "select device_code, user_code, expires_at from device_code_grants
             where device_id = ?1 and state = 'pending' and expires_at > ?2",
            params![device_id, now],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    if let Some((device_code, _user_code, expires_at)) = existing {
        return Ok(DeviceCodeResponse {
            device_code,
            user_code: _user_code,
            expires_in: expires_at - now,
            interval: POLL_INTERVAL_SECS,
        });
    }

    let device_code = random_device_code();
    let expires_at = now + EXPIRES_IN_SECS;

    // Regenerate on user-code collision against other live grants.
    let mut user_code = random_user_code();
    for _ in 0..5 {
        let collision: Option<i64> = conn
            .query_row(
                "select 1 from device_code_grants where user_code = ?1 and state in ('pending','authorized') and expires_at > ?2",
                params![user_code, now],
                |row| row.get(0),
            )
            .optional()?;
        if collision.is_none() {
            break;
        }
        user_code = random_user_code();
    }

    conn.execute(
        "insert into device_code_grants (device_code, user_code, device_id, device_name, platform, state, authorized_user_id, interval_secs, last_polled_at, expires_at, created_at)
         values (?1, ?2, ?3, ?4, ?5, 'pending', null, ?6, null, ?7, ?8)",
        params![device_code, user_code, device_id, device_name, platform, POLL_INTERVAL_SECS, expires_at, now],
    )?;

    Ok(DeviceCodeResponse {
        device_code,
        user_code,
        expires_in: EXPIRES_IN_SECS,
        interval: POLL_INTERVAL_SECS,
    })
}

/// Operator-side approval, keyed by the human-facing `user_code`.
pub fn approve(user_code: &str, user_id: &str) -> GatewayResult<()> {
    let conn = open_conn();
    let now = chrono::Utc::now().timestamp();
    let updated = conn.execute(
        "update device_code_grants set state = 'authorized', authorized_user_id = ?1
         where user_code = ?2 and state = 'pending' and expires_at > ?3",
        params![user_id, user_code, now],
    )?;
    if updated == 0 {
        return Err(GatewayError::InvalidRequest("unknown or expired user code".into()));
    }
    Ok(())
}

/// `pollDeviceCode`: the only transition to `consumed`.
pub fn poll(device_code: &str) -> GatewayResult<PollOutcome> {
    let conn = open_conn();
    let now = chrono::Utc::now().timestamp();

    let row: Option<(String, Option<String>, i64, Option<i64>, i64)> = conn
        .query_row(
            "select state, authorized_user_id, interval_secs, last_polled_at, expires_at
             from device_code_grants where device_code = ?1",
            params![device_code],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;

    let Some((state_str, authorized_user_id, interval_secs, last_polled_at, expires_at)) = row else {
        return Err(GatewayError::InvalidRequest("unknown device code".into()));
    };

    if expires_at <= now {
        conn.execute(
            "update device_code_grants set state = 'expired' where device_code = ?1",
            params![device_code],
        )?;
        return Ok(PollOutcome::Expired);
    }

    if let Some(last) = last_polled_at {
        if now - last < interval_secs {
            return Ok(PollOutcome::SlowDown);
        }
    }
    conn.execute(
        "update device_code_grants set last_polled_at = ?1 where device_code = ?2",
        params![now, device_code],
    )?;

    match GrantState::from_str(&state_str) {
        GrantState::Pending => Ok(PollOutcome::AuthorizationPending),
        GrantState::Denied => Ok(PollOutcome::Denied),
        GrantState::Expired => Ok(PollOutcome::Expired),
        GrantState::Consumed => Err(GatewayError::InvalidRequest("device code already consumed".into())),
        GrantState::Authorized => {
            let user_id = authorized_user_id
                .ok_or_else(|| GatewayError::ServerError("authorized grant missing user id".into()))?;
            let updated = conn.execute(
                "update device_code_grants set state = 'consumed' where device_code = ?1 and state = 'authorized'",
                params![device_code],
            )?;
            if updated == 0 {
                // Raced with another poll; the other poll already consumed it.
                return Err(GatewayError::InvalidRequest("device code already consumed".into()));
            }
            Ok(PollOutcome::Authorized { user_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_code_has_expected_length_and_alphabet() {
        let code = random_user_code();
        assert_eq!(code.len(), USER_CODE_LEN);
        assert!(code.chars().all(|c| USER_CODE_ALPHABET.contains(&(c as u8))));
    }
}
