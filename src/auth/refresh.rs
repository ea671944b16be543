//! RefreshToken issuance and single-use rotation.
//!
//! Only the SHA-256 hash of a refresh token is ever persisted. Rotation is
//! a single transaction: insert the new hash, then delete the row keyed by
//! the old hash. If that delete affects zero rows, the token had already
//! been rotated or revoked by a concurrent caller — the whole transaction
//! rolls back and the caller gets `token_revoked`.

use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::db::open_conn;
use crate::error::{GatewayError, GatewayResult};

const REFRESH_TOKEN_BYTES: usize = 32;

pub struct RotatedTokens {
    pub user_id: String,
    pub device_id: String,
    pub refresh_token: String,
}

fn new_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Create (or replace) a device binding for `user_id`/`device_id`, evicting
/// the oldest binding first if `device_limit` is already reached. Returns
/// the new opaque refresh token.
pub fn bind_device(
    user_id: &str,
    device_id: &str,
    device_name: &str,
    platform: &str,
    device_limit: Option<u32>,
) -> GatewayResult<String> {
    let mut conn = open_conn();
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp();

    if let Some(limit) = device_limit {
        let count: u32 = tx.query_row(
            "select count(*) from device_bindings where user_id = ?1 and device_id != ?2",
            params![user_id, device_id],
            |r| r.get(0),
        )?;
        if count >= limit {
            tx.execute(
                "delete from device_bindings where rowid in (
                    select rowid from device_bindings where user_id = ?1 and device_id != ?2
                    order by last_used_at asc limit 1
                )",
                params![user_id, device_id],
            )?;
        }
    }

    let token = new_token();
    let token_hash = hash_token(&token);
    tx.execute(
        "insert into device_bindings (user_id, device_id, device_name, platform, refresh_token_hash, created_at, last_used_at)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         on conflict(user_id, device_id) do update set
            device_name = excluded.device_name,
            platform = excluded.platform,
            refresh_token_hash = excluded.refresh_token_hash,
            last_used_at = excluded.last_used_at",
        params![user_id, device_id, device_name, platform, token_hash, now],
    )?;
    tx.commit()?;
    Ok(token)
}

/// Atomic compare-and-swap rotation: the presented token's hash must still
/// be the binding's current hash, or the rotation is rejected.
pub fn rotate(presented_token: &str) -> GatewayResult<RotatedTokens> {
    let presented_hash = hash_token(presented_token);
    let mut conn = open_conn();
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp();

    let found: Option<(String, String)> = tx
        .query_row(
            "select user_id, device_id from device_bindings where refresh_token_hash = ?1",
            params![presented_hash],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let Some((user_id, device_id)) = found else {
        return Err(GatewayError::TokenRevoked);
    };

    let new = new_token();
    let new_hash = hash_token(&new);
    let updated = tx.execute(
        "update device_bindings set refresh_token_hash = ?1, last_used_at = ?2
         where user_id = ?3 and device_id = ?4 and refresh_token_hash = ?5",
        params![new_hash, now, user_id, device_id, presented_hash],
    )?;
    if updated == 0 {
        // Concurrent rotation already replaced the hash; treat as revoked.
        drop(tx);
        return Err(GatewayError::TokenRevoked);
    }
    tx.commit()?;

    Ok(RotatedTokens {
        user_id,
        device_id,
        refresh_token: new,
    })
}

/// `logout`: invalidate one device, or every device binding for the user.
pub fn revoke(user_id: &str, device_id: Option<&str>) -> GatewayResult<()> {
    let conn = open_conn();
    match device_id {
        Some(device_id) => {
            conn.execute(
                "delete from device_bindings where user_id = ?1 and device_id = ?2",
                params![user_id, device_id],
            )?;
        }
        None => {
            conn.execute(
                "delete from device_bindings where user_id = ?1",
                params![user_id],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_not_the_token() {
        let t = new_token();
        assert_ne!(hash_token(&t), t);
        assert_eq!(hash_token(&t), hash_token(&t));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(), new_token());
    }
}
