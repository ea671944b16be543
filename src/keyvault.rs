//! AES-256-GCM admin API key vault, replacing the inherited OS-specific
//! (Windows DPAPI only, no-op elsewhere) secret protection with a real
//! cross-platform authenticated cipher.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use once_cell::sync::Lazy;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::db::open_conn;
use crate::error::{GatewayError, GatewayResult};
use crate::secrets::key_vault_secret;

const CACHE_TTL: Duration = Duration::from_secs(300);
const NONCE_LEN: usize = 12;

struct CacheEntry {
    plaintext: String,
    cached_at: Instant,
}

static DECRYPT_CACHE: Lazy<Mutex<HashMap<String, CacheEntry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn cipher() -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_vault_secret()))
}

pub fn encrypt(plaintext: &str) -> GatewayResult<(Vec<u8>, Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher()
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| GatewayError::ServerError("key vault encryption failed".into()))?;
    Ok((nonce_bytes.to_vec(), ciphertext))
}

fn decrypt(nonce: &[u8], ciphertext: &[u8]) -> GatewayResult<String> {
    let nonce = Nonce::from_slice(nonce);
    let plaintext = cipher()
        .decrypt(nonce, ciphertext)
        .map_err(|_| GatewayError::ServerError("key vault decryption failed".into()))?;
    String::from_utf8(plaintext).map_err(|_| GatewayError::ServerError("decrypted key was not utf-8".into()))
}

/// `AdminApiKey` access: decrypts on demand, serving a short-TTL in-memory
/// cache so the hot request path rarely pays the AEAD cost. Plaintext keys
/// are never logged or serialized back out.
pub trait AdminKeyStore: Send + Sync {
    fn active_key(&self, provider: &str) -> GatewayResult<Option<String>>;
    fn active_providers(&self) -> GatewayResult<Vec<String>>;
    fn set_key(&self, provider: &str, plaintext: &str) -> GatewayResult<()>;
    fn invalidate(&self, provider: &str);
}

pub struct SqliteAdminKeyStore;

impl SqliteAdminKeyStore {
    pub fn new() -> Self {
        SqliteAdminKeyStore
    }
}

impl Default for SqliteAdminKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminKeyStore for SqliteAdminKeyStore {
    fn active_key(&self, provider: &str) -> GatewayResult<Option<String>> {
        {
            let cache = DECRYPT_CACHE.lock().unwrap();
            if let Some(entry) = cache.get(provider) {
                if entry.cached_at.elapsed() < CACHE_TTL {
                    return Ok(Some(entry.plaintext.clone()));
                }
            }
        }

        let conn = open_conn();
        let row: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "select nonce, ciphertext from admin_api_keys where provider = ?1 and is_active = 1",
                params![provider],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((nonce, ciphertext)) = row else {
            return Ok(None);
        };
        let plaintext = decrypt(&nonce, &ciphertext)?;

        conn.execute(
            "update admin_api_keys set usage_count = usage_count + 1, last_used_at = ?1 where provider = ?2",
            params![chrono::Utc::now().timestamp(), provider],
        )?;

        DECRYPT_CACHE.lock().unwrap().insert(
            provider.to_string(),
            CacheEntry { plaintext: plaintext.clone(), cached_at: Instant::now() },
        );
        Ok(Some(plaintext))
    }

    fn active_providers(&self) -> GatewayResult<Vec<String>> {
        let conn = open_conn();
        let mut stmt = conn.prepare("select provider from admin_api_keys where is_active = 1")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn set_key(&self, provider: &str, plaintext: &str) -> GatewayResult<()> {
        let (nonce, ciphertext) = encrypt(plaintext)?;
        let conn = open_conn();
        conn.execute(
            "insert into admin_api_keys (provider, nonce, ciphertext, is_active, usage_count, last_used_at)
             values (?1, ?2, ?3, 1, 0, null)
             on conflict(provider) do update set nonce = excluded.nonce, ciphertext = excluded.ciphertext, is_active = 1",
            params![provider, nonce, ciphertext],
        )?;
        self.invalidate(provider);
        Ok(())
    }

    fn invalidate(&self, provider: &str) {
        DECRYPT_CACHE.lock().unwrap().remove(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        crate::secrets::init_for_test();
        let (nonce, ciphertext) = encrypt("sk-test-upstream-key").unwrap();
        assert_eq!(decrypt(&nonce, &ciphertext).unwrap(), "sk-test-upstream-key");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        crate::secrets::init_for_test();
        let (nonce, mut ciphertext) = encrypt("sk-test-upstream-key").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(decrypt(&nonce, &ciphertext).is_err());
    }
}
