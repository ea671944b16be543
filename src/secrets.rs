//! Process-wide secret material, loaded once from the environment.
//!
//! Both secrets are required at startup: there is no generated fallback,
//! because a fallback would silently invalidate every token and key on
//! process restart. `bin/server_main.rs` fails fast if either is missing.

use once_cell::sync::OnceCell;

static AUTH_SECRET: OnceCell<Vec<u8>> = OnceCell::new();
static KEY_VAULT_SECRET: OnceCell<[u8; 32]> = OnceCell::new();

/// Load `AUTH_SECRET` and `KEY_VAULT_SECRET` from the environment. Call once
/// at startup before anything touches `auth::jwt` or `keyvault`.
pub fn init() -> Result<(), String> {
    let auth = std::env::var("AUTH_SECRET")
        .map_err(|_| "AUTH_SECRET environment variable is not set".to_string())?;
    if auth.len() < 32 {
        return Err("AUTH_SECRET must be at least 32 bytes".to_string());
    }
    AUTH_SECRET.set(auth.into_bytes()).ok();

    let vault = std::env::var("KEY_VAULT_SECRET")
        .map_err(|_| "KEY_VAULT_SECRET environment variable is not set".to_string())?;
    let vault_bytes =
        hex::decode(vault.trim()).map_err(|_| "KEY_VAULT_SECRET must be 64 hex chars (32 bytes)".to_string())?;
    let arr: [u8; 32] = vault_bytes
        .try_into()
        .map_err(|_| "KEY_VAULT_SECRET must decode to exactly 32 bytes".to_string())?;
    KEY_VAULT_SECRET.set(arr).ok();

    Ok(())
}

pub fn auth_secret() -> &'static [u8] {
    AUTH_SECRET
        .get()
        .expect("secrets::init() must run before auth_secret() is called")
}

pub fn key_vault_secret() -> &'static [u8; 32] {
    KEY_VAULT_SECRET
        .get()
        .expect("secrets::init() must run before key_vault_secret() is called")
}

#[cfg(test)]
pub fn init_for_test() {
    AUTH_SECRET
        .set(b"test-auth-secret-at-least-32-bytes-long!".to_vec())
        .ok();
    KEY_VAULT_SECRET.set([7u8; 32]).ok();
}
