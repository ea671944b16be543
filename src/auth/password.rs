//! Argon2id password hashing for credential-backed accounts.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{GatewayError, GatewayResult};

pub fn hash(password: &str) -> GatewayResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| GatewayError::ServerError(format!("password hash failed: {e}")))
}

/// Constant-time verification via the crate's own comparison. Returns
/// `false` on malformed stored hashes rather than erroring, since a bad
/// hash and a bad password are indistinguishable to the caller.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let h = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &h));
    }

    #[test]
    fn wrong_password_fails() {
        let h = hash("correct horse battery staple").unwrap();
        assert!(!verify("wrong password", &h));
    }

    #[test]
    fn distinct_hashes_for_same_password() {
        let a = hash("same-password").unwrap();
        let b = hash("same-password").unwrap();
        assert_ne!(a, b);
    }
}
