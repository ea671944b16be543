//! AccessToken minting and verification: a stateless HS256 JWT.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::secrets::auth_secret;

const ISSUER: &str = "relay-gateway";
const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    device: String,
    iat: i64,
    exp: i64,
    iss: String,
}

pub struct VerifiedIdentity {
    pub user_id: String,
    pub device_id: String,
}

/// Mint a new access token for `(user_id, device_id)`. Returns the encoded
/// JWT and its TTL in seconds.
pub fn mint(user_id: &str, device_id: &str) -> GatewayResult<(String, i64)> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        device: device_id.to_string(),
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
        iss: ISSUER.to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth_secret()),
    )
    .map_err(|e| GatewayError::ServerError(format!("jwt encode failed: {e}")))?;
    Ok((token, ACCESS_TOKEN_TTL_SECS))
}

/// Validate signature, expiry, issuer, and claim shape. Any malformation
/// collapses to `invalid_token` per the spec's failure semantics.
pub fn verify(token: &str) -> GatewayResult<VerifiedIdentity> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(auth_secret()), &validation)
        .map_err(|_| GatewayError::InvalidToken)?;

    if data.claims.sub.is_empty() || data.claims.device.is_empty() {
        return Err(GatewayError::InvalidToken);
    }

    Ok(VerifiedIdentity {
        user_id: data.claims.sub,
        device_id: data.claims.device,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_verify_round_trip() {
        crate::secrets::init_for_test();
        let (token, ttl) = mint("user-1", "device-1").unwrap();
        assert_eq!(ttl, ACCESS_TOKEN_TTL_SECS);
        let identity = verify(&token).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.device_id, "device-1");
    }

    #[test]
    fn tampered_token_is_rejected() {
        crate::secrets::init_for_test();
        let (token, _) = mint("user-1", "device-1").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify(&tampered).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        crate::secrets::init_for_test();
        let claims = Claims {
            sub: "user-1".to_string(),
            device: "device-1".to_string(),
            iat: 0,
            exp: 1,
            iss: ISSUER.to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(auth_secret()),
        )
        .unwrap();
        assert!(verify(&token).is_err());
    }
}
