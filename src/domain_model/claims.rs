use crate::domain_model::AccessToken;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

/// Claims derived from the access token. Never persisted; the token string
/// is the source of truth and is re-decoded whenever the expiry is needed.
#[derive(Debug, Clone, Copy)]
pub struct TokenClaims {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed access token: {0}")]
pub struct DecodeError(pub String);

#[derive(Debug, Deserialize)]
struct RawClaims {
    exp: i64,
}

/// Extract the expiry claim from an access token without verifying the
/// signature. Verification is the server's job; this core only needs the
/// claim to plan refresh scheduling, so the token is treated as opaque
/// apart from its `exp` field.
pub fn decode_claims(token: &AccessToken) -> Result<TokenClaims, DecodeError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<RawClaims>(&token.0, &DecodingKey::from_secret(b""), &validation)
        .map_err(|e| DecodeError(e.to_string()))?;

    let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
        .ok_or_else(|| DecodeError(format!("exp claim out of range: {}", data.claims.exp)))?;

    Ok(TokenClaims { expires_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    fn token_expiring_at(exp: DateTime<Utc>) -> AccessToken {
        let claims = TestClaims {
            sub: "tester".to_string(),
            exp: exp.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        AccessToken(token)
    }

    #[test]
    fn decodes_expiry_claim() {
        let exp = Utc::now() + Duration::days(30);
        let claims = decode_claims(&token_expiring_at(exp)).unwrap();
        assert_eq!(claims.expires_at.timestamp(), exp.timestamp());
    }

    #[test]
    fn decodes_already_expired_token() {
        // Expired tokens must still decode; expiry handling is the
        // scheduler's decision, not the decoder's.
        let exp = Utc::now() - Duration::hours(2);
        let claims = decode_claims(&token_expiring_at(exp)).unwrap();
        assert!(claims.expires_at < Utc::now());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_claims(&AccessToken("not-a-jwt".to_string())).is_err());
        assert!(decode_claims(&AccessToken("".to_string())).is_err());
        assert!(decode_claims(&AccessToken("a.b.c".to_string())).is_err());
    }

    #[test]
    fn rejects_missing_exp() {
        #[derive(Serialize)]
        struct NoExp {
            sub: String,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoExp {
                sub: "tester".to_string(),
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(decode_claims(&AccessToken(token)).is_err());
    }
}
