//! JWT Authentication
//!
//! Validates JWTs from the backend's identity provider. The bridge never
//! issues tokens; it only checks them and maps the subject to an [`ActorId`].

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{parse_bool, ConfigError};
use crate::core::ids::ActorId;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Skip expiry validation (testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `AUTH_*` variables through a lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let skip_expiry = match lookup("AUTH_SKIP_EXPIRY") {
            Some(v) => parse_bool("AUTH_SKIP_EXPIRY", v.trim())?,
            None => false,
        };

        Ok(Self {
            issuer: lookup("AUTH_ISSUER"),
            audience: lookup("AUTH_AUDIENCE"),
            public_key_pem: lookup("AUTH_PUBLIC_KEY_PEM"),
            secret: lookup("AUTH_SECRET"),
            skip_expiry,
        })
    }

    /// Check if a verification key is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims we expect from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the backend user id.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Actor id for this subject.
    ///
    /// Numeric subjects are backend user ids and are used as-is. Anything
    /// else is hashed into a stable id.
    pub fn actor_id(&self) -> ActorId {
        if let Ok(id) = self.sub.parse::<u64>() {
            return ActorId(id);
        }

        let mut hasher = Sha256::new();
        hasher.update(b"arcade-bridge-actor:");
        hasher.update(self.sub.as_bytes());
        let hash = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[..8]);
        ActorId(u64::from_be_bytes(bytes))
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else if config.secret.is_some() {
        Algorithm::HS256
    } else {
        return Err(AuthError::NotConfigured);
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = match (&config.public_key_pem, &config.secret) {
        (Some(pem), _) => {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
            decode(token, &key, &validation).map_err(map_jwt_error)?
        }
        (None, Some(secret)) => {
            let key = DecodingKey::from_secret(secret.as_bytes());
            decode(token, &key, &validation).map_err(map_jwt_error)?
        }
        (None, None) => return Err(AuthError::NotConfigured),
    };

    let claims = token_data.claims;

    if claims.sub.trim().is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // The library allows leeway; enforce the exact expiry.
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const SECRET: &str = "bridge-test-secret-0123456789abcdef";

    pub(crate) fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    pub(crate) fn test_claims(sub: &str) -> TokenClaims {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        TokenClaims {
            sub: sub.into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_token_validation() {
        let token = create_test_token(&test_claims("42"), SECRET);

        let claims = validate_token(&token, &secret_config()).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.actor_id(), ActorId(42));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = test_claims("42");
        claims.exp = 1;
        let token = create_test_token(&claims, SECRET);

        assert!(matches!(validate_token(&token, &secret_config()), Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = create_test_token(&test_claims("42"), "another-secret-entirely-000000");

        assert!(matches!(
            validate_token(&token, &secret_config()),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let token = create_test_token(&test_claims("  "), SECRET);

        assert!(matches!(
            validate_token(&token, &secret_config()),
            Err(AuthError::MissingClaim(_))
        ));
    }

    #[test]
    fn test_issuer_and_audience_validation() {
        let token = create_test_token(&test_claims("42"), SECRET);

        let wrong_issuer = AuthConfig {
            issuer: Some("someone-else".into()),
            ..secret_config()
        };
        assert!(matches!(validate_token(&token, &wrong_issuer), Err(AuthError::InvalidIssuer)));

        let wrong_audience = AuthConfig {
            audience: Some("other-audience".into()),
            ..secret_config()
        };
        assert!(matches!(validate_token(&token, &wrong_audience), Err(AuthError::InvalidAudience)));

        let matching = AuthConfig {
            issuer: Some("test-issuer".into()),
            audience: Some("test-audience".into()),
            ..secret_config()
        };
        assert!(validate_token(&token, &matching).is_ok());
    }

    #[test]
    fn test_actor_id_derivation() {
        let hashed = test_claims("auth0|abc123");
        let again = test_claims("auth0|abc123");
        let other = test_claims("auth0|xyz789");

        assert_eq!(hashed.actor_id(), again.actor_id());
        assert_ne!(hashed.actor_id(), other.actor_id());
        assert_eq!(test_claims("7").actor_id(), ActorId(7));
    }

    #[test]
    fn test_not_configured_error() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_skip_expiry_for_testing() {
        let mut claims = test_claims("42");
        claims.exp = 1;
        let token = create_test_token(&claims, SECRET);

        let config = AuthConfig {
            skip_expiry: true,
            ..secret_config()
        };
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = AuthConfig::from_lookup(|key| match key {
            "AUTH_SECRET" => Some("s".into()),
            "AUTH_ISSUER" => Some("issuer".into()),
            "AUTH_SKIP_EXPIRY" => Some("1".into()),
            _ => None,
        })
        .unwrap();
        assert!(config.is_configured());
        assert!(config.skip_expiry);
        assert_eq!(config.issuer.as_deref(), Some("issuer"));

        assert!(AuthConfig::from_lookup(|key| (key == "AUTH_SKIP_EXPIRY").then(|| "nah".to_string())).is_err());
    }
}
