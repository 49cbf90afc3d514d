//! Access tokens issued by the identity provider.
//!
//! Tokens are HS256 JWTs signed with a shared base64 secret. Besides the
//! user (`sub`) they carry the id of the server-side session (`sid`), which
//! is what revocation and inactivity checks operate on.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const ACCESS_TOKEN_AUDIENCE: &str = "authenticated";

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token")]
    InvalidToken,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

#[derive(Debug, Clone)]
pub struct AccessTokenDetails {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JwtService {
    secret: Arc<SecretString>,
}

impl JwtService {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }

    pub fn encode_access_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id,
            sid: session_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            aud: ACCESS_TOKEN_AUDIENCE.to_string(),
        };

        let key = EncodingKey::from_base64_secret(self.secret.expose_secret())?;
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }

    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenDetails, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_audience(&[ACCESS_TOKEN_AUDIENCE]);
        validation.required_spec_claims = HashSet::from([
            "sub".to_string(),
            "exp".to_string(),
            "aud".to_string(),
        ]);
        validation.leeway = 30;

        let key = DecodingKey::from_base64_secret(self.secret.expose_secret())?;
        let claims = decode::<AccessTokenClaims>(token, &key, &validation)?.claims;

        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).ok_or(JwtError::InvalidToken)?;

        Ok(AccessTokenDetails {
            user_id: claims.sub,
            session_id: claims.sid,
            expires_at,
        })
    }
}
