// Bearer tokens: HS256 JWTs carrying the user id and admin flag
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub admin: bool,
    pub iss: String,
    pub exp: usize,
}

/// Who a verified token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub admin: bool,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Build from config. An empty secret gets a random one that only lives
    /// as long as this process.
    pub fn from_config(auth: &AuthConfig) -> Self {
        if auth.jwt_secret.is_empty() {
            tracing::warn!("No jwt_secret configured; tokens will not survive a restart");
            let secret = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
            return Self::new(&secret, &auth.issuer, auth.token_hours);
        }
        Self::new(&auth.jwt_secret, &auth.issuer, auth.token_hours)
    }

    pub fn issue(&self, user_id: &str, admin: bool) -> AppResult<String> {
        let exp = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("Failed to calculate expiration".into()))?
            .timestamp() as usize;

        let claims = Claims {
            id: user_id.to_string(),
            admin,
            iss: self.issuer.clone(),
            exp,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            AppError::Unauthorized
        })?;

        Ok(Identity {
            user_id: data.claims.id,
            admin: data.claims.admin,
        })
    }
}
