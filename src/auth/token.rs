use crate::config::SessionSettings;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Discriminates the two credentials so one can never stand in for the other,
/// even if both keys were ever configured identically.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Represents the claims encoded within both access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the principal's id.
    pub sub: i32,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Unique token id. Two tokens minted for the same principal in the same
    /// second still differ, which rotation depends on.
    pub jti: Uuid,
    pub token_type: TokenType,
}

/// A freshly minted credential pair. Never persisted; only the hash of
/// `refresh_token` is stored.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_in: Duration,
    pub refresh_expires_in: Duration,
}

/// Mints and verifies access/refresh JWTs, each with its own key and lifetime.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(settings: &SessionSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Lifetimes are exact; the default 60s leeway would keep an expired
        // access token usable for another minute.
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            validation,
        }
    }

    /// Mints a new pair for an already-authenticated principal.
    ///
    /// Performs no validation of its own: callers must have verified a password
    /// or a stored refresh credential. Persisting the refresh hash is also the
    /// caller's job.
    pub fn issue_tokens(&self, principal_id: i32) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.sign(principal_id, TokenType::Access)?,
            refresh_token: self.sign(principal_id, TokenType::Refresh)?,
            access_expires_in: self.access_ttl,
            refresh_expires_in: self.refresh_ttl,
        })
    }

    /// Checks signature, expiry and type of an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, TokenType::Access)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }

    /// Checks signature, expiry and type of a refresh token. Says nothing about
    /// whether it is still the stored credential.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        self.verify(token, TokenType::Refresh)
    }

    fn sign(&self, principal_id: i32, token_type: TokenType) -> Result<String, AppError> {
        let now = Utc::now();
        let (ttl, key) = match token_type {
            TokenType::Access => (self.access_ttl, &self.access_encoding),
            TokenType::Refresh => (self.refresh_ttl, &self.refresh_encoding),
        };

        let claims = Claims {
            sub: principal_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
    }

    fn verify(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };
        let claims = decode::<Claims>(token, key, &self.validation)?.claims;
        if claims.token_type != expected {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }
        Ok(claims)
    }
}

/// SHA-256 hex digest of an opaque credential (refresh or reset token).
///
/// bcrypt is unsuitable here: it ignores input past 72 bytes, and JWTs for the
/// same principal share a much longer prefix.
pub fn hash_credential(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
