use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;

use crate::auth::claims::{AccessClaims, RefreshClaims, RoleClaims, TokenType, CLAIMS_VERSION};
use crate::config::Config;
use crate::error::HrmError;
use crate::models::user;

/// Mints and verifies access and refresh tokens.
///
/// Access and refresh tokens are signed with different secrets, so a leaked
/// access-token secret cannot be used to forge long-lived refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// Why a token failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid(String),
}

impl From<TokenError> for HrmError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => HrmError::Unauthorized("Token has expired".to_string()),
            TokenError::Invalid(_) => HrmError::Unauthorized("Invalid token".to_string()),
        }
    }
}

impl TokenIssuer {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        TokenIssuer {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.refresh_token_secret,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Create an access token embedding the user's identity and role snapshot.
    pub fn generate_access_token(
        &self,
        user: &user::Model,
        role: Option<RoleClaims>,
    ) -> Result<String, HrmError> {
        self.issue_access_token(user, role).map(|(token, _)| token)
    }

    /// Like [`Self::generate_access_token`], also returning the signed claims.
    pub fn issue_access_token(
        &self,
        user: &user::Model,
        role: Option<RoleClaims>,
    ) -> Result<(String, AccessClaims), HrmError> {
        let now = Utc::now();
        let claims = AccessClaims {
            ver: CLAIMS_VERSION,
            sub: user.id.to_string(),
            user_id: user.id,
            email: user.email.clone(),
            role_id: user.role_id,
            role,
            typ: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(|e| HrmError::Internal(format!("Failed to create access token: {}", e)))?;
        Ok((token, claims))
    }

    /// Create a refresh token bound to `session_id`. Returns the token and its `jti`.
    pub fn generate_refresh_token(
        &self,
        user_id: i32,
        session_id: &str,
    ) -> Result<(String, String), HrmError> {
        let now = Utc::now();
        let jti = uuid::Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            user_id,
            session_id: session_id.to_string(),
            typ: TokenType::Refresh,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(|e| HrmError::Internal(format!("Failed to create refresh token: {}", e)))?;
        Ok((token, jti))
    }

    /// Validate an access token and return its claims.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = decode_claims(token, &self.access_decoding)?;
        if claims.typ != TokenType::Access {
            return Err(TokenError::Invalid("not an access token".to_string()));
        }
        if claims.ver != CLAIMS_VERSION {
            return Err(TokenError::Invalid(format!(
                "unsupported claims version {}",
                claims.ver
            )));
        }
        Ok(claims)
    }

    /// Validate a refresh token and return its claims.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = decode_claims(token, &self.refresh_decoding)?;
        if claims.typ != TokenType::Refresh {
            return Err(TokenError::Invalid("not a refresh token".to_string()));
        }
        Ok(claims)
    }
}

fn decode_claims<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, TokenError> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })
}
