use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::{TokenVerifier, VerifiedUser};
use crate::error::RelayError;

/// Claims issued by the account service at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User id (24 hex chars)
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiration (Unix timestamp). Tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl From<Claims> for VerifiedUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            first_name: claims.first_name,
            last_name: claims.last_name,
        }
    }
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an HS256 token for `user`, valid for `ttl_secs` (or forever when `None`).
pub fn issue_token(
    secret: &[u8],
    user: &VerifiedUser,
    ttl_secs: Option<i64>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        id: user.id.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        iat: Some(now),
        exp: ttl_secs.map(|ttl| now + ttl),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Validate a token and return its claims.
pub fn validate_token(secret: &[u8], token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // `exp` is checked when present but not demanded.
    validation.required_spec_claims = HashSet::new();
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// `TokenVerifier` for HS256 tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Vec<u8>,
}

impl JwtVerifier {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, RelayError> {
        match validate_token(&self.secret, token) {
            Ok(claims) => Ok(claims.into()),
            Err(err) => {
                tracing::debug!(error = %err, "Token rejected");
                Err(RelayError::AuthInvalid)
            }
        }
    }
}
