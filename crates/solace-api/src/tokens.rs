use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use solace_types::api::{Claims, TokenPair};

/// Signing key and lifetimes for access and refresh tokens.
#[derive(Clone)]
pub struct TokenSettings {
    secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_access(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.access_ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    /// Access token plus a fresh refresh token. The caller stores the
    /// returned hash; the raw refresh token only goes to the client.
    pub fn issue_pair(&self, user_id: Uuid, email: &str) -> anyhow::Result<(TokenPair, String)> {
        let access_token = self.issue_access(user_id, email)?;
        let refresh_token = new_refresh_token();
        let hash = hash_refresh_token(&refresh_token);

        Ok((
            TokenPair {
                access_token,
                refresh_token,
                token_type: "Bearer",
                expires_in: self.access_ttl.num_seconds(),
            },
            hash,
        ))
    }
}

/// 256 random bits, URL-safe base64.
fn new_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    B64.encode(bytes)
}

pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
