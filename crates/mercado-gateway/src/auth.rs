use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use mercado_types::api::{Claims, Principal};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token required")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Admits or rejects a relay connection based on its bearer token.
///
/// Tokens are HS256-signed with the shared secret and must carry an
/// unexpired `exp` claim. No clock leeway is granted.
#[derive(Clone)]
pub struct AuthGate {
    key: DecodingKey,
    validation: Validation,
}

impl AuthGate {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn admit(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let token_data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(token_data.claims.into())
    }
}
