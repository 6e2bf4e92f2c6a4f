/// Session token issuing and verification
///
/// HS256 JWTs signed with the process-wide secret. Expiry is checked
/// against the service clock rather than inside `jsonwebtoken`, so an
/// expired token is reported separately from a forged one.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::{Environment, JwtSettings};
use crate::error::{AppError, AuthError};
use crate::storage::User;

#[derive(Clone)]
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiry_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl SessionTokens {
    pub fn new(secret: &[u8], issuer: String, expiry_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
            expiry_seconds,
            clock,
        }
    }

    /// Resolves the secret for `environment`; fails when it is missing
    /// outside local development
    pub fn from_settings(
        settings: &JwtSettings,
        environment: Environment,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let secret = settings.signing_secret(environment)?;
        Ok(Self::new(
            &secret,
            settings.issuer.clone(),
            settings.expiry_seconds,
            clock,
        ))
    }

    /// Signs a token for `user`
    ///
    /// # Errors
    /// Returns error if token encoding fails
    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let claims = Claims::new(
            user,
            self.clock.now(),
            self.expiry_seconds,
            self.issuer.clone(),
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verifies signature, issuer and expiry
    ///
    /// # Errors
    /// `TokenInvalid` for malformed, forged or foreign tokens,
    /// `TokenExpired` once the validity window has passed
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                AuthError::TokenInvalid
            })?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}
