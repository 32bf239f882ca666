//! Authentication hook for validating player identity.
//!
//! Pairplay does not issue credentials. A separate account service signs
//! session tokens; the server only verifies them through an
//! [`Authenticator`] and turns the claims into an [`Identity`].
//! [`JwtAuthenticator`] covers the common HS256 case.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use pairplay_protocol::Identity;
use serde::Deserialize;
use tracing::debug;

use crate::SessionError;

/// Validates a client's token and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use pairplay_protocol::Identity;
/// use pairplay_session::{Authenticator, SessionError};
///
/// /// Accepts `name` tokens verbatim. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::MissingToken);
///         }
///         Ok(Identity::new(token, token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies `token` and returns the identity it was issued for.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] when the token is malformed, has a bad
    /// signature, is expired, or lacks an id claim.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

/// Claims read from a session token. `id` is preferred over the standard
/// `sub` so tokens from the existing account service keep working.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Verifies HS256-signed JWTs with a shared secret.
#[derive(Clone)]
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Builds an authenticator that requires a valid `exp` claim.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Accept tokens without an `exp` claim. Tokens that do carry one are
    /// still rejected once expired.
    pub fn allow_missing_exp(mut self) -> Self {
        self.validation.required_spec_claims.remove("exp");
        self
    }

    /// Seconds of clock skew tolerated on `exp`.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| SessionError::AuthFailed(e.to_string()))?;
        let Claims { id, sub, username } = data.claims;

        let id = id
            .or(sub)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::AuthFailed("token has no id claim".into()))?;
        let display_name = username.unwrap_or_else(|| id.clone());

        debug!(player_id = %id, "token verified");
        Ok(Identity::new(id, display_name))
    }
}

impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        if token.is_empty() {
            return Err(SessionError::MissingToken);
        }
        self.verify(token)
    }
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}
