//! Caller-supplied decision points
//!
//! The engine manages tokens; who may log in and what an identity may do are
//! decided by these callbacks. All except the authenticator have defaults.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::claims::AccessClaims;
use crate::error::AuthenticationError;
use crate::extractor::RequestContext;

/// Turns login credentials into user data
///
/// Closures of the form `Fn(&Value) -> Result<Value, AuthenticationError>`
/// implement this trait directly; implement it by hand when authentication
/// needs to await a database or an upstream service.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Check `credentials` and return the user data to embed in the session
    ///
    /// # Errors
    ///
    /// An [`AuthenticationError`] describing why the credentials were refused.
    async fn authenticate(&self, credentials: &Value) -> Result<Value, AuthenticationError>;
}

#[async_trait]
impl<F> Authenticator for F
where
    F: Fn(&Value) -> Result<Value, AuthenticationError> + Send + Sync,
{
    async fn authenticate(&self, credentials: &Value) -> Result<Value, AuthenticationError> {
        self(credentials)
    }
}

/// Maps user data to the claims of a new access token
pub type PayloadFn = Arc<dyn Fn(&Value) -> AccessClaims + Send + Sync>;

/// Derives the request identity from verified claims
pub type IdentityHandler = Arc<dyn Fn(&AccessClaims) -> Option<Value> + Send + Sync>;

/// Decides whether an identity may perform a request
pub type Authorizer = Arc<dyn Fn(Option<&Value>, &RequestContext) -> bool + Send + Sync>;

/// Computes the access token lifetime from its claims
pub type TimeoutFn = Arc<dyn Fn(&AccessClaims) -> Duration + Send + Sync>;

/// Payload function storing user data under `identity_key`
pub fn default_payload(identity_key: &str) -> PayloadFn {
    let key = identity_key.to_string();
    Arc::new(move |user_data| AccessClaims::new().with(key.clone(), user_data.clone()))
}

/// Identity handler reading `identity_key` from the claims
pub fn default_identity_handler(identity_key: &str) -> IdentityHandler {
    let key = identity_key.to_string();
    Arc::new(move |claims| claims.get(&key).cloned())
}

/// Authorizer that admits every identity
pub fn allow_all() -> Authorizer {
    Arc::new(|_, _| true)
}

/// Fixed token lifetime
pub fn fixed_timeout(timeout: Duration) -> TimeoutFn {
    Arc::new(move |_| timeout)
}
