use std::sync::Arc;

use arbor_core::BackendError;

use crate::TokenGrant;

/// Token service (external): "is this credential known, and what does it carry?"
///
/// Returns `Ok(None)` for unknown or revoked tokens. Expiry is checked by the
/// caller against the grant's time window.
pub trait TokenService: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Option<TokenGrant>, BackendError>;
}

impl<S> TokenService for Arc<S>
where
    S: TokenService + ?Sized,
{
    fn resolve(&self, token: &str) -> Result<Option<TokenGrant>, BackendError> {
        (**self).resolve(token)
    }
}
