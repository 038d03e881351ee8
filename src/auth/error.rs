//! Failure taxonomy for the authentication gateway.
//!
//! Raw transport and protocol errors from the identity provider never cross
//! the gateway boundary; they are translated into [`AuthFailure`] at the
//! provider client.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The provider rejected the supplied credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The lockout gate vetoed the attempt before the provider was called.
    #[error("account locked after repeated failed login attempts")]
    AccountLocked,

    /// The provider rejected the refresh token.
    #[error("invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    /// Transport-level failure or timeout talking to the provider. Does not
    /// count toward lockout.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered 2xx with a body the gateway cannot use.
    #[error("identity provider returned a malformed response: {0}")]
    ProviderMalformedResponse(String),
}
