//! Authentication and authorization core: the token gateway, the lockout
//! policy, claim normalization, and the authorization evaluator.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod gateway;
pub mod lockout;
pub mod principal;

pub use authorize::{authorize, authorize_self_or};
pub use claims::ClaimSet;
pub use error::AuthFailure;
pub use gateway::{AuthGateway, IdentityProvider, TokenBundle};
pub use lockout::{LockoutDecision, LockoutPolicy};
pub use principal::Principal;
