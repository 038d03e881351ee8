//! Authentication gateway for Keycloak-backed services.
//!
//! The gateway fronts a Keycloak realm with a small HTTP API: credential
//! and token exchange with a sliding-window brute-force lockout, claim
//! normalization into flat authority strings, an append-only audit ledger
//! in PostgreSQL, and administrative user/role pass-through.

pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod keycloak;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
