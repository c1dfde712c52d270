//! CI identity trust: key set, token verification and run attestation.
//!
//! # Flow
//!
//! ```text
//! bearer token → TokenVerifier (KeySetCache) → IdentityClaims
//!              → RunAttestor (live run-history query)
//! ```
//!
//! A verified token proves who is asking; [`crate::bind::ClaimBinder`]
//! then proves the request is consistent with that identity.

pub mod attest;
pub mod claims;
pub mod jwks;
pub mod verifier;

pub use attest::RunAttestor;
pub use claims::IdentityClaims;
pub use jwks::{KeyLookupError, KeySetCache, SigningKey};
pub use verifier::TokenVerifier;
