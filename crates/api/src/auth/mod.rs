//! Authentication primitives.
//!
//! - [`jwt`] -- bearer-token validation against the identity provider's
//!   HS256 signing secret (plus a generator used by tests and dev tooling).

pub mod jwt;
