//! Token bookkeeping for the API surface.

pub mod revocation;

pub use revocation::{TokenClaims, TokenRevocationLedger, TokenStatus};
