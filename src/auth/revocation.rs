// src/auth/revocation.rs
//! Token revocation on top of the shared cache.
//!
//! Two independent records can invalidate a token:
//!
//! - `token:blacklist:<jti>`: a sentinel that lives exactly as long as the token
//! - `user:signUpdate:<userId>`: a cutoff in epoch millis; every token issued
//!   before it is invalid. Kept for 24 hours.
//!
//! Checks fail open. With the cache down, a revoked token is accepted until
//! the cache comes back; availability wins over strict revocation.

use crate::cache::{CacheResult, CacheStore};
use crate::utils::{Clock, SystemClock};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BLACKLIST_PREFIX: &str = "token:blacklist";
const SIGN_UPDATE_PREFIX: &str = "user:signUpdate";
const BLACKLIST_SENTINEL: &str = "1";
pub const SIGN_UPDATE_TTL_SECS: u64 = 24 * 60 * 60;

/// The subset of JWT claims the ledger needs. Times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Blacklisted,
    SupersededBySignUpdate,
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid)
    }
}

#[derive(Clone)]
pub struct TokenRevocationLedger {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

fn blacklist_key(token_id: &str) -> String {
    format!("{}:{}", BLACKLIST_PREFIX, token_id)
}

fn sign_update_key(user_id: &str) -> String {
    format!("{}:{}", SIGN_UPDATE_PREFIX, user_id)
}

impl TokenRevocationLedger {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock))
    }

    pub fn with_clock(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// `ttl_secs` should be the token's remaining lifetime.
    pub async fn blacklist(&self, token_id: &str, ttl_secs: u64) -> CacheResult<()> {
        let result = self
            .cache
            .set_with_ttl(&blacklist_key(token_id), ttl_secs, BLACKLIST_SENTINEL)
            .await;
        if let Err(e) = &result {
            warn!("Could not blacklist token {}: {}", token_id, e);
        }
        result
    }

    pub async fn is_blacklisted(&self, token_id: &str) -> bool {
        match self.cache.get(&blacklist_key(token_id)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Blacklist lookup failed for {}, allowing token: {}", token_id, e);
                false
            }
        }
    }

    /// Invalidates every token of `user_id` issued before `since_millis`.
    pub async fn invalidate_all_tokens_for_user(
        &self,
        user_id: &str,
        since_millis: i64,
    ) -> CacheResult<()> {
        let result = self
            .cache
            .set_with_ttl(
                &sign_update_key(user_id),
                SIGN_UPDATE_TTL_SECS,
                &since_millis.to_string(),
            )
            .await;
        if let Err(e) = &result {
            warn!("Could not record sign update for user {}: {}", user_id, e);
        }
        result
    }

    pub async fn is_token_invalidated_by_sign_update(
        &self,
        user_id: &str,
        token_issued_at_secs: i64,
    ) -> bool {
        let raw = match self.cache.get(&sign_update_key(user_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!("Sign update lookup failed for {}, allowing token: {}", user_id, e);
                return false;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(cutoff_millis) => token_issued_at_secs.saturating_mul(1000) < cutoff_millis,
            Err(e) => {
                debug!("Ignoring unparsable sign update for {}: {}", user_id, e);
                false
            }
        }
    }

    /// Blacklists the token for whatever lifetime it has left (at least 1s).
    pub async fn revoke(&self, claims: &TokenClaims) -> CacheResult<()> {
        let now_secs = self.clock.now().timestamp();
        let remaining = (claims.exp - now_secs).max(1) as u64;
        self.blacklist(&claims.jti, remaining).await
    }

    pub async fn token_status(&self, claims: &TokenClaims) -> TokenStatus {
        if self.is_blacklisted(&claims.jti).await {
            return TokenStatus::Blacklisted;
        }
        if self
            .is_token_invalidated_by_sign_update(&claims.sub, claims.iat)
            .await
        {
            return TokenStatus::SupersededBySignUpdate;
        }
        TokenStatus::Valid
    }
}
