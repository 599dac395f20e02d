//! Resolution of request credentials to the calling party.
//!
//! Every lookup failure, including a broken backing store, is reported as an
//! error so callers fail closed.

use std::{collections::HashMap, fmt::Write as _};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use shared::models::PartyId;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no credentials presented")]
    MissingCredentials,
    #[error("unknown or expired session")]
    UnknownSession,
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token or session cookie value to its party.
    async fn current_party(&self, credential: &str) -> Result<PartyId, IdentityError>;
}

/// Hex SHA-256 of a session token; only hashes are stored.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Looks credentials up in the `sessions` table.
#[derive(Debug, Clone)]
pub struct PgSessionIdentity {
    pool: PgPool,
}

impl PgSessionIdentity {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgSessionIdentity {
    async fn current_party(&self, credential: &str) -> Result<PartyId, IdentityError> {
        let party = sqlx::query_scalar::<_, String>(
            "SELECT party_id FROM sessions WHERE token_hash = $1 AND expires_at > now()",
        )
        .bind(hash_token(credential))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| IdentityError::Lookup(err.to_string()))?;

        party.map(PartyId::new).ok_or(IdentityError::UnknownSession)
    }
}

/// Fixed token table, configured under `auth.static_tokens`.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, PartyId>,
}

impl StaticIdentity {
    pub fn new<I, T, P>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (T, P)>,
        T: Into<String>,
        P: Into<PartyId>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, party)| (token.into(), party.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_party(&self, credential: &str) -> Result<PartyId, IdentityError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(IdentityError::UnknownSession)
    }
}
