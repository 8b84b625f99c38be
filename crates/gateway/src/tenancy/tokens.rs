// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enrollment tokens: a hex-random opaque secret handed to a new agent at
//! install time, persisted only as its SHA-256 hash. The plaintext token is
//! returned to the caller once, at creation, and never again.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token not found")]
    NotFound,
    #[error("token expired")]
    Expired,
    #[error("token exhausted: maximum uses reached")]
    Exhausted,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// A freshly created token. `plaintext` must be handed to the caller and
/// never stored; only `token_hash` is persisted.
pub struct CreatedToken {
    pub id: Uuid,
    pub plaintext: String,
}

fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A hex-random opaque token suitable for a bearer session handle. Same
/// generation as an enrollment token's plaintext, reused here since both are
/// "random secret the caller must not be able to guess".
pub fn opaque_token() -> String {
    random_token()
}

/// Hash a password the same way an enrollment token is hashed before
/// storage: the plaintext never touches the database.
pub fn hash_password(plaintext: &str) -> String {
    hash_token(plaintext)
}

pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    hash_token(plaintext) == hash
}

/// Create an enrollment token scoped to `environment_id`, with optional
/// expiry and optional max-uses.
pub async fn create_enrollment_token(
    pool: &PgPool,
    environment_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
) -> Result<CreatedToken, TokenError> {
    let plaintext = random_token();
    let token_hash = hash_token(&plaintext);

    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO enrollment_tokens (token_hash, environment_id, expires_at, max_uses)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(&token_hash)
    .bind(environment_id)
    .bind(expires_at)
    .bind(max_uses)
    .fetch_one(pool)
    .await?;

    Ok(CreatedToken { id, plaintext })
}

/// Validate `token`, atomically incrementing its use count if it is still
/// live, and return the environment it enrolls into.
///
/// Rejects unknown, expired, or exhausted tokens. The expiry/exhaustion
/// guard and the increment happen inside one `UPDATE ... RETURNING`, so
/// concurrent validations against a `max_uses=1` token cannot both succeed:
/// only the row that wins the update sees a returned row, every other
/// concurrent caller sees zero rows affected.
pub async fn validate_enrollment_token(pool: &PgPool, token: &str) -> Result<Uuid, TokenError> {
    let token_hash = hash_token(token);

    let row: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE enrollment_tokens SET use_count = use_count + 1
         WHERE token_hash = $1
           AND (max_uses IS NULL OR use_count < max_uses)
           AND (expires_at IS NULL OR expires_at > now())
         RETURNING environment_id",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    if let Some((environment_id,)) = row {
        return Ok(environment_id);
    }

    // The update matched no row: find out why, to return the right error.
    let existing: Option<(Option<DateTime<Utc>>, Option<i32>, i32)> = sqlx::query_as(
        "SELECT expires_at, max_uses, use_count FROM enrollment_tokens WHERE token_hash = $1",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match existing {
        None => Err(TokenError::NotFound),
        Some((Some(expires_at), _, _)) if expires_at <= Utc::now() => Err(TokenError::Expired),
        Some(_) => Err(TokenError::Exhausted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_not_the_plaintext() {
        let plaintext = "abc123";
        let hash = hash_token(plaintext);
        assert_eq!(hash, hash_token(plaintext));
        assert_ne!(hash, plaintext);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn random_tokens_are_unique() {
        assert_ne!(random_token(), random_token());
    }
}
