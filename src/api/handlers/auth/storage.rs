//! Store operations for the session authenticator.
//!
//! Every operation takes the pool explicitly; there is no process-wide
//! database handle. Expiration comparisons happen in Rust so the predicates
//! stay testable without a clock inside the database.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::state::AuthConfig;
use super::utils::{generate_token, hash_token, verify_password};

/// Minimal identity attached to a validated session or refresh token.
#[derive(Clone, Debug)]
pub(crate) struct SessionUser {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) username: String,
}

/// Raw token pair plus expirations, handed to the client exactly once.
#[derive(Debug)]
pub(crate) struct TokenTriple {
    pub(crate) session_token: String,
    pub(crate) refresh_token: String,
    pub(crate) session_expires_at: DateTime<Utc>,
    pub(crate) refresh_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) enum RegisterOutcome {
    Created(SessionUser),
    Conflict,
}

/// Mint a fresh token pair with expirations measured from `now`.
pub(crate) fn new_triple_at(config: &AuthConfig, now: DateTime<Utc>) -> Result<TokenTriple> {
    Ok(TokenTriple {
        session_token: generate_token()?,
        refresh_token: generate_token()?,
        session_expires_at: now + Duration::seconds(config.session_ttl_seconds()),
        refresh_expires_at: config
            .refresh_ttl_seconds()
            .map(|ttl| now + Duration::seconds(ttl)),
    })
}

pub(crate) fn new_triple(config: &AuthConfig) -> Result<TokenTriple> {
    new_triple_at(config, Utc::now())
}

/// Session tokens are valid strictly before their expiration instant.
pub(crate) fn session_still_valid(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now < expires_at
}

/// Refresh tokens without a stored expiration never expire.
pub(crate) fn refresh_still_valid(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |at| now < at)
}

/// Create a user with its first session triple in one statement.
///
/// A username conflict leaves the existing identity untouched, including its
/// stored credential hash.
pub(crate) async fn insert_user(
    pool: &PgPool,
    name: &str,
    username: &str,
    password_hash: &str,
    triple: &TokenTriple,
) -> Result<RegisterOutcome> {
    let query = r"
        INSERT INTO users
            (name, username, password_hash, session_token_hash, refresh_token_hash,
             session_expires_at, refresh_expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (username) DO NOTHING
        RETURNING id, name, username
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(username)
        .bind(password_hash)
        .bind(hash_token(&triple.session_token))
        .bind(hash_token(&triple.refresh_token))
        .bind(triple.session_expires_at)
        .bind(triple.refresh_expires_at)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to insert user")?;

    Ok(row.map_or(RegisterOutcome::Conflict, |row| {
        RegisterOutcome::Created(SessionUser {
            id: row.get("id"),
            name: row.get("name"),
            username: row.get("username"),
        })
    }))
}

/// Overwrite a user's session triple (issue/renew).
pub(crate) async fn store_triple(pool: &PgPool, user_id: i64, triple: &TokenTriple) -> Result<()> {
    let query = r"
        UPDATE users
        SET session_token_hash = $1,
            refresh_token_hash = $2,
            session_expires_at = $3,
            refresh_expires_at = $4
        WHERE id = $5
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(hash_token(&triple.session_token))
        .bind(hash_token(&triple.refresh_token))
        .bind(triple.session_expires_at)
        .bind(triple.refresh_expires_at)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store session triple")?;
    Ok(())
}

/// Resolve a session token to its user, if the token is known and unexpired.
///
/// Unknown and expired tokens are indistinguishable to callers.
pub(crate) async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>> {
    let query = r"
        SELECT id, name, username, session_expires_at
        FROM users
        WHERE session_token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session token")?;

    Ok(row.and_then(|row| {
        let expires_at: DateTime<Utc> = row.get("session_expires_at");
        session_still_valid(expires_at, Utc::now()).then(|| SessionUser {
            id: row.get("id"),
            name: row.get("name"),
            username: row.get("username"),
        })
    }))
}

/// Resolve a refresh token to its user.
///
/// There is no expiration check unless a refresh TTL was configured.
pub(crate) async fn validate_refresh(pool: &PgPool, token: &str) -> Result<Option<SessionUser>> {
    let query = r"
        SELECT id, name, username, refresh_expires_at
        FROM users
        WHERE refresh_token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup refresh token")?;

    Ok(row.and_then(|row| {
        let expires_at: Option<DateTime<Utc>> = row.get("refresh_expires_at");
        refresh_still_valid(expires_at, Utc::now()).then(|| SessionUser {
            id: row.get("id"),
            name: row.get("name"),
            username: row.get("username"),
        })
    }))
}

/// Rotate both tokens and reset expiration for the refresh token's owner.
///
/// A single UPDATE keeps concurrent renewals atomic; the loser of a race
/// simply overwrites the winner (last write wins).
pub(crate) async fn renew_from_refresh(
    pool: &PgPool,
    refresh_token: &str,
    config: &AuthConfig,
) -> Result<Option<(SessionUser, TokenTriple)>> {
    let triple = new_triple(config)?;
    let query = r"
        UPDATE users
        SET session_token_hash = $1,
            refresh_token_hash = $2,
            session_expires_at = $3,
            refresh_expires_at = $4
        WHERE refresh_token_hash = $5
          AND (refresh_expires_at IS NULL OR refresh_expires_at > $6)
        RETURNING id, name, username
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(&triple.session_token))
        .bind(hash_token(&triple.refresh_token))
        .bind(triple.session_expires_at)
        .bind(triple.refresh_expires_at)
        .bind(hash_token(refresh_token))
        .bind(Utc::now())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to renew session")?;

    Ok(row.map(|row| {
        (
            SessionUser {
                id: row.get("id"),
                name: row.get("name"),
                username: row.get("username"),
            },
            triple,
        )
    }))
}

/// Force-expire the current session without touching the tokens themselves.
/// Later validation fails the expiration check naturally.
pub(crate) async fn expire_now(pool: &PgPool, user_id: i64) -> Result<()> {
    let query = "UPDATE users SET session_expires_at = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to expire session")?;
    Ok(())
}

/// Check a username/password pair against the stored credential hash.
///
/// A missing user and a wrong password produce the same `None`.
pub(crate) async fn verify_credentials(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> Result<Option<SessionUser>> {
    let query = r"
        SELECT id, name, username, password_hash
        FROM users
        WHERE username = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by username")?;

    Ok(row.and_then(|row| {
        let stored_hash: String = row.get("password_hash");
        verify_password(password, &stored_hash).then(|| SessionUser {
            id: row.get("id"),
            name: row.get("name"),
            username: row.get("username"),
        })
    }))
}
