//! Store-backed session lifecycle tests.
//!
//! These run only when `VETURI_TEST_DSN` points at a disposable Postgres
//! database; without it each test is a no-op.

use super::state::AuthConfig;
use super::storage::{
    expire_now, insert_user, new_triple, new_triple_at, renew_from_refresh, store_triple,
    validate_refresh, validate_session, verify_credentials, RegisterOutcome, SessionUser,
    TokenTriple,
};
use super::utils::{generate_token, hash_password};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("VETURI_TEST_DSN") else {
        eprintln!("Skipping integration test: VETURI_TEST_DSN not set");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await
        .context("failed to connect test pool")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(Some(pool))
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn unique_username(prefix: &str) -> Result<String> {
    let token = generate_token()?;
    Ok(format!("{prefix}-{}", &token[..8]))
}

async fn register(
    pool: &PgPool,
    username: &str,
    password: &str,
    config: &AuthConfig,
) -> Result<(SessionUser, TokenTriple)> {
    let triple = new_triple(config)?;
    let outcome = insert_user(pool, "Test User", username, &hash_password(password)?, &triple)
        .await?;
    match outcome {
        RegisterOutcome::Created(user) => Ok((user, triple)),
        RegisterOutcome::Conflict => Err(anyhow!("unexpected username conflict")),
    }
}

async fn stored_password_hash(pool: &PgPool, username: &str) -> Result<String> {
    let row = sqlx::query("SELECT password_hash FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(pool)
        .await
        .context("failed to fetch password hash")?;
    Ok(row.get("password_hash"))
}

#[tokio::test]
async fn issued_session_validates_immediately() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("issue")?;
    let (user, triple) = register(&pool, &username, "pw1", &config).await?;

    let validated = validate_session(&pool, &triple.session_token).await?;
    assert_eq!(validated.map(|found| found.id), Some(user.id));

    let refreshed = validate_refresh(&pool, &triple.refresh_token).await?;
    assert_eq!(refreshed.map(|found| found.id), Some(user.id));

    Ok(())
}

#[tokio::test]
async fn renew_rotates_both_tokens_and_extends_expiration() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("alice")?;
    let (user, _) = register(&pool, &username, "pw1", &config).await?;

    // Re-issue a triple stamped in the past so the renewal visibly extends it.
    let old_triple = new_triple_at(&config, Utc::now() - Duration::seconds(10))?;
    store_triple(&pool, user.id, &old_triple).await?;

    let (renewed_user, fresh) = renew_from_refresh(&pool, &old_triple.refresh_token, &config)
        .await?
        .context("refresh token should be renewable")?;

    assert_eq!(renewed_user.id, user.id);
    assert_ne!(fresh.session_token, old_triple.session_token);
    assert_ne!(fresh.refresh_token, old_triple.refresh_token);
    assert!(fresh.session_expires_at > old_triple.session_expires_at);

    // The old session token no longer validates; the new one does.
    assert!(validate_session(&pool, &old_triple.session_token)
        .await?
        .is_none());
    assert_eq!(
        validate_session(&pool, &fresh.session_token)
            .await?
            .map(|found| found.id),
        Some(user.id)
    );

    // The old refresh token was rotated away as well.
    assert!(renew_from_refresh(&pool, &old_triple.refresh_token, &config)
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn expired_session_fails_validation_without_crashing() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("expired")?;
    let (user, triple) = register(&pool, &username, "pw1", &config).await?;

    sqlx::query("UPDATE users SET session_expires_at = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .context("failed to expire session")?;

    assert!(validate_session(&pool, &triple.session_token)
        .await?
        .is_none());

    // Refresh tokens are unaffected by session expiry in the default config.
    assert_eq!(
        validate_refresh(&pool, &triple.refresh_token)
            .await?
            .map(|found| found.id),
        Some(user.id)
    );
    assert!(renew_from_refresh(&pool, &triple.refresh_token, &config)
        .await?
        .is_some());

    Ok(())
}

#[tokio::test]
async fn logout_invalidates_unchanged_token() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("logout")?;
    let (user, triple) = register(&pool, &username, "pw1", &config).await?;

    assert!(validate_session(&pool, &triple.session_token)
        .await?
        .is_some());

    expire_now(&pool, user.id).await?;

    // Same token string, expired session.
    assert!(validate_session(&pool, &triple.session_token)
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn duplicate_username_leaves_existing_identity_untouched() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("dup")?;
    let (_, _) = register(&pool, &username, "pw1", &config).await?;
    let original_hash = stored_password_hash(&pool, &username).await?;

    let triple = new_triple(&config)?;
    let outcome = insert_user(
        &pool,
        "Impostor",
        &username,
        &hash_password("other-password")?,
        &triple,
    )
    .await?;

    assert!(matches!(outcome, RegisterOutcome::Conflict));
    assert_eq!(stored_password_hash(&pool, &username).await?, original_hash);

    Ok(())
}

#[tokio::test]
async fn credentials_verify_only_the_exact_password() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new();
    let username = unique_username("creds")?;
    let (user, _) = register(&pool, &username, "pw1", &config).await?;
    let stored_hash = stored_password_hash(&pool, &username).await?;

    assert_eq!(
        verify_credentials(&pool, &username, "pw1")
            .await?
            .map(|found| found.id),
        Some(user.id)
    );
    assert!(verify_credentials(&pool, &username, "pw2").await?.is_none());
    assert!(verify_credentials(&pool, &username, "").await?.is_none());
    assert!(verify_credentials(&pool, &username, &stored_hash)
        .await?
        .is_none());
    assert!(verify_credentials(&pool, "no-such-user", "pw1")
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn configured_refresh_ttl_is_enforced() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let config = AuthConfig::new().with_refresh_ttl_seconds(Some(60));
    let username = unique_username("refresh-ttl")?;
    let (user, _) = register(&pool, &username, "pw1", &config).await?;

    // Stamp the triple far enough back that the refresh TTL has elapsed.
    let stale = new_triple_at(&config, Utc::now() - Duration::seconds(120))?;
    store_triple(&pool, user.id, &stale).await?;

    assert!(validate_refresh(&pool, &stale.refresh_token)
        .await?
        .is_none());
    assert!(renew_from_refresh(&pool, &stale.refresh_token, &config)
        .await?
        .is_none());

    Ok(())
}
