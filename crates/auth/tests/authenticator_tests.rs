use std::collections::HashSet;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ideabridge_auth::{AuthError, Authenticator, UserRole};
use ideabridge_config::AuthConfig;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

fn default_auth_config() -> AuthConfig {
    AuthConfig {
        session_ttl_seconds: 3_600,
    }
}

struct TestContext {
    pool: SqlitePool,
    authenticator: Authenticator,
    _temp_dir: TempDir,
    config: AuthConfig,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        let config = default_auth_config();
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("auth.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let mut options = SqliteConnectOptions::from_str(&db_url)?;
        options = options.create_if_missing(true);
        options = options.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        let authenticator = Authenticator::new(pool.clone(), config.clone());

        Ok(Self {
            pool,
            authenticator,
            _temp_dir: temp_dir,
            config,
        })
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }
}

#[tokio::test]
async fn register_persists_user_with_role_and_argon2_hash() -> TestResult {
    let ctx = TestContext::new().await?;

    let user = ctx
        .authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let (role, hash): (String, String) =
        sqlx::query_as("SELECT role, password_hash FROM users WHERE id = ?")
            .bind(user.id)
            .fetch_one(ctx.pool())
            .await?;

    assert_eq!(role, "innovator");
    assert!(hash.starts_with("$argon2"), "secret must be an argon2 hash");
    assert_eq!(user.role, UserRole::Innovator);

    Ok(())
}

#[tokio::test]
async fn register_rejects_duplicate_email() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let err = ctx
        .authenticator()
        .register("alice@example.com", "another", UserRole::Investor, None)
        .await
        .expect_err("expected duplicate email to fail");

    assert!(matches!(err, AuthError::UserExists));

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(user_count, 1, "no additional users should be created");

    Ok(())
}

#[tokio::test]
async fn register_salts_identical_passwords_differently() -> TestResult {
    let ctx = TestContext::new().await?;

    let first = ctx
        .authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;
    let second = ctx
        .authenticator()
        .register("bob@example.com", "s3cret", UserRole::Investor, None)
        .await?;

    let first_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(first.id)
        .fetch_one(ctx.pool())
        .await?;
    let second_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(second.id)
        .fetch_one(ctx.pool())
        .await?;

    assert_ne!(
        first_hash, second_hash,
        "argon2 salts should differ per registration"
    );

    Ok(())
}

#[tokio::test]
async fn login_returns_session_honouring_configured_ttl() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let session = ctx
        .authenticator()
        .login("alice@example.com", "s3cret")
        .await?;

    let ttl = Duration::seconds(ctx.config.session_ttl_seconds as i64);
    let remaining = session.expires_at - Utc::now();
    assert!(
        (remaining - ttl).num_seconds().abs() <= 2,
        "session ttl should respect configuration"
    );

    let stored_expires: String =
        sqlx::query_scalar("SELECT expires_at FROM sessions WHERE token = ?")
            .bind(&session.token)
            .fetch_one(ctx.pool())
            .await?;
    let parsed = DateTime::parse_from_rfc3339(&stored_expires)?.with_timezone(&Utc);
    assert_eq!(parsed, session.expires_at);

    Ok(())
}

#[tokio::test]
async fn login_rejects_incorrect_password() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let err = ctx
        .authenticator()
        .login("alice@example.com", "bad-secret")
        .await
        .expect_err("expected invalid password");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let session_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(session_count, 0, "no sessions should be issued on failure");

    Ok(())
}

#[tokio::test]
async fn login_rejects_unknown_email() -> TestResult {
    let ctx = TestContext::new().await?;
    let err = ctx
        .authenticator()
        .login("unknown@example.com", "secret")
        .await
        .expect_err("expected unknown email to fail");
    assert!(matches!(err, AuthError::InvalidCredentials));
    Ok(())
}

#[tokio::test]
async fn authenticate_token_resolves_user_and_session() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx
        .authenticator()
        .register(
            "alice@example.com",
            "s3cret",
            UserRole::Investor,
            Some("Alice Example"),
        )
        .await?;
    let session = ctx
        .authenticator()
        .login("alice@example.com", "s3cret")
        .await?;

    let (resolved_user, resolved_session) = ctx
        .authenticator()
        .authenticate_token(&session.token)
        .await?;

    assert_eq!(resolved_user.id, user.id);
    assert_eq!(resolved_user.role, UserRole::Investor);
    assert_eq!(resolved_user.display_name.as_deref(), Some("Alice Example"));
    assert_eq!(resolved_session.token, session.token);
    Ok(())
}

#[tokio::test]
async fn authenticate_token_deletes_expired_sessions() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx
        .authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let token = "expired-token";
    let created_at = (Utc::now() - Duration::hours(2)).to_rfc3339();
    let expires_at = (Utc::now() - Duration::hours(1)).to_rfc3339();

    sqlx::query(
        "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(token)
    .bind(&created_at)
    .bind(&expires_at)
    .execute(ctx.pool())
    .await?;

    let err = ctx
        .authenticator()
        .authenticate_token(token)
        .await
        .expect_err("expired token should be rejected");
    assert!(matches!(err, AuthError::SessionExpired));

    let remaining: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(ctx.pool())
        .await?;
    assert!(
        remaining.is_none(),
        "expired session should be removed from the database"
    );

    Ok(())
}

#[tokio::test]
async fn authenticate_token_rejects_unknown_token() -> TestResult {
    let ctx = TestContext::new().await?;
    let err = ctx
        .authenticator()
        .authenticate_token("missing-token")
        .await
        .expect_err("unknown token should not authenticate");
    assert!(matches!(err, AuthError::SessionNotFound));
    Ok(())
}

#[tokio::test]
async fn session_tokens_are_unique_and_urlsafe() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.authenticator()
        .register("alice@example.com", "s3cret", UserRole::Innovator, None)
        .await?;

    let mut tokens = HashSet::new();
    for _ in 0..5 {
        let session = ctx
            .authenticator()
            .login("alice@example.com", "s3cret")
            .await?;
        assert!(
            URL_SAFE_NO_PAD.decode(session.token.as_bytes()).is_ok(),
            "token should be URL safe base64"
        );
        assert!(
            tokens.insert(session.token.clone()),
            "tokens should be unique per session"
        );
    }
    Ok(())
}

#[tokio::test]
async fn user_role_round_trips_through_storage() -> TestResult {
    let ctx = TestContext::new().await?;

    for (email, role) in [
        ("innovator@example.com", UserRole::Innovator),
        ("investor@example.com", UserRole::Investor),
        ("admin@example.com", UserRole::Admin),
    ] {
        let user = ctx
            .authenticator()
            .register(email, "s3cret", role, None)
            .await?;
        let fetched = ctx.authenticator().user_profile(user.id).await?;
        assert_eq!(fetched.role, role);
    }

    Ok(())
}

#[test]
fn user_role_parse_rejects_unknown_values() {
    let err = UserRole::parse("superuser").expect_err("unknown role should fail");
    assert!(matches!(err, AuthError::UnknownRole(_)));
    assert_eq!(UserRole::parse("investor").unwrap(), UserRole::Investor);
}
