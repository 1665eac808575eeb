use axum::http::HeaderMap;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use supabase_jwt::{Claims, JwksCache};

use crate::{AppState, error::AppError, models::User};

/// Authenticated caller, resolved to the local profile row.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub username: String,
    pub role: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_header = headers.get("Authorization").and_then(|h| h.to_str().ok())?;
    let token = auth_header.strip_prefix("Bearer ")?;
    if token.is_empty() { None } else { Some(token) }
}

fn is_expired(exp: i64) -> bool {
    Utc::now().timestamp() > exp
}

/// Verify the auth provider's JWT against its JWKS and return the subject.
/// The subject identity is trusted verbatim; no credential handling
/// happens on this side.
pub async fn verify_jwt(
    jwks_cache: &Arc<JwksCache>,
    headers: &HeaderMap,
) -> Result<String, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;

    let claims = Claims::from_token(token, jwks_cache).await;

    match claims {
        Err(_) => Err(AppError::Unauthorized),
        Ok(claims) if is_expired(claims.exp as i64) => Err(AppError::Unauthorized),
        Ok(claims) => Ok(claims.sub),
    }
}

/// Full authentication: verify the token, provision the local profile on
/// first sight of a new subject, reject banned users.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, AppError> {
    let subject = verify_jwt(&state.jwks_cache, headers).await?;
    let user = ensure_user(&state.db, &subject).await?;

    if user.role == "banned" {
        return Err(AppError::Forbidden);
    }

    Ok(AuthedUser {
        id: user.id,
        username: user.username,
        role: user.role,
    })
}

pub fn require_admin(user: &AuthedUser) -> Result<(), AppError> {
    if user.role != "admin" {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Get-or-create the profile row for a provider subject. Two concurrent
/// first requests race to insert; ON CONFLICT makes the loser fall
/// through to the winner's row.
pub async fn ensure_user(db: &PgPool, subject: &str) -> Result<User, AppError> {
    let inserted = sqlx::query(
        "INSERT INTO users (id, username) VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(subject)
    .bind(format!("user_{subject}"))
    .execute(db)
    .await?;

    if inserted.rows_affected() > 0 {
        tracing::info!("Provisioned profile for subject {}", subject);
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(subject)
        .fetch_one(db)
        .await?;

    Ok(user)
}
