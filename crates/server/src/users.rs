use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::{
    AppState, auth,
    error::{AppError, unique_conflict},
    models::{Profile, UpdateMeRequest, User},
};

const MAX_USERNAME_LEN: usize = 40;

// ===== Handlers =====

pub async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;

    let row: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(row))
}

pub async fn update_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<User>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;

    let username = req.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }

    let row: User = sqlx::query_as(
        "UPDATE users SET username = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(username)
    .bind(&user.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| unique_conflict(e, "Username is already taken"))?;

    Ok(Json(row))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Profile>, AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(&username)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or(AppError::NotFound)?;

    let question_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions WHERE user_id = $1 AND is_hidden = FALSE",
    )
    .bind(&user.id)
    .fetch_one(&state.db)
    .await?;

    let answer_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM answers WHERE user_id = $1 AND is_hidden = FALSE",
    )
    .bind(&user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(Profile {
        username: user.username,
        role: user.role,
        question_count,
        answer_count,
        created_at: user.created_at,
    }))
}
