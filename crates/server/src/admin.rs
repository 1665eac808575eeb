use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    AppState, auth,
    error::AppError,
    models::{
        Answer, ExportVote, HideRequest, ListParams, Paginated, Question, Stats, Tag, TagRequest,
        TargetKind, UpdateRoleRequest, User, VoteDirection, pagination,
    },
    tags, votes,
};

const ROLES: [&str; 4] = ["user", "moderator", "admin", "banned"];

// ===== Store =====

/// Remove every vote a user has cast. This is the administrative cleanup
/// path that mutates the ledger outside the vote service; each deleted
/// row still runs the score maintenance step on the purge transaction,
/// so target scores stay consistent with the ledger throughout.
pub async fn purge_votes(db: &PgPool, user_id: &str) -> Result<u64, AppError> {
    let mut tx = db.begin().await?;

    let rows = sqlx::query(
        "SELECT id, target_kind, target_id, direction FROM votes
         WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut purged = 0u64;
    for row in rows {
        let vote_id: Uuid = row.try_get(0)?;
        let raw_kind: String = row.try_get(1)?;
        let target_id: i32 = row.try_get(2)?;
        let raw_direction: i16 = row.try_get(3)?;

        let kind = TargetKind::parse(&raw_kind)
            .ok_or_else(|| AppError::BadRequest(format!("Corrupt vote row {vote_id}")))?;
        let direction = VoteDirection::from_value(raw_direction)
            .ok_or_else(|| AppError::BadRequest(format!("Corrupt vote row {vote_id}")))?;

        sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(vote_id)
            .execute(&mut *tx)
            .await?;
        votes::vote_removed(&mut tx, kind, target_id, direction).await?;
        purged += 1;
    }

    tx.commit().await?;
    tracing::info!("Purged {} votes for user {}", purged, user_id);
    Ok(purged)
}

pub async fn set_hidden(
    db: &PgPool,
    kind: TargetKind,
    id: i32,
    hidden: bool,
) -> Result<(), AppError> {
    let sql = format!("UPDATE {} SET is_hidden = $1 WHERE id = $2", kind.table());
    let updated = sqlx::query(&sql)
        .bind(hidden)
        .bind(id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

// ===== Handlers =====

pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Stats>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;
    let total_questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&state.db)
        .await?;
    let total_answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers")
        .fetch_one(&state.db)
        .await?;
    let total_votes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes")
        .fetch_one(&state.db)
        .await?;
    let users_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= CURRENT_DATE")
            .fetch_one(&state.db)
            .await?;
    let questions_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE created_at >= CURRENT_DATE")
            .fetch_one(&state.db)
            .await?;

    Ok(Json(Stats {
        total_users,
        total_questions,
        total_answers,
        total_votes,
        users_today,
        questions_today,
    }))
}

/// Dump the raw ledger, newest first.
pub async fn export_votes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ExportVote>>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let votes: Vec<ExportVote> = sqlx::query_as(
        "SELECT user_id, target_kind, target_id, direction, created_at
         FROM votes
         ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(votes))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<Paginated<User>>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let (page, per_page, offset) = pagination(params.page, params.per_page);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;
    let items: Vec<User> =
        sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(Paginated {
        items,
        total,
        page,
        per_page,
    }))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    if !ROLES.contains(&req.role.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Role must be one of: {}",
            ROLES.join(", ")
        )));
    }

    let updated: Option<User> = sqlx::query_as(
        "UPDATE users SET role = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(&req.role)
    .bind(&id)
    .fetch_optional(&state.db)
    .await?;

    updated.map(Json).ok_or(AppError::NotFound)
}

pub async fn purge_user_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let purged = purge_votes(&state.db, &id).await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

/// Moderation hide/unhide. Keeps ledger history intact: the vote rows and
/// the score survive, the content just drops out of public reads.
pub async fn hide_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<HideRequest>,
) -> Result<Json<Question>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    set_hidden(&state.db, TargetKind::Question, id, req.hidden).await?;
    let question = crate::questions::get(&state.db, id).await?;
    Ok(Json(question))
}

pub async fn hide_answer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<HideRequest>,
) -> Result<Json<Answer>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    set_hidden(&state.db, TargetKind::Answer, id, req.hidden).await?;
    let answer = crate::answers::get(&state.db, id).await?;
    Ok(Json(answer))
}

pub async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TagRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let tag = tags::create(&state.db, &req.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<TagRequest>,
) -> Result<Json<Tag>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    let tag = tags::rename(&state.db, id, &req.name).await?;
    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    auth::require_admin(&user)?;

    tags::remove(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
