use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use sqlx::PgPool;

use crate::{
    AppState, auth,
    error::AppError,
    models::{Answer, CreateAnswerRequest, Question, UpdateAnswerRequest},
};

// ===== Store =====

pub async fn get(db: &PgPool, id: i32) -> Result<Answer, AppError> {
    let answer: Option<Answer> = sqlx::query_as("SELECT * FROM answers WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    answer.ok_or(AppError::NotFound)
}

/// Answers for a question: accepted answer first, then score, then age.
pub async fn list_for_question(db: &PgPool, question_id: i32) -> Result<Vec<Answer>, AppError> {
    let answers: Vec<Answer> = sqlx::query_as(
        "SELECT a.* FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE a.question_id = $1 AND a.is_hidden = FALSE
         ORDER BY COALESCE(a.id = q.accepted_answer_id, FALSE) DESC,
                  a.score DESC, a.created_at ASC",
    )
    .bind(question_id)
    .fetch_all(db)
    .await?;
    Ok(answers)
}

/// Insert the answer and bump the question's answer counter as one
/// transaction, so readers never see the two disagree.
pub async fn create(
    db: &PgPool,
    question_id: i32,
    user_id: &str,
    body: &str,
) -> Result<Answer, AppError> {
    let mut tx = db.begin().await?;

    let bumped = sqlx::query(
        "UPDATE questions SET answer_count = answer_count + 1
         WHERE id = $1 AND is_hidden = FALSE",
    )
    .bind(question_id)
    .execute(&mut *tx)
    .await?;
    if bumped.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    let answer: Answer = sqlx::query_as(
        "INSERT INTO answers (question_id, user_id, body)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(question_id)
    .bind(user_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(answer)
}

pub async fn update(db: &PgPool, id: i32, user_id: &str, body: &str) -> Result<Answer, AppError> {
    let existing = get(db, id).await?;
    if existing.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let answer: Answer = sqlx::query_as(
        "UPDATE answers SET body = $1, updated_at = NOW()
         WHERE id = $2
         RETURNING *",
    )
    .bind(body)
    .bind(id)
    .fetch_one(db)
    .await?;

    Ok(answer)
}

/// Delete an answer, its ledger rows, and the question's counter bump,
/// all in one transaction. An accepted answer loses its accepted mark.
pub async fn delete(db: &PgPool, id: i32, user_id: &str) -> Result<(), AppError> {
    let existing = get(db, id).await?;
    if existing.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM votes WHERE target_kind = 'answer' AND target_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE questions SET
            answer_count = GREATEST(answer_count - 1, 0),
            accepted_answer_id = CASE WHEN accepted_answer_id = $1 THEN NULL
                ELSE accepted_answer_id END
         WHERE id = $2",
    )
    .bind(id)
    .bind(existing.question_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM answers WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Toggle the accepted mark. Only the question's author may accept;
/// accepting the already-accepted answer clears the mark.
pub async fn accept(db: &PgPool, answer_id: i32, user_id: &str) -> Result<Question, AppError> {
    let answer = get(db, answer_id).await?;
    if answer.is_hidden {
        return Err(AppError::NotFound);
    }

    let question: Option<Question> = sqlx::query_as("SELECT * FROM questions WHERE id = $1")
        .bind(answer.question_id)
        .fetch_optional(db)
        .await?;
    let question = question.ok_or(AppError::NotFound)?;

    if question.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let next = if question.accepted_answer_id == Some(answer_id) {
        None
    } else {
        Some(answer_id)
    };

    let updated: Question = sqlx::query_as(
        "UPDATE questions SET accepted_answer_id = $1 WHERE id = $2 RETURNING *",
    )
    .bind(next)
    .bind(question.id)
    .fetch_one(db)
    .await?;

    Ok(updated)
}

// ===== Handlers =====

pub async fn list_answers(
    State(state): State<AppState>,
    Path(question_id): Path<i32>,
) -> Result<Json<Vec<Answer>>, AppError> {
    crate::questions::get_visible(&state.db, question_id).await?;
    let answers = list_for_question(&state.db, question_id).await?;
    Ok(Json(answers))
}

pub async fn create_answer(
    State(state): State<AppState>,
    Path(question_id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<CreateAnswerRequest>,
) -> Result<(StatusCode, Json<Answer>), AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    if req.body.trim().is_empty() {
        return Err(AppError::BadRequest("Body must not be empty".into()));
    }

    let answer = create(&state.db, question_id, &user.id, &req.body).await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

pub async fn update_answer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<UpdateAnswerRequest>,
) -> Result<Json<Answer>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    if req.body.trim().is_empty() {
        return Err(AppError::BadRequest("Body must not be empty".into()));
    }

    let answer = update(&state.db, id, &user.id, &req.body).await?;
    Ok(Json(answer))
}

pub async fn delete_answer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    delete(&state.db, id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn accept_answer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<Question>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    let question = accept(&state.db, id, &user.id).await?;
    Ok(Json(question))
}
