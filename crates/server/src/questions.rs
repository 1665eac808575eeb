use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use sqlx::PgPool;

use crate::{
    AppState, auth,
    error::AppError,
    models::{
        CreateQuestionRequest, ListParams, Paginated, Question, QuestionDetail, QuestionSummary,
        SearchParams, UpdateQuestionRequest, pagination,
    },
    tags,
};

const MAX_TITLE_LEN: usize = 200;
const MAX_TAGS: usize = 5;

fn order_clause(sort: &str) -> &'static str {
    match sort {
        "top" => "q.score DESC, q.created_at DESC",
        "active" => "q.updated_at DESC, q.id DESC",
        // "new" (default)
        _ => "q.created_at DESC, q.id DESC",
    }
}

fn validate_question(title: &str, body: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".into()));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("Body must not be empty".into()));
    }
    Ok(())
}

// ===== Store =====

pub async fn list(
    db: &PgPool,
    sort: &str,
    tag_slug: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Question>, i64), AppError> {
    let order = order_clause(sort);

    let (total, items) = match tag_slug {
        None => {
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_hidden = FALSE")
                    .fetch_one(db)
                    .await?;

            let sql = format!(
                "SELECT q.* FROM questions q
                 WHERE q.is_hidden = FALSE
                 ORDER BY {order}
                 LIMIT $1 OFFSET $2"
            );
            let items: Vec<Question> = sqlx::query_as(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(db)
                .await?;
            (total, items)
        }
        Some(slug) => {
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM questions q
                 JOIN question_tags qt ON qt.question_id = q.id
                 JOIN tags t ON t.id = qt.tag_id
                 WHERE q.is_hidden = FALSE AND t.slug = $1",
            )
            .bind(slug)
            .fetch_one(db)
            .await?;

            let sql = format!(
                "SELECT q.* FROM questions q
                 JOIN question_tags qt ON qt.question_id = q.id
                 JOIN tags t ON t.id = qt.tag_id
                 WHERE q.is_hidden = FALSE AND t.slug = $1
                 ORDER BY {order}
                 LIMIT $2 OFFSET $3"
            );
            let items: Vec<Question> = sqlx::query_as(&sql)
                .bind(slug)
                .bind(limit)
                .bind(offset)
                .fetch_all(db)
                .await?;
            (total, items)
        }
    };

    Ok((items, total))
}

pub async fn get(db: &PgPool, id: i32) -> Result<Question, AppError> {
    let question: Option<Question> = sqlx::query_as("SELECT * FROM questions WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    question.ok_or(AppError::NotFound)
}

/// Variant for public reads: moderation-hidden questions look deleted.
pub async fn get_visible(db: &PgPool, id: i32) -> Result<Question, AppError> {
    let question = get(db, id).await?;
    if question.is_hidden {
        return Err(AppError::NotFound);
    }
    Ok(question)
}

pub async fn create(
    db: &PgPool,
    user_id: &str,
    title: &str,
    body: &str,
    tag_names: &[String],
) -> Result<Question, AppError> {
    let tag_ids = tags::get_or_create(db, tag_names).await?;

    let mut tx = db.begin().await?;

    let question: Question = sqlx::query_as(
        "INSERT INTO questions (user_id, title, body)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(user_id)
    .bind(title.trim())
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO question_tags (question_id, tag_id) VALUES ($1, $2)")
            .bind(question.id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(question)
}

pub async fn update(
    db: &PgPool,
    id: i32,
    user_id: &str,
    title: &str,
    body: &str,
) -> Result<Question, AppError> {
    let existing = get(db, id).await?;
    if existing.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let question: Question = sqlx::query_as(
        "UPDATE questions SET title = $1, body = $2, updated_at = NOW()
         WHERE id = $3
         RETURNING *",
    )
    .bind(title.trim())
    .bind(body)
    .bind(id)
    .fetch_one(db)
    .await?;

    Ok(question)
}

/// Delete a question together with every ledger row referencing it or its
/// answers. The answer rows go via FK cascade; their ledger rows carry no
/// FK to the polymorphic target, so they are cleared here in the same
/// transaction.
pub async fn delete(db: &PgPool, id: i32, user_id: &str) -> Result<(), AppError> {
    let existing = get(db, id).await?;
    if existing.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let mut tx = db.begin().await?;

    sqlx::query(
        "DELETE FROM votes
         WHERE (target_kind = 'question' AND target_id = $1)
            OR (target_kind = 'answer' AND target_id IN
                (SELECT id FROM answers WHERE question_id = $1))",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn search(
    db: &PgPool,
    query: &str,
    sort: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Question>, i64), AppError> {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{escaped}%");

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions q
         WHERE q.is_hidden = FALSE AND (q.title ILIKE $1 OR q.body ILIKE $1)",
    )
    .bind(&pattern)
    .fetch_one(db)
    .await?;

    let sql = format!(
        "SELECT q.* FROM questions q
         WHERE q.is_hidden = FALSE AND (q.title ILIKE $1 OR q.body ILIKE $1)
         ORDER BY {}
         LIMIT $2 OFFSET $3",
        order_clause(sort)
    );
    let items: Vec<Question> = sqlx::query_as(&sql)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

    Ok((items, total))
}

async fn with_tags(
    db: &PgPool,
    questions: Vec<Question>,
) -> Result<Vec<QuestionSummary>, AppError> {
    let ids: Vec<i32> = questions.iter().map(|q| q.id).collect();
    let mut tag_map = tags::for_questions(db, &ids).await?;

    Ok(questions
        .into_iter()
        .map(|q| {
            let tags = tag_map.remove(&q.id).unwrap_or_default();
            QuestionSummary { question: q, tags }
        })
        .collect())
}

// ===== Handlers =====

pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Paginated<QuestionSummary>>, AppError> {
    let (page, per_page, offset) = pagination(params.page, params.per_page);
    let sort = params.sort.as_deref().unwrap_or("new");

    let (questions, total) = list(
        &state.db,
        sort,
        params.tag.as_deref(),
        per_page as i64,
        offset,
    )
    .await?;

    let items = with_tags(&state.db, questions).await?;

    Ok(Json(Paginated {
        items,
        total,
        page,
        per_page,
    }))
}

pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<QuestionDetail>, AppError> {
    let question = get_visible(&state.db, id).await?;

    sqlx::query("UPDATE questions SET view_count = view_count + 1 WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    let author: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(&question.user_id)
        .fetch_one(&state.db)
        .await?;

    let tags = tags::for_question(&state.db, id).await?;

    Ok(Json(QuestionDetail {
        question,
        author,
        tags,
    }))
}

pub async fn create_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<Question>), AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    validate_question(&req.title, &req.body)?;
    if req.tags.len() > MAX_TAGS {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_TAGS} tags per question"
        )));
    }

    let question = create(&state.db, &user.id, &req.title, &req.body, &req.tags).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<UpdateQuestionRequest>,
) -> Result<Json<Question>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    validate_question(&req.title, &req.body)?;

    let question = update(&state.db, id, &user.id, &req.title, &req.body).await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user = auth::authenticate(&state, &headers).await?;
    delete(&state.db, id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn search_questions(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Paginated<QuestionSummary>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::BadRequest("Search query must not be empty".into()));
    }

    let (page, per_page, offset) = pagination(params.page, params.per_page);
    let sort = params.sort.as_deref().unwrap_or("new");

    let (questions, total) = search(&state.db, params.q.trim(), sort, per_page as i64, offset).await?;
    let items = with_tags(&state.db, questions).await?;

    Ok(Json(Paginated {
        items,
        total,
        page,
        per_page,
    }))
}
