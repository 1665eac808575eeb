use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use sqlx::{PgPool, Row};

use crate::{
    AppState,
    error::{AppError, unique_conflict},
    models::{ListParams, Paginated, QuestionSummary, Tag, pagination},
};

const MAX_TAG_LEN: usize = 30;

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

// ===== Store =====

/// Get or create tags by name, returning their ids. Names are normalized
/// to lowercase; blank or oversized names are skipped.
pub async fn get_or_create(db: &PgPool, names: &[String]) -> Result<Vec<i32>, AppError> {
    let mut ids = Vec::new();

    for name in names {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name.len() > MAX_TAG_LEN {
            continue;
        }
        let slug = slugify(&name);

        // Concurrent creates of the same tag fall through to the
        // winner's row.
        sqlx::query("INSERT INTO tags (name, slug) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(&name)
            .bind(&slug)
            .execute(db)
            .await?;

        let id: i32 = sqlx::query_scalar("SELECT id FROM tags WHERE slug = $1")
            .bind(&slug)
            .fetch_one(db)
            .await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids)
}

/// Tag names attached to a single question.
pub async fn for_question(db: &PgPool, question_id: i32) -> Result<Vec<String>, AppError> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT t.name FROM tags t
         JOIN question_tags qt ON qt.tag_id = t.id
         WHERE qt.question_id = $1
         ORDER BY t.name",
    )
    .bind(question_id)
    .fetch_all(db)
    .await?;
    Ok(names)
}

/// Tag names for a whole page of questions in one query.
pub async fn for_questions(
    db: &PgPool,
    question_ids: &[i32],
) -> Result<HashMap<i32, Vec<String>>, AppError> {
    if question_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(
        "SELECT qt.question_id, t.name FROM question_tags qt
         JOIN tags t ON t.id = qt.tag_id
         WHERE qt.question_id = ANY($1)
         ORDER BY t.name",
    )
    .bind(question_ids)
    .fetch_all(db)
    .await?;

    let mut map: HashMap<i32, Vec<String>> = HashMap::new();
    for row in rows {
        let question_id: i32 = row.try_get(0)?;
        let name: String = row.try_get(1)?;
        map.entry(question_id).or_default().push(name);
    }
    Ok(map)
}

pub async fn create(db: &PgPool, name: &str) -> Result<Tag, AppError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.len() > MAX_TAG_LEN {
        return Err(AppError::BadRequest(format!(
            "Tag name must be 1-{MAX_TAG_LEN} characters"
        )));
    }

    let tag: Tag = sqlx::query_as("INSERT INTO tags (name, slug) VALUES ($1, $2) RETURNING *")
        .bind(&name)
        .bind(slugify(&name))
        .fetch_one(db)
        .await
        .map_err(|e| unique_conflict(e, "Tag already exists"))?;

    Ok(tag)
}

pub async fn rename(db: &PgPool, id: i32, name: &str) -> Result<Tag, AppError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.len() > MAX_TAG_LEN {
        return Err(AppError::BadRequest(format!(
            "Tag name must be 1-{MAX_TAG_LEN} characters"
        )));
    }

    let tag: Option<Tag> = sqlx::query_as(
        "UPDATE tags SET name = $1, slug = $2 WHERE id = $3 RETURNING *",
    )
    .bind(&name)
    .bind(slugify(&name))
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(|e| unique_conflict(e, "Tag already exists"))?;

    tag.ok_or(AppError::NotFound)
}

pub async fn remove(db: &PgPool, id: i32) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

// ===== Handlers =====

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, AppError> {
    let tags: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(tags))
}

pub async fn questions_by_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Paginated<QuestionSummary>>, AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tags WHERE slug = $1)")
        .bind(&slug)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let (page, per_page, offset) = pagination(params.page, params.per_page);
    let sort = params.sort.as_deref().unwrap_or("new");

    let (questions, total) =
        crate::questions::list(&state.db, sort, Some(&slug), per_page as i64, offset).await?;

    let ids: Vec<i32> = questions.iter().map(|q| q.id).collect();
    let mut tag_map = for_questions(&state.db, &ids).await?;
    let items = questions
        .into_iter()
        .map(|q| {
            let tags = tag_map.remove(&q.id).unwrap_or_default();
            QuestionSummary { question: q, tags }
        })
        .collect();

    Ok(Json(Paginated {
        items,
        total,
        page,
        per_page,
    }))
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_replaces_separators() {
        assert_eq!(slugify("rust async"), "rust-async");
        assert_eq!(slugify("c++"), "c--");
    }

    #[test]
    fn slugify_keeps_alphanumerics() {
        assert_eq!(slugify("borrowck2"), "borrowck2");
    }
}
