#![allow(dead_code)]

use sqlx::PgPool;

pub async fn seed_user(db: &PgPool, id: &str) -> String {
    sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("user_{id}"))
        .execute(db)
        .await
        .unwrap();
    id.to_string()
}

pub async fn seed_admin(db: &PgPool, id: &str) -> String {
    sqlx::query("INSERT INTO users (id, username, role) VALUES ($1, $2, 'admin')")
        .bind(id)
        .bind(format!("user_{id}"))
        .execute(db)
        .await
        .unwrap();
    id.to_string()
}

pub async fn seed_question(db: &PgPool, user_id: &str, title: &str) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO questions (user_id, title, body) VALUES ($1, $2, 'body') RETURNING id",
    )
    .bind(user_id)
    .bind(title)
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn seed_answer(db: &PgPool, question_id: i32, user_id: &str) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO answers (question_id, user_id, body) VALUES ($1, $2, 'body') RETURNING id",
    )
    .bind(question_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .unwrap()
}

/// The denormalized counter as stored on the target row.
pub async fn score_of(db: &PgPool, table: &str, id: i32) -> i32 {
    let sql = format!("SELECT score FROM {table} WHERE id = $1");
    sqlx::query_scalar(&sql).bind(id).fetch_one(db).await.unwrap()
}

/// The net of the ledger rows pointing at a target. The score invariant
/// says this always equals `score_of` for the same target.
pub async fn ledger_sum(db: &PgPool, kind: &str, target_id: i32) -> i64 {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(direction), 0)::BIGINT FROM votes
         WHERE target_kind = $1 AND target_id = $2",
    )
    .bind(kind)
    .bind(target_id)
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn vote_rows(db: &PgPool, kind: &str, target_id: i32) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM votes WHERE target_kind = $1 AND target_id = $2",
    )
    .bind(kind)
    .bind(target_id)
    .fetch_one(db)
    .await
    .unwrap()
}
