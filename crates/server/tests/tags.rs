mod common;

use askboard::{questions, tags};
use common::*;
use sqlx::PgPool;

#[sqlx::test]
async fn get_or_create_is_idempotent_and_case_insensitive(pool: PgPool) {
    let first = tags::get_or_create(&pool, &["Rust".to_string()]).await.unwrap();
    let second = tags::get_or_create(&pool, &["rust".to_string()]).await.unwrap();

    assert_eq!(first, second);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 1);
}

#[sqlx::test]
async fn blank_and_oversized_names_are_skipped(pool: PgPool) {
    let ids = tags::get_or_create(
        &pool,
        &["  ".to_string(), "x".repeat(31), "ok".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(ids.len(), 1);
}

#[sqlx::test]
async fn questions_filter_by_tag_slug(pool: PgPool) {
    let author = seed_user(&pool, "author").await;

    let tagged = questions::create(&pool, &author, "About async", "body", &["async rust".to_string()])
        .await
        .unwrap();
    seed_question(&pool, &author, "Untagged").await;

    let (hits, total) = questions::list(&pool, "new", Some("async-rust"), 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(hits[0].id, tagged.id);
}

#[sqlx::test]
async fn duplicate_create_conflicts(pool: PgPool) {
    tags::create(&pool, "rust").await.unwrap();
    let err = tags::create(&pool, "Rust").await.unwrap_err();
    assert!(matches!(err, askboard::AppError::Conflict(_)));
}

#[sqlx::test]
async fn rename_and_remove(pool: PgPool) {
    let tag = tags::create(&pool, "rsut").await.unwrap();

    let renamed = tags::rename(&pool, tag.id, "rust").await.unwrap();
    assert_eq!(renamed.name, "rust");
    assert_eq!(renamed.slug, "rust");

    tags::remove(&pool, tag.id).await.unwrap();
    let err = tags::remove(&pool, tag.id).await.unwrap_err();
    assert!(matches!(err, askboard::AppError::NotFound));
}

#[sqlx::test]
async fn deleting_question_leaves_tag_rows(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let q = questions::create(&pool, &author, "Tagged", "body", &["rust".to_string()])
        .await
        .unwrap();

    questions::delete(&pool, q.id, &author).await.unwrap();

    // The tag survives for other questions; the join rows cascade away.
    let tags_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
        .fetch_one(&pool)
        .await
        .unwrap();
    let joins_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM question_tags")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tags_left, 1);
    assert_eq!(joins_left, 0);
}
