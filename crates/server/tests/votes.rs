mod common;

use askboard::models::{TargetKind, VoteDirection};
use askboard::votes::{self, VoteState};
use common::*;
use sqlx::PgPool;

#[sqlx::test]
async fn first_vote_creates_row_and_moves_score(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter-a").await;
    let q = seed_question(&pool, &author, "Q1").await;

    let outcome = votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();

    assert_eq!(outcome.state, VoteState::Up);
    assert_eq!(outcome.score, 1);
    assert_eq!(score_of(&pool, "questions", q).await, 1);
    assert_eq!(vote_rows(&pool, "question", q).await, 1);
}

#[sqlx::test]
async fn resubmitting_same_direction_retracts(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter-a").await;
    let q = seed_question(&pool, &author, "Q1").await;

    votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();
    let outcome = votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();

    assert_eq!(outcome.state, VoteState::None);
    assert_eq!(outcome.score, 0);
    assert_eq!(vote_rows(&pool, "question", q).await, 0);
    assert_eq!(score_of(&pool, "questions", q).await, 0);
}

#[sqlx::test]
async fn switching_direction_moves_score_by_two(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter-a").await;
    let q = seed_question(&pool, &author, "Q1").await;

    votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();
    let before = score_of(&pool, "questions", q).await;

    let outcome = votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Down)
        .await
        .unwrap();

    assert_eq!(outcome.state, VoteState::Down);
    assert_eq!(outcome.score, before - 2);
    // Still exactly one ledger row, flipped in place.
    assert_eq!(vote_rows(&pool, "question", q).await, 1);
    assert_eq!(ledger_sum(&pool, "question", q).await, -1);
}

#[sqlx::test]
async fn opposing_voters_cancel_out(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let a = seed_user(&pool, "voter-a").await;
    let b = seed_user(&pool, "voter-b").await;
    let q = seed_question(&pool, &author, "Q1").await;

    votes::submit_vote(&pool, &a, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();
    let outcome = votes::submit_vote(&pool, &b, TargetKind::Question, q, VoteDirection::Down)
        .await
        .unwrap();

    assert_eq!(outcome.score, 0);
    assert_eq!(vote_rows(&pool, "question", q).await, 2);
    assert_eq!(score_of(&pool, "questions", q).await, 0);
}

#[sqlx::test]
async fn answers_are_votable_too(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter-a").await;
    let q = seed_question(&pool, &author, "Q1").await;
    let a = seed_answer(&pool, q, &author).await;

    let outcome = votes::submit_vote(&pool, &voter, TargetKind::Answer, a, VoteDirection::Down)
        .await
        .unwrap();

    assert_eq!(outcome.state, VoteState::Down);
    assert_eq!(outcome.score, -1);
    assert_eq!(score_of(&pool, "answers", a).await, -1);
    // The question's own score is untouched.
    assert_eq!(score_of(&pool, "questions", q).await, 0);
}

#[sqlx::test]
async fn score_matches_ledger_after_mixed_sequence(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let a = seed_user(&pool, "voter-a").await;
    let b = seed_user(&pool, "voter-b").await;
    let c = seed_user(&pool, "voter-c").await;
    let q = seed_question(&pool, &author, "Q1").await;

    use VoteDirection::*;
    let sequence = [
        (&a, Up),
        (&b, Down),
        (&a, Down), // switch
        (&c, Up),
        (&b, Down), // retract
        (&a, Down), // retract
        (&c, Up),   // retract
        (&c, Down),
    ];
    for (voter, direction) in sequence {
        votes::submit_vote(&pool, voter, TargetKind::Question, q, direction)
            .await
            .unwrap();
    }

    let score = score_of(&pool, "questions", q).await;
    assert_eq!(score as i64, ledger_sum(&pool, "question", q).await);
    assert_eq!(score, -1);
    assert_eq!(vote_rows(&pool, "question", q).await, 1);
}

#[sqlx::test]
async fn vote_on_missing_target_is_not_found(pool: PgPool) {
    let voter = seed_user(&pool, "voter-a").await;

    let err = votes::submit_vote(&pool, &voter, TargetKind::Question, 9999, VoteDirection::Up)
        .await
        .unwrap_err();

    assert!(matches!(err, askboard::AppError::NotFound));
}

#[sqlx::test]
async fn concurrent_submissions_preserve_uniqueness_and_score(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter-a").await;
    let q = seed_question(&pool, &author, "Q1").await;

    let (first, second) = tokio::join!(
        votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up),
        votes::submit_vote(&pool, &voter, TargetKind::Question, q, VoteDirection::Up),
    );

    // The race may resolve as insert-then-retract (both succeed) or as a
    // lost insert surfaced as a retryable conflict. Either way the
    // uniqueness and score invariants must hold.
    let failures = [&first, &second]
        .iter()
        .filter(|r| r.is_err())
        .count();
    assert!(failures <= 1);
    if let Some(err) = [first, second].into_iter().find_map(Result::err) {
        assert!(err.is_retryable(), "losing racer must be retryable");
    }

    let rows = vote_rows(&pool, "question", q).await;
    assert!(rows <= 1);
    let score = score_of(&pool, "questions", q).await;
    assert_eq!(score as i64, ledger_sum(&pool, "question", q).await);
}

#[sqlx::test]
async fn failed_score_half_rolls_back_ledger_half(pool: PgPool) {
    let voter = seed_user(&pool, "voter-a").await;
    let missing_target = 4242;

    // Drive the two halves by hand with the target absent: the ledger
    // write succeeds, the compensating score update cannot.
    let mut tx = pool.begin().await.unwrap();
    sqlx::query(
        "INSERT INTO votes (id, user_id, target_kind, target_id, direction)
         VALUES ($1, $2, 'question', $3, 1)",
    )
    .bind(uuid::Uuid::new_v4())
    .bind(&voter)
    .bind(missing_target)
    .execute(&mut *tx)
    .await
    .unwrap();

    let err = votes::vote_inserted(&mut tx, TargetKind::Question, missing_target, VoteDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, askboard::AppError::NotFound));
    drop(tx); // roll back, as the vote service does on any error

    assert_eq!(vote_rows(&pool, "question", missing_target).await, 0);
}

#[sqlx::test]
async fn returned_score_includes_other_voters(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let a = seed_user(&pool, "voter-a").await;
    let b = seed_user(&pool, "voter-b").await;
    let q = seed_question(&pool, &author, "Q1").await;

    votes::submit_vote(&pool, &a, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();
    let outcome = votes::submit_vote(&pool, &b, TargetKind::Question, q, VoteDirection::Up)
        .await
        .unwrap();

    // The response carries the authoritative total, not just this
    // caller's contribution.
    assert_eq!(outcome.score, 2);
}
