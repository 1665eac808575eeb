//! The vote ledger and its score maintenance.
//!
//! Every votable row carries a denormalized `score` column equal to the
//! net of the ledger rows pointing at it. That equality is kept by running
//! the matching maintenance step on the same transaction as every ledger
//! mutation, no matter which code path performs it. A ledger change is
//! never visible without its score change or vice versa.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    AppState, auth,
    error::{AppError, unique_conflict},
    models::{TargetKind, VoteDirection, VoteRequest, VoteResponse},
};

/// Effective state of one voter on one target after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    None,
    Up,
    Down,
}

impl VoteState {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteState::None => "none",
            VoteState::Up => "up",
            VoteState::Down => "down",
        }
    }
}

impl From<VoteDirection> for VoteState {
    fn from(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => VoteState::Up,
            VoteDirection::Down => VoteState::Down,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoteOutcome {
    pub state: VoteState,
    /// Authoritative score read back inside the submitting transaction.
    pub score: i32,
}

// ===== Score maintenance =====

/// A new ledger row was inserted.
pub async fn vote_inserted(
    tx: &mut Transaction<'_, Postgres>,
    kind: TargetKind,
    target_id: i32,
    direction: VoteDirection,
) -> Result<(), AppError> {
    apply_score_delta(tx, kind, target_id, direction.delta()).await
}

/// An existing ledger row changed direction.
pub async fn vote_changed(
    tx: &mut Transaction<'_, Postgres>,
    kind: TargetKind,
    target_id: i32,
    old: VoteDirection,
    new: VoteDirection,
) -> Result<(), AppError> {
    apply_score_delta(tx, kind, target_id, new.delta() - old.delta()).await
}

/// A ledger row was deleted.
pub async fn vote_removed(
    tx: &mut Transaction<'_, Postgres>,
    kind: TargetKind,
    target_id: i32,
    old: VoteDirection,
) -> Result<(), AppError> {
    apply_score_delta(tx, kind, target_id, -old.delta()).await
}

async fn apply_score_delta(
    tx: &mut Transaction<'_, Postgres>,
    kind: TargetKind,
    target_id: i32,
    delta: i32,
) -> Result<(), AppError> {
    if delta == 0 {
        return Ok(());
    }

    let sql = format!(
        "UPDATE {} SET score = score + $1 WHERE id = $2",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(delta)
        .bind(target_id)
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        // Target deleted concurrently; fail so the ledger half rolls back.
        return Err(AppError::NotFound);
    }

    Ok(())
}

// ===== Vote service =====

/// Apply one vote intent as exactly one ledger mutation.
///
/// No existing row: insert. Same direction as the existing row: delete
/// (toggle-off). Opposite direction: update in place. The score
/// adjustment runs on the same transaction, so either both halves commit
/// or neither does. The SELECT ... FOR UPDATE serializes competing
/// submissions from the same voter on the same target.
pub async fn submit_vote(
    db: &PgPool,
    user_id: &str,
    kind: TargetKind,
    target_id: i32,
    direction: VoteDirection,
) -> Result<VoteOutcome, AppError> {
    // Cheap pre-check for a friendly 404; existence is re-verified
    // atomically by the score update itself.
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        kind.table()
    );
    let target_exists: bool = sqlx::query_scalar(&sql)
        .bind(target_id)
        .fetch_one(db)
        .await?;
    if !target_exists {
        return Err(AppError::NotFound);
    }

    let mut tx = db.begin().await?;

    let existing: Option<(Uuid, i16)> = sqlx::query_as(
        "SELECT id, direction FROM votes
         WHERE user_id = $1 AND target_kind = $2 AND target_id = $3
         FOR UPDATE",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?;

    let state = match existing {
        None => {
            sqlx::query(
                "INSERT INTO votes (id, user_id, target_kind, target_id, direction)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(kind.as_str())
            .bind(target_id)
            .bind(direction.value())
            .execute(&mut *tx)
            .await
            // Two concurrent first-votes race to insert; the loser trips
            // the uniqueness index and may simply resubmit.
            .map_err(|e| unique_conflict(e, "Vote already recorded by a concurrent request"))?;

            vote_inserted(&mut tx, kind, target_id, direction).await?;
            VoteState::from(direction)
        }
        Some((vote_id, held_value)) => {
            let held = VoteDirection::from_value(held_value)
                .ok_or_else(|| AppError::BadRequest("Corrupt vote row".to_string()))?;

            if held == direction {
                // Resubmitting the held direction retracts the vote.
                sqlx::query("DELETE FROM votes WHERE id = $1")
                    .bind(vote_id)
                    .execute(&mut *tx)
                    .await?;
                vote_removed(&mut tx, kind, target_id, held).await?;
                VoteState::None
            } else {
                sqlx::query("UPDATE votes SET direction = $1 WHERE id = $2")
                    .bind(direction.value())
                    .bind(vote_id)
                    .execute(&mut *tx)
                    .await?;
                vote_changed(&mut tx, kind, target_id, held, direction).await?;
                VoteState::from(direction)
            }
        }
    };

    let sql = format!("SELECT score FROM {} WHERE id = $1", kind.table());
    let score: i32 = sqlx::query_scalar(&sql)
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(VoteOutcome { state, score })
}

// ===== Handlers =====

async fn submit(
    state: AppState,
    headers: HeaderMap,
    kind: TargetKind,
    target_id: i32,
    req: VoteRequest,
) -> Result<Json<VoteResponse>, AppError> {
    let user = auth::authenticate(&state, &headers).await?;

    let direction = VoteDirection::parse(&req.direction)
        .ok_or_else(|| AppError::BadRequest("Direction must be 'up' or 'down'".to_string()))?;

    let outcome = submit_vote(&state.db, &user.id, kind, target_id, direction).await?;

    Ok(Json(VoteResponse {
        target_kind: kind,
        target_id,
        state: outcome.state.as_str(),
        score: outcome.score,
    }))
}

pub async fn vote_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    submit(state, headers, TargetKind::Question, id, req).await
}

pub async fn vote_answer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    submit(state, headers, TargetKind::Answer, id, req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_delta_is_direction() {
        assert_eq!(VoteDirection::Up.delta(), 1);
        assert_eq!(VoteDirection::Down.delta(), -1);
    }

    #[test]
    fn switch_delta_is_two() {
        let up_to_down = VoteDirection::Down.delta() - VoteDirection::Up.delta();
        let down_to_up = VoteDirection::Up.delta() - VoteDirection::Down.delta();
        assert_eq!(up_to_down, -2);
        assert_eq!(down_to_up, 2);
    }

    #[test]
    fn removal_undoes_insert() {
        for d in [VoteDirection::Up, VoteDirection::Down] {
            assert_eq!(d.delta() + (-d.delta()), 0);
        }
    }

    #[test]
    fn state_reports_wire_form() {
        assert_eq!(VoteState::None.as_str(), "none");
        assert_eq!(VoteState::from(VoteDirection::Up).as_str(), "up");
        assert_eq!(VoteState::from(VoteDirection::Down).as_str(), "down");
    }
}
