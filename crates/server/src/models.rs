use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== Rows =====

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Question {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub score: i32,
    pub answer_count: i32,
    pub view_count: i32,
    pub accepted_answer_id: Option<i32>,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Answer {
    pub id: i32,
    pub question_id: i32,
    pub user_id: String,
    pub body: String,
    pub score: i32,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: String,
    pub target_kind: String,
    pub target_id: i32,
    pub direction: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

// ===== Vote domain types =====

/// Kind of entity a vote points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Question,
    Answer,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Question => "question",
            TargetKind::Answer => "answer",
        }
    }

    /// Table carrying the denormalized score for this kind.
    pub fn table(self) -> &'static str {
        match self {
            TargetKind::Question => "questions",
            TargetKind::Answer => "answers",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "question" => Some(TargetKind::Question),
            "answer" => Some(TargetKind::Answer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// Contribution of one vote of this direction to a target's score.
    pub fn delta(self) -> i32 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }

    /// Stored ledger representation.
    pub fn value(self) -> i16 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }

    pub fn from_value(value: i16) -> Option<Self> {
        match value {
            1 => Some(VoteDirection::Up),
            -1 => Some(VoteDirection::Down),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(VoteDirection::Up),
            "down" => Some(VoteDirection::Down),
            _ => None,
        }
    }
}

// ===== Requests =====

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// "up" or "down". Resubmitting the direction you already hold
    /// retracts the vote.
    pub direction: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuestionRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAnswerRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnswerRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct HideRequest {
    pub hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
}

// ===== Responses =====

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub target_kind: TargetKind,
    pub target_id: i32,
    /// Effective vote after this submission: "up", "down" or "none".
    pub state: &'static str,
    /// Authoritative score after this submission; clients display this
    /// value rather than adjusting optimistically.
    pub score: i32,
}

#[derive(Debug, Serialize)]
pub struct QuestionSummary {
    #[serde(flatten)]
    pub question: Question,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub author: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub username: String,
    pub role: String,
    pub question_count: i64,
    pub answer_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_users: i64,
    pub total_questions: i64,
    pub total_answers: i64,
    pub total_votes: i64,
    pub users_today: i64,
    pub questions_today: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ExportVote {
    pub user_id: String,
    pub target_kind: String,
    pub target_id: i32,
    pub direction: i16,
    pub created_at: DateTime<Utc>,
}

// ===== Pagination =====

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 50;

/// Clamp raw pagination params to (page, per_page, offset).
pub fn pagination(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let offset = (page as i64 - 1) * per_page as i64;
    (page, per_page, offset)
}
