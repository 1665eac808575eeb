pub mod admin;
pub mod answers;
pub mod auth;
pub mod error;
pub mod models;
pub mod questions;
pub mod tags;
pub mod users;
pub mod votes;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sqlx::PgPool;
use supabase_jwt::JwksCache;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::AppError;

// ===== App State =====

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwks_cache: Arc<JwksCache>,
}

// ===== Router =====

pub fn app(state: AppState) -> Router {
    Router::new()
        // Questions
        .route(
            "/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/questions/:id",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        .route("/search", get(questions::search_questions))
        // Answers
        .route(
            "/questions/:id/answers",
            get(answers::list_answers).post(answers::create_answer),
        )
        .route(
            "/answers/:id",
            put(answers::update_answer).delete(answers::delete_answer),
        )
        .route("/answers/:id/accept", post(answers::accept_answer))
        // Votes
        .route("/questions/:id/vote", post(votes::vote_question))
        .route("/answers/:id/vote", post(votes::vote_answer))
        // Tags
        .route("/tags", get(tags::list_tags))
        .route("/tags/:slug/questions", get(tags::questions_by_tag))
        // Users
        .route("/me", get(users::get_me).put(users::update_me))
        .route("/users/:username", get(users::get_profile))
        // Admin
        .route("/admin/stats", get(admin::get_stats))
        .route("/admin/export", get(admin::export_votes))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id/role", put(admin::update_role))
        .route("/admin/users/:id/votes", delete(admin::purge_user_votes))
        .route("/admin/questions/:id/hide", put(admin::hide_question))
        .route("/admin/answers/:id/hide", put(admin::hide_answer))
        .route("/admin/tags", post(admin::create_tag))
        .route(
            "/admin/tags/:id",
            put(admin::update_tag).delete(admin::delete_tag),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
