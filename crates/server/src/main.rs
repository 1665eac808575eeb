use askboard::AppState;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::get,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};
use supabase_jwt::JwksCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwks_url = env::var("SUPABASE_JWKS_URL").expect("SUPABASE_JWKS_URL must be set");

    // Setup database connection
    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!().run(&db).await?;
    tracing::info!("Migrations applied");

    let jwks_cache = Arc::new(JwksCache::new(&jwks_url));
    let state = AppState { db, jwks_cache };

    // Build router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(askboard::app(state));

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ===== Handlers =====

async fn root() -> &'static str {
    "Q&A Board Backend (Supabase Auth) - Use /health to check status"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // Check DB connection
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => Json(serde_json::json!({
            "status": "ok",
            "database": "connected"
        })),
        Err(_) => Json(serde_json::json!({
            "status": "error",
            "database": "disconnected"
        })),
    }
}
