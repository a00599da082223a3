use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use lennyrpg_rust_server::leaderboard::Leaderboard;
use lennyrpg_rust_server::server_protocol::parse_score_submission;
use lennyrpg_rust_server::server_utils::{parse_leaderboard_limit, parse_rank_query};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type SharedState = Arc<Mutex<Leaderboard>>;

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RankQuery {
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lennyrpg_rust_server=info,server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let leaderboard_path = std::env::var("LEADERBOARD_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/leaderboard.json"));

    let state: SharedState = Arc::new(Mutex::new(Leaderboard::new(leaderboard_path)));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler).post(submit_handler))
        .route("/api/leaderboard/rank", get(rank_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        tracing::info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)))
    } else {
        tracing::warn!("static file root not found. run `npm run build` to generate dist.");
        app
    };
    let app = app.layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(port, "listening");
    axum::serve(listener, app).await.context("server runtime failed")?;
    Ok(())
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist"), PathBuf::from("../dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.build_response(parse_leaderboard_limit(query.limit.as_deref())))
}

async fn submit_handler(State(state): State<SharedState>, body: String) -> impl IntoResponse {
    let Some(submission) = parse_score_submission(&body) else {
        tracing::debug!("rejected malformed score submission");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid score submission" })),
        );
    };
    let mut guard = state.lock().await;
    let result = guard.save_score(&submission);
    tracing::info!(
        name = %submission.name,
        level = submission.level,
        accepted = result.accepted,
        rank = ?result.rank,
        "score submitted"
    );
    (StatusCode::OK, Json(json!(result)))
}

async fn rank_handler(State(state): State<SharedState>, Query(query): Query<RankQuery>) -> impl IntoResponse {
    let Some(name) = parse_rank_query(query.name.as_deref()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing name" })));
    };
    let guard = state.lock().await;
    let rank = guard.player_rank(&name);
    (
        StatusCode::OK,
        Json(json!({ "name": name, "rank": rank, "total": guard.len() })),
    )
}
