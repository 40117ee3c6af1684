use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::context::AppContext;
use crate::error::ServiceError;
use crate::models::{
    ApiResponse, EntityType, MatchdayInfo, Prediction, QualityReport, SyncResult, SyncStatus, TableEntry,
};
use crate::services::scheduler::{spawn_sync_tasks, startup_sync};

type AppState = Arc<AppContext>;

/// Runs the HTTP API together with the periodic sync tasks until Ctrl-C.
pub async fn serve(ctx: AppContext, port: u16) -> anyhow::Result<()> {
    let ctx = Arc::new(ctx);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = spawn_sync_tasks(ctx.clone(), shutdown_rx.clone());
    let startup_ctx = ctx.clone();
    tasks.push(tokio::spawn(async move {
        let results = startup_sync(&startup_ctx).await;
        tracing::info!("Startup sync finished for {} entity types", results.len());
    }));

    let app = create_router().with_state(ctx);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Kickcast API server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
            }
            shutdown_tx.send(true).ok();
        })
        .await?;

    for task in tasks {
        task.await.ok();
    }
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sync/status", get(sync_status_handler))
        .route("/api/sync/{entity}", post(sync_handler))
        .route("/api/predictions/cache", delete(clear_cache_handler))
        .route("/api/predictions/{matchday}", get(predictions_handler))
        .route("/api/prediction-quality", get(quality_handler))
        .route("/api/table", get(table_handler))
        .route("/api/matchday-info", get(matchday_info_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("Kickcast API is running"))
}

// POST /api/sync/{entity} - Run a sync cycle for teams, matches or all
#[derive(Deserialize)]
struct SyncQuery {
    force: Option<bool>,
    matchday: Option<u32>,
}

async fn sync_handler(
    State(ctx): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<SyncQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<SyncResult>>>) {
    let force = params.force.unwrap_or(false);

    let results = if entity.eq_ignore_ascii_case("all") {
        ctx.sync_all(force).await
    } else {
        match (entity.parse::<EntityType>(), params.matchday) {
            (Ok(EntityType::Matches), Some(day)) => vec![ctx.sync_matchday(day, force).await],
            (Ok(entity), _) => vec![ctx.run_sync(entity, force).await],
            (Err(e), _) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e))),
        }
    };

    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.entity.to_string())
        .collect();

    if failed.is_empty() {
        (StatusCode::OK, Json(ApiResponse::success(results)))
    } else {
        let message = format!("sync failed for {}", failed.join(", "));
        tracing::error!("{}", message);
        (StatusCode::BAD_GATEWAY, Json(ApiResponse::failure(message, results)))
    }
}

// GET /api/sync/status - Last recorded cycle per entity type
async fn sync_status_handler(
    State(ctx): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SyncStatus>>>, StatusCode> {
    match ctx.repo.get_all_sync_status().await {
        Ok(status) => Ok(Json(ApiResponse::success(status))),
        Err(e) => {
            tracing::error!("Failed to read sync status: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /api/predictions/{matchday}
async fn predictions_handler(
    State(ctx): State<AppState>,
    Path(matchday): Path<i32>,
) -> Result<Json<ApiResponse<Vec<Prediction>>>, StatusCode> {
    match ctx.predictions.get_predictions_for_matchday(matchday).await {
        Ok(predictions) => Ok(Json(ApiResponse::success(predictions))),
        Err(ServiceError::InvalidMatchday(_)) => Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("Failed to compute predictions for matchday {}: {}", matchday, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// DELETE /api/predictions/cache?matchday=N - Drop one matchday or everything
#[derive(Deserialize)]
struct ClearCacheQuery {
    matchday: Option<i32>,
}

async fn clear_cache_handler(
    State(ctx): State<AppState>,
    Query(params): Query<ClearCacheQuery>,
) -> Json<ApiResponse<String>> {
    ctx.predictions.clear_prediction_cache(params.matchday);
    let message = match params.matchday {
        Some(day) => format!("Cleared cached predictions for matchday {}", day),
        None => "Cleared all cached results".to_string(),
    };
    Json(ApiResponse::success(message))
}

// GET /api/prediction-quality
async fn quality_handler(
    State(ctx): State<AppState>,
) -> Result<Json<ApiResponse<QualityReport>>, StatusCode> {
    match ctx.predictions.get_prediction_quality().await {
        Ok(report) => Ok(Json(ApiResponse::success(report))),
        Err(e) => {
            tracing::error!("Failed to compute prediction quality: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /api/table
async fn table_handler(State(ctx): State<AppState>) -> Result<Json<ApiResponse<Vec<TableEntry>>>, StatusCode> {
    match ctx.league_table().await {
        Ok(table) => Ok(Json(ApiResponse::success(table))),
        Err(e) => {
            tracing::error!("Failed to build league table: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /api/matchday-info
async fn matchday_info_handler(
    State(ctx): State<AppState>,
) -> Result<Json<ApiResponse<MatchdayInfo>>, StatusCode> {
    match ctx.matchday_info().await {
        Ok(info) => Ok(Json(ApiResponse::success(info))),
        Err(e) => {
            tracing::error!("Failed to read matchday info: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
