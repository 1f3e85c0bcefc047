use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use indorex_core::domain::holding::{
    ChangeSource, Holding, HoldingPatch, PortfolioSnapshot, PortfolioState,
};
use indorex_core::domain::suggestion::{Suggestion, SuggestionBatch};
use indorex_core::llm::anthropic::AnthropicClient;
use indorex_core::llm::{GenerateInput, SuggestionClient};
use indorex_core::quotes::QuoteRouter;
use indorex_core::store::{PortfolioStore, StoreError};

// The original dashboard polls these when no symbols are given.
const DEFAULT_SYMBOLS: &str = "AAPL,MSFT,GOOGL,TSLA,NVDA";
const DEFAULT_SLOT_USER: &str = "default";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = indorex_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match indorex_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in-memory only");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in-memory only");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API in-memory only");
            None
        }
    };

    let user = std::env::var("PORTFOLIO_USER").unwrap_or_else(|_| DEFAULT_SLOT_USER.to_string());
    let store = load_or_seed_store(pool.as_ref(), &user).await;

    let quotes = Arc::new(QuoteRouter::from_settings(&settings)?);

    let llm = match AnthropicClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "LLM suggestion source not configured; /ai/suggest disabled");
            None
        }
    };

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        pool,
        quotes,
        llm,
        user: Arc::from(user),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/quote", get(get_quotes))
        .route("/portfolio", get(get_portfolio))
        .route("/portfolio/history", get(get_history))
        .route("/portfolio/holdings", post(add_holding))
        .route(
            "/portfolio/holdings/:ticker",
            patch(update_holding).delete(remove_holding),
        )
        .route("/ai/suggest", post(suggest))
        .route("/portfolio/suggestions/apply", post(apply_suggestions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<PortfolioStore>>,
    pool: Option<PgPool>,
    quotes: Arc<QuoteRouter>,
    llm: Option<Arc<AnthropicClient>>,
    user: Arc<str>,
}

async fn load_or_seed_store(pool: Option<&PgPool>, user: &str) -> PortfolioStore {
    let Some(pool) = pool else {
        return PortfolioStore::seeded();
    };

    match indorex_core::storage::portfolio_state::load_state(pool, user).await {
        Ok(Some(state)) => PortfolioStore::from_state(state),
        Ok(None) => PortfolioStore::seeded(),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to load persisted portfolio; starting from seed");
            PortfolioStore::seeded()
        }
    }
}

/// Best-effort persistence: a storage failure degrades the session to
/// in-memory state, it never fails the request.
async fn persist_state(state: &AppState, snapshot: &PortfolioState) {
    let Some(pool) = &state.pool else { return };

    if let Err(e) =
        indorex_core::storage::portfolio_state::save_state(pool, &state.user, snapshot).await
    {
        sentry_anyhow::capture_anyhow(&e);
        tracing::warn!(error = %e, "failed to persist portfolio state; continuing in-memory");
    }
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

fn store_error_response(err: StoreError) -> ApiError {
    let status = match err {
        StoreError::DuplicateTicker(_) => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_body(status, &err.to_string())
}

#[derive(Debug, Deserialize)]
struct QuoteParams {
    symbols: Option<String>,
}

async fn get_quotes(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let symbols: Vec<String> = params
        .symbols
        .as_deref()
        .unwrap_or(DEFAULT_SYMBOLS)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if symbols.is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "symbols must be non-empty"));
    }

    match state.quotes.fetch_quotes(&symbols).await {
        Ok(result) => Ok(Json(
            serde_json::json!({ "quoteResponse": { "result": result } }),
        )),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "quote fetch failed");
            Err(error_body(StatusCode::BAD_GATEWAY, &format!("{e:#}")))
        }
    }
}

async fn get_portfolio(State(state): State<AppState>) -> Json<Vec<Holding>> {
    let store = state.store.lock().await;
    Json(store.holdings().to_vec())
}

async fn get_history(State(state): State<AppState>) -> Json<Vec<PortfolioSnapshot>> {
    let store = state.store.lock().await;
    Json(store.history().to_vec())
}

async fn add_holding(
    State(state): State<AppState>,
    Json(holding): Json<Holding>,
) -> Result<(StatusCode, Json<Vec<Holding>>), ApiError> {
    let ticker = holding.ticker.trim().to_string();

    let mut store = state.store.lock().await;
    store.add_holding(holding).map_err(store_error_response)?;
    store.log_snapshot(&format!("Added {ticker}"), ChangeSource::User);

    let snapshot = store.state();
    drop(store);
    persist_state(&state, &snapshot).await;

    Ok((StatusCode::CREATED, Json(snapshot.holdings)))
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    updated: bool,
    holdings: Vec<Holding>,
}

async fn update_holding(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Json(patch): Json<HoldingPatch>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let updated = store
        .update_holding(&ticker, patch)
        .map_err(store_error_response)?;

    if !updated {
        // Unknown ticker is a soft no-op, not an error.
        return Ok(Json(UpdateResponse {
            updated: false,
            holdings: store.holdings().to_vec(),
        }));
    }

    store.log_snapshot(&format!("Updated {ticker}"), ChangeSource::User);
    let snapshot = store.state();
    drop(store);
    persist_state(&state, &snapshot).await;

    Ok(Json(UpdateResponse {
        updated: true,
        holdings: snapshot.holdings,
    }))
}

async fn remove_holding(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> StatusCode {
    let mut store = state.store.lock().await;
    if store.remove_holding(&ticker) {
        store.log_snapshot(&format!("Removed {ticker}"), ChangeSource::User);
        let snapshot = store.state();
        drop(store);
        persist_state(&state, &snapshot).await;
    }

    // Removal is idempotent; deleting an absent ticker succeeds too.
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestRequest {
    query: String,
    #[serde(default)]
    document_names: Vec<String>,
}

async fn suggest(
    State(state): State<AppState>,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<SuggestionBatch>, ApiError> {
    let Some(llm) = &state.llm else {
        return Err(error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "suggestion source is not configured",
        ));
    };

    let holdings = {
        let store = state.store.lock().await;
        store.holdings().to_vec()
    };

    let input = GenerateInput::try_new(req.query, &holdings, req.document_names)
        .map_err(|e| error_body(StatusCode::INTERNAL_SERVER_ERROR, &format!("{e:#}")))?;

    match llm.generate_suggestions(input).await {
        Ok(batch) => Ok(Json(batch)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "suggestion source failed");
            Err(error_body(
                StatusCode::BAD_GATEWAY,
                "suggestion source failed; retry later",
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplyRequest {
    summary: String,
    suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyResponse {
    snapshot_id: Uuid,
    holdings: Vec<Holding>,
}

async fn apply_suggestions(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let snapshot_id = store
        .apply_suggestions(&req.summary, &req.suggestions)
        .map_err(store_error_response)?;

    let snapshot = store.state();
    drop(store);
    persist_state(&state, &snapshot).await;

    Ok(Json(ApplyResponse {
        snapshot_id,
        holdings: snapshot.holdings,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &indorex_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
