mod companies;
mod error;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use compsync_common::error::{CompsyncError, CompsyncResult};
use compsync_common::types::ServiceInfo;
use compsync_config::{init_tracing, AppConfig};
use compsync_db::companies::pg_repository::PgCompanyRepository;
use compsync_db::sync::pg_repository::PgSyncLogRepository;
use compsync_sync::{ClientConfig, CompanyApiClient, SyncService, SyncSettings};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

const SERVICE_NAME: &str = "compsync-api";

pub type AppSyncService = SyncService<PgCompanyRepository, PgSyncLogRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub company_repo: PgCompanyRepository,
    pub sync_service: AppSyncService,
    pub source_client: CompanyApiClient,
    pub service_info: ServiceInfo,
}

impl AppState {
    pub fn new(pool: PgPool, source_client: CompanyApiClient, settings: SyncSettings) -> Self {
        let company_repo = PgCompanyRepository::new(pool.clone());
        let sync_service = SyncService::new(
            Arc::new(company_repo.clone()),
            Arc::new(PgSyncLogRepository::new(pool.clone())),
            settings,
        );
        Self {
            pool,
            company_repo,
            sync_service,
            source_client,
            service_info: ServiceInfo::new(SERVICE_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = compsync_db::ping(&state.pool).await;
    let status = if database { "ok" } else { "degraded" };
    Json(serde_json::json!({ "status": status, "database": database }))
}

async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.service_info.clone())
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let progress = state.sync_service.progress();
    let info = &state.service_info;
    let body = format!(
        "# HELP compsync_up Service up indicator\n\
         # TYPE compsync_up gauge\n\
         compsync_up 1\n\
         # HELP compsync_info Service info\n\
         # TYPE compsync_info gauge\n\
         compsync_info{{service=\"{}\",version=\"{}\"}} 1\n\
         # HELP compsync_sync_running Whether a sync run is active\n\
         # TYPE compsync_sync_running gauge\n\
         compsync_sync_running {}\n\
         # HELP compsync_sync_processed_records Records processed by the active run\n\
         # TYPE compsync_sync_processed_records gauge\n\
         compsync_sync_processed_records {}\n\
         # HELP compsync_sync_total_records Records fetched for the active run\n\
         # TYPE compsync_sync_total_records gauge\n\
         compsync_sync_total_records {}\n",
        info.name,
        info.version,
        u8::from(progress.is_running),
        progress.processed_records,
        progress.total_records,
    );

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .merge(companies::router())
        .merge(sync::router())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

async fn bootstrap(config: &AppConfig) -> CompsyncResult<AppState> {
    let client_config = ClientConfig::from_env()?;
    let settings = SyncSettings::from_env()?;

    let pool = compsync_db::create_pool(&config.database_url).await?;
    compsync_db::run_migrations(&pool).await?;

    let client = CompanyApiClient::new(client_config)
        .map_err(|e| CompsyncError::Config(format!("failed to build http client: {e}")))?;
    let state = AppState::new(pool, client, settings);
    state.sync_service.recover_interrupted().await?;
    Ok(state)
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = SERVICE_NAME, "starting");

    let state = bootstrap(&config).await.expect("failed to initialise service");

    let app = build_router(state, &config.cors_origins);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
