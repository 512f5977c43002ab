use axum::{Router, routing::get, routing::post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use correlator_api::AppState;
use correlator_api::config::AppSettings;
use correlator_api::config_db::ConfigDb;
use correlator_api::handlers;
use correlator_api::jobs::JobRegistry;
use correlator_api::sessions::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("correlator_api=debug,tower_http=debug")
        }))
        .init();

    let config_path =
        std::env::var("CORRELATOR_CONFIG").unwrap_or_else(|_| "./correlator.toml".to_string());
    let mut settings = AppSettings::load(&config_path)?;

    // Env overrides for the common deployment knobs
    if let Ok(url) = std::env::var("TRACKER_URL") {
        settings.tracker.url = url;
    }
    if let Ok(path) = std::env::var("CORRELATOR_DB") {
        settings.server.db_path = path;
    }
    if let Ok(port) = std::env::var("CORRELATOR_PORT")
        && let Ok(port) = port.parse()
    {
        settings.server.port = port;
    }

    let db = Arc::new(ConfigDb::open(&settings.server.db_path)?);
    tracing::info!("config db opened at {}", settings.server.db_path);

    let state = AppState {
        sessions: Arc::new(SessionStore::new(settings.server.session_expire_hours)),
        registry: Arc::new(JobRegistry::new()),
        db,
        settings: Arc::new(settings),
    };
    let port = state.settings.server.port;

    let app = Router::new()
        // Auth
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::session_info))
        // Analysis jobs
        .route("/api/analysis/extract", post(handlers::analysis::start_extraction))
        .route("/api/analysis/manual", post(handlers::analysis::start_manual_analysis))
        .route("/api/analysis/jobs", get(handlers::analysis::list_jobs))
        .route(
            "/api/analysis/jobs/{id}",
            get(handlers::analysis::get_job).delete(handlers::analysis::delete_job),
        )
        .route(
            "/api/analysis/jobs/{id}/cancel",
            post(handlers::analysis::cancel_job),
        )
        // Scoring
        .route("/api/analysis/score", post(handlers::analysis::recalculate_score))
        .route("/api/analysis/ranking/{id}", get(handlers::analysis::get_ranking))
        .route(
            "/api/analysis/changes/{id}/{key}",
            get(handlers::analysis::get_candidate_detail),
        )
        // Vocabulary for the manual-analysis form
        .route("/api/analysis/technologies", get(handlers::analysis::get_technologies))
        .route("/api/analysis/services", get(handlers::analysis::get_services))
        // Scoring configuration
        .route("/api/config", get(handlers::config::get_config))
        .route(
            "/api/config/weights",
            get(handlers::config::get_weights).put(handlers::config::put_weights),
        )
        .route(
            "/api/config/penalties",
            get(handlers::config::get_penalties).put(handlers::config::put_penalties),
        )
        .route(
            "/api/config/bonuses",
            get(handlers::config::get_bonuses).put(handlers::config::put_bonuses),
        )
        .route(
            "/api/config/thresholds",
            get(handlers::config::get_thresholds).put(handlers::config::put_thresholds),
        )
        .route(
            "/api/config/top-results",
            get(handlers::config::get_top_results).put(handlers::config::put_top_results),
        )
        .route(
            "/api/config/synonyms",
            get(handlers::config::get_synonyms).put(handlers::config::put_synonyms),
        )
        .route(
            "/api/config/groups",
            get(handlers::config::get_groups).put(handlers::config::put_groups),
        )
        // Health
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("correlator-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
