mod auth;
mod booking;
mod cdn;
mod config;
mod db;
mod error;
mod extract;
mod handlers;
mod models;
mod notify;
mod rate_limit;
mod schedule;
mod settings;
mod translate;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::Config;
use rate_limit::{RateLimiter, Tier};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub started_at: Instant,
    pub mailer: Option<notify::Mailer>,
    pub translator: Option<translate::Translator>,
    pub cdn: Option<cdn::ImageCdn>,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            mailer: config.mail.clone().map(|c| notify::Mailer::new(http.clone(), c)),
            translator: config
                .translate
                .clone()
                .map(|c| translate::Translator::new(http.clone(), c)),
            cdn: config.cdn.clone().map(|c| cdn::ImageCdn::new(http.clone(), c)),
            db,
            config,
            started_at: Instant::now(),
        }
    }
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;
/// Upper bound for a multipart upload body.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Tracing first, so config warnings are visible ──
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // ── Database ──
    let pool = db::connect(&config.database_url).await?;

    let cors = cors_layer(config.cors_origin.as_deref())?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(pool, config));

    // ── Rate limiter + background cleanup of stale entries ──
    let rate_limiter = RateLimiter::standard();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let app = build_router(state, rate_limiter)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Photo booth server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// CORS: whitelist `CORS_ORIGIN` (comma separated) when configured,
/// otherwise allow any origin.
fn cors_layer(origins: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let Some(origins) = origins else {
        return Ok(layer.allow_origin(Any));
    };
    let list = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("CORS_ORIGIN entry {:?} is invalid: {}", o, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(list)))
}

/// All routes, grouped by rate tier.
fn build_router(state: Arc<AppState>, limiter: RateLimiter) -> Router {
    // 1. No-limit: health check
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: availability, content, confirm link (60 req/min)
    let public_routes = Router::new()
        .route("/api/booking/times", get(handlers::booking::times))
        .route("/api/booking/dates", get(handlers::booking::dates))
        .route(
            "/api/booking/confirm",
            get(handlers::booking::confirm_link).post(handlers::booking::confirm),
        )
        .route("/api/content", get(handlers::content::content))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Public),
            rate_limit::enforce,
        ));

    // 3. Lead submission: strictest limit (5 req/5min)
    let lead_routes = Router::new()
        .route("/api/lead", post(handlers::lead::submit_lead))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Lead),
            rate_limit::enforce,
        ));

    // 4. Login (10 req/5min)
    let login_routes = Router::new()
        .route("/api/admin/auth", post(handlers::admin::login))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Login),
            rate_limit::enforce,
        ));

    // 5. Admin: bearer token required (120 req/min)
    let admin_routes = Router::new()
        .route(
            "/api/booking/available-slots",
            get(handlers::booking::available_slots),
        )
        .route(
            "/api/booking/generate-schedule",
            post(handlers::booking::generate_schedule),
        )
        .route("/api/booking/delete-slots", post(handlers::booking::delete_slots))
        .route("/api/booking/enable-slot", post(handlers::booking::enable_slot))
        .route("/api/booking/disable-slot", post(handlers::booking::disable_slot))
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).post(handlers::admin::save_settings),
        )
        .route(
            "/api/admin/records",
            get(handlers::admin::list_records)
                .put(handlers::admin::update_record)
                .delete(handlers::admin::delete_record),
        )
        .route(
            "/api/admin/upload",
            post(handlers::admin::upload)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer::<_, Infallible>(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
        )
        .layer(from_fn_with_state(state.clone(), auth::require_admin))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Admin),
            rate_limit::enforce,
        ));

    Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(lead_routes)
        .merge(login_routes)
        .merge(admin_routes)
        .with_state(state)
}
