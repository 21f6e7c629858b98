use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dispatch_store::redis_repo::rate_limit_key;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod accounting;
pub mod devices;
pub mod documents;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod preferences;
pub mod reservations;
pub mod state;
pub mod worker;

pub use state::{AppSettings, AppState, AuthConfig, Stores};

const RATE_LIMIT_REQUESTS: i64 = 100;
const RATE_LIMIT_WINDOW_SECS: i64 = 60;
const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

pub fn app(state: AppState) -> Router {
    let driver_routes = Router::new()
        .merge(reservations::routes())
        .merge(accounting::routes())
        .merge(devices::routes())
        .merge(preferences::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::driver_auth_middleware));

    let admin_routes = Router::new()
        .merge(notifications::routes())
        .merge(documents::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(driver_routes)
        .merge(admin_routes)
        .layer(cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed = allowed_origins.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| is_local_origin(o) || allowed.iter().any(|a| a == o))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .max_age(CORS_MAX_AGE)
}

/// `localhost` and `127.0.0.1` on any scheme or port.
pub fn is_local_origin(origin: &str) -> bool {
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);
    let host = rest.split([':', '/']).next().unwrap_or_default();
    host == "localhost" || host == "127.0.0.1"
}

async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned() else {
        return next.run(req).await;
    };

    let key = rate_limit_key(&addr.ip().to_string());
    match redis.check_rate_limit(&key, RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW_SECS).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "success": false, "error": "Rate limit exceeded" })),
        )
            .into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
