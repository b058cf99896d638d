pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use std::any::Any;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyHeaders, CorsLayer};
use tracing::{error, warn};

use crate::config::CorsSettings;

use api::error::ApiError;
use api::handlers;
use middleware::{log_responses, set_request_context};

/// Assembles the full HTTP surface: product routes, root, health, fallbacks
/// and the shared middleware stack.
pub fn build_router(state: ApiState, cors: &CorsSettings) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(build_api_router())
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors_layer(cors))
}

fn cors_layer(cors: &CorsSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "catalog::http::cors",
                    origin = origin.as_str(),
                    error = %err,
                    "ignoring invalid CORS origin"
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(AnyHeaders)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "handler panicked".to_string()
    };

    error!(
        target = "catalog::http::panic",
        detail = %detail,
        "request handler panicked"
    );
    ApiError::internal(detail).into_response()
}
