//! Product handlers plus the service-level root, health and fallback routes.

use std::time::Instant;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::domain::products::{ProductDraft, ProductRecord};

use super::error::{ApiError, product_to_api};
use super::models::{ApiResponse, ProductListParams, ProductPayload};
use super::state::ApiState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub async fn root() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(
        json!({ "service": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }),
        "Product catalog is running",
    ))
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let cache_backend = state.cache.backend_name();
    let cache_ok = state.cache.store().ping().await.is_ok();

    match state.health.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(
                ApiResponse::ok(json!({ "database": "ok" }), "Service healthy").with_meta(json!({
                    "cache_backend": cache_backend,
                    "cache_ok": cache_ok,
                })),
            ),
        )
            .into_response(),
        Err(err) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            super::error::codes::DB_ERROR,
            "Database unavailable",
        )
        .with_meta(json!({ "cache_backend": cache_backend, "cache_ok": cache_ok }))
        .with_detail(err.to_string())
        .into_response(),
    }
}

pub async fn list_products(
    State(state): State<ApiState>,
    query: Result<Query<ProductListParams>, QueryRejection>,
) -> ApiResult<Vec<ProductRecord>> {
    let started = Instant::now();
    let Query(params) = query?;
    let query = params
        .into_query(&state.listing)
        .map_err(ApiError::validation)?;

    let key = state.keys.product_list(&query);
    let service = &state.products;
    let products = state
        .cache
        .get_or_populate(&key, state.cache_ttl, || service.list(&query))
        .await
        .map_err(product_to_api)?;

    let elapsed_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
    let meta = json!({
        "count": products.len(),
        "skip": query.skip,
        "limit": query.limit,
        "sort_by": query.sort_by,
        "sort_dir": query.sort_dir,
        "elapsed_ms": elapsed_ms,
    });

    Ok(Json(
        ApiResponse::ok(products, "Products retrieved successfully").with_meta(meta),
    ))
}

pub async fn get_product(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ProductRecord> {
    let Path(id) = id?;
    let key = state.keys.product(id);
    let service = &state.products;
    let product = state
        .cache
        .get_or_populate(&key, state.cache_ttl, || service.get_by_id(id))
        .await
        .map_err(product_to_api)?;

    Ok(Json(ApiResponse::ok(product, "Product fetched successfully")))
}

pub async fn create_product(
    State(state): State<ApiState>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let product = state
        .products
        .create(ProductDraft::from(payload))
        .await
        .map_err(product_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(product, "Product created successfully")),
    ))
}

pub async fn update_product(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> ApiResult<ProductRecord> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let product = state
        .products
        .update(id, ProductDraft::from(payload))
        .await
        .map_err(product_to_api)?;

    Ok(Json(ApiResponse::ok(product, "Product updated successfully")))
}

pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found("Not Found").with_meta(json!({ "path": uri.path() }))
}

pub async fn method_not_allowed(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::method_not_allowed().with_meta(json!({ "path": uri.path() }))
}
