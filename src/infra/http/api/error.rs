use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use crate::application::error::ErrorReport;
use crate::application::products::ProductServiceError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

use super::models::ApiResponse;

pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const DB_ERROR: &str = "DB_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
}

const SOURCE: &str = "infra::http::api";

/// Failure rendered as an envelope. `message` is public; `detail` only
/// reaches the logs through the attached [`ErrorReport`].
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    meta: Option<Value>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            meta: None,
            detail: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn validation(err: DomainError) -> Self {
        let DomainError::Validation { field, reason } = &err;
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::VALIDATION_ERROR,
            format!("Validation failed: {err}"),
        )
        .with_meta(json!({ "errors": [{ "field": field, "reason": reason }] }))
    }

    /// Request could not be decoded at all (bad JSON, wrong types, bad path).
    pub fn malformed(body_text: String) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::VALIDATION_ERROR,
            "Validation failed: request could not be parsed",
        )
        .with_meta(json!({ "errors": [{ "reason": body_text.clone() }] }))
        .with_detail(body_text)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "An unexpected error occurred.",
        )
        .with_detail(detail)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            codes::METHOD_NOT_ALLOWED,
            "Method not allowed",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self
            .detail
            .clone()
            .unwrap_or_else(|| self.message.clone());
        let mut body = ApiResponse::fail(self.code, self.message);
        body.meta = self.meta;

        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(SOURCE, self.status, format!("{}: {detail}", self.code))
            .attach(&mut response);
        response
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        other => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::DB_ERROR,
            "A database error occurred.",
        )
        .with_detail(other.to_string()),
    }
}

pub(crate) fn product_to_api(err: ProductServiceError) -> ApiError {
    match err {
        ProductServiceError::NotFound { id } => {
            ApiError::not_found("Product not found").with_detail(format!("product {id} not found"))
        }
        ProductServiceError::Invalid(err) => ApiError::validation(err),
        ProductServiceError::Repo(err) => repo_to_api(err),
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::malformed(rejection.body_text())
    }
}
