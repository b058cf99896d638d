use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ListingSettings;
use crate::domain::error::DomainError;
use crate::domain::products::{ProductDraft, ProductListQuery, SortDirection, SortField};

/// Uniform body for every response, successful or not.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<&'static str>,
    pub meta: Option<Value>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_code: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl ApiResponse<()> {
    pub fn fail(error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(error_code),
            meta: None,
        }
    }
}

/// Body accepted by create and full-replace update.
#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl From<ProductPayload> for ProductDraft {
    fn from(payload: ProductPayload) -> Self {
        Self {
            name: payload.name,
            category: payload.category,
            description: payload.description,
            price: payload.price,
            stock: payload.stock,
            rating: payload.rating.unwrap_or(0.0),
        }
    }
}

/// Raw listing parameters as they arrive in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub name: Option<String>,
}

impl ProductListParams {
    pub fn into_query(self, listing: &ListingSettings) -> Result<ProductListQuery, DomainError> {
        let skip = match self.skip {
            None => 0,
            Some(skip) => u64::try_from(skip)
                .map_err(|_| DomainError::validation("skip", "must not be negative"))?,
        };
        let limit = match self.limit {
            None => listing.default_limit.get(),
            Some(limit) => u32::try_from(limit).map_err(|_| {
                DomainError::validation(
                    "limit",
                    format!("must be between 1 and {}", listing.max_limit),
                )
            })?,
        };
        let sort_by = match self.sort_by.as_deref() {
            None => SortField::default(),
            Some(value) => value.parse()?,
        };
        let sort_dir = match self.sort_dir.as_deref() {
            None => SortDirection::default(),
            Some(value) => value.parse()?,
        };

        ProductListQuery {
            skip,
            limit,
            sort_by,
            sort_dir,
            category: self.category,
            min_price: self.min_price,
            max_price: self.max_price,
            name: self.name,
        }
        .validate(listing.max_limit.get())
    }
}
