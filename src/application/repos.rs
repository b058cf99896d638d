//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::products::{ProductDraft, ProductListQuery, ProductRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateProductParams {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub rating: f64,
}

impl From<ProductDraft> for CreateProductParams {
    fn from(draft: ProductDraft) -> Self {
        Self {
            name: draft.name,
            category: draft.category,
            description: draft.description,
            price: draft.price,
            stock: draft.stock,
            rating: draft.rating,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateProductParams {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub rating: f64,
}

impl UpdateProductParams {
    pub fn from_draft(id: i64, draft: ProductDraft) -> Self {
        Self {
            id,
            name: draft.name,
            category: draft.category,
            description: draft.description,
            price: draft.price,
            stock: draft.stock,
            rating: draft.rating,
        }
    }
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn list_products(&self, query: &ProductListQuery)
    -> Result<Vec<ProductRecord>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ProductRecord>, RepoError>;
}

#[async_trait]
pub trait ProductsWriteRepo: Send + Sync {
    async fn create_product(&self, params: CreateProductParams)
    -> Result<ProductRecord, RepoError>;

    /// Replaces every mutable field. Returns `RepoError::NotFound` without
    /// touching the store when `params.id` does not exist.
    async fn update_product(&self, params: UpdateProductParams)
    -> Result<ProductRecord, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
