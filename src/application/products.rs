use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::repos::{
    CreateProductParams, ProductsRepo, ProductsWriteRepo, RepoError, UpdateProductParams,
};
use crate::domain::error::DomainError;
use crate::domain::products::{ProductDraft, ProductListQuery, ProductRecord};

#[derive(Debug, Error)]
pub enum ProductServiceError {
    #[error("product {id} not found")]
    NotFound { id: i64 },
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ProductService {
    reader: Arc<dyn ProductsRepo>,
    writer: Arc<dyn ProductsWriteRepo>,
}

impl ProductService {
    pub fn new(reader: Arc<dyn ProductsRepo>, writer: Arc<dyn ProductsWriteRepo>) -> Self {
        Self { reader, writer }
    }

    pub async fn list(
        &self,
        query: &ProductListQuery,
    ) -> Result<Vec<ProductRecord>, ProductServiceError> {
        debug!(
            target = "catalog::application::products",
            skip = query.skip,
            limit = query.limit,
            sort_by = query.sort_by.as_str(),
            sort_dir = query.sort_dir.as_str(),
            category = query.category.as_deref().unwrap_or(""),
            name = query.name.as_deref().unwrap_or(""),
            "listing products"
        );

        let products = self.reader.list_products(query).await?;
        debug!(
            target = "catalog::application::products",
            count = products.len(),
            "products listed"
        );
        Ok(products)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ProductRecord, ProductServiceError> {
        match self.reader.find_by_id(id).await? {
            Some(product) => Ok(product),
            None => {
                warn!(
                    target = "catalog::application::products",
                    product_id = id,
                    "product not found"
                );
                Err(ProductServiceError::NotFound { id })
            }
        }
    }

    pub async fn create(&self, draft: ProductDraft) -> Result<ProductRecord, ProductServiceError> {
        let draft = draft.validate()?;
        let product = self
            .writer
            .create_product(CreateProductParams::from(draft))
            .await
            .inspect_err(|err| log_write_failure("create", None, err))?;

        info!(
            target = "catalog::application::products",
            product_id = product.id,
            "product created"
        );
        Ok(product)
    }

    /// Full replace of every mutable field of an existing product.
    pub async fn update(
        &self,
        id: i64,
        draft: ProductDraft,
    ) -> Result<ProductRecord, ProductServiceError> {
        let draft = draft.validate()?;
        let result = self
            .writer
            .update_product(UpdateProductParams::from_draft(id, draft))
            .await;

        let product = match result {
            Ok(product) => product,
            Err(RepoError::NotFound) => {
                warn!(
                    target = "catalog::application::products",
                    product_id = id,
                    "update target not found"
                );
                return Err(ProductServiceError::NotFound { id });
            }
            Err(err) => {
                log_write_failure("update", Some(id), &err);
                return Err(err.into());
            }
        };

        info!(
            target = "catalog::application::products",
            product_id = product.id,
            "product updated"
        );
        Ok(product)
    }
}

fn log_write_failure(op: &'static str, id: Option<i64>, err: &RepoError) {
    warn!(
        target = "catalog::application::products",
        op,
        product_id = id,
        error = %err,
        "product write rolled back"
    );
}
