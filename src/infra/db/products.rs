use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{
    CreateProductParams, ProductsRepo, ProductsWriteRepo, RepoError, UpdateProductParams,
};
use crate::domain::products::{ProductListQuery, ProductRecord, SortField};

use super::PostgresRepositories;
use super::util::{map_sqlx_error, rollback_with};

const PRODUCT_COLUMNS: &str =
    "id, name, category, description, price, stock, rating, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category: String,
    description: Option<String>,
    price: f64,
    stock: i32,
    rating: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            description: row.description,
            price: row.price,
            stock: row.stock,
            rating: row.rating,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escapes LIKE metacharacters so the value matches literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Builds the listing statement: filters, then ordering, then `OFFSET`/`LIMIT`.
///
/// The sort column comes from [`SortField::column`], never from caller text,
/// and `id` breaks ties so pages stay stable across requests.
pub fn build_list_query(query: &ProductListQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(PRODUCT_COLUMNS);
    qb.push(" FROM products WHERE TRUE");

    if let Some(category) = query.category.as_deref() {
        qb.push(" AND category ILIKE ");
        qb.push_bind(like_pattern(category));
    }
    if let Some(name) = query.name.as_deref() {
        qb.push(" AND name ILIKE ");
        qb.push_bind(like_pattern(name));
    }
    if let Some(min_price) = query.min_price {
        qb.push(" AND price >= ");
        qb.push_bind(min_price);
    }
    if let Some(max_price) = query.max_price {
        qb.push(" AND price <= ");
        qb.push_bind(max_price);
    }

    let direction = query.sort_dir.keyword();
    qb.push(" ORDER BY ");
    qb.push(query.sort_by.column());
    qb.push(" ");
    qb.push(direction);
    if query.sort_by != SortField::Id {
        qb.push(", id ");
        qb.push(direction);
    }

    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.limit));
    qb
}

#[async_trait]
impl ProductsRepo for PostgresRepositories {
    async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        let mut qb = build_list_query(query);
        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, category, description, price, stock, rating, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRecord::from))
    }
}

#[async_trait]
impl ProductsWriteRepo for PostgresRepositories {
    async fn create_product(&self, params: CreateProductParams) -> Result<ProductRecord, RepoError> {
        let CreateProductParams {
            name,
            category,
            description,
            price,
            stock,
            rating,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();
        let inserted = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products (name, category, description, price, stock, rating, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id, name, category, description, price, stock, rating, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(category)
        .bind(description)
        .bind(price)
        .bind(stock)
        .bind(rating)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(err) => return Err(rollback_with(tx, "create_product", err).await),
        };
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ProductRecord::from(row))
    }

    async fn update_product(&self, params: UpdateProductParams) -> Result<ProductRecord, RepoError> {
        let UpdateProductParams {
            id,
            name,
            category,
            description,
            price,
            stock,
            rating,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await;

        match locked {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = tx.rollback().await;
                return Err(RepoError::NotFound);
            }
            Err(err) => return Err(rollback_with(tx, "update_product.lock", err).await),
        }

        // updated_at must strictly advance even if the clock has not.
        let updated = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products
            SET name = $2,
                category = $3,
                description = $4,
                price = $5,
                stock = $6,
                rating = $7,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING id, name, category, description, price, stock, rating, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(category)
        .bind(description)
        .bind(price)
        .bind(stock)
        .bind(rating)
        .fetch_one(&mut *tx)
        .await;

        let row = match updated {
            Ok(row) => row,
            Err(err) => return Err(rollback_with(tx, "update_product", err).await),
        };
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ProductRecord::from(row))
    }
}

impl PostgresRepositories {
    /// Inserts a batch of products in one statement and one transaction.
    pub async fn insert_products(&self, batch: Vec<CreateProductParams>) -> Result<u64, RepoError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc();
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO products (name, category, description, price, stock, rating, created_at, updated_at) ",
        );
        qb.push_values(batch, |mut row, product| {
            row.push_bind(product.name)
                .push_bind(product.category)
                .push_bind(product.description)
                .push_bind(product.price)
                .push_bind(product.stock)
                .push_bind(product.rating)
                .push_bind(now)
                .push_bind(now);
        });

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let inserted = qb.build().execute(&mut *tx).await;
        let result = match inserted {
            Ok(result) => result,
            Err(err) => return Err(rollback_with(tx, "insert_products", err).await),
        };
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
