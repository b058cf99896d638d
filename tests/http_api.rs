use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use catalog::application::products::ProductService;
use catalog::application::repos::{
    CreateProductParams, HealthRepo, ProductsRepo, ProductsWriteRepo, RepoError,
    UpdateProductParams,
};
use catalog::cache::{CacheConfig, CacheKeys, MemoryCacheStore, ReadThroughCache};
use catalog::config::{CorsSettings, ListingSettings};
use catalog::domain::products::{ProductListQuery, ProductRecord, SortDirection, SortField};
use catalog::infra::http::{ApiState, build_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tower::ServiceExt;

const PANIC_ID: i64 = 666;

#[derive(Default)]
struct InMemoryProducts {
    rows: Mutex<Vec<ProductRecord>>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    db_down: AtomicBool,
}

impl InMemoryProducts {
    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<ProductRecord>> {
        self.rows.lock().expect("rows lock")
    }

    fn check_reads(&self) -> Result<(), RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductsRepo for InMemoryProducts {
    async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        self.check_reads()?;
        let mut rows: Vec<ProductRecord> = self
            .rows()
            .iter()
            .filter(|row| {
                query.category.as_deref().is_none_or(|category| {
                    row.category
                        .to_lowercase()
                        .contains(&category.to_lowercase())
                })
            })
            .filter(|row| query.min_price.is_none_or(|min| row.price >= min))
            .filter(|row| query.max_price.is_none_or(|max| row.price <= max))
            .cloned()
            .collect();

        rows.sort_by(|a, b| match query.sort_by {
            SortField::Price => a.price.total_cmp(&b.price).then(a.id.cmp(&b.id)),
            _ => a.id.cmp(&b.id),
        });
        if query.sort_dir == SortDirection::Desc {
            rows.reverse();
        }

        Ok(rows
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ProductRecord>, RepoError> {
        self.check_reads()?;
        if id == PANIC_ID {
            panic!("row decoder exploded");
        }
        Ok(self.rows().iter().find(|row| row.id == id).cloned())
    }
}

#[async_trait]
impl ProductsWriteRepo for InMemoryProducts {
    async fn create_product(&self, params: CreateProductParams) -> Result<ProductRecord, RepoError> {
        let mut rows = self.rows();
        let now = OffsetDateTime::now_utc();
        let record = ProductRecord {
            id: rows.iter().map(|row| row.id).max().unwrap_or(0) + 1,
            name: params.name,
            category: params.category,
            description: params.description,
            price: params.price,
            stock: params.stock,
            rating: params.rating,
            created_at: now,
            updated_at: now,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn update_product(&self, params: UpdateProductParams) -> Result<ProductRecord, RepoError> {
        let mut rows = self.rows();
        let row = rows
            .iter_mut()
            .find(|row| row.id == params.id)
            .ok_or(RepoError::NotFound)?;
        row.name = params.name;
        row.category = params.category;
        row.description = params.description;
        row.price = params.price;
        row.stock = params.stock;
        row.rating = params.rating;
        row.updated_at =
            OffsetDateTime::now_utc().max(row.updated_at + time::Duration::microseconds(1));
        Ok(row.clone())
    }
}

#[async_trait]
impl HealthRepo for InMemoryProducts {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.db_down.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }
}

fn build_app(repo: Arc<InMemoryProducts>) -> Router {
    let config = CacheConfig::default();
    let store = Arc::new(MemoryCacheStore::new(&config));
    let state = ApiState {
        products: Arc::new(ProductService::new(repo.clone(), repo.clone())),
        cache: ReadThroughCache::new(store, true),
        keys: CacheKeys::new("test"),
        cache_ttl: Duration::from_secs(60),
        listing: ListingSettings {
            default_limit: NonZeroU32::new(10).expect("non-zero"),
            max_limit: NonZeroU32::new(100).expect("non-zero"),
        },
        health: repo,
    };
    build_router(
        state,
        &CorsSettings {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    )
}

async fn seeded() -> (Router, Arc<InMemoryProducts>) {
    let repo = Arc::new(InMemoryProducts::default());
    for (name, category, price) in [
        ("Walnut Desk", "Home", 320.0),
        ("Rust in Action", "Books", 45.5),
        ("Cotton Hoodie", "Clothes", 60.0),
        ("Steel Lamp", "Home", 80.25),
    ] {
        repo.create_product(CreateProductParams {
            name: name.to_string(),
            category: category.to_string(),
            description: None,
            price,
            stock: 5,
            rating: 4.0,
        })
        .await
        .expect("seed row");
    }
    (build_app(repo.clone()), repo)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).expect("request should build"))
        .await
        .expect("router should respond");

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let json = serde_json::from_slice(&bytes).expect("body should be JSON");
    (status, json)
}

fn assert_failure(body: &Value, code: &str) {
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errorCode"], json!(code));
    assert_eq!(body["data"], Value::Null);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[tokio::test]
async fn root_returns_success_envelope() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["errorCode"], Value::Null);
    assert_eq!(body["data"]["service"], json!("catalog"));
}

#[tokio::test]
async fn list_applies_filters_sorting_and_reports_meta() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/products?category=home&sort_by=price&sort_dir=desc&limit=5",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, ["Walnut Desk", "Steel Lamp"]);

    let meta = &body["meta"];
    assert_eq!(meta["count"], json!(2));
    assert_eq!(meta["skip"], json!(0));
    assert_eq!(meta["limit"], json!(5));
    assert_eq!(meta["sort_by"], json!("price"));
    assert_eq!(meta["sort_dir"], json!("desc"));
    assert!(meta["elapsed_ms"].is_number());
}

#[tokio::test]
async fn first_page_of_category_is_sorted_by_price() {
    let repo = Arc::new(InMemoryProducts::default());
    for i in 0..20_u32 {
        let category = if i % 4 == 3 { "Home" } else { "Tech" };
        repo.create_product(CreateProductParams {
            name: format!("Item {i}"),
            category: category.to_string(),
            description: None,
            price: f64::from(200 - i * 7) + 0.99,
            stock: 3,
            rating: 4.0,
        })
        .await
        .expect("seed row");
    }
    let app = build_app(repo);

    let (status, body) = send(
        &app,
        Method::GET,
        "/products?skip=0&limit=10&sort_by=price&sort_dir=asc&category=Tech",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().expect("data array");
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|row| row["category"] == json!("Tech")));
    let prices: Vec<f64> = rows
        .iter()
        .map(|row| row["price"].as_f64().expect("numeric price"))
        .collect();
    assert!(prices.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(body["meta"]["count"], json!(10));
}

#[tokio::test]
async fn list_rejects_unknown_sort_field() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, "/products?sort_by=name", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_failure(&body, "VALIDATION_ERROR");
    assert_eq!(body["meta"]["errors"][0]["field"], json!("sort_by"));
}

#[tokio::test]
async fn list_rejects_out_of_range_limit() {
    let (app, _) = seeded().await;
    for uri in ["/products?limit=0", "/products?limit=101", "/products?skip=-1"] {
        let (status, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert_failure(&body, "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn list_rejects_non_numeric_price() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, "/products?min_price=cheap", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_failure(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_product_is_404_envelope() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, "/products/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body, "NOT_FOUND");
}

#[tokio::test]
async fn create_returns_201_and_record_is_readable() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/products",
        Some(json!({
            "name": "  Oak Shelf ",
            "category": "Home",
            "description": "Three tiers",
            "price": 129.99,
            "stock": 12
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["name"], json!("Oak Shelf"));
    assert_eq!(body["data"]["rating"], json!(0.0));
    let id = body["data"]["id"].as_i64().expect("id");

    let (status, body) = send(&app, Method::GET, &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], json!("Three tiers"));
}

#[tokio::test]
async fn create_with_invalid_fields_is_422() {
    let (app, repo) = seeded().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/products",
        Some(json!({ "name": "Free Lunch", "category": "Home", "price": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_failure(&body, "VALIDATION_ERROR");
    assert_eq!(body["meta"]["errors"][0]["field"], json!("price"));
    assert_eq!(repo.rows().len(), 4);
}

#[tokio::test]
async fn malformed_json_is_422() {
    let (app, _) = seeded().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/products")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn update_replaces_fields() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        Method::PUT,
        "/products/2",
        Some(json!({
            "name": "Rust in Action, 2nd ed.",
            "category": "Books",
            "price": 52.0,
            "stock": 3,
            "rating": 4.8
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(2));
    assert_eq!(body["data"]["name"], json!("Rust in Action, 2nd ed."));
    assert_eq!(body["data"]["stock"], json!(3));
    assert_eq!(body["data"]["rating"], json!(4.8));
}

#[tokio::test]
async fn update_of_missing_product_is_404() {
    let (app, _) = seeded().await;
    let (status, body) = send(
        &app,
        Method::PUT,
        "/products/404",
        Some(json!({ "name": "Ghost", "category": "Toys", "price": 1.0 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body, "NOT_FOUND");
}

#[tokio::test]
async fn reads_are_cached_and_writes_do_not_invalidate() {
    let (app, repo) = seeded().await;

    let (_, first) = send(&app, Method::GET, "/products/1", None).await;
    let reads_after_first = repo.reads.load(Ordering::SeqCst);
    assert_eq!(first["data"]["name"], json!("Walnut Desk"));

    let (status, _) = send(
        &app,
        Method::PUT,
        "/products/1",
        Some(json!({ "name": "Maple Desk", "category": "Home", "price": 300.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, second) = send(&app, Method::GET, "/products/1", None).await;
    assert_eq!(second["data"]["name"], json!("Walnut Desk"));
    assert_eq!(repo.reads.load(Ordering::SeqCst), reads_after_first);
}

#[tokio::test]
async fn store_failure_is_500_db_error() {
    let (app, repo) = seeded().await;
    repo.fail_reads.store(true, Ordering::SeqCst);

    let (status, body) = send(&app, Method::GET, "/products?limit=3", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_failure(&body, "DB_ERROR");
    assert!(
        !body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("connection reset")
    );
}

#[tokio::test]
async fn handler_panic_is_500_internal_error() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, &format!("/products/{PANIC_ID}"), None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_failure(&body, "INTERNAL_ERROR");
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::GET, "/nowhere", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body, "NOT_FOUND");
    assert_eq!(body["meta"]["path"], json!("/nowhere"));
}

#[tokio::test]
async fn delete_is_not_routed() {
    let (app, _) = seeded().await;
    let (status, body) = send(&app, Method::DELETE, "/products/1", None).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_failure(&body, "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn health_reflects_database_state() {
    let (app, repo) = seeded().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["cache_backend"], json!("memory"));
    assert_eq!(body["meta"]["cache_ok"], json!(true));

    repo.db_down.store(true, Ordering::SeqCst);
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_failure(&body, "DB_ERROR");
}
