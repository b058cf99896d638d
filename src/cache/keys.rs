//! Cache key definitions.
//!
//! Keys are plain strings so any backend can store them. List keys encode
//! every listing parameter positionally, which makes equal queries share an
//! entry and keeps distinct queries apart.

use std::fmt::Write as _;

use crate::domain::products::ProductListQuery;

pub const PRODUCT_KEY_PREFIX: &str = "product";
pub const PRODUCT_LIST_KEY_PREFIX: &str = "products";

const SEPARATOR: char = ':';

/// Builds namespaced keys for product entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    /// An empty namespace yields bare keys such as `product:42`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn product(&self, id: i64) -> String {
        self.scoped(format!("{PRODUCT_KEY_PREFIX}{SEPARATOR}{id}"))
    }

    pub fn product_list(&self, query: &ProductListQuery) -> String {
        let mut key = String::from(PRODUCT_LIST_KEY_PREFIX);
        let _ = write!(
            key,
            "{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            query.skip, query.limit, query.sort_by, query.sort_dir
        );
        push_text(&mut key, query.category.as_deref());
        push_number(&mut key, query.min_price);
        push_number(&mut key, query.max_price);
        push_text(&mut key, query.name.as_deref());
        self.scoped(key)
    }

    fn scoped(&self, key: String) -> String {
        if self.namespace.is_empty() {
            key
        } else {
            format!("{}{SEPARATOR}{key}", self.namespace)
        }
    }
}

fn push_text(key: &mut String, value: Option<&str>) {
    key.push(SEPARATOR);
    if let Some(value) = value {
        for ch in value.chars() {
            match ch {
                '%' => key.push_str("%25"),
                ':' => key.push_str("%3A"),
                other => key.push(other),
            }
        }
    }
}

fn push_number(key: &mut String, value: Option<f64>) {
    key.push(SEPARATOR);
    if let Some(value) = value {
        // -0.0 and 0.0 filter identically.
        let value = if value == 0.0 { 0.0 } else { value };
        let _ = write!(key, "{value}");
    }
}
