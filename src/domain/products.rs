//! Product entity, listing parameters and write payload invariants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const MAX_LIST_LIMIT: u32 = 100;
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub rating: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Columns a product listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Id,
    Price,
    Stock,
    Rating,
    CreatedAt,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Id,
        SortField::Price,
        SortField::Stock,
        SortField::Rating,
        SortField::CreatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Price => "price",
            SortField::Stock => "stock",
            SortField::Rating => "rating",
            SortField::CreatedAt => "created_at",
        }
    }

    /// Column name used in `ORDER BY`. Never derived from user input.
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| {
                DomainError::validation(
                    "sort_by",
                    format!("expected one of id, price, stock, rating, created_at; got `{value}`"),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(DomainError::validation(
                "sort_dir",
                format!("expected `asc` or `desc`; got `{other}`"),
            )),
        }
    }
}

/// Filtering, ordering and pagination for a product listing.
///
/// The same value drives both the SQL statement and the cache key, so two
/// queries that compare equal always share a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductListQuery {
    pub skip: u64,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub name: Option<String>,
}

impl Default for ProductListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIST_LIMIT,
            sort_by: SortField::default(),
            sort_dir: SortDirection::default(),
            category: None,
            min_price: None,
            max_price: None,
            name: None,
        }
    }
}

impl ProductListQuery {
    /// Checks bounds and folds blank text filters into "no filter".
    ///
    /// `max_limit` can only tighten [`MAX_LIST_LIMIT`].
    pub fn validate(mut self, max_limit: u32) -> Result<Self, DomainError> {
        let max_limit = max_limit.min(MAX_LIST_LIMIT);
        if self.limit == 0 || self.limit > max_limit {
            return Err(DomainError::validation(
                "limit",
                format!("must be between 1 and {max_limit}"),
            ));
        }
        ensure_price_bound("min_price", self.min_price)?;
        ensure_price_bound("max_price", self.max_price)?;

        self.category = normalize_filter(self.category);
        self.name = normalize_filter(self.name);
        Ok(self)
    }
}

fn ensure_price_bound(field: &'static str, value: Option<f64>) -> Result<(), DomainError> {
    match value {
        Some(bound) if !bound.is_finite() => {
            Err(DomainError::validation(field, "must be a finite number"))
        }
        Some(bound) if bound < 0.0 => Err(DomainError::validation(field, "must not be negative")),
        _ => Ok(()),
    }
}

fn normalize_filter(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

/// Caller-supplied product fields for create and full-replace update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub rating: f64,
}

impl ProductDraft {
    pub fn validate(self) -> Result<Self, DomainError> {
        let name = required_text("name", self.name)?;
        let category = required_text("category", self.category)?;

        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(DomainError::validation(
                "price",
                "must be a finite number greater than zero",
            ));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("stock", "must not be negative"));
        }
        if !self.rating.is_finite() || !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(DomainError::validation(
                "rating",
                format!("must be between 0 and {MAX_RATING}"),
            ));
        }

        Ok(Self {
            name,
            category,
            description: self.description,
            price: self.price,
            stock: self.stock,
            rating: self.rating,
        })
    }
}

fn required_text(field: &'static str, value: String) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be blank"));
    }
    Ok(trimmed.to_string())
}
