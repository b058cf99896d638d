//! Synthetic catalog data for local development and load tests.

use rand::Rng;

use crate::domain::products::{MAX_RATING, ProductDraft};

pub const CATEGORIES: [&str; 5] = ["Tech", "Books", "Clothes", "Home", "Toys"];

const ADJECTIVES: [&str; 10] = [
    "Sleek", "Rustic", "Ergonomic", "Smart", "Vintage", "Modern", "Compact", "Durable",
    "Elegant", "Portable",
];
const MATERIALS: [&str; 8] = [
    "Steel", "Wooden", "Cotton", "Plastic", "Glass", "Leather", "Granite", "Bamboo",
];
const KINDS: [&str; 10] = [
    "Chair", "Lamp", "Shirt", "Phone", "Watch", "Desk", "Novel", "Backpack", "Puzzle", "Speaker",
];

const MIN_PRICE: f64 = 1.0;
const MAX_PRICE: f64 = 1000.0;
const MAX_STOCK: i32 = 200;

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values[rng.random_range(0..values.len())]
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Builds one random product whose fields already satisfy `ProductDraft::validate`.
pub fn random_product<R: Rng + ?Sized>(rng: &mut R) -> ProductDraft {
    let name = format!(
        "{} {} {}",
        pick(rng, &ADJECTIVES),
        pick(rng, &MATERIALS),
        pick(rng, &KINDS)
    );
    let category = pick(rng, &CATEGORIES).to_string();
    let description = Some(format!("A {} item from the {category} range.", name.to_lowercase()));

    ProductDraft {
        name,
        category,
        description,
        price: round_to(rng.random_range(MIN_PRICE..=MAX_PRICE), 2),
        stock: rng.random_range(0..=MAX_STOCK),
        rating: round_to(rng.random_range(0.0..=MAX_RATING), 1),
    }
}

pub fn random_batch<R: Rng + ?Sized>(rng: &mut R, size: usize) -> Vec<ProductDraft> {
    (0..size).map(|_| random_product(rng)).collect()
}
