//! Application services and the persistence seams they depend on.

pub mod error;
pub mod products;
pub mod repos;
pub mod seed;
