//! Product catalog HTTP service.
//!
//! Requests flow through [`infra::http`] into the
//! [`application::products::ProductService`]; reads are served through the
//! [`cache::ReadThroughCache`] in front of the Postgres repositories in
//! [`infra::db`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
