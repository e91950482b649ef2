//! PR1SM - Morning Pack Aggregator
//!
//! This crate fetches top posts from a configured list of communities,
//! keeps the ones with an image that are safe for work, and persists them
//! as a single JSON document served to the morning dashboard.

pub mod builder;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod greeting;
pub mod routes;
pub mod store;
