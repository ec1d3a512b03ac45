//! STOREFRONT — E-commerce Demo Stack
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod analytics;
pub mod api;
pub mod config;
pub mod datagen;
pub mod simulator;
pub mod store;
pub mod types;
