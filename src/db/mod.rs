//! SQLite-backed listing store.
//!
//! This module provides:
//! - Database initialization and versioned migrations
//! - SQLite connection options (WAL, busy timeout, foreign keys)
//! - `Repository`, the `ListingStore` implementation over sqlx

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
