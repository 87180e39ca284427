//! Database layer - connection pool, repositories and the store seam
//!
//! # Design Principles
//!
//! - Connection pool (max 5 connections by default)
//! - All list operations use JOINs - no N+1 queries
//! - Unique constraints are the source of truth for uniqueness
//! - Group row locks inside transactions for the capacity rule

pub mod pool;
pub mod migrations;
pub mod repos;
pub mod store;
pub mod memory;

pub use pool::{create_pool, create_pool_with_options};
pub use repos::DbError;
pub use store::{EnrollmentStore, PgStore};
pub use memory::InMemoryStore;
