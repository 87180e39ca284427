//! marlin-server: enrollment API for the Marlin language school
//!
//! Students, class groups and the enrollments between them, served over
//! HTTP and backed by PostgreSQL.

pub mod db;
pub mod http;
pub mod models;
pub mod service;

pub use http::{build_router, run_server, ServerConfig};
pub use service::{EnrollmentPolicy, EnrollmentService, ServiceError};
