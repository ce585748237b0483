//! Core domain logic for customer identity reconciliation.
//! This crate is the single source of truth for contact cluster invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig};
pub use model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact};
pub use model::request::{
    ConsolidatedContact, IdentifyRequest, IdentifyResponse, Observation, RequestValidationError,
};
pub use reconcile::{reconcile, Reconciliation};
pub use repo::contact_repo::{ContactRepository, RepoError, RepoResult, SqliteContactRepository};
pub use service::identify_service::{IdentifyError, IdentifyService, RetryPolicy};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
