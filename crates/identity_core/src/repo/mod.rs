//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the contact store contract used by reconciliation.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes validate row-level contact invariants before
//!   persistence.
//! - Repository APIs return semantic errors (`NotFound`, `BrokenLink`) in
//!   addition to DB transport errors.

pub mod contact_repo;
