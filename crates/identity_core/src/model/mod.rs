//! Contact domain model and request/response shapes.
//!
//! # Responsibility
//! - Define the canonical `Contact` row shared by storage and reconciliation.
//! - Define the identify request contract and its input validation.
//!
//! # Invariants
//! - Every contact is identified by an immutable store-assigned `ContactId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod contact;
pub mod request;
