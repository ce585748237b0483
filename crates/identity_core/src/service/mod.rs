//! Core use-case services.
//!
//! # Responsibility
//! - Own the unit-of-work boundary around reconciliation.
//! - Keep CLI callers decoupled from storage details.

pub mod identify_service;
