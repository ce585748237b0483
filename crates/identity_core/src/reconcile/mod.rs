//! Cluster resolution and merge pipeline.
//!
//! # Responsibility
//! - Run Matcher → ClusterResolver → Merger → NewContactWriter →
//!   ResponseBuilder against one repository handle.
//!
//! # Invariants
//! - Callers provide a repository bound to a single transaction; this
//!   module never commits or rolls back.
//! - After a successful run every secondary in the touched cluster links
//!   directly to the canonical primary.

pub mod matcher;
pub mod merger;
pub mod resolver;
pub mod response;
pub mod writer;

use crate::model::contact::{ContactId, NewContact};
use crate::model::request::{ConsolidatedContact, IdentifyResponse, Observation};
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::{debug, info};
use resolver::ClusterResolution;

/// What one reconciliation run did, plus the resulting unified view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub contact: ConsolidatedContact,
    /// Row inserted by this run (fresh primary or new-data secondary).
    pub created_contact_id: Option<ContactId>,
    /// Contacts moved under the canonical primary by a merge.
    pub merged_contact_ids: Vec<ContactId>,
}

impl Reconciliation {
    pub fn into_response(self) -> IdentifyResponse {
        IdentifyResponse {
            contact: self.contact,
        }
    }
}

/// Reconciles one observation against the store.
pub fn reconcile<R: ContactRepository + ?Sized>(
    repo: &R,
    observation: &Observation,
) -> RepoResult<Reconciliation> {
    let matches = matcher::find_matches(repo, observation)?;
    debug!(
        "event=reconcile_match module=reconcile match_count={}",
        matches.len()
    );

    let resolution = resolver::resolve(repo, &matches)?;
    let (canonical_id, created_contact_id, merged_contact_ids) = match resolution.canonical() {
        None => {
            let created = repo.create_contact(&NewContact::primary(
                observation.email().map(str::to_string),
                observation.phone_number().map(str::to_string),
            ))?;
            info!(
                "event=contact_create module=reconcile status=ok precedence=primary contact_id={}",
                created.id
            );
            (created.id, Some(created.id), Vec::new())
        }
        Some(canonical) => {
            let merged = match &resolution {
                ClusterResolution::Merge { others, .. } => {
                    merger::merge_into_canonical(repo, canonical, others)?
                }
                _ => Vec::new(),
            };
            let created = writer::write_new_data(repo, canonical.id, observation)?;
            (canonical.id, created.map(|contact| contact.id), merged)
        }
    };

    let contact = response::build_response(repo, canonical_id)?;
    Ok(Reconciliation {
        contact,
        created_contact_id,
        merged_contact_ids,
    })
}
