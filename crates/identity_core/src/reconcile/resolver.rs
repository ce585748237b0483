//! Governing-primary resolution and canonical primary selection.
//!
//! # Invariants
//! - The candidate set holds each governing primary exactly once.
//! - Canonical selection is total and deterministic: earliest
//!   `created_at`, then smallest `id`.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use std::collections::BTreeMap;

/// Outcome of resolving a match set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterResolution {
    /// Nothing matched; a fresh primary has to be created.
    Fresh,
    /// Exactly one governing primary; nothing is demoted.
    Single(Contact),
    /// Several governing primaries; `others` are demoted under `canonical`.
    Merge {
        canonical: Contact,
        others: Vec<Contact>,
    },
}

impl ClusterResolution {
    /// Canonical primary, when one exists.
    pub fn canonical(&self) -> Option<&Contact> {
        match self {
            Self::Fresh => None,
            Self::Single(canonical) | Self::Merge { canonical, .. } => Some(canonical),
        }
    }
}

/// Resolves the distinct governing primaries of `matches`.
///
/// Primaries govern themselves; secondaries resolve to their `linked_id`,
/// loaded from the repository when the target is not in `matches`.
///
/// # Errors
/// - `BrokenLink` when a secondary's target is missing, deleted, or not a
///   primary.
pub fn resolve_governing_primaries<R: ContactRepository + ?Sized>(
    repo: &R,
    matches: &[Contact],
) -> RepoResult<Vec<Contact>> {
    let mut primaries: BTreeMap<ContactId, Contact> = matches
        .iter()
        .filter(|contact| contact.is_primary())
        .map(|contact| (contact.id, contact.clone()))
        .collect();

    for contact in matches.iter().filter(|contact| !contact.is_primary()) {
        let linked_id = contact
            .governing_primary_id()
            .ok_or_else(|| RepoError::InvalidData(format!("contact {} has no link", contact.id)))?;
        if primaries.contains_key(&linked_id) {
            continue;
        }

        let primary = repo
            .get_contact(linked_id, true)?
            .filter(|target| target.is_active() && target.is_primary())
            .ok_or(RepoError::BrokenLink {
                contact_id: contact.id,
                linked_id,
            })?;
        primaries.insert(linked_id, primary);
    }

    Ok(primaries.into_values().collect())
}

/// Picks the canonical primary from a candidate set.
pub fn select_canonical(mut candidates: Vec<Contact>) -> ClusterResolution {
    candidates.sort_by_key(|contact| (contact.created_at, contact.id));
    let mut iter = candidates.into_iter();
    match iter.next() {
        None => ClusterResolution::Fresh,
        Some(canonical) => {
            let others: Vec<Contact> = iter.collect();
            if others.is_empty() {
                ClusterResolution::Single(canonical)
            } else {
                ClusterResolution::Merge { canonical, others }
            }
        }
    }
}

/// Resolves matches into a cluster resolution.
pub fn resolve<R: ContactRepository + ?Sized>(
    repo: &R,
    matches: &[Contact],
) -> RepoResult<ClusterResolution> {
    let candidates = resolve_governing_primaries(repo, matches)?;
    Ok(select_canonical(candidates))
}
