//! Unified identity view assembly.
//!
//! # Invariants
//! - Emails and phone numbers are deduplicated, first-seen order.
//! - The primary's own email/phone, when present, is moved to the front
//!   by an explicit reordering step.
//! - `secondary_contact_ids` holds every cluster member except the primary.

use crate::model::contact::{Contact, ContactId};
use crate::model::request::ConsolidatedContact;
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};

/// Re-fetches the cluster of `primary_id` and builds its unified view.
pub fn build_response<R: ContactRepository + ?Sized>(
    repo: &R,
    primary_id: ContactId,
) -> RepoResult<ConsolidatedContact> {
    let cluster = repo.list_cluster(primary_id)?;
    consolidate(primary_id, &cluster)
}

/// Builds the unified view from an already-loaded cluster.
///
/// # Errors
/// - `NotFound` when `primary_id` is not a member of `cluster`.
pub fn consolidate(primary_id: ContactId, cluster: &[Contact]) -> RepoResult<ConsolidatedContact> {
    let primary = cluster
        .iter()
        .find(|contact| contact.id == primary_id)
        .ok_or(RepoError::NotFound(primary_id))?;

    let mut emails = dedup_values(cluster.iter().map(|contact| contact.email.as_deref()));
    let mut phone_numbers =
        dedup_values(cluster.iter().map(|contact| contact.phone_number.as_deref()));
    move_to_front(&mut emails, primary.email.as_deref());
    move_to_front(&mut phone_numbers, primary.phone_number.as_deref());

    let secondary_contact_ids = cluster
        .iter()
        .filter(|contact| contact.id != primary_id)
        .map(|contact| contact.id)
        .collect();

    Ok(ConsolidatedContact {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    })
}

fn dedup_values<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for value in values.flatten() {
        if !unique.iter().any(|seen| seen == value) {
            unique.push(value.to_string());
        }
    }
    unique
}

fn move_to_front(values: &mut Vec<String>, leading: Option<&str>) {
    let Some(leading) = leading else {
        return;
    };
    if let Some(position) = values.iter().position(|value| value == leading) {
        let value = values.remove(position);
        values.insert(0, value);
    }
}
