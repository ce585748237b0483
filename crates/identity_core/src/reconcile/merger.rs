//! Demotion of non-canonical primaries and one-hop relinking.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::info;

/// Folds every primary in `others` into `canonical`'s cluster.
///
/// Each demoted primary becomes a secondary of `canonical`, then its former
/// secondaries are relinked straight to `canonical` so no secondary ever
/// points at another secondary.
///
/// Returns the ids that are now secondaries of `canonical` because of this
/// merge, in demotion order.
pub fn merge_into_canonical<R: ContactRepository + ?Sized>(
    repo: &R,
    canonical: &Contact,
    others: &[Contact],
) -> RepoResult<Vec<ContactId>> {
    let mut merged = Vec::new();
    for demoted in others {
        repo.demote_to_secondary(demoted.id, canonical.id)?;
        let relinked = repo.relink_secondaries(demoted.id, canonical.id)?;

        info!(
            "event=cluster_merge module=reconcile status=ok canonical_id={} demoted_id={} relinked_count={}",
            canonical.id,
            demoted.id,
            relinked.len()
        );
        merged.push(demoted.id);
        merged.extend(relinked);
    }
    Ok(merged)
}
