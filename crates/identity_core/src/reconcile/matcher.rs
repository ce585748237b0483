//! Seed lookup for cluster resolution.

use crate::model::contact::Contact;
use crate::model::request::Observation;
use crate::repo::contact_repo::{ContactRepository, RepoResult};

/// Returns every active contact sharing the observation's email or phone.
///
/// Read-only. An absent field matches nothing; the result may be empty.
pub fn find_matches<R: ContactRepository + ?Sized>(
    repo: &R,
    observation: &Observation,
) -> RepoResult<Vec<Contact>> {
    repo.find_matching(observation.email(), observation.phone_number())
}
