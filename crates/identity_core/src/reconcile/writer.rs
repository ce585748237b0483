//! Recording of genuinely new contact data as a secondary.

use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::request::Observation;
use crate::repo::contact_repo::{ContactRepository, RepoResult};
use log::info;
use std::collections::HashSet;

/// Creates a secondary under `primary_id` when the observation carries an
/// email or phone the cluster has not seen.
///
/// Only the unseen field(s) are stored; known values stay null on the new
/// row. Returns `None` when nothing is new.
pub fn write_new_data<R: ContactRepository + ?Sized>(
    repo: &R,
    primary_id: ContactId,
    observation: &Observation,
) -> RepoResult<Option<Contact>> {
    let cluster = repo.list_cluster(primary_id)?;
    let Some(new_contact) = new_data_for(primary_id, &cluster, observation) else {
        return Ok(None);
    };

    let created = repo.create_contact(&new_contact)?;
    info!(
        "event=contact_create module=reconcile status=ok precedence=secondary contact_id={} primary_id={} has_email={} has_phone={}",
        created.id,
        primary_id,
        created.email.is_some(),
        created.phone_number.is_some()
    );
    Ok(Some(created))
}

fn new_data_for(
    primary_id: ContactId,
    cluster: &[Contact],
    observation: &Observation,
) -> Option<NewContact> {
    let emails: HashSet<&str> = cluster
        .iter()
        .filter_map(|contact| contact.email.as_deref())
        .collect();
    let phones: HashSet<&str> = cluster
        .iter()
        .filter_map(|contact| contact.phone_number.as_deref())
        .collect();

    let new_email = observation
        .email()
        .filter(|email| !emails.contains(email))
        .map(str::to_string);
    let new_phone = observation
        .phone_number()
        .filter(|phone| !phones.contains(phone))
        .map(str::to_string);

    if new_email.is_none() && new_phone.is_none() {
        return None;
    }
    Some(NewContact::secondary(primary_id, new_email, new_phone))
}

#[cfg(test)]
mod tests {
    use super::new_data_for;
    use crate::model::contact::{Contact, LinkPrecedence};
    use crate::model::request::IdentifyRequest;

    fn cluster() -> Vec<Contact> {
        vec![Contact {
            id: 1,
            email: Some("doc@hillvalley.edu".to_string()),
            phone_number: Some("123456".to_string()),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }]
    }

    #[test]
    fn known_values_produce_no_row() {
        let observation = IdentifyRequest::new(Some("doc@hillvalley.edu"), Some("123456"))
            .validate()
            .unwrap();
        assert_eq!(new_data_for(1, &cluster(), &observation), None);

        let email_only = IdentifyRequest::new(Some("doc@hillvalley.edu"), None)
            .validate()
            .unwrap();
        assert_eq!(new_data_for(1, &cluster(), &email_only), None);
    }

    #[test]
    fn only_unseen_field_is_stored() {
        let observation = IdentifyRequest::new(Some("doc@hillvalley.edu"), Some("999"))
            .validate()
            .unwrap();
        let new_contact = new_data_for(1, &cluster(), &observation).unwrap();
        assert_eq!(new_contact.email, None);
        assert_eq!(new_contact.phone_number.as_deref(), Some("999"));
        assert_eq!(new_contact.linked_id, Some(1));
        assert_eq!(new_contact.link_precedence, LinkPrecedence::Secondary);
    }

    #[test]
    fn both_fields_unseen_are_stored_together() {
        let observation = IdentifyRequest::new(Some("marty@hillvalley.edu"), Some("999"))
            .validate()
            .unwrap();
        let new_contact = new_data_for(1, &cluster(), &observation).unwrap();
        assert_eq!(new_contact.email.as_deref(), Some("marty@hillvalley.edu"));
        assert_eq!(new_contact.phone_number.as_deref(), Some("999"));
    }
}
