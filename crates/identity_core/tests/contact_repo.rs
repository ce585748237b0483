use identity_core::db::migrations::latest_version;
use identity_core::db::open_db_in_memory;
use identity_core::{
    ContactRepository, ContactValidationError, LinkPrecedence, NewContact, RepoError,
    SqliteContactRepository,
};
use rusqlite::{params, Connection};

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let created = repo
        .create_contact(&NewContact::primary(some("a@example.com"), some("123")))
        .unwrap();
    let loaded = repo.get_contact(created.id, false).unwrap().unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.link_precedence, LinkPrecedence::Primary);
    assert_eq!(loaded.linked_id, None);
    assert!(loaded.created_at > 0);
    assert!(loaded.is_active());
}

#[test]
fn find_matching_uses_email_or_phone_and_ignores_absent_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let by_email = repo
        .create_contact(&NewContact::primary(some("a@example.com"), None))
        .unwrap();
    let by_phone = repo
        .create_contact(&NewContact::primary(None, some("123")))
        .unwrap();
    repo.create_contact(&NewContact::primary(some("other@example.com"), some("999")))
        .unwrap();

    let both = repo
        .find_matching(Some("a@example.com"), Some("123"))
        .unwrap();
    let ids: Vec<i64> = both.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![by_email.id, by_phone.id]);

    let email_only = repo.find_matching(Some("a@example.com"), None).unwrap();
    assert_eq!(email_only.len(), 1);
    assert_eq!(email_only[0].id, by_email.id);

    assert!(repo.find_matching(None, None).unwrap().is_empty());
    assert!(repo
        .find_matching(Some("missing@example.com"), Some("000"))
        .unwrap()
        .is_empty());
}

#[test]
fn demote_and_relink_flatten_to_new_primary() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let keep = repo
        .create_contact(&NewContact::primary(some("keep@example.com"), None))
        .unwrap();
    let fold = repo
        .create_contact(&NewContact::primary(some("fold@example.com"), None))
        .unwrap();
    let alias = repo
        .create_contact(&NewContact::secondary(fold.id, None, some("555")))
        .unwrap();

    repo.demote_to_secondary(fold.id, keep.id).unwrap();
    let moved = repo.relink_secondaries(fold.id, keep.id).unwrap();
    assert_eq!(moved, vec![alias.id]);

    let cluster = repo.list_cluster(keep.id).unwrap();
    let ids: Vec<i64> = cluster.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![keep.id, fold.id, alias.id]);
    assert!(repo.find_link_violations().unwrap().is_empty());

    let err = repo.list_cluster(fold.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == fold.id));
}

#[test]
fn demote_rejects_secondaries_and_self_links() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo
        .create_contact(&NewContact::primary(some("a@example.com"), None))
        .unwrap();
    let secondary = repo
        .create_contact(&NewContact::secondary(primary.id, None, some("1")))
        .unwrap();

    let err = repo.demote_to_secondary(secondary.id, primary.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == secondary.id));

    let err = repo.demote_to_secondary(primary.id, primary.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ContactValidationError::SelfLink(_))
    ));
}

#[test]
fn create_rejects_contact_without_email_or_phone() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let err = repo
        .create_contact(&NewContact::primary(None, None))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ContactValidationError::MissingContactInfo)
    ));
}

#[test]
fn soft_delete_hides_contact_and_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let contact = repo
        .create_contact(&NewContact::primary(some("a@example.com"), None))
        .unwrap();
    repo.soft_delete_contact(contact.id).unwrap();
    let first_deleted_at = repo
        .get_contact(contact.id, true)
        .unwrap()
        .unwrap()
        .deleted_at;
    repo.soft_delete_contact(contact.id).unwrap();

    assert!(repo.get_contact(contact.id, false).unwrap().is_none());
    let deleted = repo.get_contact(contact.id, true).unwrap().unwrap();
    assert!(deleted.deleted_at.is_some());
    assert_eq!(deleted.deleted_at, first_deleted_at);
    assert!(repo
        .find_matching(Some("a@example.com"), None)
        .unwrap()
        .is_empty());

    let err = repo.soft_delete_contact(4_242).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(4_242)));
}

#[test]
fn soft_delete_refuses_primary_with_active_secondaries() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo
        .create_contact(&NewContact::primary(some("a@example.com"), some("1")))
        .unwrap();
    let secondary = repo
        .create_contact(&NewContact::secondary(primary.id, None, some("2")))
        .unwrap();

    let err = repo.soft_delete_contact(primary.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::PrimaryHasSecondaries {
            contact_id,
            secondary_count: 1,
        } if contact_id == primary.id
    ));
    assert!(repo.get_contact(primary.id, false).unwrap().is_some());
    assert!(repo.find_link_violations().unwrap().is_empty());

    repo.soft_delete_contact(secondary.id).unwrap();
    repo.soft_delete_contact(primary.id).unwrap();
    assert!(repo.get_contact(primary.id, false).unwrap().is_none());
    assert!(repo.find_link_violations().unwrap().is_empty());
}

#[test]
fn link_violations_report_secondaries_under_deleted_primary() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo
        .create_contact(&NewContact::primary(some("a@example.com"), None))
        .unwrap();
    let secondary = repo
        .create_contact(&NewContact::secondary(primary.id, None, some("1")))
        .unwrap();
    assert!(repo.find_link_violations().unwrap().is_empty());

    conn.execute(
        "UPDATE contacts SET deleted_at = 1000 WHERE id = ?1;",
        [primary.id],
    )
    .unwrap();
    assert_eq!(repo.find_link_violations().unwrap(), vec![secondary.id]);
}

#[test]
fn read_rejects_invalid_persisted_precedence() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
        .unwrap();
    conn.execute(
        "INSERT INTO contacts (id, email, link_precedence) VALUES (?1, ?2, 'tertiary');",
        params![7, "a@example.com"],
    )
    .unwrap();

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let err = repo.get_contact(7, false).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteContactRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_contacts_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteContactRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("contacts"))
    ));
}

#[test]
fn repository_rejects_connection_missing_required_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE contacts (
            id INTEGER PRIMARY KEY,
            email TEXT,
            phone_number TEXT,
            linked_id INTEGER,
            link_precedence TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteContactRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "contacts",
            column: "deleted_at"
        })
    ));
}
