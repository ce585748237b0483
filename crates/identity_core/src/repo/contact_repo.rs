//! Contact repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the find/create/update operations the reconciliation core
//!   needs over canonical `contacts` storage.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate row-level invariants before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Soft-deleted rows are invisible to matching and cluster reads.
//! - Every method runs on whatever connection or transaction the
//!   repository was built from; callers own the unit-of-work boundary.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "email",
    "phone_number",
    "linked_id",
    "link_precedence",
    "created_at",
    "updated_at",
    "deleted_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contact persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    InvalidData(String),
    /// A secondary points at a contact that is missing, deleted, or not a
    /// primary.
    BrokenLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// Soft delete refused: the primary still governs active secondaries.
    PrimaryHasSecondaries {
        contact_id: ContactId,
        secondary_count: usize,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether the failure is a transient store conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Db(err) => err.is_conflict(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::BrokenLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "contact {contact_id} links to {linked_id}, which is not an active primary"
            ),
            Self::PrimaryHasSecondaries {
                contact_id,
                secondary_count,
            } => write!(
                f,
                "contact {contact_id} still has {secondary_count} active secondaries"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "contact repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "contact repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "contact repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface over contact rows.
pub trait ContactRepository {
    /// Active contacts whose email equals `email` or whose phone equals
    /// `phone_number`. Absent inputs match nothing.
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>>;
    fn get_contact(&self, id: ContactId, include_deleted: bool) -> RepoResult<Option<Contact>>;
    /// Active primary `primary_id` plus its active secondaries, ordered by
    /// `created_at ASC, id ASC`.
    fn list_cluster(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>>;
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact>;
    /// Turns active primary `id` into a secondary of `primary_id`.
    fn demote_to_secondary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<()>;
    /// Rewrites every `linked_id = from_primary` to `to_primary`.
    ///
    /// Returns the active contacts that were moved.
    fn relink_secondaries(
        &self,
        from_primary: ContactId,
        to_primary: ContactId,
    ) -> RepoResult<Vec<ContactId>>;
    /// Tombstones contact `id`. Repeated deletes keep the first tombstone.
    ///
    /// # Errors
    /// - `PrimaryHasSecondaries` when active secondaries still link to `id`.
    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()>;
    /// Active secondaries whose link target is missing, deleted, or itself
    /// a secondary.
    fn find_link_violations(&self) -> RepoResult<Vec<ContactId>>;
}

/// SQLite-backed contact repository.
///
/// Built from a `Connection` or, through deref, from a `Transaction`.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_contact_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND (
                    (?1 IS NOT NULL AND email = ?1)
                    OR (?2 IS NOT NULL AND phone_number = ?2)
               )
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![email, phone_number])?;
        collect_contacts(&mut rows)
    }

    fn get_contact(&self, id: ContactId, include_deleted: bool) -> RepoResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;

        let mut rows = stmt.query(params![id, bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }

        Ok(None)
    }

    fn list_cluster(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND (
                    (id = ?1 AND link_precedence = 'primary')
                    OR linked_id = ?1
               )
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([primary_id])?;
        let cluster = collect_contacts(&mut rows)?;

        if !cluster.iter().any(|contact| contact.id == primary_id) {
            return Err(RepoError::NotFound(primary_id));
        }
        Ok(cluster)
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence.as_str(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_contact(id, false)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created contact {id} not found in read-back"))
        })
    }

    fn demote_to_secondary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<()> {
        if id == primary_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }

        let changed = self.conn.execute(
            "UPDATE contacts
             SET
                link_precedence = 'secondary',
                linked_id = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND link_precedence = 'primary'
               AND deleted_at IS NULL;",
            params![id, primary_id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn relink_secondaries(
        &self,
        from_primary: ContactId,
        to_primary: ContactId,
    ) -> RepoResult<Vec<ContactId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM contacts
             WHERE linked_id = ?1
               AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC;",
        )?;
        let moved = stmt
            .query_map([from_primary], |row| row.get::<_, ContactId>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        self.conn.execute(
            "UPDATE contacts
             SET
                linked_id = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE linked_id = ?1;",
            params![from_primary, to_primary],
        )?;

        Ok(moved)
    }

    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()> {
        let secondary_count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM contacts
             WHERE linked_id = ?1
               AND deleted_at IS NULL;",
            [id],
            |row| row.get(0),
        )?;
        if secondary_count > 0 {
            return Err(RepoError::PrimaryHasSecondaries {
                contact_id: id,
                secondary_count: secondary_count as usize,
            });
        }

        let changed = self.conn.execute(
            "UPDATE contacts
             SET
                deleted_at = COALESCE(deleted_at, strftime('%s', 'now') * 1000),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn find_link_violations(&self) -> RepoResult<Vec<ContactId>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id
             FROM contacts c
             LEFT JOIN contacts p ON p.id = c.linked_id
             WHERE c.deleted_at IS NULL
               AND c.link_precedence = 'secondary'
               AND (
                    p.id IS NULL
                    OR p.deleted_at IS NOT NULL
                    OR p.link_precedence <> 'primary'
               )
             ORDER BY c.id ASC;",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, ContactId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn collect_contacts(rows: &mut rusqlite::Rows<'_>) -> RepoResult<Vec<Contact>> {
    let mut contacts = Vec::new();
    while let Some(row) = rows.next()? {
        contacts.push(parse_contact_row(row)?);
    }
    Ok(contacts)
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence"
        ))
    })?;

    let contact = Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("contact {}: {err}", contact.id)))?;
    Ok(contact)
}

fn ensure_contact_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'contacts';",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(RepoError::MissingRequiredTable("contacts"));
    }

    let mut stmt = conn.prepare("PRAGMA table_info(contacts);")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    for &column in REQUIRED_COLUMNS {
        if !columns.iter().any(|current| current == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: "contacts",
                column,
            });
        }
    }

    Ok(())
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
