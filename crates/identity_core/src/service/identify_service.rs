//! Identify use-case service.
//!
//! # Responsibility
//! - Validate identify requests before any store interaction.
//! - Run each reconciliation as one `BEGIN IMMEDIATE` unit of work.
//! - Retry the whole unit of work on store conflicts, within a bound.
//!
//! # Invariants
//! - A failed attempt leaves no partial writes: its transaction is dropped
//!   without commit, which rolls it back.
//! - Reconciliations on the same database are serialized by SQLite's write
//!   lock, taken before the first read of each attempt.
//! - Log lines carry ids and counts only, never emails or phone numbers.

use crate::model::contact::ContactId;
use crate::model::request::{
    ConsolidatedContact, IdentifyRequest, IdentifyResponse, Observation, RequestValidationError,
};
use crate::reconcile::{reconcile, response::build_response, Reconciliation};
use crate::repo::contact_repo::{ContactRepository, RepoError, SqliteContactRepository};
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Bounded retry for store conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 count as 1.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Errors surfaced by identify use-cases.
#[derive(Debug)]
pub enum IdentifyError {
    /// Caller-correctable input problem; the store was not touched.
    InvalidRequest(RequestValidationError),
    /// Requested contact does not exist or is soft-deleted.
    ContactNotFound(ContactId),
    /// Store conflicts persisted through every attempt.
    Conflict { attempts: u32, source: RepoError },
    /// Any other store failure.
    Store(RepoError),
}

impl IdentifyError {
    /// Returns whether the caller can fix the failure by changing input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::ContactNotFound(_))
    }
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(err) => write!(f, "{err}"),
            Self::ContactNotFound(id) => write!(f, "contact not found: {id}"),
            Self::Conflict { attempts, source } => {
                write!(f, "store conflict after {attempts} attempt(s): {source}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRequest(err) => Some(err),
            Self::ContactNotFound(_) => None,
            Self::Conflict { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RequestValidationError> for IdentifyError {
    fn from(value: RequestValidationError) -> Self {
        Self::InvalidRequest(value)
    }
}

impl From<RepoError> for IdentifyError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Identify service over one SQLite connection.
pub struct IdentifyService<'conn> {
    conn: &'conn mut Connection,
    retry: RetryPolicy,
}

impl<'conn> IdentifyService<'conn> {
    /// Creates a service on a migrated connection with the default retry
    /// policy.
    pub fn try_new(conn: &'conn mut Connection) -> Result<Self, IdentifyError> {
        SqliteContactRepository::try_new(conn)?;
        Ok(Self {
            conn,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reconciles one request and returns the unified identity.
    pub fn identify(&mut self, request: &IdentifyRequest) -> Result<IdentifyResponse, IdentifyError> {
        self.reconcile_request(request)
            .map(Reconciliation::into_response)
    }

    /// Reconciles one request and reports what the run changed.
    ///
    /// # Errors
    /// - `InvalidRequest` before any store access.
    /// - `Conflict` when every attempt hit a store conflict.
    /// - `Store` for any other failure; nothing is retried or committed.
    pub fn reconcile_request(
        &mut self,
        request: &IdentifyRequest,
    ) -> Result<Reconciliation, IdentifyError> {
        let request_id = Uuid::new_v4();
        let observation = match request.validate() {
            Ok(observation) => observation,
            Err(err) => {
                warn!(
                    "event=identify module=service status=rejected request_id={} reason={:?}",
                    request_id, err
                );
                return Err(err.into());
            }
        };

        let started_at = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        info!(
            "event=identify module=service status=start request_id={} has_email={} has_phone={}",
            request_id,
            observation.email().is_some(),
            observation.phone_number().is_some()
        );

        loop {
            match self.run_attempt(&observation) {
                Ok(reconciliation) => {
                    info!(
                        "event=identify module=service status=ok request_id={} attempt={} duration_ms={} primary_id={} created={} merged_count={}",
                        request_id,
                        attempt,
                        started_at.elapsed().as_millis(),
                        reconciliation.contact.primary_contact_id,
                        reconciliation.created_contact_id.is_some(),
                        reconciliation.merged_contact_ids.len()
                    );
                    return Ok(reconciliation);
                }
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    warn!(
                        "event=identify module=service status=retry request_id={} attempt={} error={}",
                        request_id, attempt, err
                    );
                    std::thread::sleep(self.retry.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "event=identify module=service status=error request_id={} attempt={} duration_ms={} conflict={} error={}",
                        request_id,
                        attempt,
                        started_at.elapsed().as_millis(),
                        err.is_conflict(),
                        err
                    );
                    if err.is_conflict() {
                        return Err(IdentifyError::Conflict {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    return Err(IdentifyError::Store(err));
                }
            }
        }
    }

    /// Returns the unified view of the cluster containing `contact_id`
    /// without writing anything.
    pub fn cluster_view(&mut self, contact_id: ContactId) -> Result<ConsolidatedContact, IdentifyError> {
        let tx = self.conn.transaction()?;
        let view = {
            let repo = SqliteContactRepository::try_new(&tx)?;
            let contact = repo
                .get_contact(contact_id, false)?
                .ok_or(IdentifyError::ContactNotFound(contact_id))?;
            let primary_id = contact.governing_primary_id().ok_or_else(|| {
                RepoError::InvalidData(format!("contact {contact_id} has no governing primary"))
            })?;
            build_response(&repo, primary_id)?
        };
        tx.commit()?;
        Ok(view)
    }

    fn run_attempt(&mut self, observation: &Observation) -> Result<Reconciliation, RepoError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reconciliation = {
            let repo = SqliteContactRepository::try_new(&tx)?;
            reconcile(&repo, observation)?
        };
        tx.commit()?;
        Ok(reconciliation)
    }
}

impl From<rusqlite::Error> for IdentifyError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.into())
    }
}
