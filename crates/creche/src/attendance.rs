//! Daily attendance marks.
//!
//! One record per child per day, keyed `<childId>__<YYYY-MM-DD>`. Marking the
//! same child twice on one day replaces the earlier status; `createdAt` keeps
//! the time of the first mark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actor::Actor;
use crate::child::parse_calendar_date;
use crate::error::{Error, Result};
use crate::identity::KEY_DELIMITER;
use crate::store::{
    Collection, Document, DocumentStore, StoreError, StoreResult, TxAction, TxOutcome,
};

/// Attendance status for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Attended.
    Present,
    /// Did not attend.
    Absent,
    /// Arrived late.
    Late,
    /// Absence excused by the parent.
    Excused,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::Late => write!(f, "late"),
            Self::Excused => write!(f, "excused"),
        }
    }
}

/// A stored attendance mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// `<childId>__<date>`.
    pub id: String,
    /// Child this mark belongs to.
    pub child_id: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Status for the day.
    pub status: AttendanceStatus,
    /// Free-form note from staff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// User id of whoever last marked the day.
    pub marked_by: String,
    /// First time the day was marked.
    pub created_at: DateTime<Utc>,
    /// Last time the day was marked.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceBody {
    child_id: String,
    date: String,
    status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    marked_by: String,
}

impl AttendanceRecord {
    /// Build a record from a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is missing required fields.
    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let body: AttendanceBody = serde_json::from_value(doc.body.clone())?;
        Ok(Self {
            id: doc.key.clone(),
            child_id: body.child_id,
            date: body.date,
            status: body.status,
            note: body.note,
            marked_by: body.marked_by,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

/// Key of the attendance record for `child_id` on `date`.
#[must_use]
pub fn derive_attendance_key(child_id: &str, date: &str) -> String {
    format!("{child_id}{KEY_DELIMITER}{date}")
}

/// Attendance service over a document store.
#[derive(Debug)]
pub struct AttendanceLog<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> AttendanceLog<S> {
    /// Create an attendance log over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Mark a child's attendance for a day. A later mark replaces an earlier one.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] unless `actor` is staff or admin.
    /// - [`Error::Validation`] if `date` is not a real `YYYY-MM-DD` date.
    /// - [`Error::NotFound`] if the child does not exist.
    /// - [`Error::StorageUnavailable`] for store failures.
    pub fn mark(
        &self,
        actor: &Actor,
        child_id: &str,
        date: &str,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<AttendanceRecord> {
        if !actor.can_mark_attendance() {
            return Err(Error::permission_denied(format!(
                "{} {} may not mark attendance",
                actor.role, actor.user_id
            )));
        }
        parse_calendar_date("date", date)?;

        if self.store.get(Collection::Children, child_id)?.is_none() {
            return Err(Error::not_found("child", child_id));
        }

        let key = derive_attendance_key(child_id, date);
        let body = serde_json::to_value(AttendanceBody {
            child_id: child_id.to_string(),
            date: date.to_string(),
            status,
            note: note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            marked_by: actor.user_id.clone(),
        })
        .map_err(StoreError::from)?;

        debug!("Marking {} as {}", key, status);
        let outcome = self
            .store
            .transact(Collection::Attendance, &key, &mut |_| {
                TxAction::Write(body.clone())
            })?;

        match outcome {
            TxOutcome::Committed(doc) => {
                info!("Marked {} {} on {}", child_id, status, date);
                Ok(AttendanceRecord::from_document(&doc)?)
            }
            TxOutcome::Aborted(_) => Err(StoreError::Conflict {
                collection: Collection::Attendance,
                key,
            }
            .into()),
        }
    }

    /// All marks for one day, ordered by child id.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed date, [`Error::StorageUnavailable`]
    /// if the query fails.
    pub fn for_date(&self, date: &str) -> Result<Vec<AttendanceRecord>> {
        parse_calendar_date("date", date)?;
        let mut records = self.records_where("date", date)?;
        records.sort_by(|a, b| a.child_id.cmp(&b.child_id));
        Ok(records)
    }

    /// All marks for one child, oldest day first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    pub fn for_child(&self, child_id: &str) -> Result<Vec<AttendanceRecord>> {
        let mut records = self.records_where("childId", child_id)?;
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    fn records_where(&self, field: &str, value: &str) -> Result<Vec<AttendanceRecord>> {
        let docs = self
            .store
            .find_by_field(Collection::Attendance, field, value)?;
        Ok(docs
            .iter()
            .map(AttendanceRecord::from_document)
            .collect::<StoreResult<Vec<_>>>()?)
    }
}
