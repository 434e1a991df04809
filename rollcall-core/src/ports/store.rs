//! Store port - member and attendance persistence with live subscriptions

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::domain::result::{Error, Result};
use crate::domain::{AttendanceRecord, AttendanceStatus, Member, MemberFields};

/// State of a live query as seen by a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum FeedState<T> {
    /// No snapshot has been delivered yet
    Loading,
    Ready(T),
    /// The last load failed; the message is safe to log
    Failed(String),
}

impl<T> From<Result<T>> for FeedState<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => FeedState::Ready(value),
            Err(e) => FeedState::Failed(e.to_string()),
        }
    }
}

/// Handle to a live query.
///
/// The current snapshot is replaced after every committed write that touches
/// the watched collection. Dropping the handle unsubscribes.
pub struct Subscription<T> {
    rx: watch::Receiver<FeedState<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(rx: watch::Receiver<FeedState<T>>) -> Self {
        Self { rx }
    }

    /// Latest snapshot, without marking it as seen
    pub fn current(&self) -> FeedState<T> {
        self.rx.borrow().clone()
    }

    /// True when a snapshot arrived since the last `take`
    pub fn has_update(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Latest snapshot, marking it as seen
    pub fn take(&mut self) -> FeedState<T> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns false once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    AddMember(Member),
    UpdateMember {
        id: String,
        fields: MemberFields,
    },
    /// Update the record for (member, date) if one exists, else insert it
    UpsertAttendance {
        member_id: String,
        date: NaiveDate,
        status: AttendanceStatus,
    },
}

/// Writes committed as one atomic unit
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    // (member, date) -> index in ops
    attendance_slots: HashMap<(String, NaiveDate), usize>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new member; returns its id
    pub fn add_member(&mut self, fields: &MemberFields) -> String {
        let member = Member::new(fields);
        let id = member.id.clone();
        self.ops.push(WriteOp::AddMember(member));
        id
    }

    pub fn update_member(&mut self, id: impl Into<String>, fields: MemberFields) {
        self.ops.push(WriteOp::UpdateMember {
            id: id.into(),
            fields,
        });
    }

    /// Queue an attendance upsert. A later status for the same
    /// (member, date) replaces the earlier one in place.
    pub fn upsert_attendance(
        &mut self,
        member_id: impl Into<String>,
        date: NaiveDate,
        status: AttendanceStatus,
    ) {
        let member_id = member_id.into();
        let key = (member_id.clone(), date);
        if let Some(&index) = self.attendance_slots.get(&key) {
            self.ops[index] = WriteOp::UpsertAttendance {
                member_id,
                date,
                status,
            };
            return;
        }

        self.attendance_slots.insert(key, self.ops.len());
        self.ops.push(WriteOp::UpsertAttendance {
            member_id,
            date,
            status,
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Member and attendance store abstraction
///
/// Implementations must publish fresh snapshots to open subscriptions after
/// each successful write, and only after the write is durable.
pub trait AttendanceStore: Send + Sync {
    // === Members ===

    /// All members, newest first
    fn list_members(&self) -> Result<Vec<Member>>;

    fn get_member(&self, id: &str) -> Result<Option<Member>>;

    /// Validate and insert a member; returns the new id
    fn add_member(&self, fields: &MemberFields) -> Result<String> {
        fields.validate().map_err(Error::validation)?;
        let mut batch = WriteBatch::new();
        let id = batch.add_member(fields);
        self.commit(batch)?;
        Ok(id)
    }

    /// Replace name and instrument of an existing member
    fn update_member(&self, id: &str, fields: &MemberFields) -> Result<()>;

    // === Attendance ===

    fn find_attendance(&self, member_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>>;

    /// Records dated on or after `since`
    fn attendance_since(&self, since: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// Execute every write of the batch in one transaction
    fn commit(&self, batch: WriteBatch) -> Result<()>;

    // === Subscriptions ===

    fn watch_members(&self) -> Subscription<Vec<Member>>;

    fn watch_attendance(&self, since: NaiveDate) -> Subscription<Vec<AttendanceRecord>>;
}
