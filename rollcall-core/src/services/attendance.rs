//! Attendance service - mark attendance for a day

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::AttendanceStatus;
use crate::ports::{AttendanceStore, WriteBatch};

/// One status that was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStatus {
    pub member_id: String,
    pub status: AttendanceStatus,
}

/// Result of a mark action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkOutcome {
    pub date: Option<NaiveDate>,
    pub written: Vec<MemberStatus>,
    /// Members left untouched because they already had the target status
    pub skipped: usize,
}

impl MarkOutcome {
    pub fn is_noop(&self) -> bool {
        self.written.is_empty()
    }
}

/// Service for attendance writes
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Write a batch of statuses for one day as a single atomic unit.
    ///
    /// Every member must exist; nothing is written otherwise.
    pub fn mark(&self, statuses: &[(String, AttendanceStatus)], date: NaiveDate) -> Result<MarkOutcome> {
        if statuses.is_empty() {
            return Ok(MarkOutcome {
                date: Some(date),
                ..Default::default()
            });
        }

        let known: HashSet<String> = self.store.list_members()?.into_iter().map(|m| m.id).collect();
        if let Some((unknown, _)) = statuses.iter().find(|(id, _)| !known.contains(id)) {
            return Err(Error::validation(format!("Unknown member id: {}", unknown)));
        }

        let mut batch = WriteBatch::new();
        for (member_id, status) in statuses {
            batch.upsert_attendance(member_id.clone(), date, *status);
        }
        self.store.commit(batch)?;

        Ok(MarkOutcome {
            date: Some(date),
            written: statuses
                .iter()
                .map(|(member_id, status)| MemberStatus {
                    member_id: member_id.clone(),
                    status: *status,
                })
                .collect(),
            skipped: 0,
        })
    }

    /// Stored status of a member on a day, if any
    pub fn status_of(&self, member_id: &str, date: NaiveDate) -> Result<Option<AttendanceStatus>> {
        Ok(self.store.find_attendance(member_id, date)?.map(|r| r.status))
    }

    /// Present becomes Absent; anything else becomes Present
    pub fn toggle_present(&self, member_id: &str, date: NaiveDate) -> Result<MarkOutcome> {
        let next = AttendanceStatus::toggled(self.status_of(member_id, date)?);
        self.mark(&[(member_id.to_string(), next)], date)
    }

    /// Mark a half day; already half day is left alone
    pub fn mark_half_day(&self, member_id: &str, date: NaiveDate) -> Result<MarkOutcome> {
        if self.status_of(member_id, date)? == Some(AttendanceStatus::HalfDay) {
            return Ok(MarkOutcome {
                date: Some(date),
                written: Vec::new(),
                skipped: 1,
            });
        }
        self.mark(&[(member_id.to_string(), AttendanceStatus::HalfDay)], date)
    }

    /// Mark every member not already present as present, in one batch
    pub fn mark_all_present(&self, date: NaiveDate) -> Result<MarkOutcome> {
        let members = self.store.list_members()?;
        let current = self.statuses_on(date)?;

        let pending: Vec<(String, AttendanceStatus)> = members
            .iter()
            .filter(|m| current.get(&m.id) != Some(&AttendanceStatus::Present))
            .map(|m| (m.id.clone(), AttendanceStatus::Present))
            .collect();
        let skipped = members.len() - pending.len();

        let mut outcome = self.mark(&pending, date)?;
        outcome.skipped = skipped;
        Ok(outcome)
    }

    /// Stored statuses of all members on one day
    pub fn statuses_on(&self, date: NaiveDate) -> Result<HashMap<String, AttendanceStatus>> {
        Ok(self
            .store
            .attendance_since(date)?
            .into_iter()
            .filter(|r| r.date == date)
            .map(|r| (r.member_id, r.status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbStore;
    use crate::domain::MemberFields;
    use tempfile::TempDir;

    fn create_test_service() -> (TempDir, Arc<DuckDbStore>, AttendanceService) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DuckDbStore::new(&dir.path().join("test.duckdb")).unwrap());
        store.ensure_schema().unwrap();
        let service = AttendanceService::new(store.clone());
        (dir, store, service)
    }

    fn day(s: &str) -> NaiveDate {
        crate::domain::parse_date(s).unwrap()
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (_dir, store, service) = create_test_service();
        let outcome = service.mark(&[], day("2024-01-01")).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(store.attendance_count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_member_rejected_before_write() {
        let (_dir, store, service) = create_test_service();
        let id = store.add_member(&MemberFields::new("A", "Dhol")).unwrap();

        let err = service
            .mark(
                &[
                    (id, AttendanceStatus::Present),
                    ("ghost".to_string(), AttendanceStatus::Present),
                ],
                day("2024-01-01"),
            )
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.attendance_count().unwrap(), 0);
    }

    #[test]
    fn test_toggle_cycle() {
        let (_dir, store, service) = create_test_service();
        let id = store.add_member(&MemberFields::new("A", "Dhol")).unwrap();
        let date = day("2024-01-01");

        service.toggle_present(&id, date).unwrap();
        assert_eq!(service.status_of(&id, date).unwrap(), Some(AttendanceStatus::Present));

        service.toggle_present(&id, date).unwrap();
        assert_eq!(service.status_of(&id, date).unwrap(), Some(AttendanceStatus::Absent));

        service.mark_half_day(&id, date).unwrap();
        service.toggle_present(&id, date).unwrap();
        assert_eq!(service.status_of(&id, date).unwrap(), Some(AttendanceStatus::Present));
        assert_eq!(store.attendance_count().unwrap(), 1);
    }

    #[test]
    fn test_half_day_twice_writes_once() {
        let (_dir, store, service) = create_test_service();
        let id = store.add_member(&MemberFields::new("A", "Dhol")).unwrap();
        let date = day("2024-01-01");

        let first = service.mark_half_day(&id, date).unwrap();
        assert_eq!(first.written.len(), 1);

        let second = service.mark_half_day(&id, date).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn test_mark_all_present_only_writes_changes() {
        let (_dir, store, service) = create_test_service();
        let a = store.add_member(&MemberFields::new("A", "Dhol")).unwrap();
        let b = store.add_member(&MemberFields::new("B", "Tasha")).unwrap();
        let c = store.add_member(&MemberFields::new("C", "Flag")).unwrap();
        let date = day("2024-01-01");

        service.mark(&[(a.clone(), AttendanceStatus::Present)], date).unwrap();
        service.mark(&[(b.clone(), AttendanceStatus::HalfDay)], date).unwrap();

        let outcome = service.mark_all_present(date).unwrap();
        assert_eq!(outcome.skipped, 1);
        let mut written: Vec<String> = outcome.written.into_iter().map(|w| w.member_id).collect();
        written.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(written, expected);

        let again = service.mark_all_present(date).unwrap();
        assert!(again.is_noop());
        assert_eq!(again.skipped, 3);
        assert!(service
            .statuses_on(date)
            .unwrap()
            .values()
            .all(|s| *s == AttendanceStatus::Present));
    }
}
