//! Attendance domain model

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::member::Member;
use super::result::Error;

/// Date format used for storage, reports and CLI input
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| Error::validation(format!("Invalid date '{}'. Use YYYY-MM-DD", value)))
}

/// Attendance status of a member on one day
///
/// A day without a stored record is displayed and counted as `Absent`,
/// but that default is never written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "present")]
    Present,
    #[serde(rename = "absent")]
    Absent,
    #[serde(rename = "halfday")]
    HalfDay,
}

impl AttendanceStatus {
    /// Value stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::HalfDay => "halfday",
        }
    }

    /// Decode a stored value. The old `leave` status is read as half day.
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "halfday" | "leave" => Some(AttendanceStatus::HalfDay),
            _ => None,
        }
    }

    /// Single-letter code used in CSV reports
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "P",
            AttendanceStatus::Absent => "A",
            AttendanceStatus::HalfDay => "H",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::HalfDay => "Half Day",
        }
    }

    /// Status written by the present/absent toggle.
    /// Present flips to Absent; no record, Absent and HalfDay all become Present.
    pub fn toggled(current: Option<Self>) -> Self {
        match current {
            Some(AttendanceStatus::Present) => AttendanceStatus::Absent,
            _ => AttendanceStatus::Present,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "a" => Ok(AttendanceStatus::Absent),
            "halfday" | "half-day" | "half_day" | "h" => Ok(AttendanceStatus::HalfDay),
            other => Err(Error::validation(format!(
                "Unknown status '{}'. Use present, absent or halfday",
                other
            ))),
        }
    }
}

/// A persisted attendance entry, unique per (member, date)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub member_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// In-memory view of recent attendance: member id -> (date -> status)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSnapshot {
    by_member: HashMap<String, BTreeMap<NaiveDate, AttendanceStatus>>,
}

impl AttendanceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot for the given members.
    ///
    /// Every member gets an entry (possibly empty); records belonging to
    /// ids that are not in `members` are dropped.
    pub fn from_records(members: &[Member], records: &[AttendanceRecord]) -> Self {
        let known: HashSet<&str> = members.iter().map(|m| m.id.as_str()).collect();
        let mut by_member: HashMap<String, BTreeMap<NaiveDate, AttendanceStatus>> = members
            .iter()
            .map(|m| (m.id.clone(), BTreeMap::new()))
            .collect();

        for record in records {
            if !known.contains(record.member_id.as_str()) {
                continue;
            }
            if let Some(days) = by_member.get_mut(&record.member_id) {
                days.insert(record.date, record.status);
            }
        }

        Self { by_member }
    }

    /// Record a status, replacing any earlier one for the same day
    pub fn insert(&mut self, member_id: impl Into<String>, date: NaiveDate, status: AttendanceStatus) {
        self.by_member
            .entry(member_id.into())
            .or_default()
            .insert(date, status);
    }

    /// Stored status, if any
    pub fn status_on(&self, member_id: &str, date: NaiveDate) -> Option<AttendanceStatus> {
        self.by_member
            .get(member_id)
            .and_then(|days| days.get(&date))
            .copied()
    }

    /// Stored status, falling back to Absent
    pub fn effective_status(&self, member_id: &str, date: NaiveDate) -> AttendanceStatus {
        self.status_on(member_id, date)
            .unwrap_or(AttendanceStatus::Absent)
    }

    /// All stored days for one member
    pub fn for_member(&self, member_id: &str) -> Option<&BTreeMap<NaiveDate, AttendanceStatus>> {
        self.by_member.get(member_id)
    }

    /// Stored statuses of every member on one day
    pub fn statuses_on(&self, date: NaiveDate) -> HashMap<String, AttendanceStatus> {
        self.by_member
            .iter()
            .filter_map(|(id, days)| days.get(&date).map(|s| (id.clone(), *s)))
            .collect()
    }

    /// Total number of stored records
    pub fn record_count(&self) -> usize {
        self.by_member.values().map(|days| days.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}
