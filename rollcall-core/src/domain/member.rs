//! Member domain model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A member of the group whose attendance is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Opaque store id
    pub id: String,
    pub name: String,
    /// Instrument label, free text
    pub instrument: String,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Create a new member with a fresh id, created now
    pub fn new(fields: &MemberFields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: fields.name.clone(),
            instrument: fields.instrument.clone(),
            created_at: Utc::now(),
        }
    }

    /// Calendar day (UTC) the member was added
    pub fn joined_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    /// Whether the member existed on the given day
    pub fn was_member_on(&self, day: NaiveDate) -> bool {
        day >= self.joined_on()
    }
}

/// The editable fields of a member: used for add, bulk import and edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFields {
    pub name: String,
    pub instrument: String,
}

impl MemberFields {
    /// Build from raw input; surrounding whitespace is dropped
    pub fn new(name: impl AsRef<str>, instrument: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            instrument: instrument.as_ref().trim().to_string(),
        }
    }

    /// Both name and instrument are required
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() || self.instrument.is_empty() {
            return Err("Both name and instrument are required.");
        }
        Ok(())
    }
}
