//! Remark service - performance remarks from the rolling summary

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::AttendanceSnapshot;
use crate::ports::{AttendanceStore, RemarkGenerator};
use crate::services::aggregator::{self, MemberSummary};

/// A generated remark with the summary it was based on
#[derive(Debug, Clone, Serialize)]
pub struct Remark {
    pub member_id: String,
    pub member_name: String,
    pub summary: MemberSummary,
    pub summary_text: String,
    pub text: String,
    /// Why `text` is a fallback sentence, for the event log
    #[serde(skip)]
    pub failure: Option<String>,
}

/// Service that asks a remark generator about one member
pub struct RemarkService {
    store: Arc<dyn AttendanceStore>,
    generator: Arc<dyn RemarkGenerator>,
    window_days: u32,
}

impl RemarkService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        generator: Arc<dyn RemarkGenerator>,
        window_days: u32,
    ) -> Self {
        Self {
            store,
            generator,
            window_days,
        }
    }

    /// Generator problems come back as remark text; only an unknown
    /// member or a store failure is an error
    pub fn remark_for(&self, member_id: &str, today: NaiveDate) -> Result<Remark> {
        let member = self
            .store
            .get_member(member_id)?
            .ok_or_else(|| Error::not_found(format!("Member {}", member_id)))?;

        let records = self
            .store
            .attendance_since(aggregator::window_start(today, self.window_days))?;
        let snapshot = AttendanceSnapshot::from_records(std::slice::from_ref(&member), &records);
        let summary = aggregator::member_summary(&member, &snapshot, today);
        let summary_text = aggregator::summary_text(&summary);

        let generated = self.generator.generate(&member.name, &summary_text);

        Ok(Remark {
            member_id: member.id,
            member_name: member.name,
            summary,
            summary_text,
            text: generated.text,
            failure: generated.failure,
        })
    }
}
