//! Report service - attendance grid exports

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::result::{Error, Result};
use crate::domain::{AttendanceSnapshot, DATE_FORMAT};
use crate::ports::AttendanceStore;
use crate::services::aggregator;

/// Report length presets
pub const WEEKLY_DAYS: u32 = 7;
pub const MONTHLY_DAYS: u32 = 30;

/// Default export file name for a report ending `today`
pub fn default_file_name(days: u32, today: NaiveDate) -> String {
    let kind = if days == WEEKLY_DAYS { "weekly" } else { "monthly" };
    format!("{}-attendance-report-{}.csv", kind, today.format(DATE_FORMAT))
}

/// Service for CSV attendance reports
pub struct ReportService {
    store: Arc<dyn AttendanceStore>,
    window_days: u32,
}

impl ReportService {
    pub fn new(store: Arc<dyn AttendanceStore>, window_days: u32) -> Self {
        Self { store, window_days }
    }

    /// Build the CSV for the `days` days ending `today`.
    ///
    /// Only the snapshot window is loaded; older columns read as absent.
    pub fn generate(&self, days: u32, today: NaiveDate) -> Result<String> {
        if days > aggregator::MAX_DAYS {
            return Err(Error::validation(format!(
                "A report can cover at most {} days",
                aggregator::MAX_DAYS
            )));
        }
        let members = self.store.list_members()?;
        let records = self
            .store
            .attendance_since(aggregator::window_start(today, self.window_days))?;
        let snapshot = AttendanceSnapshot::from_records(&members, &records);
        aggregator::csv_report(&members, &snapshot, today, days)
    }

    /// Write the report to `output`, or to the default file name inside
    /// `output` when it is a directory
    pub fn export(&self, days: u32, today: NaiveDate, output: &Path) -> Result<PathBuf> {
        let path = if output.is_dir() {
            output.join(default_file_name(days, today))
        } else {
            output.to_path_buf()
        };

        let csv = self.generate(days, today)?;
        fs::write(&path, csv)?;
        Ok(path)
    }
}
