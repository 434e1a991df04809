//! DuckDB store implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{params, Connection, OptionalExt};
use uuid::Uuid;

use crate::adapters::feed::ChangeFeed;
use crate::domain::result::{self, Error};
use crate::domain::{AttendanceRecord, AttendanceStatus, Member, MemberFields, DATE_FORMAT};
use crate::migrations::MIGRATIONS;
use crate::ports::{AttendanceStore, Subscription, WriteBatch, WriteOp};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
pub fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

const MEMBER_COLUMNS: &str = "member_id, name, instrument, created_at";
const ATTENDANCE_COLUMNS: &str = "record_id, member_id, attendance_date, status";

/// DuckDB-backed member and attendance store
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    feed: ChangeFeed,
}

impl DuckDbStore {
    /// Open (or create) the store at `db_path`
    ///
    /// Retries with exponential backoff on file locking errors, which occur
    /// when two CLI invocations touch the database at the same moment.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        feed: ChangeFeed::new(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[rollcall] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Run pending store migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()
    }

    /// Ensure the schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // === Member queries ===

    pub fn fetch_members(&self) -> Result<Vec<Member>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_members ORDER BY created_at DESC, member_id",
            MEMBER_COLUMNS
        ))?;

        let members = stmt
            .query_map([], |row| Ok(row_to_member(row)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(members)
    }

    pub fn fetch_member(&self, id: &str) -> Result<Option<Member>> {
        let conn = self.lock()?;
        let member = conn
            .query_row(
                &format!("SELECT {} FROM sys_members WHERE member_id = ?", MEMBER_COLUMNS),
                [id],
                |row| Ok(row_to_member(row)),
            )
            .optional()?;
        Ok(member)
    }

    // === Attendance queries ===

    pub fn fetch_attendance_since(&self, since: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_attendance WHERE attendance_date >= ? ORDER BY attendance_date, member_id",
            ATTENDANCE_COLUMNS
        ))?;

        // Rows with an unreadable date or status are skipped
        let records = stmt
            .query_map([format_date(since)], |row| Ok(row_to_record(row)))?
            .filter_map(|r| r.ok().flatten())
            .collect();

        Ok(records)
    }

    pub fn fetch_attendance(&self, member_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sys_attendance WHERE member_id = ? AND attendance_date = ?",
                    ATTENDANCE_COLUMNS
                ),
                params![member_id, format_date(date)],
                |row| Ok(row_to_record(row)),
            )
            .optional()?;
        Ok(record.flatten())
    }

    pub fn attendance_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_attendance", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Writes ===

    /// Apply every op in one transaction. Returns which collections changed
    /// as (members, attendance).
    pub fn apply_batch(&self, ops: &[WriteOp]) -> Result<(bool, bool)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut members_changed = false;
        let mut attendance_changed = false;

        for op in ops {
            match op {
                WriteOp::AddMember(member) => {
                    tx.execute(
                        "INSERT INTO sys_members (member_id, name, instrument, created_at) VALUES (?, ?, ?, ?)",
                        params![
                            member.id,
                            member.name,
                            member.instrument,
                            format_timestamp(&member.created_at),
                        ],
                    )?;
                    members_changed = true;
                }
                WriteOp::UpdateMember { id, fields } => {
                    let updated = tx.execute(
                        "UPDATE sys_members SET name = ?, instrument = ? WHERE member_id = ?",
                        params![fields.name, fields.instrument, id],
                    )?;
                    if updated == 0 {
                        bail!("Member {} does not exist", id);
                    }
                    members_changed = true;
                }
                WriteOp::UpsertAttendance {
                    member_id,
                    date,
                    status,
                } => {
                    let date = format_date(*date);
                    let existing: Option<String> = tx
                        .query_row(
                            "SELECT record_id FROM sys_attendance WHERE member_id = ? AND attendance_date = ?",
                            params![member_id, date],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match existing {
                        Some(record_id) => {
                            tx.execute(
                                "UPDATE sys_attendance SET status = ? WHERE record_id = ?",
                                params![status.as_str(), record_id],
                            )?;
                        }
                        None => {
                            tx.execute(
                                "INSERT INTO sys_attendance (record_id, member_id, attendance_date, status) VALUES (?, ?, ?, ?)",
                                params![Uuid::new_v4().to_string(), member_id, date, status.as_str()],
                            )?;
                        }
                    }
                    attendance_changed = true;
                }
            }
        }

        tx.commit()?;
        Ok((members_changed, attendance_changed))
    }

    fn publish(&self, members_changed: bool, attendance_changed: bool) {
        if members_changed {
            self.feed.publish_members(|| self.list_members());
        }
        if attendance_changed {
            self.feed.publish_attendance(|since| self.attendance_since(since));
        }
    }
}

impl AttendanceStore for DuckDbStore {
    fn list_members(&self) -> result::Result<Vec<Member>> {
        self.fetch_members().map_err(db_error)
    }

    fn get_member(&self, id: &str) -> result::Result<Option<Member>> {
        self.fetch_member(id).map_err(db_error)
    }

    fn update_member(&self, id: &str, fields: &MemberFields) -> result::Result<()> {
        fields.validate().map_err(Error::validation)?;
        if self.get_member(id)?.is_none() {
            return Err(Error::not_found(format!("Member {}", id)));
        }

        let mut batch = WriteBatch::new();
        batch.update_member(id, fields.clone());
        self.commit(batch)
    }

    fn find_attendance(&self, member_id: &str, date: NaiveDate) -> result::Result<Option<AttendanceRecord>> {
        self.fetch_attendance(member_id, date).map_err(db_error)
    }

    fn attendance_since(&self, since: NaiveDate) -> result::Result<Vec<AttendanceRecord>> {
        self.fetch_attendance_since(since).map_err(db_error)
    }

    fn commit(&self, batch: WriteBatch) -> result::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // The connection lock is released before subscribers reload
        let (members_changed, attendance_changed) =
            self.apply_batch(batch.ops()).map_err(db_error)?;
        self.publish(members_changed, attendance_changed);
        Ok(())
    }

    fn watch_members(&self) -> Subscription<Vec<Member>> {
        self.feed.subscribe_members(|| self.list_members())
    }

    fn watch_attendance(&self, since: NaiveDate) -> Subscription<Vec<AttendanceRecord>> {
        self.feed
            .subscribe_attendance(since, |since| self.attendance_since(since))
    }
}

fn db_error(e: anyhow::Error) -> Error {
    Error::database(format!("{:#}", e))
}

fn row_to_member(row: &duckdb::Row) -> Member {
    let created_str: String = row.get(3).unwrap_or_default();
    Member {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        instrument: row.get(2).unwrap_or_default(),
        created_at: parse_timestamp(&created_str),
    }
}

fn row_to_record(row: &duckdb::Row) -> Option<AttendanceRecord> {
    let date_str: String = row.get(2).ok()?;
    let status_str: String = row.get(3).ok()?;
    Some(AttendanceRecord {
        id: row.get(0).ok()?,
        member_id: row.get(1).ok()?,
        date: NaiveDate::parse_from_str(&date_str, DATE_FORMAT).ok()?,
        status: AttendanceStatus::from_db_str(&status_str)?,
    })
}

// Helper functions

/// Fixed-width UTC form so string order matches time order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
