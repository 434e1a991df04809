//! Live state container
//!
//! Holds the latest snapshots pushed by the store and identity
//! subscriptions and derives the dashboard views from them on demand.
//! Each source resolves independently: a slow or failed source never
//! blocks the others.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::watch;

use crate::domain::result::Result;
use crate::domain::{AttendanceRecord, AttendanceSnapshot, AttendanceStatus, AuthState, Member, User};
use crate::ports::{AttendanceStore, FeedState, IdentityProvider, Subscription};
use crate::services::aggregator::{self, DayBucket, DayStatus, DaySummary, MemberSummary};
use crate::services::LoggingService;

/// Resolution state of one data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Pending,
    Ready,
    /// Resolved with an error; the last good data (possibly none) is kept
    Failed,
}

impl Readiness {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Readiness::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub auth: Readiness,
    pub members: Readiness,
    pub attendance: Readiness,
}

impl ReadinessReport {
    pub fn all_resolved(&self) -> bool {
        self.auth.is_resolved() && self.members.is_resolved() && self.attendance.is_resolved()
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Auth,
    Members,
    Attendance,
}

/// Sources whose sender has gone away
#[derive(Debug, Default)]
struct ClosedSources {
    auth: bool,
    members: bool,
    attendance: bool,
}

impl ClosedSources {
    fn mark(&mut self, source: Source) {
        match source {
            Source::Auth => self.auth = true,
            Source::Members => self.members = true,
            Source::Attendance => self.attendance = true,
        }
    }
}

/// Current members, attendance window and signed-in user
pub struct LiveState {
    logger: Option<Arc<LoggingService>>,
    today: NaiveDate,
    window_start: NaiveDate,
    auth_rx: watch::Receiver<AuthState>,
    members_sub: Subscription<Vec<Member>>,
    attendance_sub: Subscription<Vec<AttendanceRecord>>,
    user: Option<User>,
    members: Vec<Member>,
    records: Vec<AttendanceRecord>,
    snapshot: AttendanceSnapshot,
    readiness: ReadinessReport,
    closed: ClosedSources,
}

impl LiveState {
    /// Subscribe to every source and apply what each one holds right now
    pub fn new(
        store: &dyn AttendanceStore,
        identity: &dyn IdentityProvider,
        today: NaiveDate,
        window_days: u32,
        logger: Option<Arc<LoggingService>>,
    ) -> Self {
        let window_start = aggregator::window_start(today, window_days);
        let mut state = Self {
            logger,
            today,
            window_start,
            auth_rx: identity.on_auth_change(),
            members_sub: store.watch_members(),
            attendance_sub: store.watch_attendance(window_start),
            user: None,
            members: Vec::new(),
            records: Vec::new(),
            snapshot: AttendanceSnapshot::new(),
            readiness: ReadinessReport {
                auth: Readiness::Pending,
                members: Readiness::Pending,
                attendance: Readiness::Pending,
            },
            closed: ClosedSources::default(),
        };
        state.apply_all();
        state
    }

    /// Apply snapshots that arrived since the last call.
    /// Returns true when anything changed.
    pub fn sync(&mut self) -> bool {
        let mut changed = false;

        if self.auth_rx.has_changed().unwrap_or(false) {
            let auth = self.auth_rx.borrow_and_update().clone();
            self.apply_auth(auth);
            changed = true;
        }

        let mut data_changed = false;
        if self.members_sub.has_update() {
            let members = self.members_sub.take();
            self.apply_members(members);
            data_changed = true;
        }
        if self.attendance_sub.has_update() {
            let records = self.attendance_sub.take();
            self.apply_attendance(records);
            data_changed = true;
        }

        if data_changed {
            self.rebuild_snapshot();
        }
        changed || data_changed
    }

    /// Wait until any live source publishes, then apply what arrived.
    /// A source that shuts down is dropped from the wait; returns false
    /// once every source has shut down.
    pub async fn changed(&mut self) -> bool {
        loop {
            let (source, alive) = tokio::select! {
                r = self.auth_rx.changed(), if !self.closed.auth => (Source::Auth, r.is_ok()),
                alive = self.members_sub.changed(), if !self.closed.members => (Source::Members, alive),
                alive = self.attendance_sub.changed(), if !self.closed.attendance => (Source::Attendance, alive),
                else => return false,
            };
            if !alive {
                self.closed.mark(source);
                continue;
            }

            // `changed` already marked this source as seen, so apply it here
            match source {
                Source::Auth => {
                    let auth = self.auth_rx.borrow_and_update().clone();
                    self.apply_auth(auth);
                }
                Source::Members => {
                    let members = self.members_sub.take();
                    self.apply_members(members);
                    self.rebuild_snapshot();
                }
                Source::Attendance => {
                    let records = self.attendance_sub.take();
                    self.apply_attendance(records);
                    self.rebuild_snapshot();
                }
            }
            self.sync();
            return true;
        }
    }

    /// Apply what every source holds right now
    fn apply_all(&mut self) {
        let auth = self.auth_rx.borrow_and_update().clone();
        self.apply_auth(auth);
        let members = self.members_sub.take();
        self.apply_members(members);
        let records = self.attendance_sub.take();
        self.apply_attendance(records);
        self.rebuild_snapshot();
    }

    fn apply_auth(&mut self, auth: AuthState) {
        self.readiness.auth = if auth.is_resolved() {
            Readiness::Ready
        } else {
            Readiness::Pending
        };
        self.user = auth.user().cloned();
    }

    fn apply_members(&mut self, state: FeedState<Vec<Member>>) {
        match state {
            FeedState::Loading => {}
            FeedState::Ready(members) => {
                self.members = members;
                self.readiness.members = Readiness::Ready;
            }
            FeedState::Failed(message) => {
                self.report_failure("members", &message);
                self.readiness.members = Readiness::Failed;
            }
        }
    }

    fn apply_attendance(&mut self, state: FeedState<Vec<AttendanceRecord>>) {
        match state {
            FeedState::Loading => {}
            FeedState::Ready(records) => {
                self.records = records;
                self.readiness.attendance = Readiness::Ready;
            }
            FeedState::Failed(message) => {
                self.report_failure("attendance", &message);
                self.readiness.attendance = Readiness::Failed;
            }
        }
    }

    fn report_failure(&self, source: &str, message: &str) {
        if let Some(logger) = &self.logger {
            let _ = logger.log_error("subscription_failed", message, Some(source));
        }
    }

    fn rebuild_snapshot(&mut self) {
        self.snapshot = AttendanceSnapshot::from_records(&self.members, &self.records);
    }

    // === Accessors ===

    pub fn readiness(&self) -> ReadinessReport {
        self.readiness
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// First day of the loaded attendance window
    pub fn window_start(&self) -> NaiveDate {
        self.window_start
    }

    /// Whether `date` is inside the loaded window (future days excluded)
    pub fn in_window(&self, date: NaiveDate) -> bool {
        date >= self.window_start && date <= self.today
    }

    /// Members, newest first
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn snapshot(&self) -> &AttendanceSnapshot {
        &self.snapshot
    }

    // === Derived views ===

    pub fn today_summary(&self) -> DaySummary {
        aggregator::today_summary(&self.members, &self.snapshot, self.today)
    }

    pub fn weekly_summary(&self) -> Vec<DayBucket> {
        aggregator::weekly_summary(&self.members, &self.snapshot, self.today)
    }

    pub fn member_summary(&self, id: &str) -> Option<MemberSummary> {
        self.member(id)
            .map(|m| aggregator::member_summary(m, &self.snapshot, self.today))
    }

    pub fn member_history(&self, id: &str) -> Option<Vec<DayStatus>> {
        self.member(id)
            .map(|m| aggregator::member_history(m, &self.snapshot, self.today))
    }

    /// Effective status of every member on `date`, in store order
    pub fn roster(&self, date: NaiveDate) -> Vec<(Member, AttendanceStatus)> {
        self.members
            .iter()
            .map(|m| (m.clone(), self.snapshot.effective_status(&m.id, date)))
            .collect()
    }

    pub fn filtered_members(&self, query: &str) -> Vec<Member> {
        aggregator::filter_members(&self.members, query)
    }

    pub fn csv_report(&self, days: u32) -> Result<String> {
        aggregator::csv_report(&self.members, &self.snapshot, self.today, days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::domain::result::Error;
    use crate::domain::{AuthError, MemberFields};
    use crate::ports::WriteBatch;
    use crate::services::EntryPoint;
    use tempfile::TempDir;

    /// In-memory store whose feeds are driven by the test
    struct FakeStore {
        members_tx: watch::Sender<FeedState<Vec<Member>>>,
        attendance_tx: watch::Sender<FeedState<Vec<AttendanceRecord>>>,
        since: Mutex<Option<NaiveDate>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                members_tx: watch::channel(FeedState::Loading).0,
                attendance_tx: watch::channel(FeedState::Loading).0,
                since: Mutex::new(None),
            }
        }
    }

    impl AttendanceStore for FakeStore {
        fn list_members(&self) -> Result<Vec<Member>> {
            Ok(Vec::new())
        }
        fn get_member(&self, _id: &str) -> Result<Option<Member>> {
            Ok(None)
        }
        fn update_member(&self, _id: &str, _fields: &MemberFields) -> Result<()> {
            Ok(())
        }
        fn find_attendance(&self, _member_id: &str, _date: NaiveDate) -> Result<Option<AttendanceRecord>> {
            Ok(None)
        }
        fn attendance_since(&self, _since: NaiveDate) -> Result<Vec<AttendanceRecord>> {
            Ok(Vec::new())
        }
        fn commit(&self, _batch: WriteBatch) -> Result<()> {
            Err(Error::database("read only"))
        }
        fn watch_members(&self) -> Subscription<Vec<Member>> {
            Subscription::new(self.members_tx.subscribe())
        }
        fn watch_attendance(&self, since: NaiveDate) -> Subscription<Vec<AttendanceRecord>> {
            *self.since.lock().unwrap() = Some(since);
            Subscription::new(self.attendance_tx.subscribe())
        }
    }

    struct FakeIdentity {
        tx: watch::Sender<AuthState>,
    }

    impl IdentityProvider for FakeIdentity {
        fn sign_in(&self, _email: &str, _password: &str) -> std::result::Result<User, AuthError> {
            Err(AuthError::WrongPassword)
        }
        fn sign_out(&self) -> std::result::Result<(), AuthError> {
            self.tx.send_replace(AuthState::SignedOut);
            Ok(())
        }
        fn current_user(&self) -> Option<User> {
            self.tx.borrow().user().cloned()
        }
        fn on_auth_change(&self) -> watch::Receiver<AuthState> {
            self.tx.subscribe()
        }
    }

    fn day(s: &str) -> NaiveDate {
        crate::domain::parse_date(s).unwrap()
    }

    fn member(id: &str) -> Member {
        let mut m = Member::new(&MemberFields::new(id.to_uppercase(), "Dhol"));
        m.id = id.to_string();
        m.created_at = chrono::DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        m
    }

    fn record(member_id: &str, date: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("{}-{}", member_id, date),
            member_id: member_id.to_string(),
            date: day(date),
            status,
        }
    }

    fn fixture() -> (FakeStore, FakeIdentity) {
        (
            FakeStore::new(),
            FakeIdentity {
                tx: watch::channel(AuthState::Initializing).0,
            },
        )
    }

    #[test]
    fn test_starts_pending_and_subscribes_to_window() {
        let (store, identity) = fixture();
        let state = LiveState::new(&store, &identity, day("2024-03-01"), 30, None);

        assert_eq!(
            state.readiness(),
            ReadinessReport {
                auth: Readiness::Pending,
                members: Readiness::Pending,
                attendance: Readiness::Pending,
            }
        );
        assert_eq!(*store.since.lock().unwrap(), Some(day("2024-01-31")));
        assert!(state.in_window(day("2024-01-31")));
        assert!(!state.in_window(day("2024-01-30")));
        assert!(!state.in_window(day("2024-03-02")));
    }

    #[test]
    fn test_sources_resolve_independently() {
        let (store, identity) = fixture();
        let mut state = LiveState::new(&store, &identity, day("2024-01-01"), 30, None);

        store.members_tx.send_replace(FeedState::Ready(vec![member("a"), member("b")]));
        assert!(state.sync());
        assert_eq!(state.readiness().members, Readiness::Ready);
        assert_eq!(state.readiness().attendance, Readiness::Pending);
        assert_eq!(state.today_summary().absent, 2);

        store.attendance_tx.send_replace(FeedState::Ready(vec![record(
            "a",
            "2024-01-01",
            AttendanceStatus::Present,
        )]));
        identity.tx.send_replace(AuthState::SignedOut);
        assert!(state.sync());
        assert!(state.readiness().all_resolved());
        assert_eq!(
            state.today_summary(),
            DaySummary {
                present: 1,
                absent: 1,
                half_day: 0,
                total: 2
            }
        );
        assert!(!state.sync());
    }

    #[test]
    fn test_records_of_unknown_members_are_dropped() {
        let (store, identity) = fixture();
        store.members_tx.send_replace(FeedState::Ready(vec![member("a")]));
        store.attendance_tx.send_replace(FeedState::Ready(vec![
            record("a", "2024-01-01", AttendanceStatus::HalfDay),
            record("ghost", "2024-01-01", AttendanceStatus::Present),
        ]));

        let state = LiveState::new(&store, &identity, day("2024-01-01"), 30, None);
        assert_eq!(state.snapshot().record_count(), 1);
        assert_eq!(state.today_summary().half_day, 1);
        assert_eq!(state.roster(day("2024-01-01"))[0].1, AttendanceStatus::HalfDay);
    }

    #[test]
    fn test_failed_feed_resolves_and_is_logged() {
        let dir = TempDir::new().unwrap();
        let logger = Arc::new(LoggingService::new(dir.path(), EntryPoint::Embedded, "test").unwrap());
        let (store, identity) = fixture();
        store.members_tx.send_replace(FeedState::Ready(vec![member("a")]));

        let mut state = LiveState::new(&store, &identity, day("2024-01-01"), 30, Some(logger.clone()));
        store.members_tx.send_replace(FeedState::Failed("Database error: gone".to_string()));
        store.attendance_tx.send_replace(FeedState::Failed("Database error: gone".to_string()));
        state.sync();

        assert_eq!(state.readiness().members, Readiness::Failed);
        assert_eq!(state.readiness().attendance, Readiness::Failed);
        assert!(state.readiness().members.is_resolved());
        // Last good member list is kept
        assert_eq!(state.members().len(), 1);

        let errors = logger.get_errors(10).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.event == "subscription_failed"));
    }

    #[tokio::test]
    async fn test_changed_wakes_on_publish() {
        let (store, identity) = fixture();
        let mut state = LiveState::new(&store, &identity, day("2024-01-01"), 30, None);

        let user = User::new("u1", "a@b.co");
        identity.tx.send_replace(AuthState::SignedIn(user.clone()));
        assert!(state.changed().await);
        assert_eq!(state.user(), Some(&user));
        assert_eq!(state.readiness().auth, Readiness::Ready);

        drop(identity);
        drop(store);
        assert!(!state.changed().await);
    }

    #[tokio::test]
    async fn test_changed_outlives_closed_identity() {
        let (store, identity) = fixture();
        let mut state = LiveState::new(&store, &identity, day("2024-01-01"), 30, None);

        drop(identity);
        store.members_tx.send_replace(FeedState::Ready(vec![member("a")]));
        assert!(state.changed().await);
        assert_eq!(state.members().len(), 1);

        store.attendance_tx.send_replace(FeedState::Ready(vec![record(
            "a",
            "2024-01-01",
            AttendanceStatus::Present,
        )]));
        assert!(state.changed().await);
        assert_eq!(state.today_summary().present, 1);

        drop(store);
        assert!(!state.changed().await);
    }

    #[tokio::test]
    async fn test_failure_is_logged_once_across_other_updates() {
        let dir = TempDir::new().unwrap();
        let logger = Arc::new(LoggingService::new(dir.path(), EntryPoint::Embedded, "test").unwrap());
        let (store, identity) = fixture();
        store.members_tx.send_replace(FeedState::Failed("Database error: boom".to_string()));

        let mut state = LiveState::new(&store, &identity, day("2024-01-01"), 30, Some(logger.clone()));
        for _ in 0..3 {
            store.attendance_tx.send_replace(FeedState::Ready(Vec::new()));
            assert!(state.changed().await);
        }

        assert_eq!(state.readiness().members, Readiness::Failed);
        assert_eq!(state.readiness().attendance, Readiness::Ready);
        let failures = logger
            .get_errors(10)
            .unwrap()
            .into_iter()
            .filter(|e| e.event == "subscription_failed")
            .count();
        assert_eq!(failures, 1);
    }
}
