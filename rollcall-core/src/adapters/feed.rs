//! Change feed - fans out fresh snapshots to open subscriptions

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::domain::result::Result;
use crate::domain::{AttendanceRecord, Member};
use crate::ports::{FeedState, Subscription};

type MemberSender = watch::Sender<FeedState<Vec<Member>>>;
type AttendanceSender = watch::Sender<FeedState<Vec<AttendanceRecord>>>;

/// Holds one sender for the member list and one per attendance window start.
///
/// Senders never block: a snapshot replaces whatever the subscriber has not
/// read yet, so a slow reader only ever sees the latest state. Loads run
/// under the sender's lock so a stale load never replaces a newer one.
pub struct ChangeFeed {
    members: Mutex<MemberSender>,
    attendance: Mutex<Vec<(NaiveDate, AttendanceSender)>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (members, _) = watch::channel(FeedState::Loading);
        Self {
            members: Mutex::new(members),
            attendance: Mutex::new(Vec::new()),
        }
    }

    /// Open a member subscription seeded with a fresh load
    pub fn subscribe_members(&self, load: impl FnOnce() -> Result<Vec<Member>>) -> Subscription<Vec<Member>> {
        let members = lock_or_recover(&self.members);
        members.send_replace(load().into());
        Subscription::new(members.subscribe())
    }

    /// Open an attendance subscription for records dated on or after `since`
    pub fn subscribe_attendance(
        &self,
        since: NaiveDate,
        load: impl FnOnce(NaiveDate) -> Result<Vec<AttendanceRecord>>,
    ) -> Subscription<Vec<AttendanceRecord>> {
        let mut senders = lock_or_recover(&self.attendance);
        let state: FeedState<Vec<AttendanceRecord>> = load(since).into();

        if let Some((_, tx)) = senders.iter().find(|(start, _)| *start == since) {
            tx.send_replace(state);
            return Subscription::new(tx.subscribe());
        }

        let (tx, rx) = watch::channel(state);
        senders.push((since, tx));
        Subscription::new(rx)
    }

    /// Push a reloaded member list to live subscribers
    pub fn publish_members(&self, load: impl FnOnce() -> Result<Vec<Member>>) {
        let members = lock_or_recover(&self.members);
        if members.receiver_count() == 0 {
            return;
        }
        members.send_replace(load().into());
    }

    /// Push reloaded attendance to every live window; closed windows are dropped
    pub fn publish_attendance(&self, load: impl Fn(NaiveDate) -> Result<Vec<AttendanceRecord>>) {
        let mut senders = lock_or_recover(&self.attendance);
        senders.retain(|(_, tx)| tx.receiver_count() > 0);
        for (since, tx) in senders.iter() {
            tx.send_replace(load(*since).into());
        }
    }

    /// Number of attendance windows with at least one subscriber
    pub fn attendance_windows(&self) -> usize {
        lock_or_recover(&self.attendance)
            .iter()
            .filter(|(_, tx)| tx.receiver_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::Error;
    use crate::domain::MemberFields;

    fn day(s: &str) -> NaiveDate {
        crate::domain::parse_date(s).unwrap()
    }

    #[test]
    fn test_member_subscription_seeded() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe_members(|| Ok(vec![Member::new(&MemberFields::new("A", "Dhol"))]));

        match sub.current() {
            FeedState::Ready(members) => assert_eq!(members.len(), 1),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe_members(|| Ok(vec![]));
        assert!(!sub.has_update());

        feed.publish_members(|| Err(Error::database("gone")));
        assert!(sub.has_update());
        assert_eq!(sub.take(), FeedState::Failed("Database error: gone".to_string()));
    }

    #[test]
    fn test_dropped_attendance_windows_are_pruned() {
        let feed = ChangeFeed::new();
        let first = feed.subscribe_attendance(day("2024-01-01"), |_| Ok(vec![]));
        let second = feed.subscribe_attendance(day("2024-01-01"), |_| Ok(vec![]));
        let other = feed.subscribe_attendance(day("2024-02-01"), |_| Ok(vec![]));
        assert_eq!(feed.attendance_windows(), 2);

        drop(first);
        drop(second);
        feed.publish_attendance(|_| Ok(vec![]));
        assert_eq!(feed.attendance_windows(), 1);

        drop(other);
        assert_eq!(feed.attendance_windows(), 0);
    }
}
