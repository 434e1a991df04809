//! Attendance aggregation
//!
//! Pure derivations over the member list and an attendance snapshot. Every
//! view is recomputed from the full snapshot on each call. A member with no
//! record on a day counts as absent everywhere.

use chrono::{Duration, NaiveDate};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{AttendanceSnapshot, AttendanceStatus, Member, DATE_FORMAT};

/// Days covered by the per-member rolling summary (today included)
pub const ROLLING_DAYS: i64 = 30;

/// Days covered by the weekly chart
pub const WEEK_DAYS: i64 = 7;

/// Upper bound for report length and snapshot window, in days
pub const MAX_DAYS: u32 = 3660;

/// `today` minus `offset` days, or None past the calendar's first day
fn days_before(today: NaiveDate, offset: i64) -> Option<NaiveDate> {
    today.checked_sub_signed(Duration::days(offset))
}

/// First day of the snapshot window ending today.
/// Saturates at the earliest representable date.
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    days_before(today, i64::from(window_days)).unwrap_or(NaiveDate::MIN)
}

/// Counts for a single day across all members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub present: i64,
    pub absent: i64,
    pub half_day: i64,
    pub total: i64,
}

/// One day of the weekly chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayBucket {
    /// Short weekday name, e.g. `Mon`
    pub label: String,
    pub date: NaiveDate,
    pub present: i64,
    pub absent: i64,
    pub half_day: i64,
}

/// Rolling summary for one member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub present: i64,
    pub absent: i64,
    pub half_day: i64,
    pub days_considered: i64,
}

/// Effective status of one member on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Present / half-day counts among `members` on `date`
fn count_day(members: &[Member], snapshot: &AttendanceSnapshot, date: NaiveDate) -> (i64, i64) {
    members
        .iter()
        .fold((0, 0), |(present, half_day), member| match snapshot.status_on(&member.id, date) {
            Some(AttendanceStatus::Present) => (present + 1, half_day),
            Some(AttendanceStatus::HalfDay) => (present, half_day + 1),
            _ => (present, half_day),
        })
}

/// Summary of `today`. Absent is derived from the member count.
pub fn today_summary(members: &[Member], snapshot: &AttendanceSnapshot, today: NaiveDate) -> DaySummary {
    let total = members.len() as i64;
    let (present, half_day) = count_day(members, snapshot, today);
    DaySummary {
        present,
        absent: total - present - half_day,
        half_day,
        total,
    }
}

/// The 7 days ending today, oldest first
pub fn weekly_summary(members: &[Member], snapshot: &AttendanceSnapshot, today: NaiveDate) -> Vec<DayBucket> {
    let total = members.len() as i64;
    (0..WEEK_DAYS)
        .rev()
        .filter_map(|offset| days_before(today, offset))
        .map(|date| {
            let (present, half_day) = count_day(members, snapshot, date);
            DayBucket {
                label: date.format("%a").to_string(),
                date,
                present,
                absent: total - present - half_day,
                half_day,
            }
        })
        .collect()
}

/// Days of the rolling window on which the member already existed, newest first
fn eligible_days(member: &Member, today: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
    (0..ROLLING_DAYS)
        .map_while(move |offset| days_before(today, offset))
        .filter(move |date| member.was_member_on(*date))
}

/// Rolling summary for one member, clipped to the day they were added
pub fn member_summary(member: &Member, snapshot: &AttendanceSnapshot, today: NaiveDate) -> MemberSummary {
    let mut summary = MemberSummary::default();
    for date in eligible_days(member, today) {
        summary.days_considered += 1;
        match snapshot.status_on(&member.id, date) {
            Some(AttendanceStatus::Present) => summary.present += 1,
            Some(AttendanceStatus::HalfDay) => summary.half_day += 1,
            _ => {}
        }
    }
    summary.absent = summary.days_considered - summary.present - summary.half_day;
    summary
}

/// Day-by-day history over the rolling window, newest first
pub fn member_history(member: &Member, snapshot: &AttendanceSnapshot, today: NaiveDate) -> Vec<DayStatus> {
    eligible_days(member, today)
        .map(|date| DayStatus {
            date,
            status: snapshot.effective_status(&member.id, date),
        })
        .collect()
}

/// The `days` dates ending today, oldest first.
/// Capped at `MAX_DAYS`; dates before the earliest representable day are left out.
pub fn report_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = (0..i64::from(days.min(MAX_DAYS)))
        .map_while(|offset| days_before(today, offset))
        .collect();
    dates.reverse();
    dates
}

/// Attendance grid as CSV.
///
/// Every field is quoted, rows end with `\n` and the last row has no
/// trailing newline.
pub fn csv_report(
    members: &[Member],
    snapshot: &AttendanceSnapshot,
    today: NaiveDate,
    days: u32,
) -> Result<String> {
    let dates = report_dates(today, days);
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut header = vec!["Member Name".to_string(), "Instrument".to_string()];
    header.extend(dates.iter().map(|d| d.format(DATE_FORMAT).to_string()));
    writer.write_record(&header)?;

    for member in members {
        let mut row = vec![member.name.as_str(), member.instrument.as_str()];
        row.extend(dates.iter().map(|d| snapshot.effective_status(&member.id, *d).code()));
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Other(format!("Failed to finish CSV: {}", e)))?;
    let mut text =
        String::from_utf8(bytes).map_err(|e| Error::Other(format!("CSV is not UTF-8: {}", e)))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Summary sentence handed to the remark generator
pub fn summary_text(summary: &MemberSummary) -> String {
    format!(
        "Total days tracked: {}. Present: {}, Absent: {}, Half Day: {}.",
        summary.days_considered, summary.present, summary.absent, summary.half_day
    )
}

/// Members sorted by name, keeping those whose name or instrument contains
/// `query` (case-insensitive). An empty query keeps everyone.
pub fn filter_members(members: &[Member], query: &str) -> Vec<Member> {
    let query = query.trim().to_lowercase();
    let mut filtered: Vec<Member> = members
        .iter()
        .filter(|m| {
            query.is_empty()
                || m.name.to_lowercase().contains(&query)
                || m.instrument.to_lowercase().contains(&query)
        })
        .cloned()
        .collect();
    filtered.sort_by_cached_key(|m| m.name.to_lowercase());
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(s: &str) -> NaiveDate {
        crate::domain::parse_date(s).unwrap()
    }

    fn member(id: &str, name: &str, instrument: &str, joined: &str) -> Member {
        let joined = day(joined);
        Member {
            id: id.to_string(),
            name: name.to_string(),
            instrument: instrument.to_string(),
            created_at: Utc
                .from_utc_datetime(&joined.and_hms_opt(9, 30, 0).unwrap()),
        }
    }

    fn two_members() -> Vec<Member> {
        vec![
            member("a", "A", "", "2023-01-01"),
            member("b", "B", "", "2023-01-01"),
        ]
    }

    #[test]
    fn test_today_summary_example() {
        let members = two_members();
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-01"), AttendanceStatus::Present);

        let summary = today_summary(&members, &snapshot, day("2024-01-01"));
        assert_eq!(
            summary,
            DaySummary {
                present: 1,
                absent: 1,
                half_day: 0,
                total: 2
            }
        );
    }

    #[test]
    fn test_today_summary_counts_explicit_absent_once() {
        let members = two_members();
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-01"), AttendanceStatus::Absent);
        snapshot.insert("b", day("2024-01-01"), AttendanceStatus::HalfDay);

        let summary = today_summary(&members, &snapshot, day("2024-01-01"));
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.half_day, 1);
        assert_eq!(summary.present + summary.absent + summary.half_day, summary.total);
    }

    #[test]
    fn test_empty_inputs_yield_zeros() {
        let snapshot = AttendanceSnapshot::new();
        assert_eq!(today_summary(&[], &snapshot, day("2024-01-01")), DaySummary::default());

        let week = weekly_summary(&[], &snapshot, day("2024-01-01"));
        assert_eq!(week.len(), 7);
        assert!(week.iter().all(|b| b.present == 0 && b.absent == 0 && b.half_day == 0));
    }

    #[test]
    fn test_weekly_summary_oldest_first() {
        let members = two_members();
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-07"), AttendanceStatus::Present);
        snapshot.insert("b", day("2024-01-01"), AttendanceStatus::HalfDay);

        let week = weekly_summary(&members, &snapshot, day("2024-01-07"));
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, day("2024-01-01"));
        assert_eq!(week[0].label, "Mon");
        assert_eq!(week[0].half_day, 1);
        assert_eq!(week[6].date, day("2024-01-07"));
        assert_eq!(week[6].label, "Sun");
        assert_eq!(week[6].present, 1);
        for bucket in &week {
            assert_eq!(bucket.present + bucket.absent + bucket.half_day, 2);
        }
        assert!(week.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_member_summary_full_window() {
        let m = member("a", "A", "Dhol", "2023-01-01");
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-30"), AttendanceStatus::Present);
        snapshot.insert("a", day("2024-01-29"), AttendanceStatus::HalfDay);
        snapshot.insert("a", day("2024-01-28"), AttendanceStatus::Absent);
        // Outside the 30-day window
        snapshot.insert("a", day("2023-12-31"), AttendanceStatus::Present);

        let summary = member_summary(&m, &snapshot, day("2024-01-30"));
        assert_eq!(
            summary,
            MemberSummary {
                present: 1,
                absent: 28,
                half_day: 1,
                days_considered: 30
            }
        );
    }

    #[test]
    fn test_member_summary_clipped_to_join_date() {
        let m = member("a", "A", "Dhol", "2024-01-28");
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-27"), AttendanceStatus::Present);
        snapshot.insert("a", day("2024-01-28"), AttendanceStatus::Present);

        let summary = member_summary(&m, &snapshot, day("2024-01-30"));
        assert_eq!(summary.days_considered, 3);
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 2);
    }

    #[test]
    fn test_member_history_newest_first() {
        let m = member("a", "A", "Dhol", "2024-01-28");
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-29"), AttendanceStatus::HalfDay);

        let history = member_history(&m, &snapshot, day("2024-01-30"));
        assert_eq!(
            history,
            vec![
                DayStatus { date: day("2024-01-30"), status: AttendanceStatus::Absent },
                DayStatus { date: day("2024-01-29"), status: AttendanceStatus::HalfDay },
                DayStatus { date: day("2024-01-28"), status: AttendanceStatus::Absent },
            ]
        );
    }

    #[test]
    fn test_csv_report_example() {
        let members = two_members();
        let mut snapshot = AttendanceSnapshot::new();
        snapshot.insert("a", day("2024-01-01"), AttendanceStatus::Present);

        let csv = csv_report(&members, &snapshot, day("2024-01-02"), 2).unwrap();
        assert_eq!(
            csv,
            "\"Member Name\",\"Instrument\",\"2024-01-01\",\"2024-01-02\"\n\
             \"A\",\"\",\"P\",\"A\"\n\
             \"B\",\"\",\"A\",\"A\""
        );
    }

    #[test]
    fn test_csv_report_escapes_quotes() {
        let members = vec![member("a", "Ravi \"Tiger\" Rao", "Dhol, Large", "2023-01-01")];
        let snapshot = AttendanceSnapshot::new();

        let csv = csv_report(&members, &snapshot, day("2024-01-02"), 1).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "\"Ravi \"\"Tiger\"\" Rao\",\"Dhol, Large\",\"A\"");
    }

    #[test]
    fn test_csv_report_zero_days() {
        let csv = csv_report(&two_members(), &AttendanceSnapshot::new(), day("2024-01-02"), 0).unwrap();
        assert_eq!(csv.lines().next().unwrap(), "\"Member Name\",\"Instrument\"");
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_csv_report_columns_ascending() {
        let csv = csv_report(&two_members(), &AttendanceSnapshot::new(), day("2024-03-01"), 30).unwrap();
        let header: Vec<&str> = csv.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), 32);
        assert_eq!(header[2], "\"2024-02-01\"");
        assert_eq!(header[31], "\"2024-03-01\"");
        assert!(header[2..].windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(day("2024-03-01"), 30), day("2024-01-31"));
        assert_eq!(window_start(day("2024-03-01"), 0), day("2024-03-01"));
    }

    #[test]
    fn test_huge_spans_do_not_overflow() {
        assert_eq!(window_start(day("2024-01-01"), 4_000_000_000), NaiveDate::MIN);

        let dates = report_dates(day("2024-01-01"), 100_000_000);
        assert_eq!(dates.len(), MAX_DAYS as usize);
        assert_eq!(dates.last(), Some(&day("2024-01-01")));

        let near_start = NaiveDate::MIN + Duration::days(2);
        assert_eq!(report_dates(near_start, 7).len(), 3);
        assert_eq!(weekly_summary(&two_members(), &AttendanceSnapshot::new(), near_start).len(), 3);
    }

    #[test]
    fn test_summary_text() {
        let summary = MemberSummary {
            present: 20,
            absent: 8,
            half_day: 2,
            days_considered: 30,
        };
        assert_eq!(
            summary_text(&summary),
            "Total days tracked: 30. Present: 20, Absent: 8, Half Day: 2."
        );
    }

    #[test]
    fn test_filter_members() {
        let members = vec![
            member("1", "zara", "Tasha", "2023-01-01"),
            member("2", "Amit", "Dhol", "2023-01-01"),
            member("3", "Bela", "dhol", "2023-01-01"),
        ];

        let all: Vec<String> = filter_members(&members, "").into_iter().map(|m| m.name).collect();
        assert_eq!(all, vec!["Amit", "Bela", "zara"]);

        let dhol: Vec<String> = filter_members(&members, "DHOL").into_iter().map(|m| m.name).collect();
        assert_eq!(dhol, vec!["Amit", "Bela"]);

        assert_eq!(filter_members(&members, "ZAR").len(), 1);
        assert!(filter_members(&members, "flute").is_empty());
    }
}
