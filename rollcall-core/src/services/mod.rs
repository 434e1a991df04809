//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod aggregator;
mod attendance;
pub mod logging;
mod members;
pub mod migration;
mod remark;
mod report;
mod state;

pub use attendance::{AttendanceService, MarkOutcome, MemberStatus};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use members::{parse_member_csv, ImportResult, MemberService, ParsedImport};
pub use migration::{MigrationResult, MigrationService};
pub use remark::{Remark, RemarkService};
pub use report::{default_file_name, ReportService, MONTHLY_DAYS, WEEKLY_DAYS};
pub use state::{LiveState, Readiness, ReadinessReport};
