//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod attendance;
pub mod credential;
mod member;
pub mod result;
mod user;

pub use attendance::{parse_date, AttendanceRecord, AttendanceSnapshot, AttendanceStatus, DATE_FORMAT};
pub use credential::{Argon2Params, CredentialFile, StoredCredential};
pub use member::{Member, MemberFields};
pub use user::{AuthError, AuthState, User};
