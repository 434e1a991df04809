//! Rollcall Core - attendance tracking for a small troupe
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Member, AttendanceRecord, User, etc.)
//! - **ports**: Trait definitions for external dependencies (AttendanceStore, IdentityProvider, RemarkGenerator)
//! - **services**: Business logic orchestration and the live state container
//! - **adapters**: Concrete implementations (DuckDB, local credentials, Gemini)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use adapters::duckdb::DuckDbStore;
use adapters::gemini::{get_base_url, GeminiRemarkGenerator};
use adapters::local_identity::LocalIdentityProvider;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    AttendanceRecord, AttendanceSnapshot, AttendanceStatus, AuthError, AuthState, Member,
    MemberFields, User,
};

/// Store file inside the data directory
pub const STORE_FILE: &str = "rollcall.duckdb";

/// Today's date as used everywhere (UTC)
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Main context for Rollcall operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, the identity provider, configuration and all services.
pub struct RollcallContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub store: Arc<DuckDbStore>,
    pub identity: Arc<LocalIdentityProvider>,
    pub member_service: MemberService,
    pub attendance_service: AttendanceService,
    pub report_service: ReportService,
    pub remark_service: RemarkService,
}

impl RollcallContext {
    /// Create a context over `data_dir`, creating the directory and store if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = Config::load(data_dir)?;

        let store = Arc::new(DuckDbStore::new(&data_dir.join(STORE_FILE))?);
        store.ensure_schema()?;

        let identity = Arc::new(LocalIdentityProvider::new(data_dir));

        let base_url = config.remark_base_url.clone().unwrap_or_else(get_base_url);
        let generator = Arc::new(GeminiRemarkGenerator::new_with_base_url(
            config.remark_api_key.clone(),
            &config.remark_model,
            &config.group_name,
            &base_url,
        )?);

        let member_service = MemberService::new(store.clone());
        let attendance_service = AttendanceService::new(store.clone());
        let report_service = ReportService::new(store.clone(), config.window_days);
        let remark_service = RemarkService::new(store.clone(), generator, config.window_days);

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            store,
            identity,
            member_service,
            attendance_service,
            report_service,
            remark_service,
        })
    }

    /// First day of the attendance window ending `today`
    pub fn window_start(&self, today: NaiveDate) -> NaiveDate {
        aggregator::window_start(today, self.config.window_days)
    }

    /// Attendance can only be written inside the live window
    pub fn check_in_window(&self, date: NaiveDate, today: NaiveDate) -> domain::result::Result<()> {
        let start = self.window_start(today);
        if date < start || date > today {
            return Err(Error::validation(format!(
                "Date {} is outside the attendance window ({} to {})",
                date, start, today
            )));
        }
        Ok(())
    }

    /// Subscribe a live state container to the store and identity provider
    pub fn live_state(&self, today: NaiveDate, logger: Option<Arc<LoggingService>>) -> LiveState {
        LiveState::new(
            self.store.as_ref(),
            self.identity.as_ref(),
            today,
            self.config.window_days,
            logger,
        )
    }
}
