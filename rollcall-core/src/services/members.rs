//! Member service - add, import, edit and look up members

use std::fs;
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{Member, MemberFields};
use crate::ports::{AttendanceStore, WriteBatch};
use crate::services::aggregator;

/// Members parsed from an import file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImport {
    pub members: Vec<MemberFields>,
    /// Data rows dropped for a missing name or instrument
    pub skipped: usize,
}

/// Result of a bulk import
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub ids: Vec<String>,
}

/// Parse a member CSV.
///
/// The header must name `name` and `instrument` columns (any case, any
/// order, extra columns allowed). Rows missing either value are skipped.
pub fn parse_member_csv(text: &str) -> Result<ParsedImport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Whitespace-only lines
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        rows.push(record);
    }

    if rows.len() < 2 {
        return Err(Error::validation(
            "CSV must have a header and at least one data row.",
        ));
    }

    let header = &rows[0];
    let column = |wanted: &str| header.iter().position(|h| h.to_lowercase() == wanted);
    let (name_idx, instrument_idx) = match (column("name"), column("instrument")) {
        (Some(n), Some(i)) => (n, i),
        _ => {
            return Err(Error::validation(
                "CSV header must contain 'name' and 'instrument' columns.",
            ))
        }
    };

    let mut parsed = ParsedImport::default();
    for row in &rows[1..] {
        let fields = MemberFields::new(
            row.get(name_idx).unwrap_or(""),
            row.get(instrument_idx).unwrap_or(""),
        );
        if fields.validate().is_ok() {
            parsed.members.push(fields);
        } else {
            parsed.skipped += 1;
        }
    }

    if parsed.members.is_empty() {
        return Err(Error::validation("No valid members found in the CSV file."));
    }

    Ok(parsed)
}

/// Service for member management
pub struct MemberService {
    store: Arc<dyn AttendanceStore>,
}

impl MemberService {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Add one member; returns the new id
    pub fn add(&self, name: &str, instrument: &str) -> Result<String> {
        self.store.add_member(&MemberFields::new(name, instrument))
    }

    /// Add several members in one atomic batch
    pub fn add_many(&self, members: &[MemberFields]) -> Result<Vec<String>> {
        for fields in members {
            fields.validate().map_err(Error::validation)?;
        }

        let mut batch = WriteBatch::new();
        let ids: Vec<String> = members.iter().map(|f| batch.add_member(f)).collect();
        self.store.commit(batch)?;
        Ok(ids)
    }

    /// Import members from CSV text
    pub fn import_text(&self, text: &str) -> Result<ImportResult> {
        let parsed = parse_member_csv(text)?;
        let ids = self.add_many(&parsed.members)?;
        Ok(ImportResult {
            imported: ids.len(),
            skipped: parsed.skipped,
            ids,
        })
    }

    /// Import members from a CSV file
    pub fn import_csv(&self, path: &Path) -> Result<ImportResult> {
        let text = fs::read_to_string(path)?;
        self.import_text(&text)
    }

    pub fn update(&self, id: &str, name: &str, instrument: &str) -> Result<()> {
        self.store.update_member(id, &MemberFields::new(name, instrument))
    }

    /// All members, newest first
    pub fn list(&self) -> Result<Vec<Member>> {
        self.store.list_members()
    }

    pub fn get(&self, id: &str) -> Result<Member> {
        self.store
            .get_member(id)?
            .ok_or_else(|| Error::not_found(format!("Member {}", id)))
    }

    /// Members sorted by name, filtered by name or instrument
    pub fn search(&self, query: &str) -> Result<Vec<Member>> {
        Ok(aggregator::filter_members(&self.list()?, query))
    }
}
