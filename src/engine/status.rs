//! Applied vs pending scripts

use serde::Serialize;

use crate::engine::history::HistoryRecord;

/// Migration status of a database
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Rows of the history table, by rank
    pub applied: Vec<HistoryRecord>,
    /// Scripts not yet applied, by version
    pub pending: Vec<PendingScript>,
    /// `false` when the history table has not been created yet
    pub has_history: bool,
}

/// A script that has not been applied yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingScript {
    pub version: String,
    pub description: String,
    pub script: String,
    pub location: String,
    pub checksum: String,
}

impl MigrationStatus {
    /// Status of a database whose history table exists
    pub fn new(applied: Vec<HistoryRecord>, pending: Vec<PendingScript>) -> Self {
        Self {
            applied,
            pending,
            has_history: true,
        }
    }

    /// Status of a database that was never migrated
    ///
    /// # Arguments
    ///
    /// * `pending` - Every resolved script, by version
    pub fn without_history(pending: Vec<PendingScript>) -> Self {
        Self {
            applied: Vec::new(),
            pending,
            has_history: false,
        }
    }

    /// Number of rows in the history table
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applied plus pending scripts
    pub fn total(&self) -> usize {
        self.applied_count() + self.pending_count()
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Version of the most recently applied script
    #[must_use]
    pub fn current_version(&self) -> Option<&str> {
        self.applied.last().map(|r| r.version.as_str())
    }

    /// Version the next run starts with
    #[must_use]
    pub fn next_pending_version(&self) -> Option<&str> {
        self.pending.first().map(|p| p.version.as_str())
    }
}
