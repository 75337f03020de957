//! Backing store seam.
//!
//! `PgStore` writes to Postgres; `MemoryStore` keeps the same tables in
//! process memory with the same conflict rules and backs dry runs.

mod memory;
mod postgres;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Application, Employer, NaicsEntry, Occupation, SiteKey, WorksiteLocation};

pub use memory::{MemoryStore, RunEntry};
pub use postgres::PgStore;

pub const OCCUPATIONS: &str = "occupations";
pub const EMPLOYERS: &str = "employers";
pub const WORKSITES: &str = "worksite_locations";
pub const APPLICATIONS: &str = "applications";
pub const NAICS: &str = "naics_lookup";

/// Aggregate views refreshed after a successful load.
pub const VIEWS: [&str; 3] = [
    "mv_industry_metrics",
    "mv_state_metrics",
    "mv_occupation_metrics",
];

/// One batch of rows for one table, written in a single transaction.
#[derive(Debug, Clone, Copy)]
pub enum Batch<'a> {
    Occupations(&'a [Occupation]),
    Employers(&'a [Employer]),
    Worksites(&'a [WorksiteLocation]),
    Applications(&'a [Application]),
    Naics(&'a [NaicsEntry]),
}

impl Batch<'_> {
    pub fn table(&self) -> &'static str {
        match self {
            Batch::Occupations(_) => OCCUPATIONS,
            Batch::Employers(_) => EMPLOYERS,
            Batch::Worksites(_) => WORKSITES,
            Batch::Applications(_) => APPLICATIONS,
            Batch::Naics(_) => NAICS,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Occupations(rows) => rows.len(),
            Batch::Employers(rows) => rows.len(),
            Batch::Worksites(rows) => rows.len(),
            Batch::Applications(rows) => rows.len(),
            Batch::Naics(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub occupations: i64,
    pub employers: i64,
    pub worksite_locations: i64,
    pub applications: i64,
    pub naics_lookup: i64,
    pub applications_by_year: BTreeMap<i32, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Write one batch in its own transaction and return the number of rows
    /// inserted or updated. On error nothing from the batch is visible.
    async fn write_batch(&self, batch: Batch<'_>) -> Result<u64, StoreError>;

    /// The whole worksite key table, in one read.
    async fn site_keys(&self) -> Result<Vec<(SiteKey, i64)>, StoreError>;

    /// Application row count per fiscal year already present.
    async fn loaded_fiscal_years(&self) -> Result<BTreeMap<i32, i64>, StoreError>;

    /// File-set years whose most recent load run finished as `done`.
    async fn done_years(&self) -> Result<BTreeSet<i32>, StoreError>;

    async fn table_counts(&self) -> Result<TableCounts, StoreError>;

    async fn refresh_views(&self) -> Result<(), StoreError>;

    async fn start_run(&self, fiscal_year: i32, detail: serde_json::Value) -> Result<Uuid, StoreError>;

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<(), StoreError>;
}
