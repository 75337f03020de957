//! Batched writes, one transaction per batch.
//!
//! A failing batch is rolled back by the store, logged with its index and
//! row range, and recorded in the report. The remaining batches still run.

use std::fmt;
use std::ops::Range;

use tracing::{error, info};

use crate::error::LoadError;
use crate::models::{Application, Employer, NaicsEntry, Occupation, WorksiteLocation};
use crate::store::{Batch, Store, APPLICATIONS, EMPLOYERS, NAICS, OCCUPATIONS, WORKSITES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Mutable attributes are overwritten; the key is preserved.
    UpdateOnConflict,
    /// The existing row is kept untouched.
    IgnoreOnConflict,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::UpdateOnConflict => f.write_str("update"),
            ConflictPolicy::IgnoreOnConflict => f.write_str("ignore"),
        }
    }
}

/// A row type with a target table and a conflict rule.
pub trait Entity: Sized + Sync {
    const TABLE: &'static str;
    const CONFLICT_KEY: &'static str;
    const POLICY: ConflictPolicy;

    fn batch(rows: &[Self]) -> Batch<'_>;
}

impl Entity for Occupation {
    const TABLE: &'static str = OCCUPATIONS;
    const CONFLICT_KEY: &'static str = "soc_code";
    const POLICY: ConflictPolicy = ConflictPolicy::UpdateOnConflict;

    fn batch(rows: &[Self]) -> Batch<'_> {
        Batch::Occupations(rows)
    }
}

impl Entity for Employer {
    const TABLE: &'static str = EMPLOYERS;
    const CONFLICT_KEY: &'static str = "emp_id";
    const POLICY: ConflictPolicy = ConflictPolicy::UpdateOnConflict;

    fn batch(rows: &[Self]) -> Batch<'_> {
        Batch::Employers(rows)
    }
}

impl Entity for WorksiteLocation {
    const TABLE: &'static str = WORKSITES;
    const CONFLICT_KEY: &'static str = "worksite_city, worksite_state, worksite_zip";
    const POLICY: ConflictPolicy = ConflictPolicy::IgnoreOnConflict;

    fn batch(rows: &[Self]) -> Batch<'_> {
        Batch::Worksites(rows)
    }
}

impl Entity for Application {
    const TABLE: &'static str = APPLICATIONS;
    const CONFLICT_KEY: &'static str = "app_id";
    const POLICY: ConflictPolicy = ConflictPolicy::IgnoreOnConflict;

    fn batch(rows: &[Self]) -> Batch<'_> {
        Batch::Applications(rows)
    }
}

impl Entity for NaicsEntry {
    const TABLE: &'static str = NAICS;
    const CONFLICT_KEY: &'static str = "naics_code";
    const POLICY: ConflictPolicy = ConflictPolicy::UpdateOnConflict;

    fn batch(rows: &[Self]) -> Batch<'_> {
        Batch::Naics(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    /// 1-based batch index.
    pub number: usize,
    pub rows: Range<usize>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub table: &'static str,
    pub total: usize,
    pub batches: usize,
    /// Rows in committed batches.
    pub written: usize,
    /// Rows the store reports as inserted or updated.
    pub affected: u64,
    pub failed: Vec<FailedBatch>,
}

impl BatchReport {
    pub fn failed_rows(&self) -> usize {
        self.failed.iter().map(|f| f.rows.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchWriter<'a, S: Store + ?Sized> {
    store: &'a S,
    batch_size: usize,
}

impl<'a, S: Store + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn write<E: Entity>(&self, rows: &[E]) -> BatchReport {
        let mut report = BatchReport {
            table: E::TABLE,
            total: rows.len(),
            ..Default::default()
        };

        for (i, chunk) in rows.chunks(self.batch_size).enumerate() {
            let number = i + 1;
            let start = i * self.batch_size;
            let end = start + chunk.len();
            report.batches = number;

            match self.store.write_batch(E::batch(chunk)).await {
                Ok(affected) => {
                    report.written += chunk.len();
                    report.affected += affected;
                }
                Err(source) => {
                    let err = LoadError::BatchWrite {
                        table: E::TABLE,
                        batch: number,
                        start,
                        end,
                        source,
                    };
                    error!(error = %err, "batch failed");
                    report.failed.push(FailedBatch {
                        number,
                        rows: start..end,
                        error: err.to_string(),
                    });
                }
            }

            info!(
                table = E::TABLE,
                on_conflict = %E::POLICY,
                key = E::CONFLICT_KEY,
                batch = number,
                written = report.written,
                total = report.total,
                "batch progress"
            );
        }
        report
    }
}
