//! Year orchestration.
//!
//! Each fiscal year moves through
//! `Pending -> FilesDiscovered -> DimensionsLoaded -> SiteMappingBuilt -> FactsLoaded -> Done`,
//! or to `Failed` from any state. Years run one after another; a failed year
//! does not stop the run. Years whose latest load run finished `done` are
//! skipped unless `force` is set, so an interrupted multi-year run can be
//! repeated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::{BatchReport, BatchWriter};
use crate::columns::ColumnResolution;
use crate::config::LoaderConfig;
use crate::dimensions::extract_dimensions;
use crate::error::LoadError;
use crate::filter::{FilterReport, RecordFilter};
use crate::record::{LcaRecord, Normalizer};
use crate::sites::{build_applications, SiteResolver};
use crate::source::{discover_files, read_table, SourceTable};
use crate::store::{RunStatus, Store, TableCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearState {
    Pending,
    FilesDiscovered,
    DimensionsLoaded,
    SiteMappingBuilt,
    FactsLoaded,
    Done,
    Failed,
}

impl fmt::Display for YearState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            YearState::Pending => "pending",
            YearState::FilesDiscovered => "files-discovered",
            YearState::DimensionsLoaded => "dimensions-loaded",
            YearState::SiteMappingBuilt => "site-mapping-built",
            YearState::FactsLoaded => "facts-loaded",
            YearState::Done => "done",
            YearState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearSelection {
    Specific(Vec<i32>),
    All,
}

/// What happened to one source file of a year.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub rows: usize,
    pub filter: FilterReport,
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearOutcome {
    pub year: i32,
    pub state: YearState,
    pub files: Vec<FileReport>,
    /// Rows read from the year's files.
    pub found: usize,
    /// Rows that passed the visa and status filters.
    pub retained: usize,
    /// Fact rows in committed batches.
    pub loaded: usize,
    /// Fact rows that did not exist before this run.
    pub inserted: u64,
    /// Filtered, not admitted, duplicate or in a failed batch.
    pub skipped: usize,
    pub failed_batches: usize,
    pub error: Option<String>,
    /// Last state reached before the year failed.
    pub failed_at: Option<YearState>,
}

impl YearOutcome {
    fn new(year: i32) -> Self {
        Self {
            year,
            state: YearState::Pending,
            files: Vec::new(),
            found: 0,
            retained: 0,
            loaded: 0,
            inserted: 0,
            skipped: 0,
            failed_batches: 0,
            error: None,
            failed_at: None,
        }
    }

    fn advance(&mut self, state: YearState) {
        debug!(year = self.year, from = %self.state, to = %state, "year state");
        self.state = state;
    }

    fn fail(&mut self, err: LoadError) {
        error!(error = %err, "year failed");
        self.error = Some(err.to_string());
        self.failed_at = Some(self.state);
        self.advance(YearState::Failed);
    }

    fn absorb(&mut self, report: &BatchReport) {
        self.failed_batches += report.failed.len();
    }

    fn audit_detail(&self) -> serde_json::Value {
        json!({
            "found": self.found,
            "retained": self.retained,
            "loaded": self.loaded,
            "inserted": self.inserted,
            "skipped": self.skipped,
            "failed_batches": self.failed_batches,
            "failed_at": self.failed_at.map(|s| s.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<YearOutcome>,
    /// Requested years skipped because their last load run finished.
    pub already_loaded: Vec<i32>,
    pub views_refreshed: bool,
    pub counts: Option<TableCounts>,
}

impl RunSummary {
    pub fn done_years(&self) -> Vec<i32> {
        self.years_in(YearState::Done)
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.years_in(YearState::Failed)
    }

    fn years_in(&self, state: YearState) -> Vec<i32> {
        self.outcomes
            .iter()
            .filter(|o| o.state == state)
            .map(|o| o.year)
            .collect()
    }

    pub fn total_found(&self) -> usize {
        self.outcomes.iter().map(|o| o.found).sum()
    }

    pub fn total_loaded(&self) -> usize {
        self.outcomes.iter().map(|o| o.loaded).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.outcomes.iter().map(|o| o.skipped).sum()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== LCA Load Summary ===");
        if self.outcomes.is_empty() {
            let _ = writeln!(out, "No years processed");
        } else {
            let _ = writeln!(
                out,
                "{:<6} {:<20} {:>10} {:>10} {:>10} {:>8}",
                "Year", "State", "Found", "Loaded", "Skipped", "Failed"
            );
            for o in &self.outcomes {
                let _ = writeln!(
                    out,
                    "{:<6} {:<20} {:>10} {:>10} {:>10} {:>8}",
                    o.year,
                    o.state.to_string(),
                    o.found,
                    o.loaded,
                    o.skipped,
                    o.failed_batches
                );
                if let Some(err) = &o.error {
                    let _ = writeln!(out, "       error: {err}");
                }
            }
            let _ = writeln!(
                out,
                "Total: found {}, loaded {}, skipped {}",
                self.total_found(),
                self.total_loaded(),
                self.total_skipped()
            );
        }

        if !self.already_loaded.is_empty() {
            let years: Vec<String> = self.already_loaded.iter().map(i32::to_string).collect();
            let _ = writeln!(out, "Already loaded (skipped): {}", years.join(", "));
        }
        if self.views_refreshed {
            let _ = writeln!(out, "Aggregate views refreshed");
        }

        if let Some(counts) = &self.counts {
            let _ = writeln!(out, "\n=== Table Counts ===");
            let _ = writeln!(out, "occupations:        {}", counts.occupations);
            let _ = writeln!(out, "employers:          {}", counts.employers);
            let _ = writeln!(out, "worksite_locations: {}", counts.worksite_locations);
            let _ = writeln!(out, "applications:       {}", counts.applications);
            if counts.naics_lookup > 0 {
                let _ = writeln!(out, "naics_lookup:       {}", counts.naics_lookup);
            }
            for (year, n) in &counts.applications_by_year {
                let _ = writeln!(out, "  FY{year}: {n}");
            }
        }
        out
    }
}

pub struct Loader<S: Store + ?Sized> {
    store: Arc<S>,
    config: LoaderConfig,
}

impl<S: Store + ?Sized> Loader<S> {
    pub fn new(store: Arc<S>, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Load the selected years. Only a failing resume query is returned as
    /// an error; everything else ends up in the summary.
    pub async fn run(&self, selection: YearSelection) -> Result<RunSummary, LoadError> {
        let discovered = match discover_files(&self.config.data_dir) {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "file discovery failed");
                BTreeMap::new()
            }
        };
        info!(
            data_dir = %self.config.data_dir.display(),
            years = discovered.len(),
            "source files discovered"
        );

        let done = self
            .store
            .done_years()
            .await
            .map_err(LoadError::Connection)?;

        let years: Vec<i32> = match selection {
            YearSelection::All => discovered.keys().copied().collect(),
            YearSelection::Specific(years) => {
                years.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
            }
        };

        let mut summary = RunSummary::default();
        for year in years {
            if !self.config.force && done.contains(&year) {
                info!(year, "fiscal year already loaded, skipping");
                summary.already_loaded.push(year);
                continue;
            }
            let files = discovered.get(&year).map(Vec::as_slice).unwrap_or_default();
            let outcome = self.load_year(year, files).await;
            summary.outcomes.push(outcome);
        }

        if self.config.refresh_views {
            if summary.done_years().is_empty() {
                warn!("no year finished; aggregate views not refreshed");
            } else {
                match self.store.refresh_views().await {
                    Ok(()) => {
                        info!("aggregate views refreshed");
                        summary.views_refreshed = true;
                    }
                    Err(e) => error!(error = %e, "view refresh failed"),
                }
            }
        }

        match self.store.table_counts().await {
            Ok(counts) => summary.counts = Some(counts),
            Err(e) => warn!(error = %e, "could not read final table counts"),
        }
        Ok(summary)
    }

    /// Load one fiscal year from its files. Never fails; the outcome carries
    /// the final state.
    pub async fn load_year(&self, year: i32, files: &[PathBuf]) -> YearOutcome {
        let mut outcome = YearOutcome::new(year);
        info!(year, files = files.len(), "loading fiscal year");

        let file_names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let run_id = match self.store.start_run(year, json!({ "files": file_names })).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(year, error = %e, "could not record load run");
                None
            }
        };

        self.drive_year(&mut outcome, files).await;
        self.record_run(run_id, &outcome).await;

        info!(
            year,
            state = %outcome.state,
            found = outcome.found,
            loaded = outcome.loaded,
            skipped = outcome.skipped,
            "fiscal year finished"
        );
        outcome
    }

    async fn drive_year(&self, outcome: &mut YearOutcome, files: &[PathBuf]) {
        let year = outcome.year;
        if files.is_empty() {
            outcome.fail(LoadError::YearLoad {
                year,
                reason: "no source files found".to_string(),
            });
            return;
        }
        outcome.advance(YearState::FilesDiscovered);

        let records = match self.prepare(outcome, files).await {
            Ok(records) => records,
            Err(e) => {
                outcome.fail(LoadError::YearLoad {
                    year,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let dims = extract_dimensions(&records);
        info!(
            year,
            employers = dims.employers.len(),
            occupations = dims.occupations.len(),
            worksites = dims.worksites.len(),
            "dimensions extracted"
        );
        let writer = BatchWriter::new(self.store.as_ref(), self.config.dimension_batch_size);
        let occupations = writer.write(&dims.occupations).await;
        outcome.absorb(&occupations);
        let employers = writer.write(&dims.employers).await;
        outcome.absorb(&employers);
        let worksites = writer.write(&dims.worksites).await;
        outcome.absorb(&worksites);
        outcome.advance(YearState::DimensionsLoaded);

        let sites = match SiteResolver::load(self.store.as_ref()).await {
            Ok(sites) => sites,
            Err(e) => {
                outcome.fail(LoadError::YearLoad {
                    year,
                    reason: format!("site mapping: {e}"),
                });
                return;
            }
        };
        outcome.advance(YearState::SiteMappingBuilt);

        let facts = build_applications(&records, &sites);
        if facts.rejected > 0 || facts.duplicates > 0 {
            info!(
                year,
                rejected = facts.rejected,
                duplicates = facts.duplicates,
                unresolved_sites = facts.unresolved_sites,
                "rows not admitted as applications"
            );
        }
        let writer = BatchWriter::new(self.store.as_ref(), self.config.fact_batch_size);
        let applications = writer.write(&facts.applications).await;
        outcome.absorb(&applications);
        outcome.loaded = applications.written;
        outcome.inserted = applications.affected;
        outcome.skipped = outcome.found - outcome.loaded;
        outcome.advance(YearState::FactsLoaded);

        outcome.advance(YearState::Done);
    }

    /// Read, map, normalize and filter every file of the year. Any
    /// unreadable file fails the year before anything is written.
    async fn prepare(
        &self,
        outcome: &mut YearOutcome,
        files: &[PathBuf],
    ) -> Result<Vec<LcaRecord>, LoadError> {
        let mut records = Vec::new();
        for path in files {
            let table = read_table(path).await?;
            let (file_records, report) = map_table(&table);
            outcome.found += report.rows;
            outcome.retained += report.filter.retained();
            records.extend(file_records);
            outcome.files.push(report);
        }
        // Outcome counts stay valid if the year fails later.
        outcome.skipped = outcome.found;
        Ok(records)
    }

    async fn record_run(&self, run_id: Option<Uuid>, outcome: &YearOutcome) {
        let Some(run_id) = run_id else { return };
        let status = if outcome.state == YearState::Done {
            RunStatus::Done
        } else {
            RunStatus::Failed
        };
        if let Err(e) = self
            .store
            .finish_run(run_id, status, outcome.error.as_deref(), outcome.audit_detail())
            .await
        {
            warn!(year = outcome.year, error = %e, "could not finish load run record");
        }
    }
}

/// Column mapping, normalization and filtering for one file.
pub fn map_table(table: &SourceTable) -> (Vec<LcaRecord>, FileReport) {
    let resolution = ColumnResolution::resolve(&table.headers);
    let missing = resolution.missing();
    for field in &missing {
        let err = LoadError::MissingColumn {
            field: *field,
            path: table.path.clone(),
        };
        debug!(error = %err, "field will be null");
    }
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|f| f.name()).collect();
        warn!(file = %table.path.display(), missing = ?names, "columns not found");
    }

    let normalizer = Normalizer::new(&resolution);
    let records: Vec<LcaRecord> = table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalizer.normalize(&resolution.project(row, SourceTable::line_of(i))))
        .collect();

    let (records, filter) = RecordFilter::new(&resolution).apply(records);
    let report = FileReport {
        path: table.path.clone(),
        rows: table.rows.len(),
        filter,
        missing_columns: missing.iter().map(|f| f.name().to_string()).collect(),
    };
    (records, report)
}
