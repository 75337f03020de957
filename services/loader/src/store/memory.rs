use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Batch, RunStatus, Store, TableCounts, APPLICATIONS, EMPLOYERS, NAICS, OCCUPATIONS};
use crate::error::StoreError;
use crate::models::{Application, Employer, NaicsEntry, Occupation, SiteKey};

#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub run_id: Uuid,
    pub fiscal_year: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub detail: serde_json::Value,
}

#[derive(Debug, Default)]
struct Tables {
    occupations: BTreeMap<String, Occupation>,
    employers: BTreeMap<String, Employer>,
    worksites: HashMap<SiteKey, i64>,
    next_site_id: i64,
    applications: BTreeMap<String, Application>,
    naics: BTreeMap<String, NaicsEntry>,
    runs: Vec<RunEntry>,
    view_refreshes: usize,
}

/// In-process store with the Postgres store's conflict rules: primary and
/// foreign keys are enforced and a failing batch leaves no trace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn coalesce(target: &mut Option<String>, incoming: &Option<String>) {
    if incoming.is_some() {
        target.clone_from(incoming);
    }
}

/// Postgres refuses an upsert that touches the same row twice.
fn reject_repeated_keys<'a, K: Eq + Hash + 'a>(
    table: &'static str,
    keys: impl Iterator<Item = &'a K>,
) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(StoreError::Constraint {
                table,
                detail: "batch affects the same row twice".to_string(),
            });
        }
    }
    Ok(())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn application(&self, app_id: &str) -> Option<Application> {
        self.tables.lock().await.applications.get(app_id).cloned()
    }

    pub async fn employer(&self, emp_id: &str) -> Option<Employer> {
        self.tables.lock().await.employers.get(emp_id).cloned()
    }

    pub async fn occupation(&self, soc_code: &str) -> Option<Occupation> {
        self.tables.lock().await.occupations.get(soc_code).cloned()
    }

    pub async fn runs(&self) -> Vec<RunEntry> {
        self.tables.lock().await.runs.clone()
    }

    pub async fn view_refreshes(&self) -> usize {
        self.tables.lock().await.view_refreshes
    }
}

impl Tables {
    fn upsert_occupations(&mut self, rows: &[Occupation]) -> Result<u64, StoreError> {
        reject_repeated_keys(OCCUPATIONS, rows.iter().map(|r| &r.soc_code))?;
        for row in rows {
            match self.occupations.get_mut(&row.soc_code) {
                Some(existing) => {
                    coalesce(&mut existing.soc_title, &row.soc_title);
                    coalesce(&mut existing.major_group, &row.major_group);
                }
                None => {
                    self.occupations.insert(row.soc_code.clone(), row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }

    fn upsert_employers(&mut self, rows: &[Employer]) -> Result<u64, StoreError> {
        reject_repeated_keys(EMPLOYERS, rows.iter().map(|r| &r.emp_id))?;
        for row in rows {
            match self.employers.get_mut(&row.emp_id) {
                Some(existing) => {
                    coalesce(&mut existing.emp_name, &row.emp_name);
                    coalesce(&mut existing.industry, &row.industry);
                    coalesce(&mut existing.emp_address, &row.emp_address);
                    coalesce(&mut existing.emp_city, &row.emp_city);
                    coalesce(&mut existing.emp_state, &row.emp_state);
                    coalesce(&mut existing.emp_zip, &row.emp_zip);
                }
                None => {
                    self.employers.insert(row.emp_id.clone(), row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }

    fn insert_worksites(&mut self, rows: &[SiteKey]) -> u64 {
        let mut inserted = 0;
        for key in rows {
            if !self.worksites.contains_key(key) {
                self.next_site_id += 1;
                self.worksites.insert(key.clone(), self.next_site_id);
                inserted += 1;
            }
        }
        inserted
    }

    fn insert_applications(&mut self, rows: &[Application]) -> Result<u64, StoreError> {
        let site_ids: HashSet<i64> = self.worksites.values().copied().collect();
        for row in rows {
            let violation = if !self.employers.contains_key(&row.emp_id) {
                Some(format!("emp_id {} not in employers", row.emp_id))
            } else if !self.occupations.contains_key(&row.soc_code) {
                Some(format!("soc_code {} not in occupations", row.soc_code))
            } else {
                row.site_id
                    .filter(|id| !site_ids.contains(id))
                    .map(|id| format!("site_id {id} not in worksite_locations"))
            };
            if let Some(detail) = violation {
                return Err(StoreError::Constraint {
                    table: APPLICATIONS,
                    detail: format!("app_id {}: {detail}", row.app_id),
                });
            }
        }

        let mut inserted = 0;
        for row in rows {
            if !self.applications.contains_key(&row.app_id) {
                self.applications.insert(row.app_id.clone(), row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn upsert_naics(&mut self, rows: &[NaicsEntry]) -> Result<u64, StoreError> {
        reject_repeated_keys(NAICS, rows.iter().map(|r| &r.naics_code))?;
        for row in rows {
            match self.naics.get_mut(&row.naics_code) {
                Some(existing) => {
                    coalesce(&mut existing.industry_name, &row.industry_name);
                    coalesce(&mut existing.sector, &row.sector);
                    coalesce(&mut existing.industry_category, &row.industry_category);
                }
                None => {
                    self.naics.insert(row.naics_code.clone(), row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write_batch(&self, batch: Batch<'_>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        // Every failure is detected before the first mutation.
        match batch {
            Batch::Occupations(rows) => tables.upsert_occupations(rows),
            Batch::Employers(rows) => tables.upsert_employers(rows),
            Batch::Worksites(rows) => Ok(tables.insert_worksites(rows)),
            Batch::Applications(rows) => tables.insert_applications(rows),
            Batch::Naics(rows) => tables.upsert_naics(rows),
        }
    }

    async fn site_keys(&self) -> Result<Vec<(SiteKey, i64)>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .worksites
            .iter()
            .map(|(key, id)| (key.clone(), *id))
            .collect())
    }

    async fn loaded_fiscal_years(&self) -> Result<BTreeMap<i32, i64>, StoreError> {
        let tables = self.tables.lock().await;
        let mut years = BTreeMap::new();
        for year in tables.applications.values().filter_map(|a| a.fiscal_year) {
            *years.entry(year).or_insert(0) += 1;
        }
        Ok(years)
    }

    async fn done_years(&self) -> Result<BTreeSet<i32>, StoreError> {
        let tables = self.tables.lock().await;
        // Runs are kept in start order, so the last entry per year wins.
        let mut latest = BTreeMap::new();
        for run in &tables.runs {
            latest.insert(run.fiscal_year, run.status);
        }
        Ok(latest
            .into_iter()
            .filter(|(_, status)| *status == RunStatus::Done)
            .map(|(year, _)| year)
            .collect())
    }

    async fn table_counts(&self) -> Result<TableCounts, StoreError> {
        let applications_by_year = self.loaded_fiscal_years().await?;
        let tables = self.tables.lock().await;
        Ok(TableCounts {
            occupations: tables.occupations.len() as i64,
            employers: tables.employers.len() as i64,
            worksite_locations: tables.worksites.len() as i64,
            applications: tables.applications.len() as i64,
            naics_lookup: tables.naics.len() as i64,
            applications_by_year,
        })
    }

    async fn refresh_views(&self) -> Result<(), StoreError> {
        self.tables.lock().await.view_refreshes += 1;
        Ok(())
    }

    async fn start_run(&self, fiscal_year: i32, detail: serde_json::Value) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        self.tables.lock().await.runs.push(RunEntry {
            run_id,
            fiscal_year,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            error: None,
            detail,
        });
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(run) = tables.runs.iter_mut().find(|r| r.run_id == run_id) {
            run.finished_at = Some(Utc::now());
            run.status = status;
            run.error = error.map(str::to_string);
            if let (Some(existing), serde_json::Value::Object(extra)) = (run.detail.as_object_mut(), detail) {
                existing.extend(extra);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupation(code: &str, title: Option<&str>) -> Occupation {
        Occupation {
            soc_code: code.to_string(),
            soc_title: title.map(str::to_string),
            major_group: Some(code[..2].to_string()),
        }
    }

    fn employer(id: &str) -> Employer {
        Employer {
            emp_id: id.to_string(),
            emp_name: Some(format!("Employer {id}")),
            industry: None,
            emp_address: None,
            emp_city: None,
            emp_state: None,
            emp_zip: None,
        }
    }

    fn application(app_id: &str, emp_id: &str, soc_code: &str, site_id: Option<i64>) -> Application {
        Application {
            app_id: app_id.to_string(),
            emp_id: emp_id.to_string(),
            soc_code: soc_code.to_string(),
            site_id,
            case_status: "Certified".to_string(),
            decision_date: None,
            received_date: None,
            fiscal_year: Some(2020),
            visa_class: "H-1B".to_string(),
            job_title: None,
            full_time: true,
            begin_date: None,
            end_date: None,
            wage_offer: None,
            wage_unit: None,
            annual_wage: None,
        }
    }

    // -------------------------------------------------------------------------
    // DIMENSIONS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn upsert_keeps_existing_value_when_incoming_is_null() {
        let store = MemoryStore::new();
        let first = [occupation("15-1252", Some("Software Developers"))];
        store.write_batch(Batch::Occupations(&first)).await.unwrap();
        let second = [occupation("15-1252", None)];
        store.write_batch(Batch::Occupations(&second)).await.unwrap();

        let stored = store.occupation("15-1252").await.unwrap();
        assert_eq!(stored.soc_title.as_deref(), Some("Software Developers"));
    }

    #[tokio::test]
    async fn upsert_overwrites_with_new_value() {
        let store = MemoryStore::new();
        let first = [occupation("15-1252", Some("Old"))];
        store.write_batch(Batch::Occupations(&first)).await.unwrap();
        let second = [occupation("15-1252", Some("New"))];
        store.write_batch(Batch::Occupations(&second)).await.unwrap();

        assert_eq!(
            store.occupation("15-1252").await.unwrap().soc_title.as_deref(),
            Some("New")
        );
    }

    #[tokio::test]
    async fn repeated_key_in_one_batch_is_rejected() {
        let store = MemoryStore::new();
        let rows = [employer("E1"), employer("E2"), employer("E1")];
        let err = store.write_batch(Batch::Employers(&rows)).await.unwrap_err();

        assert!(matches!(err, StoreError::Constraint { table: "employers", .. }));
        assert_eq!(store.table_counts().await.unwrap().employers, 0);
    }

    #[tokio::test]
    async fn worksites_get_stable_ids() {
        let store = MemoryStore::new();
        let key = SiteKey::new(None, Some("CA"), Some("94105"));
        let rows = [key.clone(), SiteKey::new(Some("Austin"), Some("TX"), None)];
        assert_eq!(store.write_batch(Batch::Worksites(&rows)).await.unwrap(), 2);
        assert_eq!(store.write_batch(Batch::Worksites(&rows)).await.unwrap(), 0);

        let keys = store.site_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&(key, 1)));
    }

    // -------------------------------------------------------------------------
    // FACTS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn foreign_key_violation_rolls_back_the_batch() {
        let store = MemoryStore::new();
        store.write_batch(Batch::Employers(&[employer("E1")])).await.unwrap();
        store
            .write_batch(Batch::Occupations(&[occupation("15-1252", None)]))
            .await
            .unwrap();

        let rows = [
            application("I-1", "E1", "15-1252", None),
            application("I-2", "E9", "15-1252", None),
        ];
        let err = store.write_batch(Batch::Applications(&rows)).await.unwrap_err();

        assert!(matches!(err, StoreError::Constraint { table: "applications", .. }));
        assert!(store.application("I-1").await.is_none());
    }

    #[tokio::test]
    async fn applications_are_never_overwritten() {
        let store = MemoryStore::new();
        store.write_batch(Batch::Employers(&[employer("E1")])).await.unwrap();
        store
            .write_batch(Batch::Occupations(&[occupation("15-1252", None)]))
            .await
            .unwrap();

        let original = [application("I-1", "E1", "15-1252", None)];
        assert_eq!(store.write_batch(Batch::Applications(&original)).await.unwrap(), 1);

        let mut changed = application("I-1", "E1", "15-1252", None);
        changed.job_title = Some("Changed".to_string());
        let changed = [changed];
        assert_eq!(store.write_batch(Batch::Applications(&changed)).await.unwrap(), 0);

        assert_eq!(store.application("I-1").await.unwrap().job_title, None);
        assert_eq!(
            store.loaded_fiscal_years().await.unwrap(),
            BTreeMap::from([(2020, 1)])
        );
    }

    // -------------------------------------------------------------------------
    // AUDIT
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn run_audit_merges_detail() {
        let store = MemoryStore::new();
        let run_id = store
            .start_run(2020, serde_json::json!({ "files": ["a.csv"] }))
            .await
            .unwrap();
        store
            .finish_run(run_id, RunStatus::Done, None, serde_json::json!({ "loaded": 3 }))
            .await
            .unwrap();

        let runs = store.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Done);
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].detail["loaded"], 3);
        assert_eq!(runs[0].detail["files"][0], "a.csv");
    }

    #[tokio::test]
    async fn done_years_follow_the_latest_run_per_year() {
        let store = MemoryStore::new();
        let empty = || serde_json::json!({});

        let first = store.start_run(2019, empty()).await.unwrap();
        store.finish_run(first, RunStatus::Done, None, empty()).await.unwrap();
        let retry = store.start_run(2019, empty()).await.unwrap();
        store
            .finish_run(retry, RunStatus::Failed, Some("boom"), empty())
            .await
            .unwrap();

        let failed = store.start_run(2020, empty()).await.unwrap();
        store
            .finish_run(failed, RunStatus::Failed, Some("boom"), empty())
            .await
            .unwrap();
        let fixed = store.start_run(2020, empty()).await.unwrap();
        store.finish_run(fixed, RunStatus::Done, None, empty()).await.unwrap();

        store.start_run(2021, empty()).await.unwrap();

        assert_eq!(store.done_years().await.unwrap(), BTreeSet::from([2020]));
    }
}
