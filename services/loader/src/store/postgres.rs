use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Batch, RunStatus, Store, TableCounts, APPLICATIONS, EMPLOYERS, NAICS, OCCUPATIONS, VIEWS, WORKSITES};
use crate::error::{LoadError, StoreError};
use crate::models::{Application, Employer, NaicsEntry, Occupation, SiteKey};

/// Rows per INSERT statement. Applications bind 16 parameters per row, well
/// under the 65535 bind limit at this size.
const PAGE_ROWS: usize = 1000;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the pool. A failure here is the one fatal error of a run.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|e| LoadError::Connection(StoreError::Database(e)))?;
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64, StoreError> {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

async fn upsert_occupations(conn: &mut PgConnection, rows: &[Occupation]) -> Result<u64, StoreError> {
    let mut affected = 0;
    for page in rows.chunks(PAGE_ROWS) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO occupations (soc_code, soc_title, major_group) ",
        );
        qb.push_values(page, |mut b, row| {
            b.push_bind(&row.soc_code)
                .push_bind(&row.soc_title)
                .push_bind(&row.major_group);
        });
        qb.push(
            " ON CONFLICT (soc_code) DO UPDATE SET \
             soc_title = COALESCE(EXCLUDED.soc_title, occupations.soc_title), \
             major_group = COALESCE(EXCLUDED.major_group, occupations.major_group)",
        );
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

async fn upsert_employers(conn: &mut PgConnection, rows: &[Employer]) -> Result<u64, StoreError> {
    let mut affected = 0;
    for page in rows.chunks(PAGE_ROWS) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO employers (emp_id, emp_name, industry, emp_address, emp_city, emp_state, emp_zip) ",
        );
        qb.push_values(page, |mut b, row| {
            b.push_bind(&row.emp_id)
                .push_bind(&row.emp_name)
                .push_bind(&row.industry)
                .push_bind(&row.emp_address)
                .push_bind(&row.emp_city)
                .push_bind(&row.emp_state)
                .push_bind(&row.emp_zip);
        });
        qb.push(
            " ON CONFLICT (emp_id) DO UPDATE SET \
             emp_name = COALESCE(EXCLUDED.emp_name, employers.emp_name), \
             industry = COALESCE(EXCLUDED.industry, employers.industry), \
             emp_address = COALESCE(EXCLUDED.emp_address, employers.emp_address), \
             emp_city = COALESCE(EXCLUDED.emp_city, employers.emp_city), \
             emp_state = COALESCE(EXCLUDED.emp_state, employers.emp_state), \
             emp_zip = COALESCE(EXCLUDED.emp_zip, employers.emp_zip)",
        );
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

async fn insert_worksites(conn: &mut PgConnection, rows: &[SiteKey]) -> Result<u64, StoreError> {
    let mut affected = 0;
    for page in rows.chunks(PAGE_ROWS) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO worksite_locations (worksite_city, worksite_state, worksite_zip) ",
        );
        qb.push_values(page, |mut b, key| {
            b.push_bind(&key.city)
                .push_bind(&key.state)
                .push_bind(&key.zip);
        });
        // The unique constraint is NULLS NOT DISTINCT.
        qb.push(" ON CONFLICT DO NOTHING");
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

async fn insert_applications(conn: &mut PgConnection, rows: &[Application]) -> Result<u64, StoreError> {
    let mut affected = 0;
    for page in rows.chunks(PAGE_ROWS) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO applications (app_id, emp_id, soc_code, site_id, case_status, \
             decision_date, received_date, fiscal_year, visa_class, job_title, full_time, \
             begin_date, end_date, wage_offer, wage_unit, annual_wage) ",
        );
        qb.push_values(page, |mut b, app| {
            b.push_bind(&app.app_id)
                .push_bind(&app.emp_id)
                .push_bind(&app.soc_code)
                .push_bind(app.site_id)
                .push_bind(&app.case_status)
                .push_bind(app.decision_date)
                .push_bind(app.received_date)
                .push_bind(app.fiscal_year)
                .push_bind(&app.visa_class)
                .push_bind(&app.job_title)
                .push_bind(app.full_time)
                .push_bind(app.begin_date)
                .push_bind(app.end_date)
                .push_bind(app.wage_offer)
                .push_bind(&app.wage_unit)
                .push_bind(app.annual_wage);
        });
        qb.push(" ON CONFLICT (app_id) DO NOTHING");
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

async fn upsert_naics(conn: &mut PgConnection, rows: &[NaicsEntry]) -> Result<u64, StoreError> {
    let mut affected = 0;
    for page in rows.chunks(PAGE_ROWS) {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO naics_lookup (naics_code, industry_name, sector, industry_category) ",
        );
        qb.push_values(page, |mut b, row| {
            b.push_bind(&row.naics_code)
                .push_bind(&row.industry_name)
                .push_bind(&row.sector)
                .push_bind(&row.industry_category);
        });
        qb.push(
            " ON CONFLICT (naics_code) DO UPDATE SET \
             industry_name = COALESCE(EXCLUDED.industry_name, naics_lookup.industry_name), \
             sector = COALESCE(EXCLUDED.sector, naics_lookup.sector), \
             industry_category = COALESCE(EXCLUDED.industry_category, naics_lookup.industry_category)",
        );
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

#[async_trait]
impl Store for PgStore {
    async fn write_batch(&self, batch: Batch<'_>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = match batch {
            Batch::Occupations(rows) => upsert_occupations(&mut tx, rows).await,
            Batch::Employers(rows) => upsert_employers(&mut tx, rows).await,
            Batch::Worksites(rows) => insert_worksites(&mut tx, rows).await,
            Batch::Applications(rows) => insert_applications(&mut tx, rows).await,
            Batch::Naics(rows) => upsert_naics(&mut tx, rows).await,
        };

        match result {
            Ok(affected) => {
                tx.commit().await?;
                debug!(table = batch.table(), rows = batch.len(), affected, "batch committed");
                Ok(affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(table = batch.table(), error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn site_keys(&self) -> Result<Vec<(SiteKey, i64)>, StoreError> {
        let rows: Vec<(i64, Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT site_id, worksite_city, worksite_state, worksite_zip FROM worksite_locations",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(site_id, city, state, zip)| (SiteKey { city, state, zip }, site_id))
            .collect())
    }

    async fn loaded_fiscal_years(&self) -> Result<BTreeMap<i32, i64>, StoreError> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT fiscal_year, COUNT(*)
            FROM applications
            WHERE fiscal_year IS NOT NULL
            GROUP BY fiscal_year
            ORDER BY fiscal_year
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn done_years(&self) -> Result<BTreeSet<i32>, StoreError> {
        let years: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT fiscal_year
            FROM (
                SELECT DISTINCT ON (fiscal_year) fiscal_year, status
                FROM load_runs
                ORDER BY fiscal_year, started_at DESC
            ) latest
            WHERE status = 'done'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(years.into_iter().collect())
    }

    async fn table_counts(&self) -> Result<TableCounts, StoreError> {
        Ok(TableCounts {
            occupations: self.count(OCCUPATIONS).await?,
            employers: self.count(EMPLOYERS).await?,
            worksite_locations: self.count(WORKSITES).await?,
            applications: self.count(APPLICATIONS).await?,
            naics_lookup: self.count(NAICS).await?,
            applications_by_year: self.loaded_fiscal_years().await?,
        })
    }

    async fn refresh_views(&self) -> Result<(), StoreError> {
        for view in VIEWS {
            sqlx::query(&format!("REFRESH MATERIALIZED VIEW {view}"))
                .execute(&self.pool)
                .await?;
            debug!(view, "refreshed");
        }
        Ok(())
    }

    async fn start_run(&self, fiscal_year: i32, detail: serde_json::Value) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO load_runs (run_id, fiscal_year, status, detail)
            VALUES ($1, $2, 'running', $3)
            "#,
        )
        .bind(run_id)
        .bind(fiscal_year)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE load_runs
            SET finished_at = now(), status = $2, error = $3, detail = detail || $4
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(error)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
