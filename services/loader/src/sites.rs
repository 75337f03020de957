//! Worksite surrogate-key resolution and fact assembly.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Application, SiteKey};
use crate::record::LcaRecord;
use crate::store::Store;

/// Natural key to `site_id`, loaded once per year after the worksite upsert.
#[derive(Debug, Clone, Default)]
pub struct SiteResolver {
    ids: HashMap<SiteKey, i64>,
}

impl SiteResolver {
    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let resolver = Self::from_rows(store.site_keys().await?);
        info!(sites = resolver.len(), "site mapping built");
        Ok(resolver)
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (SiteKey, i64)>) -> Self {
        Self {
            ids: rows.into_iter().collect(),
        }
    }

    pub fn resolve(&self, key: &SiteKey) -> Option<i64> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet {
    pub applications: Vec<Application>,
    /// Rows missing `app_id`, `emp_id` or `soc_code`.
    pub rejected: usize,
    /// Repeats of an `app_id` already seen in this set.
    pub duplicates: usize,
    /// Admitted rows whose worksite did not resolve.
    pub unresolved_sites: usize,
}

impl FactSet {
    pub fn skipped(&self) -> usize {
        self.rejected + self.duplicates
    }
}

/// Turn records into fact rows. The first occurrence of an `app_id` wins,
/// matching insert-or-ignore in the store.
pub fn build_applications(records: &[LcaRecord], sites: &SiteResolver) -> FactSet {
    let mut facts = FactSet::default();
    let mut seen = HashSet::new();

    for record in records {
        let site_id = sites.resolve(&record.worksite);
        match record.to_application(site_id) {
            Ok(app) => {
                if !seen.insert(app.app_id.clone()) {
                    facts.duplicates += 1;
                    continue;
                }
                if site_id.is_none() {
                    facts.unresolved_sites += 1;
                }
                facts.applications.push(app);
            }
            Err(e) => {
                debug!(error = %e, "row not admitted");
                facts.rejected += 1;
            }
        }
    }
    facts
}
