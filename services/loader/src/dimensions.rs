//! Dimension extraction: employers, occupations and worksites, deduplicated
//! by natural key before anything reaches the store.

use std::collections::HashMap;
use std::hash::Hash;

use crate::models::{Employer, Occupation, SiteKey, WorksiteLocation};
use crate::record::LcaRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    pub employers: Vec<Employer>,
    pub occupations: Vec<Occupation>,
    pub worksites: Vec<WorksiteLocation>,
}

/// Keeps rows in first-sighting order and merges later sightings into them.
struct Dedup<K, V> {
    index: HashMap<K, usize>,
    rows: Vec<V>,
}

impl<K: Eq + Hash, V> Dedup<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }

    fn upsert(&mut self, key: K, row: V, merge: impl FnOnce(&mut V, V)) {
        match self.index.get(&key) {
            Some(&i) => merge(&mut self.rows[i], row),
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

fn overlay(target: &mut Option<String>, incoming: Option<String>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

/// Rows with a null key contribute nothing to that dimension. Worksites
/// without a state are dropped. For duplicate keys each attribute takes its
/// last non-null value in input order.
pub fn extract_dimensions(records: &[LcaRecord]) -> Dimensions {
    let mut employers: Dedup<String, Employer> = Dedup::new();
    let mut occupations: Dedup<String, Occupation> = Dedup::new();
    let mut worksites: Dedup<SiteKey, WorksiteLocation> = Dedup::new();

    for record in records {
        if let Some(emp_id) = &record.emp_id {
            let row = Employer {
                emp_id: emp_id.clone(),
                emp_name: record.emp_name.clone(),
                industry: record.industry.clone(),
                emp_address: record.emp_address.clone(),
                emp_city: record.emp_city.clone(),
                emp_state: record.emp_state.clone(),
                emp_zip: record.emp_zip.clone(),
            };
            employers.upsert(emp_id.clone(), row, |seen, new| {
                overlay(&mut seen.emp_name, new.emp_name);
                overlay(&mut seen.industry, new.industry);
                overlay(&mut seen.emp_address, new.emp_address);
                overlay(&mut seen.emp_city, new.emp_city);
                overlay(&mut seen.emp_state, new.emp_state);
                overlay(&mut seen.emp_zip, new.emp_zip);
            });
        }

        if let Some(soc_code) = &record.soc_code {
            let row = Occupation {
                soc_code: soc_code.clone(),
                soc_title: record.soc_title.clone(),
                major_group: record.major_group.clone(),
            };
            occupations.upsert(soc_code.clone(), row, |seen, new| {
                overlay(&mut seen.soc_title, new.soc_title);
                overlay(&mut seen.major_group, new.major_group);
            });
        }

        if record.worksite.is_storable() {
            worksites.upsert(record.worksite.clone(), record.worksite.clone(), |_, _| {});
        }
    }

    Dimensions {
        employers: employers.rows,
        occupations: occupations.rows,
        worksites: worksites.rows,
    }
}
