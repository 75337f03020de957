//! Fixture files for loader integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use loader::LoaderConfig;

pub const MODERN_HEADER: &str = "CASE_NUMBER,CASE_STATUS,RECEIVED_DATE,DECISION_DATE,VISA_CLASS,\
JOB_TITLE,SOC_CODE,SOC_TITLE,FULL_TIME_POSITION,EMPLOYER_NAME,EMPLOYER_FEIN,EMPLOYER_CITY,\
EMPLOYER_STATE,WORKSITE_CITY,WORKSITE_STATE,WORKSITE_POSTAL_CODE,WAGE_RATE_OF_PAY_FROM,\
WAGE_UNIT_OF_PAY";

/// One disclosure row in the current layout.
#[derive(Debug, Clone)]
pub struct Case {
    pub case_number: String,
    pub status: String,
    pub received: String,
    pub visa: String,
    pub job_title: String,
    pub soc_code: String,
    pub soc_title: String,
    pub employer: String,
    pub fein: String,
    pub worksite_city: String,
    pub worksite_state: String,
    pub worksite_zip: String,
    pub wage: String,
    pub unit: String,
}

impl Case {
    /// A certified H-1B case received in January of `fiscal_year`.
    pub fn new(case_number: &str, fiscal_year: i32) -> Self {
        Self {
            case_number: case_number.to_string(),
            status: "CERTIFIED".to_string(),
            received: format!("{fiscal_year}-01-15"),
            visa: "H-1B".to_string(),
            job_title: "Software Engineer".to_string(),
            soc_code: "15-1252".to_string(),
            soc_title: "Software Developers".to_string(),
            employer: "Acme Corp".to_string(),
            fein: "12-3456789".to_string(),
            worksite_city: "San Francisco".to_string(),
            worksite_state: "CA".to_string(),
            worksite_zip: "94105".to_string(),
            wage: "50".to_string(),
            unit: "Hour".to_string(),
        }
    }

    pub fn line(&self) -> String {
        let cells: [&str; 18] = [
            &self.case_number,
            &self.status,
            &self.received,
            &self.received,
            &self.visa,
            &self.job_title,
            &self.soc_code,
            &self.soc_title,
            "Y",
            &self.employer,
            &self.fein,
            "Austin",
            "TX",
            &self.worksite_city,
            &self.worksite_state,
            &self.worksite_zip,
            &self.wage,
            &self.unit,
        ];
        cells.join(",")
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// `LCA_Disclosure_Data_FY{year}.csv` holding `cases`.
pub fn write_year(dir: &Path, year: i32, cases: &[Case]) -> PathBuf {
    let mut content = String::from(MODERN_HEADER);
    content.push('\n');
    for case in cases {
        content.push_str(&case.line());
        content.push('\n');
    }
    write_file(dir, &format!("LCA_Disclosure_Data_FY{year}.csv"), &content)
}

/// `n` distinct certified cases for `year`.
pub fn cases_for(year: i32, n: usize) -> Vec<Case> {
    (0..n)
        .map(|i| Case::new(&format!("I-200-{year}-{i:06}"), year))
        .collect()
}

/// Small batches so every load spans several of them.
pub fn config(data_dir: &Path) -> LoaderConfig {
    LoaderConfig {
        data_dir: data_dir.to_path_buf(),
        dimension_batch_size: 2,
        fact_batch_size: 3,
        ..LoaderConfig::default()
    }
}
