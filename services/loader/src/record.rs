//! Normalized disclosure record.
//!
//! A `RawRecord` carries the text of one source row keyed by canonical
//! field. `Normalizer` turns it into an `LcaRecord` of typed optional
//! fields, applying the file-level defaults for columns a given year's
//! layout lacks.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::columns::{CanonicalField as F, ColumnResolution, RawRecord};
use crate::error::LoadError;
use crate::models::{Application, SiteKey};
use crate::normalize::{
    derive_fiscal_year, major_group, normalize_wage, parse_date, parse_flag, title_case, WageUnit,
};

pub const DEFAULT_CASE_STATUS: &str = "Certified";
pub const DEFAULT_VISA_CLASS: &str = "H-1B";
pub const DEFAULT_WAGE_UNIT: &str = "Year";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LcaRecord {
    pub line: usize,
    pub app_id: Option<String>,
    pub case_status: Option<String>,
    pub visa_class: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub received_date: Option<NaiveDate>,
    pub fiscal_year: Option<i32>,
    pub soc_code: Option<String>,
    pub soc_title: Option<String>,
    pub major_group: Option<String>,
    pub job_title: Option<String>,
    pub emp_id: Option<String>,
    pub emp_name: Option<String>,
    pub industry: Option<String>,
    pub emp_address: Option<String>,
    pub emp_city: Option<String>,
    pub emp_state: Option<String>,
    pub emp_zip: Option<String>,
    pub worksite: SiteKey,
    pub wage_offer: Option<f64>,
    pub wage_unit: Option<String>,
    pub annual_wage: Option<f64>,
    pub full_time: Option<bool>,
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl LcaRecord {
    /// Fact row for this record. Rows without `app_id`, `emp_id` or
    /// `soc_code` are not admitted.
    pub fn to_application(&self, site_id: Option<i64>) -> Result<Application, LoadError> {
        let missing = |what: &str| LoadError::RowParse {
            line: self.line,
            reason: format!("missing {what}"),
        };
        let app_id = self.app_id.clone().ok_or_else(|| missing("app_id"))?;
        let emp_id = self.emp_id.clone().ok_or_else(|| missing("emp_id"))?;
        let soc_code = self.soc_code.clone().ok_or_else(|| missing("soc_code"))?;

        Ok(Application {
            app_id,
            emp_id,
            soc_code,
            site_id,
            case_status: self
                .case_status
                .clone()
                .unwrap_or_else(|| DEFAULT_CASE_STATUS.to_string()),
            decision_date: self.decision_date,
            received_date: self.received_date,
            fiscal_year: self.fiscal_year,
            visa_class: self
                .visa_class
                .clone()
                .unwrap_or_else(|| DEFAULT_VISA_CLASS.to_string()),
            job_title: self.job_title.clone(),
            full_time: self.full_time.unwrap_or(true),
            begin_date: self.begin_date,
            end_date: self.end_date,
            wage_offer: self.wage_offer,
            wage_unit: self.wage_unit.clone(),
            annual_wage: self.annual_wage,
        })
    }
}

/// Stand-in employer key for layouts without a FEIN column. Not
/// collision-free; equal names (after case and spacing cleanup) share a key.
pub fn synthesize_emp_id(emp_name: &str) -> String {
    let canonical = emp_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..15].to_string()
}

/// Per-file normalization. Knows which columns the file lacks so that
/// defaults apply to the whole file, not to blank cells.
#[derive(Debug, Clone)]
pub struct Normalizer {
    has_emp_id: bool,
    has_worksite_city: bool,
    has_worksite_state: bool,
    has_worksite_zip: bool,
    has_wage_unit: bool,
    has_visa_class: bool,
    has_full_time: bool,
}

impl Normalizer {
    pub fn new(resolution: &ColumnResolution) -> Self {
        Self {
            has_emp_id: resolution.contains(F::EmpId),
            has_worksite_city: resolution.contains(F::WorksiteCity),
            has_worksite_state: resolution.contains(F::WorksiteState),
            has_worksite_zip: resolution.contains(F::WorksiteZip),
            has_wage_unit: resolution.contains(F::WageUnit),
            has_visa_class: resolution.contains(F::VisaClass),
            has_full_time: resolution.contains(F::FullTime),
        }
    }

    pub fn normalize(&self, raw: &RawRecord) -> LcaRecord {
        let text = |field: F| raw.get(field).map(str::to_string);
        let date = |field: F| raw.get(field).and_then(parse_date);

        let emp_name = text(F::EmpName);
        let emp_id = if self.has_emp_id {
            text(F::EmpId)
        } else {
            emp_name.as_deref().map(synthesize_emp_id)
        };

        let worksite_or_employer = |present: bool, worksite: F, employer: F| {
            if present {
                raw.get(worksite)
            } else {
                raw.get(employer)
            }
        };
        let worksite = SiteKey::new(
            worksite_or_employer(self.has_worksite_city, F::WorksiteCity, F::EmpCity),
            worksite_or_employer(self.has_worksite_state, F::WorksiteState, F::EmpState),
            worksite_or_employer(self.has_worksite_zip, F::WorksiteZip, F::EmpZip),
        );

        let unit_label = if self.has_wage_unit {
            raw.get(F::WageUnit)
        } else {
            Some(DEFAULT_WAGE_UNIT)
        };
        let wage = normalize_wage(raw.get(F::WageOffer), unit_label);
        let wage_unit = unit_label.map(|label| match WageUnit::parse(label) {
            Some(unit) => unit.label().to_string(),
            None => label.to_string(),
        });

        let visa_class = if self.has_visa_class {
            text(F::VisaClass)
        } else {
            Some(DEFAULT_VISA_CLASS.to_string())
        };
        let full_time = if self.has_full_time {
            raw.get(F::FullTime).and_then(parse_flag)
        } else {
            Some(true)
        };

        let soc_code = text(F::SocCode);
        let received_date = date(F::ReceivedDate);
        let decision_date = date(F::DecisionDate);

        LcaRecord {
            line: raw.line,
            app_id: text(F::AppId),
            case_status: raw.get(F::CaseStatus).map(title_case),
            visa_class,
            decision_date,
            received_date,
            fiscal_year: derive_fiscal_year(received_date, decision_date),
            major_group: soc_code.as_deref().and_then(major_group),
            soc_code,
            soc_title: text(F::SocTitle),
            job_title: text(F::JobTitle),
            emp_id,
            emp_name,
            industry: text(F::Industry),
            emp_address: text(F::EmployerAddress),
            emp_city: text(F::EmpCity),
            emp_state: text(F::EmpState),
            emp_zip: text(F::EmpZip),
            worksite,
            wage_offer: wage.wage_offer,
            wage_unit,
            annual_wage: wage.annual_wage,
            full_time,
            begin_date: date(F::BeginDate),
            end_date: date(F::EndDate),
        }
    }
}
