//! Rows of the dimensional model as they are written to the store.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Employer {
    pub emp_id: String,
    pub emp_name: Option<String>,
    pub industry: Option<String>,
    pub emp_address: Option<String>,
    pub emp_city: Option<String>,
    pub emp_state: Option<String>,
    pub emp_zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occupation {
    pub soc_code: String,
    pub soc_title: Option<String>,
    pub major_group: Option<String>,
}

/// Natural key of a worksite. `None` equals `None`: a missing city with the
/// same state and zip is the same location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl SiteKey {
    pub fn new(city: Option<&str>, state: Option<&str>, zip: Option<&str>) -> Self {
        Self {
            city: city.map(str::to_string),
            state: state.map(str::to_string),
            zip: zip.map(str::to_string),
        }
    }

    /// Worksites without a state are never stored.
    pub fn is_storable(&self) -> bool {
        self.state.is_some()
    }
}

/// Worksite row before the store assigns its `site_id`.
pub type WorksiteLocation = SiteKey;

#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub app_id: String,
    pub emp_id: String,
    pub soc_code: String,
    pub site_id: Option<i64>,
    pub case_status: String,
    pub decision_date: Option<NaiveDate>,
    pub received_date: Option<NaiveDate>,
    pub fiscal_year: Option<i32>,
    pub visa_class: String,
    pub job_title: Option<String>,
    pub full_time: bool,
    pub begin_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub wage_offer: Option<f64>,
    pub wage_unit: Option<String>,
    pub annual_wage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NaicsEntry {
    pub naics_code: String,
    pub industry_name: Option<String>,
    pub sector: Option<String>,
    pub industry_category: Option<String>,
}
