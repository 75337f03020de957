//! Column mapping across sixteen years of disclosure file layouts.
//!
//! Every canonical field has an ordered list of historical header names.
//! A file's headers are resolved once against this table; rows are then
//! projected through the resolution instead of probing names per row.

use std::collections::BTreeMap;
use std::fmt;

/// Fields of the normalized record, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    AppId,
    CaseStatus,
    DecisionDate,
    ReceivedDate,
    VisaClass,
    SocCode,
    SocTitle,
    JobTitle,
    EmpName,
    EmpId,
    Industry,
    EmpCity,
    EmpState,
    EmpZip,
    EmployerAddress,
    WorksiteCity,
    WorksiteState,
    WorksiteZip,
    WageOffer,
    WageUnit,
    FullTime,
    BeginDate,
    EndDate,
}

pub const FIELD_COUNT: usize = 23;

impl CanonicalField {
    pub const ALL: [CanonicalField; FIELD_COUNT] = [
        CanonicalField::AppId,
        CanonicalField::CaseStatus,
        CanonicalField::DecisionDate,
        CanonicalField::ReceivedDate,
        CanonicalField::VisaClass,
        CanonicalField::SocCode,
        CanonicalField::SocTitle,
        CanonicalField::JobTitle,
        CanonicalField::EmpName,
        CanonicalField::EmpId,
        CanonicalField::Industry,
        CanonicalField::EmpCity,
        CanonicalField::EmpState,
        CanonicalField::EmpZip,
        CanonicalField::EmployerAddress,
        CanonicalField::WorksiteCity,
        CanonicalField::WorksiteState,
        CanonicalField::WorksiteZip,
        CanonicalField::WageOffer,
        CanonicalField::WageUnit,
        CanonicalField::FullTime,
        CanonicalField::BeginDate,
        CanonicalField::EndDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::AppId => "app_id",
            CanonicalField::CaseStatus => "case_status",
            CanonicalField::DecisionDate => "decision_date",
            CanonicalField::ReceivedDate => "received_date",
            CanonicalField::VisaClass => "visa_class",
            CanonicalField::SocCode => "soc_code",
            CanonicalField::SocTitle => "soc_title",
            CanonicalField::JobTitle => "job_title",
            CanonicalField::EmpName => "emp_name",
            CanonicalField::EmpId => "emp_id",
            CanonicalField::Industry => "industry",
            CanonicalField::EmpCity => "emp_city",
            CanonicalField::EmpState => "emp_state",
            CanonicalField::EmpZip => "emp_zip",
            CanonicalField::EmployerAddress => "employer_address",
            CanonicalField::WorksiteCity => "worksite_city",
            CanonicalField::WorksiteState => "worksite_state",
            CanonicalField::WorksiteZip => "worksite_zip",
            CanonicalField::WageOffer => "wage_offer",
            CanonicalField::WageUnit => "wage_unit",
            CanonicalField::FullTime => "full_time",
            CanonicalField::BeginDate => "begin_date",
            CanonicalField::EndDate => "end_date",
        }
    }

    /// Historical header names, highest priority first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalField::AppId => &["CASE_NUMBER", "LCA_CASE_NUMBER", "CASE_NO"],
            CanonicalField::CaseStatus => &["CASE_STATUS", "STATUS", "APPROVAL_STATUS"],
            CanonicalField::DecisionDate => &["DECISION_DATE", "DOL_DECISION_DATE", "Decision_Date"],
            CanonicalField::ReceivedDate => &[
                "RECEIVED_DATE",
                "CASE_SUBMITTED",
                "LCA_CASE_SUBMIT",
                "SUBMITTED_DATE",
            ],
            CanonicalField::VisaClass => &["VISA_CLASS", "PROGRAM"],
            CanonicalField::SocCode => &["SOC_CODE", "LCA_CASE_SOC_CODE", "JOB_CODE"],
            CanonicalField::SocTitle => &[
                "SOC_TITLE",
                "SOC_NAME",
                "LCA_CASE_SOC_NAME",
                "OCCUPATIONAL_TITLE",
            ],
            CanonicalField::JobTitle => &["JOB_TITLE", "LCA_CASE_JOB_TITLE"],
            CanonicalField::EmpName => &["EMPLOYER_NAME", "LCA_CASE_EMPLOYER_NAME", "NAME"],
            CanonicalField::EmpId => &["EMPLOYER_FEIN"],
            CanonicalField::Industry => &["NAICS_CODE", "LCA_CASE_NAICS_CODE"],
            CanonicalField::EmpCity => &["EMPLOYER_CITY", "LCA_CASE_EMPLOYER_CITY", "CITY"],
            CanonicalField::EmpState => &[
                "EMPLOYER_STATE",
                "LCA_CASE_EMPLOYER_STATE",
                "STATE",
            ],
            CanonicalField::EmpZip => &[
                "EMPLOYER_POSTAL_CODE",
                "LCA_CASE_EMPLOYER_POSTAL_CODE",
                "POSTAL_CODE",
                "EMPLOYER_ZIP",
            ],
            CanonicalField::EmployerAddress => &[
                "EMPLOYER_ADDRESS1",
                "EMPLOYER_ADDRESS",
                "LCA_CASE_EMPLOYER_ADDRESS",
                "ADDRESS1",
            ],
            CanonicalField::WorksiteCity => &["WORKSITE_CITY", "LCA_CASE_WORKLOC1_CITY", "CITY_1"],
            CanonicalField::WorksiteState => &["WORKSITE_STATE", "LCA_CASE_WORKLOC1_STATE", "STATE_1"],
            CanonicalField::WorksiteZip => &["WORKSITE_POSTAL_CODE"],
            CanonicalField::WageOffer => &[
                "WAGE_RATE_OF_PAY_FROM",
                "WAGE_RATE_OF_PAY_FROM_1",
                "LCA_CASE_WAGE_RATE_FROM",
                "WAGE_RATE_1",
            ],
            CanonicalField::WageUnit => &[
                "WAGE_UNIT_OF_PAY",
                "WAGE_UNIT_OF_PAY_1",
                "LCA_CASE_WAGE_RATE_UNIT",
                "RATE_PER_1",
            ],
            CanonicalField::FullTime => &["FULL_TIME_POSITION", "FULL_TIME_POS"],
            CanonicalField::BeginDate => &[
                "BEGIN_DATE",
                "EMPLOYMENT_START_DATE",
                "LCA_CASE_EMPLOYMENT_START_DATE",
                "PERIOD_OF_EMPLOYMENT_START_DATE",
            ],
            CanonicalField::EndDate => &[
                "END_DATE",
                "EMPLOYMENT_END_DATE",
                "LCA_CASE_EMPLOYMENT_END_DATE",
                "PERIOD_OF_EMPLOYMENT_END_DATE",
            ],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header casing and padding drift between years; compare on this form.
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .replace(' ', "_")
        .to_ascii_uppercase()
}

/// Walk the fields in order; each takes the first unclaimed header that
/// matches one of its candidates, highest priority first.
fn claim_columns<'a, F, I>(normalized: &[String], candidates: F) -> [Option<usize>; FIELD_COUNT]
where
    F: Fn(CanonicalField) -> I,
    I: IntoIterator<Item = &'a str>,
{
    let mut claimed = vec![false; normalized.len()];
    let mut columns = [None; FIELD_COUNT];

    for field in CanonicalField::ALL {
        for alias in candidates(field) {
            let alias = normalize_header(alias);
            let found = normalized
                .iter()
                .enumerate()
                .find(|(idx, header)| !claimed[*idx] && **header == alias)
                .map(|(idx, _)| idx);

            if let Some(idx) = found {
                claimed[idx] = true;
                columns[field.index()] = Some(idx);
                break;
            }
        }
    }
    columns
}

/// Which source column feeds each canonical field, for one file.
#[derive(Debug, Clone)]
pub struct ColumnResolution {
    headers: Vec<String>,
    columns: [Option<usize>; FIELD_COUNT],
}

impl ColumnResolution {
    /// Resolve a file's header row. For each field the first alias present
    /// wins; a header feeds at most one field. Unmatched fields are omitted.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
        let columns = claim_columns(&normalized, |field| {
            field.aliases().iter().copied().chain(std::iter::once(field.name()))
        });

        Self {
            headers: headers.iter().map(|h| h.as_ref().trim().to_string()).collect(),
            columns,
        }
    }

    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns[field.index()]
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.column(field).is_some()
    }

    /// The source header a field was resolved to.
    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.column(field).map(|idx| self.headers[idx].as_str())
    }

    /// Present header -> canonical field.
    pub fn mapping(&self) -> BTreeMap<String, CanonicalField> {
        CanonicalField::ALL
            .iter()
            .filter_map(|&field| self.header(field).map(|h| (h.to_string(), field)))
            .collect()
    }

    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|&field| !self.contains(field))
            .collect()
    }

    /// Project one source row onto the canonical fields.
    pub fn project(&self, row: &[String], line: usize) -> RawRecord {
        let mut record = RawRecord::new(line);
        for field in CanonicalField::ALL {
            if let Some(value) = self.column(field).and_then(|idx| row.get(idx)) {
                record.set(field, value);
            }
        }
        record
    }
}

/// One source row keyed by canonical field. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub line: usize,
    values: [Option<String>; FIELD_COUNT],
}

impl RawRecord {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            values: Default::default(),
        }
    }

    pub fn set(&mut self, field: CanonicalField, value: &str) {
        let trimmed = value.trim();
        self.values[field.index()] = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    pub fn with(mut self, field: CanonicalField, value: &str) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.values[field.index()].as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // ALIAS RESOLUTION
    // -------------------------------------------------------------------------

    #[test]
    fn every_alias_resolves_to_its_field() {
        for field in CanonicalField::ALL {
            for alias in field.aliases() {
                let resolution = ColumnResolution::resolve(&[*alias]);
                assert_eq!(
                    resolution.column(field),
                    Some(0),
                    "{alias} should resolve to {field}"
                );
            }
        }
    }

    #[test]
    fn case_number_variants_resolve_to_app_id() {
        let modern = ColumnResolution::resolve(&headers(&["CASE_NUMBER"]));
        let legacy = ColumnResolution::resolve(&headers(&["LCA_CASE_NUMBER"]));
        assert_eq!(modern.mapping()["CASE_NUMBER"], CanonicalField::AppId);
        assert_eq!(legacy.mapping()["LCA_CASE_NUMBER"], CanonicalField::AppId);
    }

    #[test]
    fn priority_order_beats_column_order() {
        let resolution =
            ColumnResolution::resolve(&headers(&["LCA_CASE_NUMBER", "CASE_NO", "CASE_NUMBER"]));
        assert_eq!(resolution.header(CanonicalField::AppId), Some("CASE_NUMBER"));

        let shuffled =
            ColumnResolution::resolve(&headers(&["CASE_NUMBER", "CASE_NO", "LCA_CASE_NUMBER"]));
        assert_eq!(shuffled.header(CanonicalField::AppId), Some("CASE_NUMBER"));
    }

    #[test]
    fn header_casing_and_padding_are_ignored() {
        let resolution = ColumnResolution::resolve(&headers(&[" case_status ", "Employer Name"]));
        assert_eq!(resolution.column(CanonicalField::CaseStatus), Some(0));
        assert_eq!(resolution.column(CanonicalField::EmpName), Some(1));
    }

    #[test]
    fn canonical_names_are_accepted() {
        let resolution = ColumnResolution::resolve(&headers(&["app_id", "emp_id", "wage_offer"]));
        assert_eq!(resolution.column(CanonicalField::AppId), Some(0));
        assert_eq!(resolution.column(CanonicalField::EmpId), Some(1));
        assert_eq!(resolution.column(CanonicalField::WageOffer), Some(2));
    }

    #[test]
    fn unmatched_fields_are_omitted() {
        let resolution = ColumnResolution::resolve(&headers(&["CASE_NUMBER", "UNRELATED"]));
        assert_eq!(resolution.mapping().len(), 1);
        assert!(resolution.missing().contains(&CanonicalField::VisaClass));
        assert!(!resolution.mapping().contains_key("UNRELATED"));
    }

    #[test]
    fn a_header_feeds_one_field_only() {
        let shared = |field: CanonicalField| match field {
            CanonicalField::EmpCity | CanonicalField::WorksiteCity => vec!["CITY"],
            _ => Vec::new(),
        };

        let one = claim_columns(&["CITY".to_string()], shared);
        assert_eq!(one[CanonicalField::EmpCity.index()], Some(0));
        assert_eq!(one[CanonicalField::WorksiteCity.index()], None);

        let two = claim_columns(&["CITY".to_string(), "CITY".to_string()], shared);
        assert_eq!(two[CanonicalField::EmpCity.index()], Some(0));
        assert_eq!(two[CanonicalField::WorksiteCity.index()], Some(1));
    }

    #[test]
    fn repeated_header_resolves_to_the_first_copy() {
        let resolution =
            ColumnResolution::resolve(&headers(&["Decision_Date", "DECISION_DATE", "CITY_1"]));
        assert_eq!(resolution.column(CanonicalField::DecisionDate), Some(0));
        assert_eq!(resolution.header(CanonicalField::WorksiteCity), Some("CITY_1"));
        assert_eq!(resolution.mapping().len(), 2);
    }

    #[test]
    fn no_header_name_is_shared_between_fields() {
        let mut owner = std::collections::HashMap::new();
        for field in CanonicalField::ALL {
            let names = field.aliases().iter().copied().chain(std::iter::once(field.name()));
            for name in names {
                let previous = owner.insert(normalize_header(name), field);
                assert!(
                    previous.is_none() || previous == Some(field),
                    "{name} belongs to {field} and {previous:?}"
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // PROJECTION
    // -------------------------------------------------------------------------

    #[test]
    fn project_trims_and_blanks_to_none() {
        let resolution = ColumnResolution::resolve(&headers(&["CASE_NUMBER", "SOC_CODE", "JOB_TITLE"]));
        let row = headers(&["  I-200-1 ", "", "Engineer"]);
        let record = resolution.project(&row, 7);

        assert_eq!(record.line, 7);
        assert_eq!(record.get(CanonicalField::AppId), Some("I-200-1"));
        assert_eq!(record.get(CanonicalField::SocCode), None);
        assert_eq!(record.get(CanonicalField::JobTitle), Some("Engineer"));
        assert_eq!(record.get(CanonicalField::EmpName), None);
    }

    #[test]
    fn project_tolerates_short_rows() {
        let resolution = ColumnResolution::resolve(&headers(&["CASE_NUMBER", "SOC_CODE"]));
        let record = resolution.project(&headers(&["I-1"]), 2);
        assert_eq!(record.get(CanonicalField::AppId), Some("I-1"));
        assert_eq!(record.get(CanonicalField::SocCode), None);
    }
}
