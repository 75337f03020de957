//! Row admission by visa category and case status.

use tracing::{info, warn};

use crate::columns::{CanonicalField, ColumnResolution};
use crate::record::LcaRecord;

const VISA_MARKERS: &[&str] = &["H-1B", "H1B"];
const CERTIFIED_STATUS: &str = "CERTIFIED";

/// Row counts around each stage. A stage whose column is missing leaves
/// its count unchanged and is flagged as skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub before: usize,
    pub after_visa: usize,
    pub after_status: usize,
    pub visa_stage_skipped: bool,
    pub status_stage_skipped: bool,
}

impl FilterReport {
    pub fn retained(&self) -> usize {
        self.after_status
    }

    pub fn dropped(&self) -> usize {
        self.before - self.after_status
    }
}

pub fn is_h1b(visa_class: &str) -> bool {
    let upper = visa_class.to_uppercase();
    VISA_MARKERS.iter().any(|marker| upper.contains(marker))
}

pub fn is_certified(case_status: &str) -> bool {
    case_status.trim().eq_ignore_ascii_case(CERTIFIED_STATUS)
}

#[derive(Debug, Clone, Copy)]
pub struct RecordFilter {
    check_visa: bool,
    check_status: bool,
}

impl RecordFilter {
    pub fn new(resolution: &ColumnResolution) -> Self {
        Self {
            check_visa: resolution.contains(CanonicalField::VisaClass),
            check_status: resolution.contains(CanonicalField::CaseStatus),
        }
    }

    pub fn apply(&self, records: Vec<LcaRecord>) -> (Vec<LcaRecord>, FilterReport) {
        let mut report = FilterReport {
            before: records.len(),
            visa_stage_skipped: !self.check_visa,
            status_stage_skipped: !self.check_status,
            ..Default::default()
        };

        let records: Vec<LcaRecord> = if self.check_visa {
            records
                .into_iter()
                .filter(|r| r.visa_class.as_deref().is_some_and(is_h1b))
                .collect()
        } else {
            warn!("visa class column not found; visa filter skipped");
            records
        };
        report.after_visa = records.len();

        let records: Vec<LcaRecord> = if self.check_status {
            records
                .into_iter()
                .filter(|r| r.case_status.as_deref().is_some_and(is_certified))
                .collect()
        } else {
            warn!("case status column not found; status filter skipped");
            records
        };
        report.after_status = records.len();

        info!(
            before = report.before,
            after_visa = report.after_visa,
            after_status = report.after_status,
            "filtered records"
        );
        (records, report)
    }
}
