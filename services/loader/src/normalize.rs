//! Pure value normalizers: wages, fiscal years, dates, flags.
//!
//! None of these fail. Malformed input becomes `None` and the row keeps
//! loading with that attribute NULL.

use chrono::{Datelike, Duration, NaiveDate};

// =============================================================================
// WAGES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WageUnit {
    Hour,
    Week,
    BiWeekly,
    Month,
    Year,
}

impl WageUnit {
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "hour" | "hr" | "hourly" | "per hour" => Some(WageUnit::Hour),
            "week" | "wk" | "weekly" | "per week" => Some(WageUnit::Week),
            "bi-weekly" | "biweekly" | "bi weekly" | "2 weeks" => Some(WageUnit::BiWeekly),
            "month" | "mth" | "monthly" | "per month" => Some(WageUnit::Month),
            "year" | "yr" | "yearly" | "annual" | "per year" => Some(WageUnit::Year),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WageUnit::Hour => "Hour",
            WageUnit::Week => "Week",
            WageUnit::BiWeekly => "Bi-Weekly",
            WageUnit::Month => "Month",
            WageUnit::Year => "Year",
        }
    }

    pub fn annual_multiplier(self) -> f64 {
        match self {
            WageUnit::Hour => 2080.0,
            WageUnit::Week => 52.0,
            WageUnit::BiWeekly => 26.0,
            WageUnit::Month => 12.0,
            WageUnit::Year => 1.0,
        }
    }
}

/// Multiplier for a raw unit label; unknown or missing units count as annual.
pub fn annual_multiplier(unit: Option<&str>) -> f64 {
    unit.and_then(WageUnit::parse)
        .map(WageUnit::annual_multiplier)
        .unwrap_or(1.0)
}

/// Strip currency symbols and thousands separators and parse what remains.
/// Ranges and any other text are not numeric.
pub fn parse_wage(raw: &str) -> Option<f64> {
    let stripped: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let cleaned = stripped.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cleaned offer and its annualized value, both `None` when the amount
/// is not numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedWage {
    pub wage_offer: Option<f64>,
    pub annual_wage: Option<f64>,
}

pub fn normalize_wage(amount: Option<&str>, unit: Option<&str>) -> NormalizedWage {
    let wage_offer = amount.and_then(parse_wage);
    NormalizedWage {
        wage_offer,
        annual_wage: wage_offer.map(|w| w * annual_multiplier(unit)),
    }
}

// =============================================================================
// FISCAL YEAR
// =============================================================================

/// Federal fiscal year: October onwards belongs to the next year.
pub fn fiscal_year(date: NaiveDate) -> i32 {
    if date.month() < 10 {
        date.year()
    } else {
        date.year() + 1
    }
}

/// Received date is preferred; the decision date stands in when absent.
pub fn derive_fiscal_year(received: Option<NaiveDate>, decision: Option<NaiveDate>) -> Option<i32> {
    received.or(decision).map(fiscal_year)
}

// =============================================================================
// DATES
// =============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%d-%b-%y",
];

/// Parse the date part of a cell. Time suffixes are dropped; bare numbers in
/// the plausible range are read as Excel serial dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(' ').next().unwrap_or(raw);
    let date_part = match date_part.find('T') {
        Some(10) => &date_part[..10],
        _ => date_part,
    };
    if date_part.is_empty() {
        return None;
    }

    // Two-digit years would otherwise parse as year 23 under %Y.
    let parsed = DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(date_part, format)
            .ok()
            .filter(|d| d.year() >= 1900)
    });
    if parsed.is_some() {
        return parsed;
    }

    date_part
        .parse::<f64>()
        .ok()
        .filter(|serial| (1.0..100_000.0).contains(serial))
        .and_then(excel_serial_to_date)
}

/// Serials after 1900-02-28 count from 1899-12-30 (Excel keeps a phantom
/// 1900-02-29).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

// =============================================================================
// TEXT
// =============================================================================

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "T" | "1" => Some(true),
        "N" | "NO" | "FALSE" | "F" | "0" => Some(false),
        _ => None,
    }
}

/// Capitalize each alphabetic run: "CERTIFIED-WITHDRAWN" -> "Certified-Withdrawn".
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Major group is the first two digits of the SOC code.
pub fn major_group(soc_code: &str) -> Option<String> {
    let digits: String = soc_code.trim().replace('-', "").chars().take(2).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
