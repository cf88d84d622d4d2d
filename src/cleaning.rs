use crate::reshape::{AMOUNT_CRORE_COLUMN, CATEGORY_COLUMN, MONTH_COLUMN};
use crate::schema::RawTable;
use crate::utils::first_of_month;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::debug;

pub const YEAR_COLUMN: &str = "year";

// Year-first and day-first formats come before month-first ones so that
// "01/02/2024" reads as 1 February.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%y",
    "%d %B %Y",
    "%d-%B-%Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

// Tried against the label with a "01 " day prefix.
const MONTH_FORMATS: &[&str] = &[
    "%B-%Y", "%B %Y", "%B, %Y", "%B'%Y", "%Y-%B", "%Y %B", "%B-%y", "%B %y", "%B'%y", "%Y-%m",
    "%Y/%m", "%m/%Y", "%m-%Y",
];

/// A long-form row after value cleaning. Missing values stay `None` here and
/// are turned into skip reasons by the row filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRow {
    pub date: Option<NaiveDate>,
    pub category: String,
    pub amount_base_currency: Option<f64>,
}

/// Parses a reported number, ignoring thousands separators and stray symbols.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let kept: String = raw
        .replace(',', "")
        .replace('\u{a0}', " ")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let kept = kept.trim();
    if kept.is_empty() {
        return None;
    }
    kept.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (1900..=2100).contains(&date.year()).then_some(date)
}

/// Parses a month label such as "Jan-2024", "15/01/2024" or "2024-01",
/// reading ambiguous numeric dates day first.
pub fn parse_month_label(raw: &str) -> Option<NaiveDate> {
    let text = raw.replace('\u{a0}', " ");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .and_then(plausible);
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok().and_then(plausible))
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(text, fmt)
                    .ok()
                    .map(|dt| dt.date())
                    .and_then(plausible)
            })
        })
        .or_else(|| {
            let padded = format!("01 {text}");
            MONTH_FORMATS.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(&padded, &format!("%d {fmt}"))
                    .ok()
                    .and_then(plausible)
            })
        })
}

fn parse_year(raw: &str) -> Option<NaiveDate> {
    let year = parse_amount(raw)?;
    if year.fract() != 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, 1, 1).and_then(plausible)
}

/// Parses amounts (converted with `multiplier`) and dates for every row of a
/// long-form table. Missing columns yield `None` in every row.
pub fn clean_table(table: &RawTable, multiplier: f64) -> Vec<CleanRow> {
    let amount_col = table.column_index(AMOUNT_CRORE_COLUMN);
    let month_col = table.column_index(MONTH_COLUMN);
    let year_col = table.column_index(YEAR_COLUMN);
    let category_col = table.column_index(CATEGORY_COLUMN);

    if amount_col.is_none() {
        debug!("No {} column; every row will be dropped", AMOUNT_CRORE_COLUMN);
    }
    if month_col.is_none() && year_col.is_none() {
        debug!("No month or year column; every row will be dropped");
    }

    (0..table.rows.len())
        .map(|row| {
            let amount_base_currency = amount_col
                .and_then(|col| parse_amount(&table.cell(row, col).as_text()))
                .map(|crore| crore * multiplier)
                .filter(|v| v.is_finite());

            let date = match (month_col, year_col) {
                (Some(col), _) => parse_month_label(&table.cell(row, col).as_text()),
                (None, Some(col)) => parse_year(&table.cell(row, col).as_text()),
                (None, None) => None,
            }
            .map(first_of_month);

            let category = category_col
                .map(|col| table.cell(row, col).as_text().trim().to_string())
                .unwrap_or_default();

            CleanRow {
                date,
                category,
                amount_base_currency,
            }
        })
        .collect()
}
