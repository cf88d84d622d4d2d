use crate::cleaning::CleanRow;
use crate::schema::TidyRecord;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a cleaned row did not make it into the tidy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Skip {
    MissingAmount,
    NegativeAmount,
    MissingDate,
    UnrecognizedCategory,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterReport {
    pub records: Vec<TidyRecord>,
    pub skipped: BTreeMap<Skip, usize>,
}

impl FilterReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// True when `category` contains one of `markers`, ignoring case.
pub fn matches_marker(category: &str, markers: &[String]) -> bool {
    let lowered = category.to_lowercase();
    markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .any(|m| !m.is_empty() && lowered.contains(&m))
}

/// Admits a cleaned row as a tidy record or names the reason it is dropped.
pub fn admit_row(row: &CleanRow, markers: &[String]) -> Result<TidyRecord, Skip> {
    let amount = row
        .amount_base_currency
        .filter(|v| v.is_finite())
        .ok_or(Skip::MissingAmount)?;
    if amount < 0.0 {
        return Err(Skip::NegativeAmount);
    }
    let date = row.date.ok_or(Skip::MissingDate)?;

    let category = row.category.trim();
    if !matches_marker(category, markers) {
        return Err(Skip::UnrecognizedCategory);
    }

    Ok(TidyRecord::new(date, category, amount))
}

pub fn filter_rows(rows: &[CleanRow], markers: &[String]) -> FilterReport {
    let mut report = FilterReport::default();

    for row in rows {
        match admit_row(row, markers) {
            Ok(record) => report.records.push(record),
            Err(reason) => *report.skipped.entry(reason).or_default() += 1,
        }
    }

    if !report.skipped.is_empty() {
        debug!(
            "Kept {} rows, skipped {} ({:?})",
            report.records.len(),
            report.skipped_total(),
            report.skipped
        );
    }

    report
}
