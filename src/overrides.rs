use crate::cleaning::{parse_amount, parse_month_label};
use crate::error::{MfsError, Result};
use crate::schema::{ManualOverrideRecord, TidyRecord};
use crate::PipelineWarning;
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

const AMOUNT_BDT_COLUMN: &str = "amount_bdt";
const AMOUNT_CRORE_COLUMN: &str = "amount_crore_bdt";

/// Where hand-maintained corrections come from for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ManualOverrideSource {
    #[default]
    None,
    /// A CSV file; a missing file is the same as `None`.
    File(PathBuf),
    /// Records already loaded by the caller.
    Records(Vec<ManualOverrideRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub records: Vec<TidyRecord>,
    pub warning: Option<PipelineWarning>,
}

/// Reads override rows shaped `month,category,amount_bdt` or
/// `month,category,amount_crore_bdt` (the latter scaled by `crore_multiplier`).
///
/// Rows with an unreadable or negative amount are dropped; an unreadable month
/// or a missing column rejects the whole input.
pub fn read_manual_overrides<R: Read>(
    reader: R,
    crore_multiplier: f64,
) -> Result<Vec<ManualOverrideRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let find = |name: &str| headers.iter().position(|h| h == name);

    let month_idx = find("month").ok_or_else(|| MfsError::MissingColumn("month".to_string()))?;
    let category_idx =
        find("category").ok_or_else(|| MfsError::MissingColumn("category".to_string()))?;
    let (amount_idx, multiplier) = match (find(AMOUNT_BDT_COLUMN), find(AMOUNT_CRORE_COLUMN)) {
        (Some(idx), _) => (idx, 1.0),
        (None, Some(idx)) => (idx, crore_multiplier),
        (None, None) => {
            return Err(MfsError::MissingColumn(format!(
                "{} or {}",
                AMOUNT_BDT_COLUMN, AMOUNT_CRORE_COLUMN
            )))
        }
    };

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for result in rdr.records() {
        let row = result?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        let month_text = row.get(month_idx).unwrap_or("");
        let month = parse_month_label(month_text).ok_or_else(|| {
            MfsError::MalformedRecord(format!("line {}: unreadable month '{}'", line, month_text))
        })?;

        let category = row.get(category_idx).unwrap_or("").trim();
        let amount = row
            .get(amount_idx)
            .and_then(parse_amount)
            .map(|v| v * multiplier)
            .filter(|v| v.is_finite() && *v >= 0.0);

        match amount {
            Some(amount) if !category.is_empty() => {
                records.push(TidyRecord::new(month, category, amount))
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("Dropped {} manual override rows without a usable amount or category", dropped);
    }

    Ok(records)
}

/// Loads the override file at `path`. A missing file is `Ok(None)`.
pub fn load_manual_overrides(
    path: &Path,
    crore_multiplier: f64,
) -> Result<Option<Vec<ManualOverrideRecord>>> {
    if !path.exists() {
        debug!("No manual override file at {}", path.display());
        return Ok(None);
    }

    let wrap = |e: MfsError| MfsError::ManualOverride {
        path: path.to_path_buf(),
        details: e.to_string(),
    };

    let file = std::fs::File::open(path).map_err(|e| wrap(e.into()))?;
    read_manual_overrides(file, crore_multiplier)
        .map(Some)
        .map_err(wrap)
}

/// Concatenates manual records after scraped ones and keeps the last record per
/// (month, category), so manual values win. Output is sorted by (month, category).
pub fn merge_overrides(
    scraped: Vec<TidyRecord>,
    manual: Vec<ManualOverrideRecord>,
) -> Vec<TidyRecord> {
    let mut latest: BTreeMap<(NaiveDate, String), TidyRecord> = BTreeMap::new();

    for record in scraped.into_iter().chain(manual) {
        latest.insert((record.date, record.category.clone()), record);
    }

    latest.into_values().collect()
}

/// Applies whatever `source` provides. Failures to read the file are reported as
/// a warning and leave the scraped records untouched.
pub fn apply_manual_overrides(
    scraped: Vec<TidyRecord>,
    source: &ManualOverrideSource,
    crore_multiplier: f64,
) -> MergeOutcome {
    let manual = match source {
        ManualOverrideSource::None => None,
        ManualOverrideSource::Records(records) => Some(records.clone()),
        ManualOverrideSource::File(path) => match load_manual_overrides(path, crore_multiplier) {
            Ok(records) => records,
            Err(e) => {
                warn!("Manual override merge skipped: {}", e);
                return MergeOutcome {
                    records: scraped,
                    warning: Some(PipelineWarning::ManualOverrideSkipped {
                        path: path.clone(),
                        reason: e.to_string(),
                    }),
                };
            }
        },
    };

    let Some(manual) = manual else {
        return MergeOutcome {
            records: scraped,
            warning: None,
        };
    };

    let scraped_len = scraped.len();
    let manual_len = manual.len();
    let records = merge_overrides(scraped, manual);
    info!(
        "Merged {} manual override records into {} scraped records ({} after dedup)",
        manual_len,
        scraped_len,
        records.len()
    );

    MergeOutcome {
        records,
        warning: None,
    }
}
