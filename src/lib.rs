//! # MFS Trends
//!
//! Turns the mobile financial services (MFS) statistics published by the
//! Bangladesh central bank into a clean monthly series per payment category,
//! with growth and anomaly metrics on top.
//!
//! ## Pipeline
//!
//! 1. **Headers**: lower-case, drop placeholder/empty columns, map synonyms
//!    ([`headers`]).
//! 2. **Reshape**: unpivot one-column-per-month tables into long form
//!    ([`reshape`]).
//! 3. **Clean**: parse noisy numbers and day-first dates, crore to BDT
//!    ([`cleaning`]).
//! 4. **Filter**: keep MFS categories, record why anything else was dropped
//!    ([`filter`]).
//! 5. **Manual overrides**: hand-maintained corrections win per
//!    (month, category) ([`overrides`]).
//! 6. **Metrics**: monthly totals with month-over-month and year-over-year
//!    change ([`metrics`]).
//! 7. **Anomalies**: STL residual z-scores per category ([`anomaly`]).
//!
//! Fetching, caching and rendering are left to the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mfs_trends::*;
//!
//! let raw = RawTable::new(
//!     ["Particulars", "Jan-2024", "Feb-2024"],
//!     vec![vec!["Cash In".into(), "12,345.6".into(), "13,001.2".into()]],
//! )
//! .with_source(SourceTag::Html);
//!
//! let pipeline = MfsPipeline::default();
//! let output = pipeline.run(&raw, &ManualOverrideSource::None);
//! let flags = pipeline.anomalies_for(&output.metrics, "Cash In");
//! ```

pub mod anomaly;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod headers;
pub mod metrics;
pub mod overrides;
pub mod reshape;
pub mod schema;
pub mod seasonality;
pub mod source;
pub mod utils;

pub use anomaly::{anomalies_for_category, detect_anomalies, seasonal_anomaly};
pub use cleaning::{clean_table, parse_amount, parse_month_label, CleanRow};
pub use config::{AnomalyConfig, FetchSettings, HeaderSynonyms, PipelineConfig, CRORE};
pub use error::{MfsError, Result};
pub use export::{metrics_json_schema, write_metrics_csv};
pub use filter::{admit_row, filter_rows, FilterReport, Skip};
pub use headers::normalize_headers;
pub use metrics::{add_growth, aggregate_monthly, category_mix, latest_summary};
pub use overrides::{
    apply_manual_overrides, load_manual_overrides, merge_overrides, ManualOverrideSource,
};
pub use reshape::{reshape, TableShape};
pub use schema::*;
pub use seasonality::{stl_decompose, Decomposition, StlParams};
pub use source::{resolve_raw_table, sample_raw, RawTableSource};

use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Non-fatal conditions the caller may want to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineWarning {
    ManualOverrideSkipped { path: PathBuf, reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::ManualOverrideSkipped { path, reason } => write!(
                f,
                "Manual override file {} found but could not be merged: {}",
                path.display(),
                reason
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Tidy records after the manual merge, sorted by (month, category).
    pub tidy: Vec<TidyRecord>,
    pub skipped: BTreeMap<Skip, usize>,
    /// Sorted by (category, month).
    pub metrics: Vec<MonthlyMetric>,
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineOutput {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MfsPipeline {
    config: PipelineConfig,
}

impl MfsPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Raw table to tidy records: headers, reshape, cleaning and row filter.
    pub fn tidy(&self, raw: &RawTable) -> FilterReport {
        debug!(
            "Tidying {:?} table with {} columns and {} rows",
            raw.source,
            raw.width(),
            raw.rows.len()
        );

        let normalized = normalize_headers(raw, &self.config.header_synonyms);
        let long = reshape(&normalized);
        let cleaned = clean_table(&long, self.config.crore_multiplier);
        filter_rows(&cleaned, &self.config.category_markers)
    }

    /// Full run: tidy, merge manual overrides, aggregate and add growth.
    pub fn run(&self, raw: &RawTable, overrides: &ManualOverrideSource) -> PipelineOutput {
        info!("Running MFS pipeline on {:?} data", raw.source);

        let report = self.tidy(raw);
        let multiplier = self.config.crore_multiplier;
        let merged = apply_manual_overrides(report.records, overrides, multiplier);
        let metrics = add_growth(aggregate_monthly(&merged.records));

        info!(
            "Pipeline produced {} tidy records and {} monthly metrics ({} rows skipped)",
            merged.records.len(),
            metrics.len(),
            report.skipped.values().sum::<usize>()
        );

        PipelineOutput {
            tidy: merged.records,
            skipped: report.skipped,
            metrics,
            warnings: merged.warning.into_iter().collect(),
        }
    }

    /// Like [`MfsPipeline::run`], reading overrides from the configured path.
    pub fn run_with_configured_overrides(&self, raw: &RawTable) -> PipelineOutput {
        let source = self
            .config
            .manual_override_path
            .clone()
            .map(ManualOverrideSource::File)
            .unwrap_or_default();
        self.run(raw, &source)
    }

    pub fn anomalies(&self, metrics: &[MonthlyMetric]) -> BTreeMap<String, Vec<AnomalyFlag>> {
        detect_anomalies(metrics, &self.config.anomaly)
    }

    pub fn anomalies_for(&self, metrics: &[MonthlyMetric], category: &str) -> Vec<AnomalyFlag> {
        anomalies_for_category(metrics, category, &self.config.anomaly)
    }
}

pub fn process_raw_table(raw: &RawTable, overrides: &ManualOverrideSource) -> PipelineOutput {
    MfsPipeline::default().run(raw, overrides)
}
