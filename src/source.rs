use crate::config::FetchSettings;
use crate::error::Result;
use crate::reshape::{AMOUNT_CRORE_COLUMN, CATEGORY_COLUMN, MONTH_COLUMN};
use crate::schema::{Cell, MfsCategory, RawTable, SourceTag};
use crate::utils::months_in_range;
use chrono::NaiveDate;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const SAMPLE_SEED: u64 = 42;
const SAMPLE_NOISE: f64 = 0.08;
const SAMPLE_FLOOR: f64 = 0.1;

/// Anything able to hand the pipeline a raw table: an HTML scraper, a PDF
/// table extractor, a fixture.
pub trait RawTableSource {
    fn fetch_raw(&self) -> Result<RawTable>;
}

impl<F> RawTableSource for F
where
    F: Fn() -> Result<RawTable>,
{
    fn fetch_raw(&self) -> Result<RawTable> {
        self()
    }
}

fn sample_base_crore(category: MfsCategory) -> f64 {
    match category {
        MfsCategory::P2P => 8.0,
        MfsCategory::MerchantPayment => 4.0,
        MfsCategory::CashIn => 20.0,
        MfsCategory::CashOut => 19.0,
        MfsCategory::UtilityBillPayment => 2.0,
        MfsCategory::GovernmentPayment => 1.0,
        MfsCategory::SalaryDisbursement => 1.5,
        MfsCategory::Others => 0.5,
    }
}

const SAMPLE_ORDER: [MfsCategory; 8] = [
    MfsCategory::P2P,
    MfsCategory::MerchantPayment,
    MfsCategory::CashIn,
    MfsCategory::CashOut,
    MfsCategory::UtilityBillPayment,
    MfsCategory::GovernmentPayment,
    MfsCategory::SalaryDisbursement,
    MfsCategory::Others,
];

/// A deterministic long-form table covering 2024 for every category, amounts in
/// crore BDT, used when the live source cannot be reached.
pub fn sample_raw() -> RawTable {
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let (Some(start), Some(end)) = (
        NaiveDate::from_ymd_opt(2024, 1, 1),
        NaiveDate::from_ymd_opt(2024, 12, 1),
    ) else {
        return RawTable::default();
    };

    let mut rows = Vec::new();
    for month in months_in_range(start, end) {
        for category in SAMPLE_ORDER {
            let base = sample_base_crore(category);
            let noise = Normal::new(0.0, base * SAMPLE_NOISE)
                .map(|normal| normal.sample(&mut rng))
                .unwrap_or(0.0);
            rows.push(vec![
                Cell::Text(month.format("%Y-%m-01").to_string()),
                Cell::Text(category.label().to_string()),
                Cell::Number((base + noise).max(SAMPLE_FLOOR)),
            ]);
        }
    }

    RawTable::new([MONTH_COLUMN, CATEGORY_COLUMN, AMOUNT_CRORE_COLUMN], rows)
        .with_source(SourceTag::Sample)
}

/// Fetches from `source`, substituting the sample table on failure when the
/// settings allow it.
pub fn resolve_raw_table(source: &dyn RawTableSource, settings: FetchSettings) -> Result<RawTable> {
    match source.fetch_raw() {
        Ok(table) => {
            info!(
                "Fetched raw table with {} columns and {} rows from {:?}",
                table.width(),
                table.rows.len(),
                table.source
            );
            Ok(table)
        }
        Err(e) if settings.allow_sample => {
            warn!("Fetch failed, using sample data: {}", e);
            Ok(sample_raw())
        }
        Err(e) => Err(e),
    }
}
