use crate::utils::first_of_month;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single cell handed over by a fetch collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    /// String rendering used by the cleaning stages. Missing cells render as "".
    pub fn as_text(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Number(n) => n.is_nan(),
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Empty => true,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

/// Where a raw table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    #[schemars(description = "Table scraped from the statistics landing page")]
    Html,
    #[schemars(description = "Table extracted from a published PDF report")]
    Pdf,
    #[schemars(description = "Synthetic sample used when the source is unavailable")]
    Sample,
}

/// Untrusted tabular input. Headers may be missing, blank or duplicated and rows
/// may be ragged; nothing is validated here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<Option<String>>,
    pub rows: Vec<Vec<Cell>>,
    #[serde(default)]
    pub source: Option<SourceTag>,
}

impl RawTable {
    pub fn new<H, S>(headers: H, rows: Vec<Vec<Cell>>) -> Self
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(|h| Some(h.into())).collect(),
            rows,
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceTag) -> Self {
        self.source = Some(source);
        self
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(|h| h.as_deref().unwrap_or(""))
            .collect()
    }

    /// Index of the first column whose header is exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.as_deref() == Some(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at (row, col); short rows read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn column_is_blank(&self, col: usize) -> bool {
        (0..self.rows.len()).all(|row| self.cell(row, col).is_blank())
    }

    /// The candidate with the most columns; the first wins ties.
    pub fn widest(tables: impl IntoIterator<Item = RawTable>) -> Option<RawTable> {
        tables.into_iter().fold(None, |best: Option<RawTable>, table| match best {
            Some(b) if b.width() >= table.width() => Some(b),
            _ => Some(table),
        })
    }
}

/// The eight payment categories the central bank reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum MfsCategory {
    CashIn,
    CashOut,
    P2P,
    UtilityBillPayment,
    MerchantPayment,
    GovernmentPayment,
    SalaryDisbursement,
    Others,
}

impl MfsCategory {
    pub const ALL: [MfsCategory; 8] = [
        MfsCategory::CashIn,
        MfsCategory::CashOut,
        MfsCategory::P2P,
        MfsCategory::UtilityBillPayment,
        MfsCategory::MerchantPayment,
        MfsCategory::GovernmentPayment,
        MfsCategory::SalaryDisbursement,
        MfsCategory::Others,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MfsCategory::CashIn => "Cash In",
            MfsCategory::CashOut => "Cash Out",
            MfsCategory::P2P => "P2P",
            MfsCategory::UtilityBillPayment => "Utility Bill Payment (P2B)",
            MfsCategory::MerchantPayment => "Merchant Payment",
            MfsCategory::GovernmentPayment => "Government Payment",
            MfsCategory::SalaryDisbursement => "Salary Disbursement (B2P)",
            MfsCategory::Others => "Others",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

/// One observation of the canonical long-form table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TidyRecord {
    /// Always the first day of a month.
    pub date: NaiveDate,
    pub category: String,
    pub amount_base_currency: f64,
}

impl TidyRecord {
    pub fn new(date: NaiveDate, category: impl Into<String>, amount_base_currency: f64) -> Self {
        Self {
            date: first_of_month(date),
            category: category.into().trim().to_string(),
            amount_base_currency,
        }
    }
}

/// Hand-maintained corrections share the tidy shape.
pub type ManualOverrideRecord = TidyRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyMetric {
    #[schemars(description = "First day of the reporting month")]
    pub month: NaiveDate,
    pub category: String,
    #[schemars(description = "Total amount for the month in BDT")]
    pub amount_base_currency: f64,
    /// Month-over-month change as a signed fraction. Absent without a previous
    /// month, or when that month's amount is zero.
    pub mom: Option<f64>,
    /// Year-over-year change as a signed fraction. Absent without the same month
    /// a year earlier, or when that amount is zero.
    pub yoy: Option<f64>,
}

impl MonthlyMetric {
    pub fn new(month: NaiveDate, category: impl Into<String>, amount_base_currency: f64) -> Self {
        Self {
            month,
            category: category.into(),
            amount_base_currency,
            mom: None,
            yoy: None,
        }
    }
}

/// Headline figures for the most recent month of a metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LatestSummary {
    pub month: NaiveDate,
    #[schemars(description = "Sum of all category amounts for the month in BDT")]
    pub total_base_currency: f64,
    #[schemars(description = "Mean month-over-month change over categories that have one")]
    pub mean_mom: Option<f64>,
    #[schemars(description = "Mean year-over-year change over categories that have one")]
    pub mean_yoy: Option<f64>,
    pub categories: usize,
}

/// One category's part of a month's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryShare {
    pub month: NaiveDate,
    pub category: String,
    pub amount_base_currency: f64,
    #[schemars(description = "Fraction of the month's total; absent when the total is zero")]
    pub share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyFlag {
    pub month: NaiveDate,
    pub category: String,
    pub amount_base_currency: f64,
    pub is_anomalous: bool,
}
