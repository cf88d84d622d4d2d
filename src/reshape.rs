use crate::schema::{Cell, RawTable};
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

pub const MONTH_COLUMN: &str = "month";
pub const AMOUNT_CRORE_COLUMN: &str = "amount_crore_bdt";
pub const CATEGORY_COLUMN: &str = "category";

static DATE_LIKE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(20\d{2}|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)")
        .expect("valid date-like header regex")
});

/// True when a header looks like a month or year label ("Jan-2024", "2023").
pub fn is_date_like(header: &str) -> bool {
    DATE_LIKE_HEADER.is_match(header)
}

/// Shape of a normalized table, decided from its column signature alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    /// Already one row per observation with an explicit amount column.
    Long,
    /// One column per month; holds the indices of the month columns.
    Wide { month_columns: Vec<usize> },
    /// Neither; left untouched and rejected row by row later.
    Unrecognized,
}

impl TableShape {
    pub fn detect(table: &RawTable) -> Self {
        if table.has_column(AMOUNT_CRORE_COLUMN) {
            return TableShape::Long;
        }

        let month_columns: Vec<usize> = table
            .header_names()
            .iter()
            .enumerate()
            .filter(|(_, header)| is_date_like(header))
            .map(|(idx, _)| idx)
            .collect();

        if month_columns.is_empty() {
            TableShape::Unrecognized
        } else {
            TableShape::Wide { month_columns }
        }
    }
}

/// Unpivots month columns into `month`/`amount_crore_bdt` rows. Rows come out
/// grouped by month column, in column order.
pub fn melt_wide(table: &RawTable, month_columns: &[usize]) -> RawTable {
    let id_columns: Vec<usize> = (0..table.width())
        .filter(|idx| !month_columns.contains(idx))
        .collect();

    let mut headers: Vec<Option<String>> = id_columns
        .iter()
        .map(|&idx| table.headers[idx].clone())
        .collect();
    headers.push(Some(MONTH_COLUMN.to_string()));
    headers.push(Some(AMOUNT_CRORE_COLUMN.to_string()));

    let mut rows = Vec::with_capacity(month_columns.len() * table.rows.len());
    for &month_col in month_columns {
        let label = Cell::Text(table.headers[month_col].clone().unwrap_or_default());
        for row in 0..table.rows.len() {
            let mut cells: Vec<Cell> = id_columns
                .iter()
                .map(|&col| table.cell(row, col).clone())
                .collect();
            cells.push(label.clone());
            cells.push(table.cell(row, month_col).clone());
            rows.push(cells);
        }
    }

    RawTable {
        headers,
        rows,
        source: table.source,
    }
}

/// Copies the first column into a synthesized `category` column when none exists.
pub fn ensure_category_column(mut table: RawTable) -> RawTable {
    if table.has_column(CATEGORY_COLUMN) || table.width() == 0 {
        return table;
    }

    debug!(
        "No category column; using '{}' as category",
        table.header_names()[0]
    );
    table.headers.push(Some(CATEGORY_COLUMN.to_string()));
    let width = table.headers.len();
    for row in &mut table.rows {
        let first = row.first().cloned().unwrap_or_default();
        row.resize(width - 1, Cell::Empty);
        row.push(first);
    }
    table
}

/// Brings a normalized table into long form with a category column.
pub fn reshape(table: &RawTable) -> RawTable {
    let shape = TableShape::detect(table);
    debug!("Detected table shape: {:?}", shape);

    let long = match shape {
        TableShape::Wide { month_columns } => melt_wide(table, &month_columns),
        TableShape::Long | TableShape::Unrecognized => table.clone(),
    };

    ensure_category_column(long)
}
