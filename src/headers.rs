//! Header canonicalization for scraped tables.
//!
//! PDF extraction in particular produces blank or "Unnamed: N" headers from
//! merged cells, and the same column shows up under several spellings across
//! report editions. Everything here folds those variants onto the vocabulary
//! the rest of the pipeline expects.

use crate::config::HeaderSynonyms;
use crate::schema::{Cell, RawTable};
use log::debug;

const UNNAMED_PREFIX: &str = "unnamed";

fn is_placeholder(header: &str) -> bool {
    header.is_empty() || header.starts_with(UNNAMED_PREFIX)
}

/// Lower-cases, trims and canonicalizes headers, dropping placeholder and
/// all-blank columns. Unknown headers are kept as they are.
pub fn normalize_headers(table: &RawTable, synonyms: &HeaderSynonyms) -> RawTable {
    let lowered: Vec<String> = table
        .headers
        .iter()
        .map(|h| h.as_deref().unwrap_or("").trim().to_lowercase())
        .collect();

    let kept: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(idx, header)| !is_placeholder(header) && !table.column_is_blank(*idx))
        .map(|(idx, _)| idx)
        .collect();

    if kept.len() < lowered.len() {
        debug!(
            "Dropped {} placeholder or empty columns out of {}",
            lowered.len() - kept.len(),
            lowered.len()
        );
    }

    let headers = kept
        .iter()
        .map(|&idx| Some(synonyms.canonical(&lowered[idx]).to_string()))
        .collect();

    let rows = (0..table.rows.len())
        .map(|row| {
            kept.iter()
                .map(|&col| table.cell(row, col).clone())
                .collect::<Vec<Cell>>()
        })
        .collect();

    RawTable {
        headers,
        rows,
        source: table.source,
    }
}
