use crate::schema::{CategoryShare, LatestSummary, MonthlyMetric, TidyRecord};
use crate::utils::{first_of_month, month_ordinal};
use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

/// Sums amounts per (month, category). Output is sorted by category, then month,
/// with exactly one row per pair and growth fields unset.
pub fn aggregate_monthly(records: &[TidyRecord]) -> Vec<MonthlyMetric> {
    let mut totals: BTreeMap<(String, NaiveDate), f64> = BTreeMap::new();

    for record in records {
        *totals
            .entry((record.category.clone(), first_of_month(record.date)))
            .or_default() += record.amount_base_currency;
    }

    debug!(
        "Aggregated {} records into {} monthly rows",
        records.len(),
        totals.len()
    );

    totals
        .into_iter()
        .map(|((category, month), amount)| MonthlyMetric::new(month, category, amount))
        .collect()
}

fn ratio_change(current: f64, prior: Option<f64>) -> Option<f64> {
    let prior = prior.filter(|p| p.is_finite() && *p != 0.0)?;
    let change = current / prior - 1.0;
    change.is_finite().then_some(change)
}

/// Fills `mom` and `yoy` by looking up the previous calendar month and the same
/// month one year earlier for the same category. Rows come back sorted by
/// category, then month.
pub fn add_growth(mut rows: Vec<MonthlyMetric>) -> Vec<MonthlyMetric> {
    rows.sort_by(|a, b| (&a.category, a.month).cmp(&(&b.category, b.month)));

    let amounts: BTreeMap<(String, i32), f64> = rows
        .iter()
        .map(|r| ((r.category.clone(), month_ordinal(r.month)), r.amount_base_currency))
        .collect();

    for row in &mut rows {
        let ordinal = month_ordinal(row.month);
        let lookup = |offset: i32| {
            amounts
                .get(&(row.category.clone(), ordinal - offset))
                .copied()
        };
        let previous = lookup(1);
        let year_ago = lookup(12);

        row.mom = ratio_change(row.amount_base_currency, previous);
        row.yoy = ratio_change(row.amount_base_currency, year_ago);
    }

    rows
}

/// Splits metrics into one chronological series per category.
pub fn series_by_category(rows: &[MonthlyMetric]) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for row in rows {
        series
            .entry(row.category.clone())
            .or_default()
            .insert(row.month, row.amount_base_currency);
    }
    series
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Total, mean growth and category count for the latest month in `rows`.
/// Pass only the categories of interest; `None` for an empty table.
pub fn latest_summary(rows: &[MonthlyMetric]) -> Option<LatestSummary> {
    let month = rows.iter().map(|r| r.month).max()?;
    let latest: Vec<&MonthlyMetric> = rows.iter().filter(|r| r.month == month).collect();

    Some(LatestSummary {
        month,
        total_base_currency: latest.iter().map(|r| r.amount_base_currency).sum(),
        mean_mom: mean(latest.iter().filter_map(|r| r.mom)),
        mean_yoy: mean(latest.iter().filter_map(|r| r.yoy)),
        categories: latest.len(),
    })
}

/// Each category's fraction of its month's total, sorted by month then category.
pub fn category_mix(rows: &[MonthlyMetric]) -> Vec<CategoryShare> {
    let mut amounts: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
    for row in rows {
        *amounts
            .entry((row.month, row.category.clone()))
            .or_default() += row.amount_base_currency;
    }

    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for ((month, _), amount) in &amounts {
        *totals.entry(*month).or_default() += amount;
    }

    amounts
        .into_iter()
        .map(|((month, category), amount)| {
            let total = totals.get(&month).copied().unwrap_or_default();
            let share = (total != 0.0).then(|| amount / total).filter(|s| s.is_finite());
            CategoryShare {
                month,
                category,
                amount_base_currency: amount,
                share,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::add_months;
    use std::collections::HashSet;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_aggregation_sums_duplicates() {
        let records = vec![
            TidyRecord::new(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), "P2P", 1.0),
            TidyRecord::new(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(), "P2P", 2.0),
            TidyRecord::new(month(2024, 1), "Cash In", 4.0),
            TidyRecord::new(month(2024, 2), "P2P", 8.0),
        ];
        let monthly = aggregate_monthly(&records);
        assert_eq!(monthly.len(), 3);

        let keys: HashSet<_> = monthly.iter().map(|m| (m.month, m.category.clone())).collect();
        assert_eq!(keys.len(), monthly.len());

        let jan_p2p = monthly
            .iter()
            .find(|m| m.category == "P2P" && m.month == month(2024, 1))
            .unwrap();
        assert_eq!(jan_p2p.amount_base_currency, 3.0);
    }

    #[test]
    fn test_growth_for_consecutive_months() {
        let rows = (1..=3)
            .map(|m| MonthlyMetric::new(month(2023, m), "P2P", m as f64))
            .collect();
        let out = add_growth(rows);

        assert_eq!(out[0].mom, None);
        assert!((out[1].mom.unwrap() - 1.0).abs() < 1e-12);
        assert!((out[2].mom.unwrap() - 0.5).abs() < 1e-12);
        assert!(out.iter().all(|r| r.yoy.is_none()));
    }

    #[test]
    fn test_growth_respects_calendar_gaps() {
        let rows = vec![
            MonthlyMetric::new(month(2023, 1), "P2P", 10.0),
            MonthlyMetric::new(month(2023, 3), "P2P", 20.0),
        ];
        let out = add_growth(rows);
        assert_eq!(out[1].mom, None);
    }

    #[test]
    fn test_year_over_year_needs_twelve_months() {
        let start = month(2022, 1);
        let rows = (0..14)
            .map(|i| {
                MonthlyMetric::new(add_months(start, i).unwrap(), "Cash In", 100.0 + i as f64)
            })
            .collect();
        let out = add_growth(rows);

        assert!(out[..12].iter().all(|r| r.yoy.is_none()));
        let expected = 112.0 / 100.0 - 1.0;
        assert!((out[12].yoy.unwrap() - expected).abs() < 1e-12);
        assert!(out[13].yoy.is_some());
    }

    #[test]
    fn test_categories_do_not_leak_into_each_other() {
        let rows = vec![
            MonthlyMetric::new(month(2024, 1), "Cash In", 10.0),
            MonthlyMetric::new(month(2024, 2), "P2P", 20.0),
        ];
        let out = add_growth(rows);
        assert!(out.iter().all(|r| r.mom.is_none()));
    }

    #[test]
    fn test_zero_prior_yields_no_growth() {
        let rows = vec![
            MonthlyMetric::new(month(2024, 1), "Others", 0.0),
            MonthlyMetric::new(month(2024, 2), "Others", 5.0),
        ];
        let out = add_growth(rows);
        assert_eq!(out[1].mom, None);
    }

    #[test]
    fn test_latest_summary_uses_latest_month_only() {
        let mut rows = vec![
            MonthlyMetric::new(month(2024, 1), "P2P", 10.0),
            MonthlyMetric::new(month(2024, 2), "P2P", 20.0),
            MonthlyMetric::new(month(2024, 2), "Cash In", 30.0),
        ];
        rows[1].mom = Some(1.0);
        rows[2].mom = Some(0.5);

        let summary = latest_summary(&rows).unwrap();
        assert_eq!(summary.month, month(2024, 2));
        assert_eq!(summary.total_base_currency, 50.0);
        assert_eq!(summary.categories, 2);
        assert!((summary.mean_mom.unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(summary.mean_yoy, None);
    }

    #[test]
    fn test_latest_summary_of_empty_table() {
        assert_eq!(latest_summary(&[]), None);
    }

    #[test]
    fn test_category_mix_shares_sum_to_one() {
        let rows = vec![
            MonthlyMetric::new(month(2024, 1), "P2P", 25.0),
            MonthlyMetric::new(month(2024, 1), "Cash In", 75.0),
            MonthlyMetric::new(month(2024, 2), "P2P", 40.0),
        ];
        let mix = category_mix(&rows);
        assert_eq!(mix.len(), 3);
        assert_eq!(mix[0].category, "Cash In");
        assert_eq!(mix[0].share, Some(0.75));
        assert_eq!(mix[1].share, Some(0.25));
        assert_eq!(mix[2].share, Some(1.0));

        let january: f64 = mix
            .iter()
            .filter(|s| s.month == month(2024, 1))
            .filter_map(|s| s.share)
            .sum();
        assert!((january - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_category_mix_with_zero_total() {
        let rows = vec![
            MonthlyMetric::new(month(2024, 3), "Others", 0.0),
            MonthlyMetric::new(month(2024, 3), "P2P", 0.0),
        ];
        assert!(category_mix(&rows).iter().all(|s| s.share.is_none()));
    }
}
