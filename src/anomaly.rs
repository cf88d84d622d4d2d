use crate::config::AnomalyConfig;
use crate::error::{MfsError, Result};
use crate::metrics::series_by_category;
use crate::schema::{AnomalyFlag, MonthlyMetric};
use crate::seasonality::{stl_decompose, StlParams};
use crate::utils::{from_month_ordinal, month_ordinal, months_between};
use chrono::NaiveDate;
use log::{debug, warn};
use splines::{Interpolation, Key, Spline};
use std::collections::BTreeMap;

/// Puts a category series on a gap-free monthly grid, carrying the last
/// observed value forward over missing months and non-finite values.
fn forward_filled_grid(series: &BTreeMap<NaiveDate, f64>) -> Result<Vec<f64>> {
    let (Some(first), Some(last)) = (series.keys().next(), series.keys().next_back()) else {
        return Ok(Vec::new());
    };

    let keys: Vec<Key<f64, f64>> = series
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(date, v)| Key::new(month_ordinal(*date) as f64, *v, Interpolation::Step(1.0)))
        .collect();
    let first_observed = keys.first().map(|k| k.t).ok_or_else(|| {
        MfsError::Decomposition("series has no finite values".to_string())
    })?;
    let spline = Spline::from_vec(keys);

    (month_ordinal(*first)..=month_ordinal(*last))
        .map(|ordinal| {
            let t = ordinal as f64;
            let observed = from_month_ordinal(ordinal)
                .and_then(|month| series.get(&month))
                .copied()
                .filter(|v| v.is_finite());
            if let Some(value) = observed {
                return Ok(value);
            }
            if t < first_observed {
                return Err(MfsError::Decomposition(
                    "cannot forward-fill a leading missing value".to_string(),
                ));
            }
            spline.clamped_sample(t).ok_or_else(|| {
                MfsError::Decomposition(format!("no value to carry into month {}", ordinal))
            })
        })
        .collect()
}

/// Residuals scaled to zero mean and unit population standard deviation.
/// `None` when the spread is negligible relative to `scale`.
pub fn standardize(residuals: &[f64], scale: f64) -> Option<Vec<f64>> {
    if residuals.is_empty() {
        return None;
    }
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let variance = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let sd = variance.sqrt();

    if !sd.is_finite() || sd <= f64::EPSILON.sqrt() * scale.abs().max(1.0) {
        return None;
    }
    Some(residuals.iter().map(|r| (r - mean) / sd).collect())
}

fn try_flag(
    series: &BTreeMap<NaiveDate, f64>,
    config: &AnomalyConfig,
) -> Result<BTreeMap<NaiveDate, bool>> {
    let values = forward_filled_grid(series)?;
    let params = StlParams::for_period(config.period, config.robust);
    let decomposition = stl_decompose(&values, &params)?;

    let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let Some(z) = standardize(&decomposition.residual, scale) else {
        return Ok(series.keys().map(|d| (*d, false)).collect());
    };

    let Some(start) = series.keys().next().copied() else {
        return Ok(BTreeMap::new());
    };
    Ok(series
        .keys()
        .map(|date| {
            let idx = months_between(start, *date) as usize;
            (*date, z[idx].abs() > config.z_threshold)
        })
        .collect())
}

/// Flags months whose seasonal-decomposition residual is unusually large.
///
/// Series with fewer than `config.min_observations` points, or whose
/// decomposition fails, come back with every flag `false`.
pub fn seasonal_anomaly(
    series: &BTreeMap<NaiveDate, f64>,
    config: &AnomalyConfig,
) -> BTreeMap<NaiveDate, bool> {
    let all_clear = || series.keys().map(|d| (*d, false)).collect();

    if series.len() < config.min_observations {
        return all_clear();
    }

    match try_flag(series, config) {
        Ok(flags) => flags,
        Err(e) => {
            warn!("Anomaly detection skipped for a series: {}", e);
            all_clear()
        }
    }
}

fn flags_for(
    category: &str,
    series: &BTreeMap<NaiveDate, f64>,
    config: &AnomalyConfig,
) -> Vec<AnomalyFlag> {
    let flags = seasonal_anomaly(series, config);
    series
        .iter()
        .map(|(month, amount)| AnomalyFlag {
            month: *month,
            category: category.to_string(),
            amount_base_currency: *amount,
            is_anomalous: flags.get(month).copied().unwrap_or(false),
        })
        .collect()
}

/// Runs detection independently for every category in `metrics`.
pub fn detect_anomalies(
    metrics: &[MonthlyMetric],
    config: &AnomalyConfig,
) -> BTreeMap<String, Vec<AnomalyFlag>> {
    series_by_category(metrics)
        .into_iter()
        .map(|(category, series)| {
            let flags = flags_for(&category, &series, config);
            let flagged = flags.iter().filter(|f| f.is_anomalous).count();
            if flagged > 0 {
                debug!("{}: {} anomalous months", category, flagged);
            }
            (category, flags)
        })
        .collect()
}

/// Flag series for one category; empty when the category is absent.
pub fn anomalies_for_category(
    metrics: &[MonthlyMetric],
    category: &str,
    config: &AnomalyConfig,
) -> Vec<AnomalyFlag> {
    let series: BTreeMap<NaiveDate, f64> = metrics
        .iter()
        .filter(|m| m.category == category)
        .map(|m| (m.month, m.amount_base_currency))
        .collect();
    flags_for(category, &series, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::add_months;
    use std::f64::consts::PI;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    fn seasonal_series(n: i32) -> BTreeMap<NaiveDate, f64> {
        (0..n)
            .map(|i| {
                let value = 1_000.0 + 5.0 * i as f64 + 80.0 * (2.0 * PI * i as f64 / 12.0).sin();
                (add_months(start(), i).unwrap(), value)
            })
            .collect()
    }

    #[test]
    fn test_short_history_never_flags() {
        let mut series = seasonal_series(23);
        *series.get_mut(&add_months(start(), 10).unwrap()).unwrap() *= 50.0;
        let flags = seasonal_anomaly(&series, &AnomalyConfig::default());
        assert_eq!(flags.len(), 23);
        assert!(flags.values().all(|f| !f));
    }

    #[test]
    fn test_flags_planted_spike() {
        let mut series = seasonal_series(36);
        let spike = add_months(start(), 20).unwrap();
        *series.get_mut(&spike).unwrap() += 900.0;

        let flags = seasonal_anomaly(&series, &AnomalyConfig::default());
        assert_eq!(flags.len(), 36);
        assert!(flags[&spike]);
        assert!(flags.values().filter(|f| **f).count() <= 3);
    }

    #[test]
    fn test_gaps_are_forward_filled() {
        let mut series = seasonal_series(36);
        series.remove(&add_months(start(), 5).unwrap());
        series.remove(&add_months(start(), 17).unwrap());
        // Interior cycle: a spike in the final cycle has no robust neighbours in
        // its cycle-subseries and is kept as seasonal.
        let spike = add_months(start(), 20).unwrap();
        *series.get_mut(&spike).unwrap() += 900.0;

        let flags = seasonal_anomaly(&series, &AnomalyConfig::default());
        assert_eq!(flags.len(), 34);
        assert!(flags[&spike]);
    }

    #[test]
    fn test_forward_fill_carries_previous_value() {
        let mut series = BTreeMap::new();
        series.insert(start(), 1.0);
        series.insert(add_months(start(), 1).unwrap(), f64::NAN);
        series.insert(add_months(start(), 3).unwrap(), 4.0);
        let grid = forward_filled_grid(&series).unwrap();
        assert_eq!(grid, vec![1.0, 1.0, 1.0, 4.0]);
    }

    #[test]
    fn test_leading_missing_value_is_no_anomaly() {
        let mut series = seasonal_series(30);
        *series.get_mut(&start()).unwrap() = f64::NAN;
        let flags = seasonal_anomaly(&series, &AnomalyConfig::default());
        assert!(flags.values().all(|f| !f));
    }

    #[test]
    fn test_flat_series_has_no_anomalies() {
        let series: BTreeMap<NaiveDate, f64> = (0..30)
            .map(|i| (add_months(start(), i).unwrap(), 42.0))
            .collect();
        let flags = seasonal_anomaly(&series, &AnomalyConfig::default());
        assert!(flags.values().all(|f| !f));
    }

    #[test]
    fn test_categories_are_independent() {
        let mut metrics = Vec::new();
        for (month, value) in seasonal_series(30) {
            metrics.push(MonthlyMetric::new(month, "P2P", value));
        }
        for (month, value) in seasonal_series(12) {
            metrics.push(MonthlyMetric::new(month, "Cash In", value * 100.0));
        }

        let result = detect_anomalies(&metrics, &AnomalyConfig::default());
        assert_eq!(result["P2P"].len(), 30);
        assert_eq!(result["Cash In"].len(), 12);
        assert!(result["Cash In"].iter().all(|f| !f.is_anomalous));

        let single = anomalies_for_category(&metrics, "P2P", &AnomalyConfig::default());
        assert_eq!(single, result["P2P"]);
        assert!(anomalies_for_category(&metrics, "Others", &AnomalyConfig::default()).is_empty());
    }
}
