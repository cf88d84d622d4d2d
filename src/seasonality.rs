//! Seasonal-trend decomposition by LOESS (STL).
//!
//! A straight implementation of the Cleveland et al. (1990) procedure with
//! degree-1 local fits: an inner loop alternating cycle-subseries smoothing,
//! low-pass filtering and trend smoothing, and an optional outer loop that
//! re-weights observations with bisquare robustness weights so that isolated
//! spikes end up in the residual instead of bending trend and season.

use crate::error::{MfsError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct StlParams {
    pub period: usize,
    /// Span of the cycle-subseries smoother, odd and at least 3.
    pub seasonal: usize,
    pub trend: usize,
    pub low_pass: usize,
    pub degree: usize,
    pub inner_iter: usize,
    pub outer_iter: usize,
}

fn next_odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

impl StlParams {
    /// Conventional defaults: seasonal span 7, trend span from the classic
    /// `1.5 * period / (1 - 1.5 / seasonal)` rule, low-pass span of the next
    /// odd number above the period.
    pub fn for_period(period: usize, robust: bool) -> Self {
        let seasonal = 7;
        let trend = (1.5 * period as f64 / (1.0 - 1.5 / seasonal as f64)).ceil() as usize;
        let (inner_iter, outer_iter) = if robust { (2, 15) } else { (5, 0) };

        Self {
            period,
            seasonal,
            trend: next_odd(trend.max(3)),
            low_pass: next_odd(period + 1),
            degree: 1,
            inner_iter,
            outer_iter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// Final robustness weights (all 1.0 when no outer iterations ran).
    pub weights: Vec<f64>,
}

/// Local linear (or constant) fit at position `xs` using points `nleft..=nright`.
fn loess_estimate(
    y: &[f64],
    span: usize,
    degree: usize,
    xs: f64,
    nleft: usize,
    nright: usize,
    robustness: Option<&[f64]>,
) -> Option<f64> {
    let n = y.len();
    let range = n.saturating_sub(1) as f64;
    let mut h = (xs - nleft as f64).max(nright as f64 - xs);
    if span > n {
        h += ((span - n) / 2) as f64;
    }
    let h9 = 0.999 * h;
    let h1 = 0.001 * h;

    let mut weights = vec![0.0; nright - nleft + 1];
    let mut total = 0.0;
    for (w, j) in weights.iter_mut().zip(nleft..=nright) {
        let r = (j as f64 - xs).abs();
        if r <= h9 {
            *w = if r <= h1 {
                1.0
            } else {
                (1.0 - (r / h).powi(3)).powi(3)
            };
            if let Some(rw) = robustness {
                *w *= rw[j];
            }
            total += *w;
        }
    }

    if total <= 0.0 {
        return None;
    }
    weights.iter_mut().for_each(|w| *w /= total);

    if h > 0.0 && degree > 0 {
        let center: f64 = weights
            .iter()
            .zip(nleft..=nright)
            .map(|(w, j)| w * j as f64)
            .sum();
        let spread: f64 = weights
            .iter()
            .zip(nleft..=nright)
            .map(|(w, j)| w * (j as f64 - center).powi(2))
            .sum();
        if spread.sqrt() > 0.001 * range {
            let slope = (xs - center) / spread;
            for (w, j) in weights.iter_mut().zip(nleft..=nright) {
                *w *= slope * (j as f64 - center) + 1.0;
            }
        }
    }

    Some(
        weights
            .iter()
            .zip(&y[nleft..=nright])
            .map(|(w, v)| w * v)
            .sum(),
    )
}

/// LOESS smoothing evaluated at every position of `y`.
fn loess_smooth(y: &[f64], span: usize, degree: usize, robustness: Option<&[f64]>) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return y.to_vec();
    }

    let mut out = Vec::with_capacity(n);
    if span >= n {
        for i in 0..n {
            let fit = loess_estimate(y, span, degree, i as f64, 0, n - 1, robustness);
            out.push(fit.unwrap_or(y[i]));
        }
        return out;
    }

    let half = (span + 1) / 2;
    let (mut nleft, mut nright) = (0, span - 1);
    for i in 0..n {
        if i + 1 > half && nright != n - 1 {
            nleft += 1;
            nright += 1;
        }
        let fit = loess_estimate(y, span, degree, i as f64, nleft, nright, robustness);
        out.push(fit.unwrap_or(y[i]));
    }
    out
}

/// Smooths each cycle-subseries and extends it by one period at both ends.
/// Returns `n + 2 * period` values.
fn cycle_subseries(y: &[f64], params: &StlParams, robustness: Option<&[f64]>) -> Vec<f64> {
    let n = y.len();
    let period = params.period;
    let span = params.seasonal;
    let mut out = vec![0.0; n + 2 * period];

    for j in 0..period {
        let sub: Vec<f64> = (j..n).step_by(period).map(|i| y[i]).collect();
        let k = sub.len();
        if k == 0 {
            continue;
        }
        let sub_rw: Option<Vec<f64>> =
            robustness.map(|rw| (j..n).step_by(period).map(|i| rw[i]).collect());
        let sub_rw = sub_rw.as_deref();

        let smoothed = loess_smooth(&sub, span, params.degree, sub_rw);

        let nright = span.min(k) - 1;
        let left = loess_estimate(&sub, span, params.degree, -1.0, 0, nright, sub_rw)
            .unwrap_or(smoothed[0]);
        let nleft = k.saturating_sub(span);
        let right = loess_estimate(&sub, span, params.degree, k as f64, nleft, k - 1, sub_rw)
            .unwrap_or(smoothed[k - 1]);

        out[j] = left;
        for (m, v) in smoothed.iter().enumerate() {
            out[(m + 1) * period + j] = *v;
        }
        out[(k + 1) * period + j] = right;
    }

    out
}

fn moving_average(x: &[f64], len: usize) -> Vec<f64> {
    x.windows(len)
        .map(|w| w.iter().sum::<f64>() / len as f64)
        .collect()
}

/// Low-pass filter of the extended cycle-subseries: two period-length moving
/// averages, a length-3 moving average, then LOESS. Returns `n` values.
fn low_pass(c: &[f64], params: &StlParams) -> Vec<f64> {
    let first = moving_average(c, params.period);
    let second = moving_average(&first, params.period);
    let third = moving_average(&second, 3);
    loess_smooth(&third, params.low_pass, params.degree, None)
}

fn inner_loop(
    y: &[f64],
    params: &StlParams,
    robustness: Option<&[f64]>,
    trend: &mut [f64],
    seasonal: &mut [f64],
) {
    let n = y.len();
    let period = params.period;

    for _ in 0..params.inner_iter {
        let detrended: Vec<f64> = y.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();
        let cycle = cycle_subseries(&detrended, params, robustness);
        let low = low_pass(&cycle, params);
        for i in 0..n {
            seasonal[i] = cycle[period + i] - low[i];
        }

        let deseasonalized: Vec<f64> =
            y.iter().zip(seasonal.iter()).map(|(v, s)| v - s).collect();
        let smoothed = loess_smooth(&deseasonalized, params.trend, params.degree, robustness);
        trend.copy_from_slice(&smoothed);
    }
}

/// Bisquare weights on residuals scaled by six times their median magnitude.
fn robustness_weights(y: &[f64], fit: &[f64]) -> Vec<f64> {
    let residuals: Vec<f64> = y.iter().zip(fit).map(|(v, f)| (v - f).abs()).collect();
    let mut sorted = residuals.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let lo = n / 2;
    let hi = n - 1 - n / 2;
    let cmad = 3.0 * (sorted[lo] + sorted[hi]);
    let c9 = 0.999 * cmad;
    let c1 = 0.001 * cmad;

    residuals
        .iter()
        .map(|&r| {
            if r <= c1 {
                1.0
            } else if r <= c9 {
                (1.0 - (r / cmad).powi(2)).powi(2)
            } else {
                0.0
            }
        })
        .collect()
}

fn validate(values: &[f64], params: &StlParams) -> Result<()> {
    if params.period < 2 {
        return Err(MfsError::Decomposition(format!(
            "period must be at least 2, got {}",
            params.period
        )));
    }
    if values.len() < 2 * params.period {
        return Err(MfsError::Decomposition(format!(
            "need at least {} observations, got {}",
            2 * params.period,
            values.len()
        )));
    }
    for (name, span) in [
        ("seasonal", params.seasonal),
        ("trend", params.trend),
        ("low_pass", params.low_pass),
    ] {
        if span < 3 || span % 2 == 0 {
            return Err(MfsError::Decomposition(format!(
                "{} span must be odd and at least 3, got {}",
                name, span
            )));
        }
    }
    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(MfsError::Decomposition(format!(
            "non-finite value at position {}",
            idx
        )));
    }
    Ok(())
}

pub fn stl_decompose(values: &[f64], params: &StlParams) -> Result<Decomposition> {
    validate(values, params)?;

    let n = values.len();
    let mut trend = vec![0.0; n];
    let mut seasonal = vec![0.0; n];
    let mut weights: Option<Vec<f64>> = None;

    let mut pass = 0;
    loop {
        inner_loop(values, params, weights.as_deref(), &mut trend, &mut seasonal);
        pass += 1;
        if pass > params.outer_iter {
            break;
        }
        let fit: Vec<f64> = trend.iter().zip(&seasonal).map(|(t, s)| t + s).collect();
        weights = Some(robustness_weights(values, &fit));
    }

    let residual: Vec<f64> = values
        .iter()
        .zip(trend.iter().zip(&seasonal))
        .map(|(v, (t, s))| v - t - s)
        .collect();

    if residual.iter().any(|r| !r.is_finite()) {
        return Err(MfsError::Decomposition(
            "decomposition produced non-finite residuals".to_string(),
        ));
    }

    Ok(Decomposition {
        trend,
        seasonal,
        residual,
        weights: weights.unwrap_or_else(|| vec![1.0; n]),
    })
}
