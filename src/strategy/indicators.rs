//! Relationship test, price ratio and z-score

use crate::{
    config::RelationshipConfig,
    strategy::pair::Sides,
    connectors::OrderSide,
    PairTradingError, Result,
};
use statrs::function::erf::erfc;

/// Decides whether two price series currently move together
pub trait RelationshipTest: Send + Sync {
    /// Both series are most recent first and cover the same bars
    fn is_cointegrated(&self, series_a: &[f64], series_b: &[f64]) -> bool;
}

/// Augmented Dickey-Fuller test on the price ratio of the two series
#[derive(Debug, Clone)]
pub struct AdfRelationshipTest {
    lags: Vec<usize>,
    max_statistic: f64,
    max_p_value: f64,
}

impl AdfRelationshipTest {
    /// Build from configuration
    pub fn new(config: &RelationshipConfig) -> Self {
        Self {
            lags: config.adf_lags.clone(),
            max_statistic: config.max_statistic,
            max_p_value: config.max_p_value,
        }
    }
}

impl RelationshipTest for AdfRelationshipTest {
    fn is_cointegrated(&self, series_a: &[f64], series_b: &[f64]) -> bool {
        let mut ratio = price_ratio(series_a, series_b);
        if ratio.iter().any(|v| !v.is_finite()) {
            return false;
        }
        ratio.reverse();

        self.lags.iter().all(|&lags| match adf_statistic(&ratio, lags) {
            Some(statistic) => {
                let p_value = mackinnon_p_value(statistic);
                tracing::trace!(lags, statistic, p_value, "ADF result");
                statistic < self.max_statistic && p_value < self.max_p_value
            }
            None => false,
        })
    }
}

/// Element-wise `a / b` over the common length
pub fn price_ratio(series_a: &[f64], series_b: &[f64]) -> Vec<f64> {
    series_a.iter().zip(series_b).map(|(a, b)| a / b).collect()
}

/// Standardized deviation of the latest value from the mean of the latest `window` values
///
/// `series` is most recent first. Uses the population standard deviation; a flat window
/// yields 0.
pub fn zscore(series: &[f64], window: usize) -> Result<f64> {
    if window == 0 || series.len() < window {
        return Err(PairTradingError::EmptyData(format!(
            "Z-score needs {} values, got {}",
            window,
            series.len()
        ))
        .into());
    }

    let recent = &series[..window];
    let mean = recent.iter().sum::<f64>() / window as f64;
    let variance = recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window as f64;
    let std = variance.sqrt();

    if std < 1e-9 {
        return Ok(0.0);
    }
    Ok((series[0] - mean) / std)
}

/// Entry direction for a z-score, strictly beyond `threshold`
pub fn entry_sides(z: f64, threshold: f64) -> Option<Sides> {
    if z < -threshold {
        Some(Sides::long_short())
    } else if z > threshold {
        Some(Sides::short_long())
    } else {
        None
    }
}

/// Whether the ratio has crossed back over its mean for a position entered with `sides`
pub fn reverted(sides: Sides, z: f64) -> bool {
    match sides.a {
        OrderSide::Buy => z >= 0.0,
        OrderSide::Sell => z <= 0.0,
    }
}

/// ADF t-statistic of `series` (chronological) with a constant and `lags` lagged differences
///
/// Returns `None` when there are not more observations than regressors or the regression is
/// degenerate.
pub fn adf_statistic(series: &[f64], lags: usize) -> Option<f64> {
    if series.len() < lags + 2 {
        return None;
    }
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let regressors = lags + 2;

    let rows: Vec<(Vec<f64>, f64)> = (lags..diffs.len())
        .map(|t| {
            let mut x = Vec::with_capacity(regressors);
            x.push(1.0);
            x.push(series[t]);
            x.extend((1..=lags).map(|i| diffs[t - i]));
            (x, diffs[t])
        })
        .collect();

    let observations = rows.len();
    if observations <= regressors {
        return None;
    }

    let mut xtx = vec![vec![0.0; regressors]; regressors];
    let mut xty = vec![0.0; regressors];
    for (x, y) in &rows {
        for i in 0..regressors {
            xty[i] += x[i] * y;
            for j in 0..regressors {
                xtx[i][j] += x[i] * x[j];
            }
        }
    }

    let inverse = invert(xtx)?;
    let beta: Vec<f64> = inverse
        .iter()
        .map(|row| row.iter().zip(&xty).map(|(a, b)| a * b).sum())
        .collect();

    let ssr: f64 = rows
        .iter()
        .map(|(x, y)| {
            let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
            (y - fitted).powi(2)
        })
        .sum();
    let sigma2 = ssr / (observations - regressors) as f64;
    let std_error = (sigma2 * inverse[1][1]).sqrt();

    if !std_error.is_finite() || std_error <= 0.0 {
        return None;
    }
    Some(beta[1] / std_error)
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(mut matrix: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let scale = matrix
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }

    let mut inverse: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        let pivot = matrix[pivot_row][col];
        if pivot.abs() <= f64::EPSILON * scale {
            return None;
        }
        matrix.swap(col, pivot_row);
        inverse.swap(col, pivot_row);

        for j in 0..n {
            matrix[col][j] /= pivot;
            inverse[col][j] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = matrix[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                matrix[row][j] -= factor * matrix[col][j];
                inverse[row][j] -= factor * inverse[col][j];
            }
        }
    }

    Some(inverse)
}

/// MacKinnon (1994) approximate p-value of an ADF statistic, constant and no trend
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    const TAU_MAX: f64 = 2.74;
    const TAU_MIN: f64 = -18.83;
    const TAU_STAR: f64 = -1.61;
    const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
    const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }

    let coefficients: &[f64] = if statistic <= TAU_STAR { &SMALL_P } else { &LARGE_P };
    let value = coefficients.iter().rev().fold(0.0, |acc, c| acc * statistic + c);
    standard_normal_cdf(value)
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}
