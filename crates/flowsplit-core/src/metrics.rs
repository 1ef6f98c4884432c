//! Goodness-of-fit metrics for comparing disaggregated discharge against
//! gauge observations.
//!
//! All metrics take observed and simulated slices of equal length and
//! return a scalar score.
use serde::Serialize;

use crate::error::{DisaggError, Result};

/// Nash-Sutcliffe Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn nse(observed: &[f64], simulated: &[f64]) -> f64 {
    let mean_obs = mean(observed);
    let numerator: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum();
    let denominator: f64 = observed.iter().map(|o| (o - mean_obs).powi(2)).sum();
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - numerator / denominator
}

/// Root Mean Square Error. Range: [0, inf), 0 = perfect.
pub fn rmse(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mse: f64 = observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

/// Mean Absolute Error. Range: [0, inf), 0 = perfect.
pub fn mae(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len() as f64;
    observed
        .iter()
        .zip(simulated)
        .map(|(o, s)| (o - s).abs())
        .sum::<f64>()
        / n
}

/// Squared Pearson correlation. Range: [0, 1]; 0 if either side is constant.
pub fn r_squared(observed: &[f64], simulated: &[f64]) -> f64 {
    let mean_o = mean(observed);
    let mean_s = mean(simulated);
    let mut cov = 0.0;
    let mut var_o = 0.0;
    let mut var_s = 0.0;
    for (o, s) in observed.iter().zip(simulated) {
        cov += (o - mean_o) * (s - mean_s);
        var_o += (o - mean_o).powi(2);
        var_s += (s - mean_s).powi(2);
    }
    if var_o == 0.0 || var_s == 0.0 {
        return 0.0;
    }
    cov * cov / (var_o * var_s)
}

/// Willmott's index of agreement `d`. Range: [0, 1], 1 = perfect.
pub fn index_of_agreement(observed: &[f64], simulated: &[f64]) -> f64 {
    let mean_o = mean(observed);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (o, s) in observed.iter().zip(simulated) {
        numerator += (s - o).powi(2);
        denominator += ((s - mean_o).abs() + (o - mean_o).abs()).powi(2);
    }
    if denominator == 0.0 {
        return if numerator == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - numerator / denominator
}

/// Percent Bias. Optimal = 0. Positive = overestimation.
pub fn pbias(observed: &[f64], simulated: &[f64]) -> f64 {
    let sum_obs: f64 = observed.iter().sum();
    if sum_obs == 0.0 {
        return f64::INFINITY;
    }
    let diff_sum: f64 = simulated.iter().zip(observed).map(|(s, o)| s - o).sum();
    100.0 * diff_sum / sum_obs
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Summary of every metric for one site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoodnessOfFit {
    /// Number of pairs scored.
    pub n: usize,
    pub nse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
    pub index_of_agreement: f64,
    pub pbias: f64,
}

impl GoodnessOfFit {
    /// Score the pairs where both sides are defined.
    ///
    /// Undefined cells (missing observations, out-of-range lags) are
    /// dropped first. Fails on mismatched lengths or when no pair is left.
    pub fn evaluate(observed: &[Option<f64>], simulated: &[Option<f64>]) -> Result<Self> {
        if observed.len() != simulated.len() {
            return Err(DisaggError::invalid_input(
                "goodness of fit",
                format!(
                    "observed has {} values, simulated has {}",
                    observed.len(),
                    simulated.len()
                ),
            ));
        }
        let (obs, sim): (Vec<f64>, Vec<f64>) = observed
            .iter()
            .zip(simulated)
            .filter_map(|(o, s)| Some(((*o)?, (*s)?)))
            .unzip();
        if obs.is_empty() {
            return Err(DisaggError::invalid_input(
                "goodness of fit",
                "no pair with both values defined",
            ));
        }
        Ok(Self {
            n: obs.len(),
            nse: nse(&obs, &sim),
            rmse: rmse(&obs, &sim),
            mae: mae(&obs, &sim),
            r_squared: r_squared(&obs, &sim),
            index_of_agreement: index_of_agreement(&obs, &sim),
            pbias: pbias(&obs, &sim),
        })
    }
}
