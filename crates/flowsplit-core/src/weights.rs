//! Weight calculator.
//!
//! One generic weight function, `A^α · (1/K)^ω · P(t)^γ · Y^β`, whose
//! active terms are chosen by [`ModelConfig`], and the per-cohort
//! normalization that turns raw scores into allocation weights.
use chrono::{Duration, NaiveDate};

use crate::attributes::CatchmentAttributes;
use crate::config::{AreaMode, ModelConfig, NormalizationMode, PrecipResolution};
use crate::constants::{SCALE_EPSILON, SCALE_MIN, SCALE_SPAN};
use crate::error::{DisaggError, Result};
use crate::network::{CatchmentIdx, Network, NexusIdx};

/// Inputs of the weight function for one catchment at one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightInputs {
    pub area_km2: f64,
    pub conductivity: f64,
    pub precipitation: f64,
    pub runoff_yield: f64,
}

impl WeightInputs {
    /// Gather the inputs of catchment `idx` on `date`.
    pub fn gather(
        network: &Network,
        idx: CatchmentIdx,
        attrs: &CatchmentAttributes,
        date: NaiveDate,
        config: &ModelConfig,
    ) -> Result<Self> {
        let area_km2 = match config.area_mode {
            AreaMode::Incremental => network.catchment(idx).area_km2,
            AreaMode::Cumulative => network.cumulative_area(idx),
        };
        Ok(Self {
            area_km2,
            conductivity: attrs.conductivity,
            precipitation: attrs.precipitation_term(&network.catchment(idx).id, date, config)?,
            runoff_yield: attrs.runoff_yield,
        })
    }
}

/// Unnormalized weight. Disabled terms contribute a factor of exactly 1.
pub fn raw_weight(inputs: &WeightInputs, config: &ModelConfig) -> f64 {
    let e = &config.exponents;
    let mut w = inputs.area_km2.powf(e.alpha) * inputs.runoff_yield.powf(e.beta);
    if config.uses_conductivity() {
        w *= (1.0 / inputs.conductivity).powf(e.omega);
    }
    if config.precip_resolution != PrecipResolution::None {
        w *= inputs.precipitation.powf(e.gamma);
    }
    w
}

/// Conductivity must be strictly positive for `(1/K)^ω` to be defined.
pub fn validate_conductivity(catchment: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DisaggError::InvalidConductivity {
            catchment: catchment.to_string(),
            value,
        })
    }
}

/// Divide `raw` by its maximum or its sum.
///
/// `nexus` and `date` only label the error when the denominator is zero or
/// not finite.
pub fn normalize(
    raw: &[f64],
    mode: NormalizationMode,
    nexus: &str,
    date: NaiveDate,
) -> Result<Vec<f64>> {
    let denominator = match mode {
        NormalizationMode::Max => raw.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        NormalizationMode::Sum => raw.iter().sum(),
    };
    if !(denominator.is_finite() && denominator > 0.0) {
        return Err(DisaggError::DegenerateCohort {
            nexus: nexus.to_string(),
            date,
        });
    }
    Ok(raw.iter().map(|w| w / denominator).collect())
}

/// Min-max rescale into `[1, 10]` in place.
///
/// A constant slice maps to 1.0 everywhere.
pub fn scale_to_range(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min + SCALE_EPSILON;
    for v in values.iter_mut() {
        *v = SCALE_MIN + (*v - min) * SCALE_SPAN / span;
    }
}

/// Normalized weights of one cohort, one row per date.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    pub nexus: NexusIdx,
    pub members: Vec<CatchmentIdx>,
    pub start: NaiveDate,
    /// `rows[t][k]` is the weight of `members[k]` on `start + t`.
    pub rows: Vec<Vec<f64>>,
}

impl WeightTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn date(&self, t: usize) -> NaiveDate {
        self.start + Duration::days(t as i64)
    }

    pub fn row(&self, t: usize) -> &[f64] {
        &self.rows[t]
    }

    /// Weight of the `k`-th member on step `t`.
    pub fn weight(&self, k: usize, t: usize) -> f64 {
        self.rows[t][k]
    }

    /// Mean weight of the `k`-th member over all dates.
    pub fn mean_weight(&self, k: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r[k]).sum::<f64>() / self.rows.len() as f64
    }
}

/// Normalized weights for every member of the cohort under `nexus`, on
/// each of the `len` days starting at `start`.
///
/// Rows are recomputed per date only when the precipitation term varies
/// with time.
pub fn cohort_weights(
    network: &Network,
    nexus: NexusIdx,
    attributes: &[CatchmentAttributes],
    start: NaiveDate,
    len: usize,
    config: &ModelConfig,
) -> Result<WeightTable> {
    let members = network.cohort(nexus).to_vec();
    let nexus_id = &network.nexus(nexus).id;
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(len);

    for t in 0..len {
        let date = start + Duration::days(t as i64);
        let reuse = t > 0 && !varies_on(config, rows.len(), date, start);
        if reuse {
            let previous = rows[t - 1].clone();
            rows.push(previous);
            continue;
        }

        let mut inputs = members
            .iter()
            .map(|&c| WeightInputs::gather(network, c, &attributes[c.0], date, config))
            .collect::<Result<Vec<_>>>()?;
        if config.scale_inputs {
            scale_inputs(&mut inputs);
        }

        let mut raw = Vec::with_capacity(inputs.len());
        for (input, &c) in inputs.iter().zip(&members) {
            let w = raw_weight(input, config);
            // Max-mode weights must stay in (0, 1].
            if !(w.is_finite() && w > 0.0) {
                return Err(DisaggError::invalid_input(
                    &network.catchment(c).id,
                    format!("raw weight must be positive, got {w} on {date}"),
                ));
            }
            raw.push(w);
        }
        rows.push(normalize(&raw, config.normalization, nexus_id, date)?);
    }

    Ok(WeightTable {
        nexus,
        members,
        start,
        rows,
    })
}

/// Whether the weights on `date` can differ from the previous day's.
fn varies_on(config: &ModelConfig, t: usize, date: NaiveDate, start: NaiveDate) -> bool {
    match config.precip_resolution {
        PrecipResolution::None | PrecipResolution::Annual => false,
        PrecipResolution::Seasonal => {
            let previous = start + Duration::days(t as i64 - 1);
            config.seasons.season_of(previous) != config.seasons.season_of(date)
        }
        PrecipResolution::Daily => true,
    }
}

fn scale_inputs(inputs: &mut [WeightInputs]) {
    let mut area: Vec<f64> = inputs.iter().map(|i| i.area_km2).collect();
    let mut conductivity: Vec<f64> = inputs.iter().map(|i| i.conductivity).collect();
    let mut precipitation: Vec<f64> = inputs.iter().map(|i| i.precipitation).collect();
    scale_to_range(&mut area);
    scale_to_range(&mut conductivity);
    scale_to_range(&mut precipitation);
    for (k, input) in inputs.iter_mut().enumerate() {
        input.area_km2 = area[k];
        input.conductivity = conductivity[k];
        input.precipitation = precipitation[k];
    }
}
