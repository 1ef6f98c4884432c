//! Per-catchment attribute resolution.
//!
//! Turns raw catchment inputs into the scalars the weight function reads:
//! runoff yield, conductivity and precipitation aggregates. Everything is
//! computed once per catchment before any weights are evaluated.
use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ModelConfig, PrecipResolution};
use crate::error::{DisaggError, Result};
use crate::landcover::{runoff_yield, validate_fractions, CoefficientTable};
use crate::network::{CatchmentIdx, Network};
use crate::series::DailySeries;
use crate::weights::validate_conductivity;

/// Calendar convention partitioning the year into four seasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonScheme {
    /// DJF / MAM / JJA / SON.
    Meteorological,
    /// Water-year quarters: OND / JFM / AMJ / JAS.
    Hydrological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl SeasonScheme {
    /// Season containing `date`.
    pub fn season_of(self, date: NaiveDate) -> Season {
        let month = date.month();
        match self {
            SeasonScheme::Meteorological => match month {
                12 | 1 | 2 => Season::Winter,
                3..=5 => Season::Spring,
                6..=8 => Season::Summer,
                _ => Season::Autumn,
            },
            SeasonScheme::Hydrological => match month {
                1..=3 => Season::Winter,
                4..=6 => Season::Spring,
                7..=9 => Season::Summer,
                _ => Season::Autumn,
            },
        }
    }
}

/// Precipitation on `date`, with an exact zero replaced by `floor`.
///
/// Fails if the date is not covered or the raw value is negative.
pub fn effective_precipitation(
    catchment: &str,
    series: &DailySeries,
    date: NaiveDate,
    floor: f64,
) -> Result<f64> {
    let raw = series.get(date).ok_or_else(|| {
        DisaggError::invalid_input(catchment, format!("no precipitation on {date}"))
    })?;
    floor_value(catchment, date, raw, floor)
}

#[inline]
fn floor_value(catchment: &str, date: NaiveDate, raw: f64, floor: f64) -> Result<f64> {
    if raw < 0.0 {
        return Err(DisaggError::invalid_input(
            catchment,
            format!("negative precipitation {raw} on {date}"),
        ));
    }
    Ok(if raw > 0.0 { raw } else { floor })
}

/// Sum of effective precipitation over the days of `season`.
///
/// Zero when the series has no day in that season.
pub fn seasonal_precipitation(
    catchment: &str,
    series: &DailySeries,
    season: Season,
    scheme: SeasonScheme,
    floor: f64,
) -> Result<f64> {
    series
        .iter()
        .filter(|(d, _)| scheme.season_of(*d) == season)
        .try_fold(0.0, |acc, (d, v)| Ok(acc + floor_value(catchment, d, v, floor)?))
}

/// Sum of effective precipitation over the whole series.
pub fn annual_precipitation(catchment: &str, series: &DailySeries, floor: f64) -> Result<f64> {
    series
        .iter()
        .try_fold(0.0, |acc, (d, v)| Ok(acc + floor_value(catchment, d, v, floor)?))
}

/// Precipitation aggregates of one catchment.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecipitationTerms {
    pub annual: f64,
    /// Indexed by [`Season::index`].
    pub seasonal: [f64; 4],
    /// Daily values with the floor already applied.
    pub daily: DailySeries,
}

impl PrecipitationTerms {
    pub fn resolve(
        catchment: &str,
        series: &DailySeries,
        scheme: SeasonScheme,
        floor: f64,
    ) -> Result<Self> {
        let mut seasonal = [0.0; 4];
        let mut daily = Vec::with_capacity(series.len());
        for (date, raw) in series.iter() {
            let p = floor_value(catchment, date, raw, floor)?;
            seasonal[scheme.season_of(date).index()] += p;
            daily.push(p);
        }
        // Summed in date order, same as `annual_precipitation`.
        let annual = daily.iter().sum();
        Ok(Self {
            annual,
            seasonal,
            daily: DailySeries::new(catchment, series.start(), daily)?,
        })
    }
}

/// Resolved scalars for one catchment.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchmentAttributes {
    pub runoff_yield: f64,
    pub conductivity: f64,
    /// `None` when the configuration has no precipitation term.
    pub precipitation: Option<PrecipitationTerms>,
}

impl CatchmentAttributes {
    /// Resolve attributes for catchment `idx`.
    ///
    /// A precipitation series is required unless the configured
    /// resolution is `None`.
    pub fn resolve(
        network: &Network,
        idx: CatchmentIdx,
        precipitation: Option<&DailySeries>,
        table: &CoefficientTable,
        config: &ModelConfig,
    ) -> Result<Self> {
        let c = network.catchment(idx);
        validate_fractions(&c.id, &c.land_cover)?;
        let y = runoff_yield(&c.id, &c.land_cover, table)?;
        if config.uses_conductivity() {
            validate_conductivity(&c.id, c.conductivity)?;
        }

        let precipitation = if config.precip_resolution == PrecipResolution::None {
            None
        } else {
            let series = precipitation.ok_or_else(|| {
                DisaggError::invalid_input(&c.id, "no precipitation series supplied")
            })?;
            Some(PrecipitationTerms::resolve(
                &c.id,
                series,
                config.seasons,
                config.precip_floor,
            )?)
        };

        Ok(Self {
            runoff_yield: y,
            conductivity: c.conductivity,
            precipitation,
        })
    }

    /// Precipitation term `P_i(t)` at the configured resolution.
    pub fn precipitation_term(
        &self,
        catchment: &str,
        date: NaiveDate,
        config: &ModelConfig,
    ) -> Result<f64> {
        let terms = match (&self.precipitation, config.precip_resolution) {
            (_, PrecipResolution::None) => return Ok(1.0),
            (Some(terms), _) => terms,
            (None, _) => {
                return Err(DisaggError::invalid_input(
                    catchment,
                    "no precipitation series supplied",
                ))
            }
        };
        match config.precip_resolution {
            PrecipResolution::Annual => Ok(terms.annual),
            PrecipResolution::Seasonal => {
                Ok(terms.seasonal[config.seasons.season_of(date).index()])
            }
            _ => terms.daily.get(date).ok_or_else(|| {
                DisaggError::invalid_input(catchment, format!("no precipitation on {date}"))
            }),
        }
    }
}

/// Resolve every catchment of the network, indexed by [`CatchmentIdx`].
pub fn resolve_all(
    network: &Network,
    precipitation: &HashMap<String, DailySeries>,
    table: &CoefficientTable,
    config: &ModelConfig,
) -> Result<Vec<CatchmentAttributes>> {
    let mut out = Vec::with_capacity(network.len());
    for (i, c) in network.catchments().iter().enumerate() {
        let attrs = CatchmentAttributes::resolve(
            network,
            CatchmentIdx(i),
            precipitation.get(&c.id),
            table,
            config,
        )?;
        debug!(
            catchment = %c.id,
            runoff_yield = attrs.runoff_yield,
            annual_precip = attrs.precipitation.as_ref().map(|p| p.annual),
            "resolved attributes"
        );
        out.push(attrs);
    }
    info!(
        catchments = out.len(),
        level = %table.level(),
        "resolved catchment attributes"
    );
    Ok(out)
}
