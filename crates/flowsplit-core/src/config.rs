//! Model configuration.
//!
//! One immutable [`ModelConfig`] selects a weighting variant before a run.
//! All variants flow through the same weight function; the variant family
//! is purely a matter of which record is passed in.
use serde::{Deserialize, Serialize};

use crate::attributes::SeasonScheme;
use crate::constants::PRECIP_FLOOR;
use crate::error::{DisaggError, Result};
use crate::landcover::LandCoverLevel;
use crate::network::DiffluencePolicy;
use crate::travel_time::LagRounding;

/// Which drainage area enters the area term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaMode {
    Incremental,
    Cumulative,
}

/// How raw weights are normalized inside a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Divide by the cohort maximum; weights in (0, 1].
    Max,
    /// Divide by the cohort sum; weights sum to 1.
    Sum,
}

/// Temporal resolution of the precipitation term.
///
/// Ordered from static to fully time-varying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipResolution {
    /// Precipitation term fixed at 1.0.
    None,
    Annual,
    Seasonal,
    Daily,
}

/// Exponents of the weighting formula `A^α · (1/K)^ω · P^γ · Y^β`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exponents {
    pub alpha: f64,
    pub beta: f64,
    pub omega: f64,
    pub gamma: f64,
}

impl Default for Exponents {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            omega: 1.0,
            gamma: 1.0,
        }
    }
}

/// Complete configuration of one disaggregation variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub area_mode: AreaMode,
    pub normalization: NormalizationMode,
    pub precip_resolution: PrecipResolution,
    pub include_conductivity: bool,
    pub include_travel_time: bool,
    pub exponents: Exponents,
    pub land_cover_level: LandCoverLevel,
    /// Floor substituted for zero precipitation [mm/day].
    pub precip_floor: f64,
    /// Min-max rescale area, conductivity and precipitation to [1, 10]
    /// inside each cohort before scoring.
    pub scale_inputs: bool,
    pub lag_rounding: LagRounding,
    pub diffluence: DiffluencePolicy,
    pub seasons: SeasonScheme,
    /// Process cohorts on the rayon pool.
    pub parallel: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            area_mode: AreaMode::Cumulative,
            normalization: NormalizationMode::Max,
            precip_resolution: PrecipResolution::Annual,
            include_conductivity: true,
            include_travel_time: true,
            exponents: Exponents::default(),
            land_cover_level: LandCoverLevel::Level1,
            precip_floor: PRECIP_FLOOR,
            scale_inputs: false,
            lag_rounding: LagRounding::Nearest,
            diffluence: DiffluencePolicy::Reject,
            seasons: SeasonScheme::Meteorological,
            parallel: true,
        }
    }
}

impl ModelConfig {
    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DisaggError::invalid_config("config", e.to_string()))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let e = &self.exponents;
        for (name, value) in [
            ("alpha", e.alpha),
            ("beta", e.beta),
            ("omega", e.omega),
            ("gamma", e.gamma),
        ] {
            if !value.is_finite() {
                return Err(DisaggError::invalid_config(
                    "exponents",
                    format!("{name} = {value} is not finite"),
                ));
            }
        }
        if !(self.precip_floor.is_finite() && self.precip_floor > 0.0) {
            return Err(DisaggError::invalid_config(
                "precip_floor",
                format!("must be a positive number, got {}", self.precip_floor),
            ));
        }
        Ok(())
    }

    /// Short label describing the active terms, e.g. `A_RC_L1_P_K_TT`.
    ///
    /// Used to name persisted run records. Terms whose exponent is zero are
    /// omitted, as are disabled terms.
    pub fn label(&self) -> String {
        let e = &self.exponents;
        let mut parts: Vec<String> = Vec::new();
        if e.alpha != 0.0 {
            parts.push(match self.area_mode {
                AreaMode::Cumulative => "A".to_string(),
                AreaMode::Incremental => "Ai".to_string(),
            });
        }
        if e.beta != 0.0 {
            parts.push(format!("RC_L{}", self.land_cover_level.number()));
        }
        if e.gamma != 0.0 {
            match self.precip_resolution {
                PrecipResolution::None => {}
                PrecipResolution::Annual => parts.push("P".to_string()),
                PrecipResolution::Seasonal => parts.push("PS".to_string()),
                PrecipResolution::Daily => parts.push("PD".to_string()),
            }
        }
        if e.omega != 0.0 && self.include_conductivity {
            parts.push("K".to_string());
        }
        if self.include_travel_time {
            parts.push("TT".to_string());
        }
        if self.normalization == NormalizationMode::Sum {
            parts.push("SUM".to_string());
        }
        parts.join("_")
    }

    /// Whether the conductivity factor participates in the weight.
    pub fn uses_conductivity(&self) -> bool {
        self.include_conductivity && self.exponents.omega != 0.0
    }
}

/// Presets collapsing the variant family to its five distinct weightings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Drainage area only.
    AreaOnly,
    /// Area and runoff-yield coefficient.
    AreaYield,
    /// Area, yield, conductivity and annual precipitation totals.
    AnnualPrecip,
    /// As `AnnualPrecip` with seasonal totals.
    SeasonalPrecip,
    /// As `AnnualPrecip` with daily precipitation.
    DailyPrecip,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 5] = [
        ModelVariant::AreaOnly,
        ModelVariant::AreaYield,
        ModelVariant::AnnualPrecip,
        ModelVariant::SeasonalPrecip,
        ModelVariant::DailyPrecip,
    ];

    /// Configuration for this preset, starting from `base` so that
    /// area/normalization/travel-time choices are kept.
    pub fn configure(self, base: &ModelConfig) -> ModelConfig {
        let mut cfg = base.clone();
        match self {
            ModelVariant::AreaOnly => {
                cfg.exponents.beta = 0.0;
                cfg.include_conductivity = false;
                cfg.precip_resolution = PrecipResolution::None;
            }
            ModelVariant::AreaYield => {
                cfg.include_conductivity = false;
                cfg.precip_resolution = PrecipResolution::None;
            }
            ModelVariant::AnnualPrecip => {
                cfg.include_conductivity = true;
                cfg.precip_resolution = PrecipResolution::Annual;
            }
            ModelVariant::SeasonalPrecip => {
                cfg.include_conductivity = true;
                cfg.precip_resolution = PrecipResolution::Seasonal;
            }
            ModelVariant::DailyPrecip => {
                cfg.include_conductivity = true;
                cfg.precip_resolution = PrecipResolution::Daily;
            }
        }
        cfg
    }
}
