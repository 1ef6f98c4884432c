//! Land-cover runoff-yield coefficients.
//!
//! Coefficients are keyed by NLCD class code. Level 1 groups the detailed
//! classes into Anderson categories that share one coefficient; Level 2
//! assigns one coefficient per detailed class.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::FRACTION_SUM_TOLERANCE;
use crate::error::{DisaggError, Result};

/// Classification level of the coefficient table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandCoverLevel {
    Level1,
    Level2,
}

impl LandCoverLevel {
    pub fn number(self) -> u8 {
        match self {
            LandCoverLevel::Level1 => 1,
            LandCoverLevel::Level2 => 2,
        }
    }
}

impl fmt::Display for LandCoverLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.number())
    }
}

/// Level 1 categories: (name, NLCD codes, yield factor).
const LEVEL1_CATEGORIES: &[(&str, &[u16], f64)] = &[
    ("Urban", &[21, 22, 23, 24], 0.875),
    ("Agriculture", &[71, 81, 82], 0.4),
    ("Forest", &[41, 42, 43], 0.2),
    ("Shrubland", &[52], 0.175),
    ("Barren", &[31], 0.075),
    ("Wetland", &[90, 95], 0.125),
    ("Open Water", &[11], 0.95),
    ("Perennial Ice/Snow", &[12], 0.90),
];

/// Level 2 classes: (NLCD code, yield factor).
const LEVEL2_CLASSES: &[(u16, f64)] = &[
    (11, 0.95), // Open Water
    (12, 0.90), // Perennial Ice/Snow
    (21, 0.20), // Developed, Open Space
    (22, 0.50), // Developed, Low Intensity
    (23, 0.75), // Developed, Medium Intensity
    (24, 0.90), // Developed, High Intensity
    (31, 0.10), // Barren Land
    (41, 0.20), // Deciduous Forest
    (42, 0.25), // Evergreen Forest
    (43, 0.22), // Mixed Forest
    (52, 0.18), // Shrub/Scrub
    (71, 0.35), // Grassland/Herbaceous
    (81, 0.40), // Pasture/Hay
    (82, 0.45), // Cultivated Crops
    (90, 0.15), // Woody Wetlands
    (95, 0.10), // Emergent Herbaceous Wetlands
];

/// Static mapping from land-cover class to runoff-yield factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    level: LandCoverLevel,
    coefficients: BTreeMap<u16, f64>,
}

impl CoefficientTable {
    /// Build a custom table. Factors must be finite and non-negative.
    pub fn new(level: LandCoverLevel, coefficients: BTreeMap<u16, f64>) -> Result<Self> {
        for (&class, &y) in &coefficients {
            if !(y.is_finite() && y >= 0.0) {
                return Err(DisaggError::invalid_input(
                    format!("land-cover class {class}"),
                    format!("runoff coefficient must be finite and >= 0, got {y}"),
                ));
            }
        }
        Ok(Self {
            level,
            coefficients,
        })
    }

    /// Built-in NLCD table for the given level.
    pub fn nlcd(level: LandCoverLevel) -> Self {
        let coefficients = match level {
            LandCoverLevel::Level1 => LEVEL1_CATEGORIES
                .iter()
                .flat_map(|(_, codes, y)| codes.iter().map(move |&c| (c, *y)))
                .collect(),
            LandCoverLevel::Level2 => LEVEL2_CLASSES.iter().copied().collect(),
        };
        Self {
            level,
            coefficients,
        }
    }

    pub fn level(&self) -> LandCoverLevel {
        self.level
    }

    pub fn coefficient(&self, class: u16) -> Option<f64> {
        self.coefficients.get(&class).copied()
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// Check that land-cover fractions lie in [0, 1] and sum to 1 within tolerance.
pub fn validate_fractions(catchment: &str, fractions: &BTreeMap<u16, f64>) -> Result<()> {
    if fractions.is_empty() {
        return Err(DisaggError::invalid_input(
            catchment,
            "no land-cover fractions",
        ));
    }
    for (&class, &f) in fractions {
        if !(0.0..=1.0).contains(&f) {
            return Err(DisaggError::invalid_input(
                catchment,
                format!("land-cover fraction for class {class} is {f}, expected [0, 1]"),
            ));
        }
    }
    let total: f64 = fractions.values().sum();
    if (total - 1.0).abs() > FRACTION_SUM_TOLERANCE {
        return Err(DisaggError::invalid_input(
            catchment,
            format!("land-cover fractions sum to {total}, expected 1"),
        ));
    }
    Ok(())
}

/// Runoff-yield coefficient `Y = Σ_l f_l · y_l`.
///
/// Summed in class order, so the result does not depend on the order the
/// fractions were supplied in.
pub fn runoff_yield(
    catchment: &str,
    fractions: &BTreeMap<u16, f64>,
    table: &CoefficientTable,
) -> Result<f64> {
    fractions.iter().try_fold(0.0, |acc, (&class, &f)| {
        let y = table
            .coefficient(class)
            .ok_or_else(|| DisaggError::MissingCoefficient {
                catchment: catchment.to_string(),
                class,
                level: table.level.to_string(),
            })?;
        Ok(acc + f * y)
    })
}
