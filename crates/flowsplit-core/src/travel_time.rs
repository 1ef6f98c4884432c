/// Travel-time calculator.
///
/// Uniform-flow (Manning) transit time per reach, accumulated along the
/// flow path from a catchment to its reference nexus, and converted into a
/// whole-day lag on the reference series.
use serde::{Deserialize, Serialize};

use crate::constants::{
    PLACEHOLDER_DEPTH, PLACEHOLDER_MANNING_N, PLACEHOLDER_SLOPE, PLACEHOLDER_TOP_WIDTH,
    SECONDS_PER_DAY,
};
use crate::error::{DisaggError, Result};
use crate::network::{CatchmentIdx, Network};

/// Hydraulic geometry of one reach, assuming a rectangular channel of
/// constant depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReachGeometry {
    /// Reach length [m].
    pub length_m: f64,
    /// Channel top width [m].
    pub top_width_m: f64,
    /// Flow depth [m].
    pub depth_m: f64,
    /// Manning roughness [s m^-1/3].
    pub manning_n: f64,
    /// Bed slope [m/m].
    pub slope: f64,
}

impl ReachGeometry {
    /// Fallback geometry for a reach of known length with no Manning data.
    pub fn placeholder(length_m: f64) -> Self {
        Self {
            length_m,
            top_width_m: PLACEHOLDER_TOP_WIDTH,
            depth_m: PLACEHOLDER_DEPTH,
            manning_n: PLACEHOLDER_MANNING_N,
            slope: PLACEHOLDER_SLOPE,
        }
    }

    /// Reject geometry that would give a zero, negative or infinite velocity.
    pub fn validate(&self, reach: &str) -> Result<()> {
        let fields = [
            ("length", self.length_m, true),
            ("top width", self.top_width_m, false),
            ("depth", self.depth_m, false),
            ("Manning n", self.manning_n, false),
            ("slope", self.slope, false),
        ];
        for (name, value, zero_ok) in fields {
            let ok = value.is_finite() && (value > 0.0 || (zero_ok && value == 0.0));
            if !ok {
                return Err(DisaggError::invalid_input(
                    reach,
                    format!("reach {name} must be positive, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Flow area of the rectangular section [m^2].
    #[inline]
    pub fn flow_area(&self) -> f64 {
        self.top_width_m * self.depth_m
    }

    /// Wetted perimeter of the rectangular section [m].
    #[inline]
    pub fn wetted_perimeter(&self) -> f64 {
        self.top_width_m + 2.0 * self.depth_m
    }

    /// Hydraulic radius R_h = A / P [m].
    #[inline]
    pub fn hydraulic_radius(&self) -> f64 {
        self.flow_area() / self.wetted_perimeter()
    }

    /// Manning velocity v = R_h^(2/3) · S^(1/2) / n [m/s].
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.hydraulic_radius().powf(2.0 / 3.0) * self.slope.sqrt() / self.manning_n
    }
}

/// Transit time through one reach [s].
#[inline]
pub fn travel_time_seconds(reach: &ReachGeometry) -> f64 {
    reach.length_m / reach.velocity()
}

/// Sum of reach travel times from `catchment` to its reference nexus [s].
///
/// The catchment's own reach is included. When the path splits at a
/// diffluence and the network policy keeps both branches, the result is
/// the share-weighted mean over the branch paths.
pub fn cumulative_travel_time(network: &Network, catchment: CatchmentIdx) -> Result<f64> {
    let paths = network.downstream_paths(catchment)?;
    Ok(paths
        .iter()
        .map(|path| {
            let t: f64 = path
                .reaches
                .iter()
                .map(|&idx| travel_time_seconds(&network.catchment(idx).reach))
                .sum();
            path.share * t
        })
        .sum())
}

/// Rule for converting a travel time in seconds into whole reference steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagRounding {
    /// Round half away from zero.
    Nearest,
    Floor,
    Ceil,
}

impl LagRounding {
    /// Whole-day lag for `seconds` of travel time.
    ///
    /// `None` for a non-finite travel time. Lags past the `i64` range
    /// saturate; no reference series reaches that far anyway.
    pub fn to_days(self, seconds: f64) -> Option<i64> {
        if !seconds.is_finite() {
            return None;
        }
        let days = seconds / SECONDS_PER_DAY;
        let rounded = match self {
            LagRounding::Nearest => days.round(),
            LagRounding::Floor => days.floor(),
            LagRounding::Ceil => days.ceil(),
        };
        Some(if rounded >= i64::MAX as f64 {
            i64::MAX
        } else if rounded <= i64::MIN as f64 {
            i64::MIN
        } else {
            rounded as i64
        })
    }
}
