/// Numerical constants and fallback values.
///
/// Centralises the fixed values used across the weighting, travel-time and
/// attribute code.

// -- Precipitation --

/// Default effective-precipitation floor [mm/day], substituted for exact zeros.
pub const PRECIP_FLOOR: f64 = 1e-3;

// -- Time --

/// Length of one reference-series step [s].
pub const SECONDS_PER_DAY: f64 = 86_400.0;

// -- Tolerances --

/// Allowed deviation of a catchment's land-cover fractions from 1.0.
pub const FRACTION_SUM_TOLERANCE: f64 = 1e-3;

/// Allowed deviation of a nexus' branch fractions from 1.0.
pub const BRANCH_SUM_TOLERANCE: f64 = 1e-6;

/// Guard added to the min-max range when rescaling inputs.
pub const SCALE_EPSILON: f64 = 1e-9;

// -- Input rescaling --

/// Lower bound of the rescaled input range.
pub const SCALE_MIN: f64 = 1.0;

/// Width of the rescaled input range (`[1, 10]`).
pub const SCALE_SPAN: f64 = 9.0;

// -- Placeholder channel geometry --
//
// Used when no Manning table is supplied for a reach. A 5 m x 2 m rectangle
// has a flow area of 10 m^2 and a wetted perimeter of 9 m.

/// Placeholder top width [m].
pub const PLACEHOLDER_TOP_WIDTH: f64 = 5.0;

/// Placeholder flow depth [m].
pub const PLACEHOLDER_DEPTH: f64 = 2.0;

/// Placeholder Manning roughness [s m^-1/3].
pub const PLACEHOLDER_MANNING_N: f64 = 0.02;

/// Placeholder bed slope [m/m].
pub const PLACEHOLDER_SLOPE: f64 = 0.01;
