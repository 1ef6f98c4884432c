use flowsplit_macros::Columns;

/// Intermediate quantities of one catchment, reported with every run.
///
/// `annual_precip` is zero when the configuration has no precipitation
/// term; `lag_days` is zero when travel time is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Columns)]
#[columns(table_name = "DiagnosticsTable")]
pub struct CatchmentDiagnostics {
    pub area_km2: f64,
    pub cumulative_area_km2: f64,
    pub runoff_yield: f64,
    pub conductivity: f64,
    pub annual_precip: f64,
    pub travel_time_s: f64,
    pub lag_days: f64,
    pub mean_weight: f64,
}
