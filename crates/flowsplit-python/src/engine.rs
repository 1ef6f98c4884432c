use numpy::PyArray1;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::convert::{from_options, to_py_err};

use flowsplit_core::config::ModelConfig;
use flowsplit_core::engine::CellFlag;
use flowsplit_core::record::{RunInputs, RunRecord};

// ---------------------------------------------------------------------------
// Typed pyclass result objects
// ---------------------------------------------------------------------------

define_table_result! {
    /// Per-catchment intermediate quantities with typed numpy array attributes.
    pub struct Diagnostics from flowsplit_core::diagnostics::DiagnosticsTable {
        area_km2, cumulative_area_km2, runoff_yield, conductivity,
        annual_precip, travel_time_s, lag_days, mean_weight,
    }
}

/// Outcome of one disaggregation run.
///
/// `discharge` maps catchment id to a numpy array starting at `start[id]`;
/// undefined cells are NaN and listed in `flags`.
#[pyclass(frozen)]
pub struct RunResult {
    #[pyo3(get)]
    pub label: String,
    /// Catchment ids in diagnostics row order.
    #[pyo3(get)]
    pub catchments: Vec<String>,
    #[pyo3(get)]
    pub discharge: Py<PyDict>,
    #[pyo3(get)]
    pub start: Py<PyDict>,
    /// (catchment, ISO date, lag in days) of each out-of-range cell.
    #[pyo3(get)]
    pub flags: Vec<(String, String, i64)>,
    #[pyo3(get)]
    pub diagnostics: Py<Diagnostics>,
    /// Days on which a downstream catchment carried less than one above it.
    #[pyo3(get)]
    pub accumulation_violations: usize,
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Run a disaggregation described by a JSON document of run inputs.
#[pyfunction]
fn run(py: Python<'_>, inputs_json: &str) -> PyResult<RunResult> {
    let inputs = RunInputs::from_json(inputs_json).map_err(to_py_err)?;
    let (network, result) = py.allow_threads(|| inputs.run()).map_err(to_py_err)?;

    let discharge = PyDict::new(py);
    let start = PyDict::new(py);
    for series in result.table.series() {
        discharge.set_item(
            &series.catchment,
            PyArray1::from_vec(py, from_options(&series.values)),
        )?;
        start.set_item(&series.catchment, series.start.to_string())?;
    }

    let flags = result
        .flags
        .iter()
        .map(|f| match f {
            CellFlag::OutOfRangeLag {
                catchment,
                date,
                lag_days,
            } => (catchment.clone(), date.to_string(), *lag_days),
        })
        .collect();

    let accumulation_violations = result.table.accumulation_violations(&network).len();

    Ok(RunResult {
        label: result.label,
        catchments: result.diagnostic_ids,
        discharge: discharge.unbind(),
        start: start.unbind(),
        flags,
        diagnostics: Py::new(py, Diagnostics::from_table(py, result.diagnostics))?,
        accumulation_violations,
    })
}

/// Run and return the persisted JSON record (label, configuration, output).
#[pyfunction]
fn run_record(py: Python<'_>, inputs_json: &str) -> PyResult<String> {
    let inputs = RunInputs::from_json(inputs_json).map_err(to_py_err)?;
    let (_, result) = py.allow_threads(|| inputs.run()).map_err(to_py_err)?;
    RunRecord::new(&result, &inputs.config)
        .to_json()
        .map_err(to_py_err)
}

/// Variant label of a JSON configuration; the default configuration when omitted.
#[pyfunction]
#[pyo3(signature = (config_json=None))]
fn config_label(config_json: Option<&str>) -> PyResult<String> {
    let config: ModelConfig = match config_json {
        Some(json) => ModelConfig::from_json(json).map_err(to_py_err)?,
        None => ModelConfig::default(),
    };
    config.validate().map_err(to_py_err)?;
    Ok(config.label())
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "engine")?;
    m.add_function(wrap_pyfunction!(run, &m)?)?;
    m.add_function(wrap_pyfunction!(run_record, &m)?)?;
    m.add_function(wrap_pyfunction!(config_label, &m)?)?;
    m.add_class::<RunResult>()?;
    m.add_class::<Diagnostics>()?;
    parent.add_submodule(&m)?;
    Ok(())
}
