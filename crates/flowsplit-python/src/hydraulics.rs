use pyo3::prelude::*;

use crate::convert::to_py_err;

use flowsplit_core::travel_time::{travel_time_seconds, LagRounding, ReachGeometry};

/// Manning travel time through one rectangular reach [s].
#[pyfunction]
fn travel_time(
    length_m: f64,
    top_width_m: f64,
    depth_m: f64,
    manning_n: f64,
    slope: f64,
) -> PyResult<f64> {
    let reach = ReachGeometry {
        length_m,
        top_width_m,
        depth_m,
        manning_n,
        slope,
    };
    reach.validate("reach").map_err(to_py_err)?;
    Ok(travel_time_seconds(&reach))
}

/// Travel time of a reach with only its length known, using the fallback
/// channel section.
#[pyfunction]
fn placeholder_travel_time(length_m: f64) -> PyResult<f64> {
    let reach = ReachGeometry::placeholder(length_m);
    reach.validate("reach").map_err(to_py_err)?;
    Ok(travel_time_seconds(&reach))
}

/// Whole-day lag for a travel time in seconds.
#[pyfunction]
#[pyo3(signature = (seconds, rounding="nearest"))]
fn lag_days(seconds: f64, rounding: &str) -> PyResult<i64> {
    let rule = match rounding {
        "nearest" => LagRounding::Nearest,
        "floor" => LagRounding::Floor,
        "ceil" => LagRounding::Ceil,
        other => {
            return Err(pyo3::exceptions::PyValueError::new_err(format!(
                "rounding must be 'nearest', 'floor' or 'ceil', got '{other}'"
            )))
        }
    };
    rule.to_days(seconds).ok_or_else(|| {
        pyo3::exceptions::PyValueError::new_err(format!(
            "travel time must be finite, got {seconds}"
        ))
    })
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "hydraulics")?;
    m.add_function(wrap_pyfunction!(travel_time, &m)?)?;
    m.add_function(wrap_pyfunction!(placeholder_travel_time, &m)?)?;
    m.add_function(wrap_pyfunction!(lag_days, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
