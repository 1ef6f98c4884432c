use flowsplit_core::DisaggError;
use numpy::PyReadonlyArray1;
use pyo3::prelude::*;

/// Validate that a numpy array is C-contiguous and return its slice.
pub fn contiguous_slice<'py>(arr: &'py PyReadonlyArray1<'py, f64>) -> PyResult<&'py [f64]> {
    arr.as_slice().map_err(|_| {
        pyo3::exceptions::PyValueError::new_err("array must be C-contiguous")
    })
}

/// Validate contiguity of two arrays and that their lengths agree.
pub fn paired_slices<'py>(
    observed: &'py PyReadonlyArray1<'py, f64>,
    simulated: &'py PyReadonlyArray1<'py, f64>,
) -> PyResult<(&'py [f64], &'py [f64])> {
    let obs = contiguous_slice(observed)?;
    let sim = contiguous_slice(simulated)?;
    if obs.len() != sim.len() {
        return Err(pyo3::exceptions::PyValueError::new_err(format!(
            "observed has {} elements, simulated has {}",
            obs.len(),
            sim.len()
        )));
    }
    if obs.is_empty() {
        return Err(pyo3::exceptions::PyValueError::new_err("arrays are empty"));
    }
    Ok((obs, sim))
}

/// NaN marks an undefined cell on the Python side.
pub fn to_options(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&v| if v.is_nan() { None } else { Some(v) })
        .collect()
}

pub fn from_options(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

/// Every engine error surfaces as `ValueError` with its message.
pub fn to_py_err(err: DisaggError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(err.to_string())
}
