use numpy::PyReadonlyArray1;
use pyo3::prelude::*;

use crate::convert::{paired_slices, to_options, to_py_err};

use flowsplit_core::metrics;

define_scalar_result! {
    /// Goodness-of-fit summary over the pairs where both sides are defined.
    pub struct GoodnessOfFit from flowsplit_core::metrics::GoodnessOfFit {
        nse, rmse, mae, r_squared, index_of_agreement, pbias,
    }
}

macro_rules! metric_fn {
    ($name:ident) => {
        #[pyfunction]
        fn $name<'py>(
            observed: PyReadonlyArray1<'py, f64>,
            simulated: PyReadonlyArray1<'py, f64>,
        ) -> PyResult<f64> {
            let (obs, sim) = paired_slices(&observed, &simulated)?;
            Ok(metrics::$name(obs, sim))
        }
    };
}

metric_fn!(nse);
metric_fn!(rmse);
metric_fn!(mae);
metric_fn!(r_squared);
metric_fn!(index_of_agreement);
metric_fn!(pbias);

/// All metrics at once; NaN in either array drops that pair.
#[pyfunction]
fn evaluate<'py>(
    observed: PyReadonlyArray1<'py, f64>,
    simulated: PyReadonlyArray1<'py, f64>,
) -> PyResult<GoodnessOfFit> {
    let (obs, sim) = paired_slices(&observed, &simulated)?;
    let gof = metrics::GoodnessOfFit::evaluate(&to_options(obs), &to_options(sim))
        .map_err(to_py_err)?;
    Ok(GoodnessOfFit::from_core(&gof))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "metrics")?;
    m.add_function(wrap_pyfunction!(nse, &m)?)?;
    m.add_function(wrap_pyfunction!(rmse, &m)?)?;
    m.add_function(wrap_pyfunction!(mae, &m)?)?;
    m.add_function(wrap_pyfunction!(r_squared, &m)?)?;
    m.add_function(wrap_pyfunction!(index_of_agreement, &m)?)?;
    m.add_function(wrap_pyfunction!(pbias, &m)?)?;
    m.add_function(wrap_pyfunction!(evaluate, &m)?)?;
    m.add_class::<GoodnessOfFit>()?;
    parent.add_submodule(&m)?;
    Ok(())
}
