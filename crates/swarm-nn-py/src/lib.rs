use ndarray::Array2;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use swarm_nn_core::nn::MseObjective;
use swarm_nn_core::{TrainError, Trainer, TrainerConfig};

/// Minimal PyO3 module exposing swarm-nn-core to Python.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Fits a 1-in/1-out network to `(xs, ys)` by particle swarm.
///
/// Returns `(loss_history, best_position)`, the latter being the flat global best.
#[pyfunction]
#[pyo3(signature = (xs, ys, config_json=None))]
fn train_regression(
    py: Python<'_>,
    xs: Vec<f32>,
    ys: Vec<f32>,
    config_json: Option<&str>,
) -> PyResult<(Vec<f32>, Vec<f32>)> {
    let config = match config_json {
        Some(json) => TrainerConfig::from_json(json)
            .map_err(|e| PyValueError::new_err(e.to_string()))?,
        None => TrainerConfig::default(),
    };
    let n = xs.len();
    let inputs = Array2::from_shape_vec((n, 1), xs)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let targets = Array2::from_shape_vec((n, 1), ys)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let objective =
        MseObjective::new(inputs, targets).map_err(|e| PyValueError::new_err(e.to_string()))?;

    py.detach(|| -> Result<_, TrainError> {
        let mut trainer = Trainer::new(config, objective)?;
        trainer.train()?;
        Ok((
            trainer.loss_history().to_vec(),
            trainer.state().global_best().to_vec(),
        ))
    })
    .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(train_regression, m)?)?;
    Ok(())
}
