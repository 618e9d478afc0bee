use crate::codec::{CodecError, LayerLayout};
use crate::objective::Objective;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{error::Error, fmt};

/// Per-particle fitness and flattened gradients for one swarm evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub fitness: Array1<f32>,
    pub grads: Array2<f32>,
}

impl Evaluation {
    pub fn mean_fitness(&self) -> f32 {
        self.fitness.mean().unwrap_or(f32::NAN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    Decode { particle: usize, source: CodecError },
    NonFiniteLoss { particle: usize, loss: f32 },
    NonFiniteGradient { particle: usize },
    GradientShape { particle: usize, source: CodecError },
}

impl EvaluationError {
    pub fn particle(&self) -> usize {
        match self {
            EvaluationError::Decode { particle, .. }
            | EvaluationError::NonFiniteLoss { particle, .. }
            | EvaluationError::NonFiniteGradient { particle }
            | EvaluationError::GradientShape { particle, .. } => *particle,
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::Decode { particle, source } => {
                write!(f, "particle {particle} could not be decoded: {source}")
            }
            EvaluationError::NonFiniteLoss { particle, loss } => {
                write!(f, "objective returned non-finite loss {loss} for particle {particle}")
            }
            EvaluationError::NonFiniteGradient { particle } => {
                write!(f, "objective returned a non-finite gradient for particle {particle}")
            }
            EvaluationError::GradientShape { particle, source } => write!(
                f,
                "gradient for particle {particle} does not match the layer sizes: {source}"
            ),
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EvaluationError::Decode { source, .. }
            | EvaluationError::GradientShape { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Maps swarm positions to losses and gradients, one row per particle, in parallel.
pub struct FitnessEvaluator<O> {
    objective: O,
    layout: LayerLayout,
    pool: Option<ThreadPool>,
}

impl<O: Objective> FitnessEvaluator<O> {
    /// `num_threads: None` evaluates on rayon's global pool.
    pub fn new(
        objective: O,
        layout: LayerLayout,
        num_threads: Option<usize>,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = num_threads
            .map(|n| ThreadPoolBuilder::new().num_threads(n).build())
            .transpose()?;
        Ok(Self {
            objective,
            layout,
            pool,
        })
    }

    pub fn layout(&self) -> &LayerLayout {
        &self.layout
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    /// Evaluates every row of `x`. All particles finish before any result is
    /// inspected; on failure the lowest failing particle index is reported.
    pub fn evaluate(&self, x: ArrayView2<f32>) -> Result<Evaluation, EvaluationError> {
        let results: Vec<Result<(f32, Array1<f32>), EvaluationError>> = self.install(|| {
            x.axis_iter(Axis(0))
                .into_par_iter()
                .enumerate()
                .map(|(particle, row)| self.evaluate_particle(particle, row))
                .collect()
        });

        let mut fitness = Array1::zeros(x.nrows());
        let mut grads = Array2::zeros((x.nrows(), self.layout.dimensions()));
        for (particle, result) in results.into_iter().enumerate() {
            let (loss, grad) = result?;
            fitness[particle] = loss;
            grads.row_mut(particle).assign(&grad);
        }
        Ok(Evaluation { fitness, grads })
    }

    fn evaluate_particle(
        &self,
        particle: usize,
        position: ArrayView1<f32>,
    ) -> Result<(f32, Array1<f32>), EvaluationError> {
        let params = self
            .layout
            .decode(position)
            .map_err(|source| EvaluationError::Decode { particle, source })?;
        let (loss, grad) = self.objective.loss_and_gradient(&params);
        if !loss.is_finite() {
            return Err(EvaluationError::NonFiniteLoss { particle, loss });
        }
        let flat = self
            .layout
            .flatten_gradient(&grad)
            .map_err(|source| EvaluationError::GradientShape { particle, source })?;
        if !flat.iter().all(|g| g.is_finite()) {
            return Err(EvaluationError::NonFiniteGradient { particle });
        }
        Ok((loss, flat))
    }

    fn install<T, F>(&self, op: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NetworkParams;
    use ndarray::array;

    fn sum_of_squares(params: &NetworkParams) -> (f32, NetworkParams) {
        let loss: f32 = params
            .weights
            .iter()
            .map(|w| w.mapv(|v| v * v).sum())
            .chain(params.biases.iter().map(|b| b.mapv(|v| v * v).sum()))
            .sum();
        let grad = NetworkParams {
            weights: params.weights.iter().map(|w| w * 2.0).collect(),
            biases: params.biases.iter().map(|b| b * 2.0).collect(),
        };
        (loss, grad)
    }

    fn evaluator<O: Objective>(objective: O, threads: Option<usize>) -> FitnessEvaluator<O> {
        FitnessEvaluator::new(objective, LayerLayout::new(&[1, 1]).unwrap(), threads).unwrap()
    }

    #[test]
    fn evaluates_every_particle_in_row_order() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [-1.0, -1.0], [0.5, 0.5]];
        let eval = evaluator(sum_of_squares, None).evaluate(x.view()).unwrap();
        assert_eq!(eval.fitness, array![2.0, 8.0, 2.0, 0.5]);
        assert_eq!(eval.grads, &x * 2.0);
        assert!((eval.mean_fitness() - 3.125).abs() < 1e-6);
    }

    #[test]
    fn dedicated_pool_matches_global_pool() {
        let x = Array2::from_shape_fn((37, 2), |(i, j)| (i as f32 * 0.1) - j as f32);
        let global = evaluator(sum_of_squares, None).evaluate(x.view()).unwrap();
        let single = evaluator(sum_of_squares, Some(1)).evaluate(x.view()).unwrap();
        assert_eq!(global, single);
    }

    #[test]
    fn reports_lowest_failing_particle() {
        let objective = |params: &NetworkParams| {
            let w = params.weights[0][[0, 0]];
            let (loss, grad) = sum_of_squares(params);
            if w < 0.0 {
                (f32::NAN, grad)
            } else {
                (loss, grad)
            }
        };
        let x = array![[1.0, 0.0], [-1.0, 0.0], [-2.0, 0.0]];
        let err = evaluator(objective, Some(2)).evaluate(x.view()).unwrap_err();
        assert!(matches!(err, EvaluationError::NonFiniteLoss { particle: 1, .. }));
        assert_eq!(err.particle(), 1);
    }

    #[test]
    fn rejects_non_finite_gradient() {
        let objective = |params: &NetworkParams| {
            let (loss, mut grad) = sum_of_squares(params);
            grad.biases[0][0] = f32::INFINITY;
            (loss, grad)
        };
        let x = array![[1.0, 1.0]];
        let err = evaluator(objective, None).evaluate(x.view()).unwrap_err();
        assert_eq!(err, EvaluationError::NonFiniteGradient { particle: 0 });
    }

    #[test]
    fn rejects_gradient_with_wrong_shape() {
        let objective = |params: &NetworkParams| {
            let (loss, mut grad) = sum_of_squares(params);
            grad.weights[0] = Array2::zeros((2, 1));
            (loss, grad)
        };
        let x = array![[1.0, 1.0]];
        let err = evaluator(objective, None).evaluate(x.view()).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::GradientShape {
                particle: 0,
                source: CodecError::WeightShape { layer: 0, .. }
            }
        ));
    }

    #[test]
    fn rejects_positions_of_wrong_width() {
        let x = array![[1.0, 1.0, 1.0]];
        let err = evaluator(sum_of_squares, None).evaluate(x.view()).unwrap_err();
        assert!(matches!(err, EvaluationError::Decode { particle: 0, .. }));
    }
}
