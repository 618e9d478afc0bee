use crate::config::TrainerConfig;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Granularity of the random attraction coefficients `r1`, `r2`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientSampling {
    /// One scalar pair per step, shared by every particle and dimension.
    #[default]
    PerStep,
    /// One pair per dimension, shared by every particle.
    PerDimension,
}

/// Random coefficients drawn for a single step.
#[derive(Clone, Debug, PartialEq)]
pub enum Coefficients {
    Scalar { r1: f32, r2: f32 },
    PerDimension { r1: Array1<f32>, r2: Array1<f32> },
}

impl Coefficients {
    #[inline]
    fn at(&self, j: usize) -> (f32, f32) {
        match self {
            Coefficients::Scalar { r1, r2 } => (*r1, *r2),
            Coefficients::PerDimension { r1, r2 } => (r1[j], r2[j]),
        }
    }
}

/// Inputs of one update, borrowed from the swarm.
pub struct UpdateInputs<'a> {
    pub velocities: ArrayView2<'a, f32>,
    pub positions: ArrayView2<'a, f32>,
    pub personal_best: ArrayView2<'a, f32>,
    pub global_best: ArrayView1<'a, f32>,
    pub grads: ArrayView2<'a, f32>,
}

/// `v' = b*v + c1*r1*(p - x) + c2*r2*(g - x) - gd_alpha*grads`, `x' = x + v'`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityUpdateRule {
    pub inertia: f32,
    pub cognitive: f32,
    pub social: f32,
    pub gd_alpha: f32,
    pub sampling: CoefficientSampling,
}

impl VelocityUpdateRule {
    pub fn from_config(config: &TrainerConfig) -> Self {
        Self {
            inertia: config.inertia,
            cognitive: config.cognitive,
            social: config.social,
            gd_alpha: config.gd_alpha,
            sampling: config.coefficients,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, dim: usize, rng: &mut R) -> Coefficients {
        match self.sampling {
            CoefficientSampling::PerStep => Coefficients::Scalar {
                r1: rng.random::<f32>(),
                r2: rng.random::<f32>(),
            },
            CoefficientSampling::PerDimension => Coefficients::PerDimension {
                r1: Array1::from_shape_simple_fn(dim, || rng.random::<f32>()),
                r2: Array1::from_shape_simple_fn(dim, || rng.random::<f32>()),
            },
        }
    }

    /// Returns the candidate `(velocities, positions)`; the inputs are not touched.
    pub fn apply(
        &self,
        inputs: &UpdateInputs<'_>,
        coeffs: &Coefficients,
    ) -> (Array2<f32>, Array2<f32>) {
        let UpdateInputs {
            velocities,
            positions,
            personal_best,
            global_best,
            grads,
        } = inputs;

        let mut next_v = Array2::zeros(positions.raw_dim());
        Zip::indexed(&mut next_v)
            .and(velocities)
            .and(positions)
            .and(personal_best)
            .and(grads)
            .for_each(|(_, j), out, &v, &x, &p, &dg| {
                let (r1, r2) = coeffs.at(j);
                *out = self.inertia * v
                    + self.cognitive * r1 * (p - x)
                    + self.social * r2 * (global_best[j] - x)
                    - self.gd_alpha * dg;
            });

        let next_x = positions + &next_v;
        (next_v, next_x)
    }
}
