use crate::evaluator::Evaluation;
use crate::velocity::UpdateInputs;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

/// Positions, velocities and best-so-far bookkeeping of a particle swarm.
///
/// Rows are particles. `pop_size` and `dim` never change after construction.
#[derive(Clone, Debug)]
pub struct SwarmState {
    x: Array2<f32>,
    v: Array2<f32>,
    p: Array2<f32>,
    f_p: Array1<f32>,
    g: Array1<f32>,
    grads: Array2<f32>,
}

impl SwarmState {
    /// Builds the state from initial positions and their first evaluation:
    /// `p := x`, `f_p := fitness`, `g := p[argmin(f_p)]`.
    pub fn new(positions: Array2<f32>, velocities: Array2<f32>, initial: Evaluation) -> Self {
        debug_assert_eq!(positions.dim(), velocities.dim());
        debug_assert_eq!(positions.nrows(), initial.fitness.len());
        debug_assert_eq!(positions.dim(), initial.grads.dim());
        let g = Array1::zeros(positions.ncols());
        let mut state = Self {
            p: positions.clone(),
            x: positions,
            v: velocities,
            f_p: initial.fitness,
            g,
            grads: initial.grads,
        };
        state.update_global_best();
        state
    }

    pub fn pop_size(&self) -> usize {
        self.x.nrows()
    }

    pub fn dim(&self) -> usize {
        self.x.ncols()
    }

    pub fn positions(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn velocities(&self) -> ArrayView2<'_, f32> {
        self.v.view()
    }

    pub fn personal_best(&self) -> ArrayView2<'_, f32> {
        self.p.view()
    }

    pub fn personal_best_fitness(&self) -> ArrayView1<'_, f32> {
        self.f_p.view()
    }

    pub fn global_best(&self) -> ArrayView1<'_, f32> {
        self.g.view()
    }

    pub fn global_best_fitness(&self) -> f32 {
        self.f_p[self.best_index()]
    }

    pub fn gradients(&self) -> ArrayView2<'_, f32> {
        self.grads.view()
    }

    pub fn update_inputs(&self) -> UpdateInputs<'_> {
        UpdateInputs {
            velocities: self.v.view(),
            positions: self.x.view(),
            personal_best: self.p.view(),
            global_best: self.g.view(),
            grads: self.grads.view(),
        }
    }

    /// Commits one step: moves the swarm, then refreshes gradients and bests.
    pub fn advance(&mut self, velocities: Array2<f32>, positions: Array2<f32>, eval: Evaluation) {
        debug_assert_eq!(positions.dim(), self.x.dim());
        self.v = velocities;
        self.x = positions;
        self.update_personal_best(eval.fitness.view());
        self.grads = eval.grads;
        self.update_global_best();
    }

    /// Replaces `p[i]` with `x[i]` where `f_x[i] < f_p[i]`. Ties keep the old best.
    pub fn update_personal_best(&mut self, f_x: ArrayView1<f32>) {
        Zip::from(self.p.rows_mut())
            .and(&mut self.f_p)
            .and(self.x.rows())
            .and(&f_x)
            .for_each(|mut p, f_p, x, &f| {
                if f < *f_p {
                    p.assign(&x);
                    *f_p = f;
                }
            });
    }

    /// `g := p[argmin(f_p)]`, first index on ties.
    pub fn update_global_best(&mut self) {
        let best = self.best_index();
        self.g.assign(&self.p.row(best));
    }

    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, &f) in self.f_p.iter().enumerate() {
            if f < self.f_p[best] {
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn evaluation(fitness: Array1<f32>, dim: usize) -> Evaluation {
        let n = fitness.len();
        Evaluation {
            fitness,
            grads: Array2::zeros((n, dim)),
        }
    }

    fn state() -> SwarmState {
        let x = array![[1.0, 1.0], [2.0, 2.0], [-1.0, -1.0], [0.5, 0.5]];
        let v = Array2::zeros((4, 2));
        SwarmState::new(x, v, evaluation(array![2.0, 8.0, 2.0, 0.5], 2))
    }

    #[test]
    fn construction_copies_positions_into_personal_best() {
        let s = state();
        assert_eq!(s.personal_best(), s.positions());
        assert_eq!(s.global_best(), array![0.5, 0.5]);
        assert_eq!(s.global_best_fitness(), 0.5);
        assert_eq!((s.pop_size(), s.dim()), (4, 2));
    }

    #[test]
    fn personal_best_only_moves_on_strict_improvement() {
        let mut s = state();
        let next_x = array![[0.0, 0.0], [3.0, 3.0], [1.0, 1.0], [9.0, 9.0]];
        s.advance(
            Array2::zeros((4, 2)),
            next_x,
            evaluation(array![0.0, 18.0, 2.0, 162.0], 2),
        );

        assert_eq!(s.personal_best_fitness(), array![0.0, 8.0, 2.0, 0.5]);
        assert_eq!(s.personal_best().row(0), array![0.0, 0.0]);
        assert_eq!(s.personal_best().row(1), array![2.0, 2.0]);
        // Equal fitness keeps the earlier position.
        assert_eq!(s.personal_best().row(2), array![-1.0, -1.0]);
        assert_eq!(s.personal_best().row(3), array![0.5, 0.5]);
        assert_eq!(s.global_best(), array![0.0, 0.0]);
    }

    #[test]
    fn global_best_ties_pick_first_index() {
        let x = array![[3.0], [1.0], [2.0]];
        let s = SwarmState::new(
            x,
            Array2::zeros((3, 1)),
            evaluation(array![4.0, 1.0, 1.0], 1),
        );
        assert_eq!(s.best_index(), 1);
        assert_eq!(s.global_best(), array![1.0]);
    }

    #[test]
    fn advance_replaces_gradient_cache() {
        let mut s = state();
        let eval = Evaluation {
            fitness: array![2.0, 8.0, 2.0, 0.5],
            grads: Array2::from_elem((4, 2), 3.0),
        };
        s.advance(Array2::zeros((4, 2)), s.positions().to_owned(), eval);
        assert!(s.gradients().iter().all(|&g| g == 3.0));
    }
}
