//! The objective capability consumed by the minimiser.
//!
//! An objective maps a position to `(energy, gradient)`. Plain closures
//! returning the pair are objectives out of the box; [`WithArgs`] covers
//! objectives that need fixed extra arguments or that can fail.

use ndarray::Array1;
use std::convert::Infallible;

/// A differentiable scalar function evaluated at a position.
///
/// Implementations are expected to be deterministic for a fixed input. The
/// returned gradient must have the same length as `x`; the minimiser checks
/// this on every call.
pub trait Objective {
    /// Failure raised by the caller's evaluation. It is handed back untouched.
    type Error;

    /// Evaluates the function value and gradient at `x`.
    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>), Self::Error>;
}

impl<F> Objective for F
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    type Error = Infallible;

    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>), Infallible> {
        Ok(self(x))
    }
}

/// A fallible objective bundled with fixed extra arguments.
///
/// The arguments are passed by reference on every evaluation and are never
/// modified by the minimiser.
///
/// ```
/// use adaptive_bfgs::{AdaptiveBfgs, WithArgs};
/// use ndarray::{array, Array1};
///
/// // Shifted bowl whose centre is supplied as an extra argument.
/// let bowl = |x: &Array1<f64>, centre: &Array1<f64>| -> Result<(f64, Array1<f64>), String> {
///     let d = x - centre;
///     Ok((d.dot(&d), 2.0 * &d))
/// };
/// let objective = WithArgs::new(bowl, array![1.0, -1.0]);
/// let solution = AdaptiveBfgs::new(array![0.0, 0.0], objective)
///     .with_max_iterations(200)
///     .minimise()
///     .unwrap();
/// assert!(solution.success);
/// ```
pub struct WithArgs<F, A> {
    f: F,
    args: A,
}

impl<F, A> WithArgs<F, A> {
    pub fn new(f: F, args: A) -> Self {
        Self { f, args }
    }

    /// The fixed arguments handed to every evaluation.
    pub fn args(&self) -> &A {
        &self.args
    }
}

impl<F, A, E> Objective for WithArgs<F, A>
where
    F: FnMut(&Array1<f64>, &A) -> Result<(f64, Array1<f64>), E>,
{
    type Error = E;

    fn evaluate(&mut self, x: &Array1<f64>) -> Result<(f64, Array1<f64>), E> {
        (self.f)(x, &self.args)
    }
}
