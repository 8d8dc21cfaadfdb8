//! An adaptive-step, line-search free BFGS minimiser.
//!
//! The solver locates a stationary point of a differentiable scalar function
//! using exactly one objective evaluation per iteration. Instead of a line
//! search, each quasi-Newton step is scaled from local curvature estimates
//! (Ou, "Adaptive step quasi-Newton", arXiv:1612.06965) and clamped to a
//! maximum length. This suits problems such as geometry optimisation where
//! every evaluation is expensive.
//!
//! # Features
//! - Direct-form Hessian approximation starting from the identity, updated
//!   by an ordered list of strategies (BFGS by default, damped BFGS and SR1
//!   available) with identity resets on ill-conditioning or failed
//!   curvature conditions.
//! - Adaptive step scaling with a hard cap on the step norm. The direction
//!   length is measured in the metric of the Hessian approximation, so the
//!   scale approaches the full Newton step near a minimum.
//! - Convergence on the RMS gradient, which does not grow with dimension.
//! - Injectable diagnostics; the default sink writes to the `log` facade.
//! - Fallible objectives with fixed extra arguments through [`WithArgs`].
//!
//! ## Defaults
//! - `gtol = 1e-4`, `maxiter = 100`, `maxstep = 0.2`.
//! - Condition number reset threshold `1e12`.
//! - Hessian strategies: `[BfgsPositiveDefinite]`, no post-update Cholesky check.
//! - Step metric: [`StepMetric::Hessian`].
//!
//! # Example
//!
//! ```
//! use adaptive_bfgs::{AdaptiveBfgs, AdaptiveBfgsSolution};
//! use ndarray::{array, Array1};
//!
//! // A shifted quadratic bowl with its minimum at (3, -1).
//! let bowl = |x: &Array1<f64>| -> (f64, Array1<f64>) {
//!     let f = (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
//!     let g = array![2.0 * (x[0] - 3.0), 4.0 * (x[1] + 1.0)];
//!     (f, g)
//! };
//!
//! let AdaptiveBfgsSolution {
//!     final_point,
//!     success,
//!     iterations,
//!     ..
//! } = AdaptiveBfgs::new(array![0.0, 0.0], bowl)
//!     .with_gtol(1e-6)
//!     .with_max_iterations(200)
//!     .with_max_step(0.5)
//!     .minimise()
//!     .expect("minimisation failed");
//!
//! println!("Found minimum at {} in {} iterations.", final_point, iterations);
//! assert!(success);
//! assert!((final_point[0] - 3.0).abs() < 1e-4);
//! assert!((final_point[1] + 1.0).abs() < 1e-4);
//! ```

mod diagnostics;
mod hessian;
mod linalg;
mod objective;
mod options;
mod step;

pub use diagnostics::{DiagnosticSink, LogSink};
pub use hessian::{HessianSource, HessianUpdate, HessianUpdater, SecantPair};
pub use objective::{Objective, WithArgs};
pub use options::{InvalidOption, Options};
pub use step::{AdaptiveStep, StepMetric, adaptive_step};

use log::Level;
use ndarray::{Array1, Array2};
use std::convert::Infallible;

/// An error type for clear diagnostics.
///
/// Running out of iterations is not an error; it is reported through
/// [`AdaptiveBfgsSolution::success`].
#[derive(Debug, thiserror::Error)]
pub enum AdaptiveBfgsError<E = Infallible> {
    #[error("Gradient has {found} components but the position has {expected}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("The gradient contained NaN or infinity at iteration {iteration}.")]
    NonFiniteGradient { iteration: usize },
    #[error(
        "The Hessian approximation could not be inverted, or gave a non-finite direction, at iteration {iteration}."
    )]
    SingularHessian { iteration: usize },
    #[error("Invalid value {value} for option `{name}`.")]
    InvalidOption { name: &'static str, value: f64 },
    /// The objective's own failure, returned unchanged.
    #[error("The objective evaluation failed.")]
    Objective(#[source] E),
}

impl<E> From<InvalidOption> for AdaptiveBfgsError<E> {
    fn from(err: InvalidOption) -> Self {
        AdaptiveBfgsError::InvalidOption {
            name: err.name,
            value: err.value,
        }
    }
}

/// How the iteration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `max_iterations` was zero; nothing was evaluated.
    ZeroIterations,
    /// The RMS gradient fell below `gtol`.
    Converged,
    /// The iteration cap was exhausted.
    MaxIterationsReached,
}

/// The outcome of a minimisation run.
///
/// The fields correspond to the familiar `x`, `success`, `fun`, `jac`,
/// `hess` and `nit` of scipy-style results. Fields that are never computed
/// are `None`: with zero iterations nothing is evaluated, and a run that
/// converges on its first evaluation never estimates a Hessian.
#[derive(Debug, Clone)]
pub struct AdaptiveBfgsSolution {
    /// The final position.
    pub final_point: Array1<f64>,
    /// Whether the last computed RMS gradient is below `gtol`.
    pub success: bool,
    /// The objective value at `final_point`'s last evaluation.
    pub final_value: Option<f64>,
    /// The last evaluated gradient.
    pub final_gradient: Option<Array1<f64>>,
    /// The last Hessian approximation used for a step.
    pub final_hessian: Option<Array2<f64>>,
    pub final_rms_gradient: Option<f64>,
    /// The iteration index reached when the loop stopped.
    pub iterations: usize,
    /// The total number of times the objective was evaluated.
    pub func_evals: usize,
    pub status: Termination,
}

/// Mutable state of one run. Replaced field-wise only at the two
/// transition points, after an evaluation and after a step.
#[derive(Debug, Clone)]
struct OptimizerState {
    x: Array1<f64>,
    last_x: Option<Array1<f64>>,
    grad: Option<Array1<f64>>,
    last_grad: Option<Array1<f64>>,
    energy: Option<f64>,
    hess: Option<Array2<f64>>,
}

impl OptimizerState {
    fn new(x0: Array1<f64>) -> Self {
        Self {
            x: x0,
            last_x: None,
            grad: None,
            last_grad: None,
            energy: None,
            hess: None,
        }
    }

    fn record_evaluation(&mut self, energy: f64, grad: Array1<f64>) {
        self.last_grad = self.grad.replace(grad);
        self.energy = Some(energy);
    }

    fn take_step(&mut self, step: &Array1<f64>, hess: Array2<f64>) {
        let next = &self.x + step;
        self.last_x = Some(std::mem::replace(&mut self.x, next));
        self.hess = Some(hess);
    }

    // Previous Hessian with the step/gradient change that followed it.
    fn secant_pair(&self) -> Option<(Array1<f64>, Array1<f64>)> {
        let last_x = self.last_x.as_ref()?;
        let grad = self.grad.as_ref()?;
        let last_grad = self.last_grad.as_ref()?;
        Some((&self.x - last_x, grad - last_grad))
    }
}

/// A configurable adaptive-step BFGS minimiser.
pub struct AdaptiveBfgs<O> {
    x0: Array1<f64>,
    objective: O,
    options: Options,
    sink: Box<dyn DiagnosticSink>,
}

impl<O> AdaptiveBfgs<O>
where
    O: Objective,
{
    /// Creates a new minimiser with default [`Options`].
    ///
    /// # Arguments
    /// * `x0` - The initial position. Its length fixes the problem dimension.
    /// * `objective` - Returns `(value, gradient)`; any `FnMut(&Array1<f64>) -> (f64, Array1<f64>)` works.
    pub fn new(x0: Array1<f64>, objective: O) -> Self {
        Self {
            x0,
            objective,
            options: Options::default(),
            sink: Box::new(LogSink),
        }
    }

    /// Replaces the whole configuration.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Sets the RMS gradient convergence threshold (default: 1e-4).
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.options.gtol = gtol;
        self
    }

    /// Sets the maximum number of iterations (default: 100).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.options.max_iterations = max_iterations;
        self
    }

    /// Sets the maximum Euclidean length of a step (default: 0.2).
    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.options.max_step = max_step;
        self
    }

    /// Sets the condition number above which the Hessian is reset (default: 1e12).
    pub fn with_max_condition_number(mut self, max_condition_number: f64) -> Self {
        self.options.max_condition_number = max_condition_number;
        self
    }

    /// Sets the ordered list of Hessian update strategies.
    /// An empty list resets to the identity on every iteration.
    pub fn with_hessian_updates(mut self, updates: Vec<HessianUpdate>) -> Self {
        self.options.hessian_updates = updates;
        self
    }

    /// If enabled, an updated Hessian that is not positive definite is
    /// rejected and the next strategy is tried.
    pub fn with_positive_definite_check(mut self, enable: bool) -> Self {
        self.options.verify_positive_definite = enable;
        self
    }

    /// Chooses how the direction length in the step scale is measured
    /// (default: [`StepMetric::Hessian`]).
    pub fn with_step_metric(mut self, metric: StepMetric) -> Self {
        self.options.step_metric = metric;
        self
    }

    /// Routes diagnostics to `sink` instead of the `log` facade.
    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Runs the minimisation from `x0`. Every call starts from fresh state.
    pub fn minimise(&mut self) -> Result<AdaptiveBfgsSolution, AdaptiveBfgsError<O::Error>> {
        self.options.validate()?;
        let opts = &self.options;
        let sink = self.sink.as_ref();
        let n = self.x0.len();
        let mut state = OptimizerState::new(self.x0.clone());

        if opts.max_iterations == 0 {
            sink.record(
                Level::Debug,
                "max_iterations is zero; returning the initial point unevaluated",
            );
            return Ok(AdaptiveBfgsSolution {
                final_point: state.x,
                success: true,
                final_value: None,
                final_gradient: None,
                final_hessian: None,
                final_rms_gradient: None,
                iterations: 0,
                func_evals: 0,
                status: Termination::ZeroIterations,
            });
        }

        let updater = HessianUpdater::new(
            opts.hessian_updates.clone(),
            opts.max_condition_number,
            opts.verify_positive_definite,
        );
        let mut rms_grad = f64::INFINITY;
        let mut func_evals = 0;
        let mut iteration = 0;
        let mut converged = false;

        for k in 0..opts.max_iterations {
            iteration = k;
            let (energy, grad) = self
                .objective
                .evaluate(&state.x)
                .map_err(AdaptiveBfgsError::Objective)?;
            func_evals += 1;

            if grad.len() != n {
                return Err(AdaptiveBfgsError::DimensionMismatch {
                    expected: n,
                    found: grad.len(),
                });
            }
            if grad.iter().any(|v| !v.is_finite()) {
                sink.record(
                    Level::Warn,
                    &format!("Non-finite gradient at iter {k}; aborting."),
                );
                return Err(AdaptiveBfgsError::NonFiniteGradient { iteration: k });
            }

            rms_grad = linalg::rms(&grad);
            state.record_evaluation(energy, grad.clone());
            sink.record(
                Level::Debug,
                &format!("iter {k}: En = {energy:.10e}, rms grad = {rms_grad:.4e}"),
            );
            if rms_grad < opts.gtol {
                converged = true;
                break;
            }

            let secant = state.secant_pair();
            let previous = match (&state.hess, &secant) {
                (Some(hessian), Some((s, y))) => Some(SecantPair { hessian, s, y }),
                _ => None,
            };
            let (hess, source) = updater.update(n, previous);
            match source {
                HessianSource::IllConditionedReset => sink.record(
                    Level::Warn,
                    &format!(
                        "Hessian condition number exceeds {:.1e} at iter {k}; resetting to identity.",
                        opts.max_condition_number
                    ),
                ),
                HessianSource::FallbackReset => sink.record(
                    Level::Warn,
                    &format!("No Hessian update applicable at iter {k}; resetting to identity."),
                ),
                HessianSource::Updated(strategy) => {
                    sink.record(Level::Debug, &format!("Updated Hessian with {strategy:?}"))
                }
                HessianSource::ColdStart => {
                    sink.record(Level::Debug, "Starting from the identity Hessian")
                }
            }

            let Some(AdaptiveStep {
                step,
                raw_length,
                clamped,
            }) = adaptive_step(&grad, &hess, opts.max_step, opts.step_metric)
            else {
                sink.record(
                    Level::Error,
                    &format!("Hessian inversion failed or overflowed at iter {k}."),
                );
                return Err(AdaptiveBfgsError::SingularHessian { iteration: k });
            };
            if clamped {
                sink.record(
                    Level::Info,
                    &format!(
                        "adaptive step size {raw_length:.4e} exceeds maxstep; scaled to {:.4e}",
                        opts.max_step
                    ),
                );
            } else {
                sink.record(Level::Debug, &format!("adaptive step size: {raw_length:.4e}"));
            }
            state.take_step(&step, hess);
        }

        let success = rms_grad < opts.gtol;
        let status = if converged {
            Termination::Converged
        } else {
            Termination::MaxIterationsReached
        };
        if converged {
            sink.record(
                Level::Info,
                &format!("Converged: iters={iteration}, rms grad={rms_grad:.3e}, fe={func_evals}"),
            );
        } else {
            sink.record(
                Level::Warn,
                &format!(
                    "Max iterations reached: iters={iteration}, rms grad={rms_grad:.3e}, fe={func_evals}"
                ),
            );
        }
        sink.record(Level::Debug, &format!("Final x = {}", state.x));

        Ok(AdaptiveBfgsSolution {
            final_point: state.x,
            success,
            final_value: state.energy,
            final_gradient: state.grad,
            final_hessian: state.hess,
            final_rms_gradient: Some(rms_grad),
            iterations: iteration,
            func_evals,
            status,
        })
    }
}
