//! Configuration of a minimisation run.

use crate::hessian::HessianUpdate;
use crate::step::StepMetric;
use serde::{Deserialize, Deserializer};

/// Immutable settings read by the driver.
///
/// Deserialises from a map using the short option names `gtol`, `maxiter`
/// and `maxstep`; any missing key falls back to its default, so
/// `{"gtol": 1e-6}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Convergence threshold on the RMS gradient (default: 1e-4).
    pub gtol: f64,
    /// Iteration cap (default: 100). Zero returns the initial point untouched;
    /// a negative `maxiter` in a deserialised map is read as zero.
    #[serde(rename = "maxiter", deserialize_with = "iteration_count")]
    pub max_iterations: usize,
    /// Largest Euclidean norm of any applied step (default: 0.2).
    #[serde(rename = "maxstep")]
    pub max_step: f64,
    /// Condition number above which the Hessian is replaced by the identity
    /// instead of being updated (default: 1e12).
    #[serde(rename = "max_cond")]
    pub max_condition_number: f64,
    /// Update strategies tried in order; the first applicable one wins.
    pub hessian_updates: Vec<HessianUpdate>,
    /// Reject an updated Hessian that fails a Cholesky factorisation and
    /// move on to the next strategy (default: off).
    pub verify_positive_definite: bool,
    /// Metric used to measure the direction length in the step scale
    /// (default: the Hessian metric).
    pub step_metric: StepMetric,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            gtol: 1e-4,
            max_iterations: 100,
            max_step: 0.2,
            max_condition_number: 1e12,
            hessian_updates: vec![HessianUpdate::BfgsPositiveDefinite],
            verify_positive_definite: false,
            step_metric: StepMetric::Hessian,
        }
    }
}

// Signed on input so that `maxiter <= 0` means "no iterations".
fn iteration_count<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let count = i64::deserialize(deserializer)?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// A rejected option value.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidOption {
    pub name: &'static str,
    pub value: f64,
}

impl Options {
    /// Checks the numeric settings before a run starts.
    pub fn validate(&self) -> Result<(), InvalidOption> {
        if !self.gtol.is_finite() || self.gtol < 0.0 {
            return Err(InvalidOption {
                name: "gtol",
                value: self.gtol,
            });
        }
        if !self.max_step.is_finite() || self.max_step <= 0.0 {
            return Err(InvalidOption {
                name: "maxstep",
                value: self.max_step,
            });
        }
        if !self.max_condition_number.is_finite() || self.max_condition_number <= 1.0 {
            return Err(InvalidOption {
                name: "max_cond",
                value: self.max_condition_number,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InvalidOption, Options};
    use crate::hessian::HessianUpdate;
    use crate::step::StepMetric;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.gtol, 1e-4);
        assert_eq!(opts.max_iterations, 100);
        assert_eq!(opts.max_step, 0.2);
        assert_eq!(opts.max_condition_number, 1e12);
        assert_eq!(opts.hessian_updates, vec![HessianUpdate::BfgsPositiveDefinite]);
        assert!(!opts.verify_positive_definite);
        assert_eq!(opts.step_metric, StepMetric::Hessian);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_partial_map_deserialises() {
        let opts: Options = serde_json::from_str(r#"{"gtol": 1e-6, "maxiter": 7}"#).unwrap();
        assert_eq!(opts.gtol, 1e-6);
        assert_eq!(opts.max_iterations, 7);
        assert_eq!(opts.max_step, 0.2);

        let opts: Options = serde_json::from_str(
            r#"{"maxstep": 0.5, "hessian_updates": ["sr1", "bfgs_damped"], "verify_positive_definite": true}"#,
        )
        .unwrap();
        assert_eq!(opts.max_step, 0.5);
        assert_eq!(
            opts.hessian_updates,
            vec![HessianUpdate::Sr1, HessianUpdate::BfgsDamped]
        );
        assert!(opts.verify_positive_definite);

        let opts: Options = serde_json::from_str(r#"{"step_metric": "euclidean"}"#).unwrap();
        assert_eq!(opts.step_metric, StepMetric::Euclidean);
    }

    #[test]
    fn test_unknown_options_are_rejected() {
        assert!(serde_json::from_str::<Options>(r#"{"line_search": true}"#).is_err());
        assert!(serde_json::from_str::<Options>(r#"{"maxiter": 2.5}"#).is_err());
    }

    #[test]
    fn test_negative_maxiter_reads_as_zero() {
        let opts: Options = serde_json::from_str(r#"{"maxiter": -1}"#).unwrap();
        assert_eq!(opts.max_iterations, 0);
        let opts: Options = serde_json::from_str(r#"{"maxiter": 0}"#).unwrap();
        assert_eq!(opts.max_iterations, 0);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_step = Options {
            max_step: 0.0,
            ..Options::default()
        };
        assert_eq!(
            bad_step.validate(),
            Err(InvalidOption {
                name: "maxstep",
                value: 0.0
            })
        );

        let bad_gtol = Options {
            gtol: -1.0,
            ..Options::default()
        };
        assert_eq!(bad_gtol.validate().unwrap_err().name, "gtol");

        let bad_cond = Options {
            max_condition_number: f64::INFINITY,
            ..Options::default()
        };
        assert_eq!(bad_cond.validate().unwrap_err().name, "max_cond");
    }
}
