//! Levenberg–Marquardt nonlinear least squares.
//!
//! The curve-fitting engine repeatedly minimizes problems of the form:
//!
//! ```text
//! minimize Σ r_i(p)²
//! ```
//!
//! where `r` is a vector of (already weighted) residuals. Each iteration
//! solves the damped linear subproblem
//!
//! ```text
//! [ J            ]       [ -r ]
//! [ sqrt(λ)·D    ] δ  ≈  [  0 ]
//! ```
//!
//! with `J = ∂r/∂p` (forward differences) and `D` the Marquardt scaling
//! `diag(‖J column‖)`. The augmented system is solved as one SVD
//! least-squares problem, which stays robust when `J` has nearly collinear
//! columns (common for quadratic windows sampled over a handful of points).
//!
//! Implementation choices:
//! - the damping factor λ is decreased after an accepted step and increased
//!   after a rejected one; a run of rejections with λ at its ceiling means
//!   the optimizer is stuck and the whole fit fails
//! - convergence is declared on a small relative cost reduction (`ftol`) or a
//!   small step relative to the parameter vector (`xtol`)
//! - the covariance of the solution is the pseudo-inverse of `JᵀJ`, scaled by
//!   the reduced chi-squared when there are more observations than
//!   parameters (matching the conventional curve-fit covariance estimate)

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::error::AnalysisError;

/// Iteration controls for the optimizer.
#[derive(Debug, Clone)]
pub struct LmOptions {
    /// Iteration budget before giving up.
    pub max_iterations: usize,
    /// Relative cost-reduction threshold for convergence.
    pub ftol: f64,
    /// Relative step-size threshold for convergence.
    pub xtol: f64,
    /// Initial damping factor.
    pub lambda_init: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            lambda_init: 1e-3,
        }
    }
}

/// Converged optimizer state.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    /// Optimized parameter vector.
    pub params: DVector<f64>,
    /// Covariance of the parameters (scaled pseudo-inverse of `JᵀJ`).
    pub covariance: DMatrix<f64>,
    /// Final sum of squared residuals.
    pub cost: f64,
    /// Iterations consumed.
    pub iterations: usize,
}

/// Ceiling for the damping factor; past this, further damping cannot help.
const LAMBDA_MAX: f64 = 1e12;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 10.0;

/// Minimize `Σ residuals(p)²` starting from `p0`.
///
/// `residuals` must return one entry per observation; non-finite residuals at
/// the starting point fail immediately, non-finite residuals at a trial point
/// reject that step.
pub fn levenberg_marquardt<R>(
    residuals: R,
    p0: &[f64],
    n_obs: usize,
    opts: &LmOptions,
) -> Result<LmOutcome, AnalysisError>
where
    R: Fn(&[f64]) -> Vec<f64>,
{
    let n_params = p0.len();
    if n_params == 0 {
        return Err(AnalysisError::invalid("fit requires at least one parameter"));
    }
    if n_obs < n_params {
        return Err(AnalysisError::invalid(format!(
            "fit requires at least as many observations ({n_obs}) as parameters ({n_params})"
        )));
    }

    let mut params = DVector::from_column_slice(p0);
    let mut r = eval_residuals(&residuals, params.as_slice(), n_obs)?;
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(AnalysisError::invalid(
            "model produced non-finite values at the initial guess",
        ));
    }

    debug!(n_params, n_obs, initial_cost = cost, "starting LM fit");

    let mut lambda = opts.lambda_init;
    let mut iterations = 0;

    while iterations < opts.max_iterations {
        iterations += 1;

        let jac = forward_jacobian(&residuals, &params, &r, n_obs)?;
        let scaling = column_norms(&jac);

        // Inner damping loop: grow λ until a step is accepted or damping
        // stops helping.
        let mut accepted = false;
        while lambda <= LAMBDA_MAX {
            let Some(step) = solve_damped_step(&jac, &r, &scaling, lambda) else {
                lambda *= LAMBDA_UP;
                continue;
            };

            let trial = &params + &step;
            let trial_r = match eval_residuals(&residuals, trial.as_slice(), n_obs) {
                Ok(r) => r,
                Err(_) => {
                    lambda *= LAMBDA_UP;
                    continue;
                }
            };
            let trial_cost = trial_r.norm_squared();

            if trial_cost.is_finite() && trial_cost <= cost {
                let reduction = cost - trial_cost;
                let step_norm = step.norm();
                let param_norm = params.norm();

                params = trial;
                r = trial_r;
                cost = trial_cost;
                lambda = (lambda / LAMBDA_DOWN).max(1e-12);
                accepted = true;

                trace!(iterations, cost, lambda, "accepted LM step");

                let cost_converged = reduction <= opts.ftol * cost.max(f64::MIN_POSITIVE);
                let step_converged = step_norm <= opts.xtol * (param_norm + opts.xtol);
                if cost_converged || step_converged {
                    let covariance = covariance_from_jacobian(&jac, cost, n_obs);
                    debug!(iterations, cost, "LM fit converged");
                    return Ok(LmOutcome {
                        params,
                        covariance,
                        cost,
                        iterations,
                    });
                }
                break;
            }

            lambda *= LAMBDA_UP;
            trace!(iterations, lambda, trial_cost, "rejected LM step");
        }

        if !accepted {
            // λ hit its ceiling without any acceptable step: the iterate is a
            // stationary point of the damped model but not a converged one.
            return Err(AnalysisError::FitDidNotConverge { iterations, cost });
        }
    }

    Err(AnalysisError::FitDidNotConverge {
        iterations: opts.max_iterations,
        cost,
    })
}

fn eval_residuals<R>(
    residuals: &R,
    params: &[f64],
    n_obs: usize,
) -> Result<DVector<f64>, AnalysisError>
where
    R: Fn(&[f64]) -> Vec<f64>,
{
    let r = residuals(params);
    if r.len() != n_obs {
        return Err(AnalysisError::shape("residual vector", n_obs, r.len()));
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::invalid("model produced non-finite residuals"));
    }
    Ok(DVector::from_vec(r))
}

/// Forward-difference Jacobian of the residual vector.
fn forward_jacobian<R>(
    residuals: &R,
    params: &DVector<f64>,
    r0: &DVector<f64>,
    n_obs: usize,
) -> Result<DMatrix<f64>, AnalysisError>
where
    R: Fn(&[f64]) -> Vec<f64>,
{
    let n_params = params.len();
    let mut jac = DMatrix::zeros(n_obs, n_params);
    let mut perturbed = params.clone();

    for j in 0..n_params {
        let h = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
        perturbed[j] = params[j] + h;
        let rj = eval_residuals(residuals, perturbed.as_slice(), n_obs)?;
        perturbed[j] = params[j];

        for i in 0..n_obs {
            jac[(i, j)] = (rj[i] - r0[i]) / h;
        }
    }
    Ok(jac)
}

/// Euclidean norm of each Jacobian column, floored to keep the damping term
/// well-defined for columns the model is insensitive to.
fn column_norms(jac: &DMatrix<f64>) -> Vec<f64> {
    (0..jac.ncols())
        .map(|j| jac.column(j).norm().max(1e-12))
        .collect()
}

/// Solve the damped least-squares subproblem for one trial step.
///
/// Returns `None` if the augmented system is too ill-conditioned to solve
/// robustly at this damping level.
fn solve_damped_step(
    jac: &DMatrix<f64>,
    r: &DVector<f64>,
    scaling: &[f64],
    lambda: f64,
) -> Option<DVector<f64>> {
    let n_obs = jac.nrows();
    let n_params = jac.ncols();
    let sqrt_lambda = lambda.sqrt();

    let mut augmented = DMatrix::zeros(n_obs + n_params, n_params);
    let mut rhs = DVector::zeros(n_obs + n_params);
    augmented.view_mut((0, 0), (n_obs, n_params)).copy_from(jac);
    for (j, &scale) in scaling.iter().enumerate() {
        augmented[(n_obs + j, j)] = sqrt_lambda * scale;
    }
    for i in 0..n_obs {
        rhs[i] = -r[i];
    }

    // SVD solve with a tolerance ladder, loosening if the strict solve fails.
    let svd = augmented.svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(step) = svd.solve(&rhs, tol) {
            if step.iter().all(|v| v.is_finite()) {
                return Some(step.column(0).into_owned());
            }
        }
    }
    None
}

/// Covariance estimate at the solution.
///
/// Pseudo-inverse of `JᵀJ` via SVD, with singular directions dropped the way
/// a conventional curve-fit covariance is computed, scaled by the reduced
/// chi-squared `cost / (n - p)`. With `n == p` there is no residual degree of
/// freedom and the covariance is reported as infinite.
fn covariance_from_jacobian(jac: &DMatrix<f64>, cost: f64, n_obs: usize) -> DMatrix<f64> {
    let n_params = jac.ncols();
    if n_obs <= n_params {
        return DMatrix::from_element(n_params, n_params, f64::INFINITY);
    }

    let svd = jac.clone().svd(false, true);
    let Some(v_t) = svd.v_t else {
        return DMatrix::from_element(n_params, n_params, f64::INFINITY);
    };

    let s_max = svd.singular_values.amax();
    let threshold = s_max * (n_obs.max(n_params) as f64) * f64::EPSILON;

    // C = V Σ⁻² Vᵀ over the well-determined directions.
    let mut cov = DMatrix::zeros(n_params, n_params);
    for (k, &s) in svd.singular_values.iter().enumerate() {
        if s <= threshold {
            continue;
        }
        let inv_s2 = 1.0 / (s * s);
        let vk = v_t.row(k);
        for i in 0..n_params {
            for j in 0..n_params {
                cov[(i, j)] += inv_s2 * vk[i] * vk[j];
            }
        }
    }

    let scale = cost / (n_obs - n_params) as f64;
    cov * scale
}
