//! Damped least squares minimiser

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use comms_if::slv::PoseMode;

use super::{IkOptimizer, IkProblem, IkSolution, IterationInfo};
use crate::chain::{self, KinematicChain};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Damping factor of the primary task step
const DAMPING: f64 = 0.01;

/// Gain applied to the normalised secondary tasks gradient
const SECONDARY_GAIN: f64 = 0.5;

/// Largest secondary step per iteration (rad)
const MAX_SECONDARY_STEP: f64 = 0.1;

/// Number of passes made when projecting onto the linear constraints
const CONSTR_PASSES: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Bounded damped least squares minimiser.
///
/// Each iteration takes a damped least squares step towards the primary task, adds the gradient of
/// the second and rest tasks projected into the null space of the primary task, clamps the joints
/// into their bounds and projects them onto any active linear constraints.
#[derive(Debug, Clone)]
pub struct DampedLsqMin {
    /// Tolerance on the orientation error and on the final step size
    pub tol: f64,

    pub max_iter: usize,

    /// Tolerance on the position error, defaults to `tol`
    pub xyz_tol: Option<f64>,

    /// Normalise the Jacobian columns before each step
    pub user_scaling: bool,
}

/// Primary task error
struct PrimaryError {
    e: DVector<f64>,
    position: f64,
    angle: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DampedLsqMin {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self {
            tol,
            max_iter,
            xyz_tol: None,
            user_scaling: true,
        }
    }

    fn position_tol(&self) -> f64 {
        self.xyz_tol.unwrap_or(self.tol)
    }

    fn primary_ok(&self, err: &PrimaryError, full_pose: bool) -> bool {
        err.position < self.position_tol() && (!full_pose || err.angle < self.tol)
    }
}

impl IkOptimizer for DampedLsqMin {
    fn solve(
        &self,
        chain: &mut KinematicChain,
        problem: &IkProblem,
        mut callback: Option<&mut dyn FnMut(&IterationInfo)>,
    ) -> IkSolution {
        let n = chain.dof();
        let full_pose = problem.pose == PoseMode::Full && problem.xd.len() >= 7;
        let rows = if full_pose { 6 } else { 3 };

        if problem.xd.len() < 3 {
            return IkSolution {
                q: chain.free_angles(),
                converged: false,
                iterations: 0,
                position_error: f64::NAN,
                angle_error: f64::NAN,
            };
        }

        let pd = Vector3::new(problem.xd[0], problem.xd[1], problem.xd[2]);
        let rd = if full_pose {
            Some(chain::rotation(&chain::transform_from_pose(problem.xd)))
        } else {
            None
        };

        let bounds = chain.free_bounds();
        let constr = problem.constraints.and_then(|c| c.for_free(chain));
        let task_2nd = problem.task_2nd;
        let weight_2nd = match task_2nd.link {
            Some(l) if l < chain.n() => problem.weight_2nd.max(0.0),
            _ => 0.0
        };
        let weight_3rd = problem.weight_3rd.max(0.0);

        let mut q = DVector::from_vec(chain.free_angles());
        let mut last_step = f64::INFINITY;
        let mut iterations = 0;

        while iterations < self.max_iter && n > 0 {
            let q_full = chain.expand_free(q.as_slice());
            let h = chain.end_eff_transform(&q_full);
            let err = primary_error(&h, &pd, rd.as_ref());

            if let Some(cb) = callback.as_mut() {
                let x = chain::pose_from_transform(&h);
                cb(&IterationInfo {
                    iteration: iterations,
                    q: q.as_slice(),
                    x: &x,
                });
            }

            if self.primary_ok(&err, full_pose) && last_step < self.tol {
                break;
            }

            // ---- PRIMARY TASK ----

            let jac = chain.jacobian(&q_full, None, rows);
            let scale = column_scaling(&jac, self.user_scaling);
            let js = &jac * &scale;

            let damped = &js * js.transpose() + DMatrix::identity(rows, rows) * DAMPING.powi(2);
            let damped_inv = match damped.try_inverse() {
                Some(i) => i,
                None => break
            };
            let pinv = &scale * js.transpose() * damped_inv;
            let dq_primary = &pinv * &err.e;

            // ---- SECONDARY TASKS ----

            let mut grad = DVector::zeros(n);

            if weight_2nd > 0.0 {
                if let Some(link) = task_2nd.link {
                    if let Some(p2) = chain.link_position(&q_full, link) {
                        let e2 = (task_2nd.xd - p2).component_mul(&task_2nd.w);
                        let j2 = chain.jacobian(&q_full, Some(link + 1), 3);
                        grad += j2.transpose() * DVector::from_column_slice(e2.as_slice())
                            * weight_2nd;
                    }
                }
            }

            if weight_3rd > 0.0 {
                let len = n.min(problem.qd_3rd.len()).min(problem.w_3rd.len());
                for i in 0..len {
                    grad[i] += weight_3rd * problem.w_3rd[i] * (problem.qd_3rd[i] - q[i]);
                }
            }

            let total_weight = weight_2nd + weight_3rd;
            let mut dq_secondary = if total_weight > 0.0 {
                (DMatrix::identity(n, n) - &pinv * &jac) * grad * (SECONDARY_GAIN / total_weight)
            } else {
                DVector::zeros(n)
            };

            let norm = dq_secondary.norm();
            if norm > MAX_SECONDARY_STEP {
                dq_secondary *= MAX_SECONDARY_STEP / norm;
            }

            // ---- UPDATE ----

            let q_prev = q.clone();
            q += dq_primary + dq_secondary;
            clamp_to_bounds(&mut q, &bounds);

            if let Some(c) = constr.as_ref() {
                for _ in 0..CONSTR_PASSES {
                    c.project(&mut q);
                    clamp_to_bounds(&mut q, &bounds);
                }
            }

            last_step = (&q - q_prev).norm();
            iterations += 1;
        }

        // Install the solution in the chain and evaluate it
        let q = chain.set_free_angles(q.as_slice());
        let h = chain.end_eff_transform(&chain.all_angles());
        let err = primary_error(&h, &pd, rd.as_ref());

        trace!(
            "DampedLsqMin: {} iterations, position error {:e} m, angle error {:e} rad",
            iterations,
            err.position,
            err.angle
        );

        IkSolution {
            q,
            converged: self.primary_ok(&err, full_pose),
            iterations,
            position_error: err.position,
            angle_error: err.angle,
        }
    }

    fn set_translational_tol(&mut self, tol: f64) {
        self.xyz_tol = Some(tol);
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn primary_error(
    h: &nalgebra::Matrix4<f64>,
    pd: &Vector3<f64>,
    rd: Option<&Matrix3<f64>>
) -> PrimaryError {
    let ep = pd - chain::translation(h);

    match rd {
        Some(rd) => {
            let rc = chain::rotation(h);
            let eo = Rotation3::from_matrix_unchecked(rd * rc.transpose()).scaled_axis();

            PrimaryError {
                e: DVector::from_column_slice(&[ep.x, ep.y, ep.z, eo.x, eo.y, eo.z]),
                position: ep.norm(),
                angle: eo.norm(),
            }
        },
        None => PrimaryError {
            e: DVector::from_column_slice(&[ep.x, ep.y, ep.z]),
            position: ep.norm(),
            angle: 0.0,
        }
    }
}

/// Diagonal matrix normalising the columns of `jac`, or identity if scaling is disabled.
fn column_scaling(jac: &DMatrix<f64>, enabled: bool) -> DMatrix<f64> {
    let n = jac.ncols();
    if !enabled {
        return DMatrix::identity(n, n);
    }

    let diag = DVector::from_iterator(
        n,
        (0..n).map(|j| {
            let norm = jac.column(j).norm();
            if norm > 1e-9 { 1.0 / norm } else { 1.0 }
        })
    );

    DMatrix::from_diagonal(&diag)
}

fn clamp_to_bounds(q: &mut DVector<f64>, bounds: &[(f64, f64)]) {
    for (i, (min, max)) in bounds.iter().enumerate() {
        q[i] = util::maths::clamp(&q[i], min, max);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::{icub_arm, LinIneqConstr, Side, ARM_ELBOW_LINK};
    use crate::optimizer::SecondTask;

    /// An arm target reachable from a known configuration near the starting one
    fn reachable_target(chain: &KinematicChain) -> (Vec<f64>, Vec<f64>) {
        let q0 = chain.free_angles();
        let offsets = [0.2, 0.15, -0.1, 0.25, 0.1, -0.1, 0.2];
        let qt: Vec<f64> = q0.iter().zip(offsets.iter()).map(|(a, b)| a + b).collect();
        (qt.clone(), chain.end_eff_pose_for(&qt))
    }

    fn start_chain() -> KinematicChain {
        let mut chain = icub_arm(Side::Right);
        chain.set_free_angles(&[
            -0.5, 0.5, 0.3, 0.8, 0.0, 0.0, 0.0
        ]);
        chain
    }

    #[test]
    fn test_position_only() {
        let mut chain = start_chain();
        let (_, xd) = reachable_target(&chain);
        let slv = DampedLsqMin::new(1e-3, 200);
        let task_2nd = SecondTask::disabled();

        let problem = IkProblem {
            xd: &xd[0..3],
            pose: PoseMode::Full,
            weight_2nd: 0.0,
            task_2nd: &task_2nd,
            weight_3rd: 0.0,
            qd_3rd: &[],
            w_3rd: &[],
            constraints: None,
        };

        let sol = slv.solve(&mut chain, &problem, None);
        assert!(sol.converged, "position error {}", sol.position_error);
        assert!(sol.position_error < 1e-3);
        assert_eq!(sol.angle_error, 0.0);
        assert_eq!(sol.q, chain.free_angles());
    }

    #[test]
    fn test_full_pose_with_secondary_tasks() {
        let mut chain = start_chain();
        let (qt, xd) = reachable_target(&chain);
        let slv = DampedLsqMin::new(1e-3, 500);
        let task_2nd = SecondTask {
            link: Some(ARM_ELBOW_LINK),
            xd: Vector3::new(0.0, 0.0, -1.0),
            w: Vector3::new(0.0, 0.0, 1.0),
        };
        let mut cns = LinIneqConstr::icub_shoulder();
        cns.update(&chain);

        let w_3rd = vec![1.0; 7];
        let problem = IkProblem {
            xd: &xd,
            pose: PoseMode::Full,
            weight_2nd: 0.01,
            task_2nd: &task_2nd,
            weight_3rd: 0.01,
            qd_3rd: &qt,
            w_3rd: &w_3rd,
            constraints: Some(&cns),
        };

        let mut num_iters = 0;
        let mut cb = |info: &IterationInfo| {
            assert_eq!(info.q.len(), 7);
            assert_eq!(info.x.len(), 7);
            num_iters += 1;
        };

        let sol = slv.solve(&mut chain, &problem, Some(&mut cb));
        assert!(sol.converged, "errors {} {}", sol.position_error, sol.angle_error);
        assert!(num_iters >= sol.iterations);

        // Bounds are respected
        for (q, (min, max)) in sol.q.iter().zip(chain.free_bounds().iter()) {
            assert!(q >= min && q <= max);
        }
    }

    #[test]
    fn test_unreachable_returns_best_estimate() {
        let mut chain = start_chain();
        let slv = DampedLsqMin::new(1e-3, 50);
        let task_2nd = SecondTask::disabled();
        let xd = [5.0, 5.0, 5.0];

        let problem = IkProblem {
            xd: &xd,
            pose: PoseMode::Xyz,
            weight_2nd: 0.0,
            task_2nd: &task_2nd,
            weight_3rd: 0.0,
            qd_3rd: &[],
            w_3rd: &[],
            constraints: None,
        };

        let sol = slv.solve(&mut chain, &problem, None);
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 50);
        assert!(sol.position_error > 1.0);
    }

    #[test]
    fn test_translational_tol() {
        let mut slv = DampedLsqMin::new(1e-3, 10);
        assert_eq!(slv.position_tol(), 1e-3);
        slv.set_translational_tol(1e-6);
        assert_eq!(slv.position_tol(), 1e-6);
    }
}
