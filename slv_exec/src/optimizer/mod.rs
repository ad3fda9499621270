//! # Optimizer module
//!
//! Inverse kinematics minimisers. An optimizer moves the free joints of a chain so that the
//! end-effector reaches the desired pose (the primary task) while two secondary objectives are
//! pursued without disturbing it: a second end-effector position (the second task) and a preferred
//! posture (the rest, or third, task).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod dls;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;
use comms_if::slv::PoseMode;

use crate::chain::{KinematicChain, LinIneqConstr};

pub use dls::DampedLsqMin;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Specification of the second task.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondTask {
    /// Chain link whose end is the second end-effector, `None` disables the task
    pub link: Option<usize>,

    /// Desired position of the second end-effector (m)
    pub xd: Vector3<f64>,

    /// Per-axis weights of the second task
    pub w: Vector3<f64>,
}

/// A single inverse kinematics problem.
#[derive(Debug, Clone)]
pub struct IkProblem<'a> {
    /// Desired pose, `[x y z]` or `[x y z ax ay az theta]`
    pub xd: &'a [f64],

    /// Pose mode, full pose targets with fewer than 7 components are solved for position only
    pub pose: PoseMode,

    /// Weight of the second task, 0 disables it
    pub weight_2nd: f64,

    pub task_2nd: &'a SecondTask,

    /// Weight of the rest task, 0 disables it
    pub weight_3rd: f64,

    /// Rest targets of the free joints (rad)
    pub qd_3rd: &'a [f64],

    /// Rest weights of the free joints
    pub w_3rd: &'a [f64],

    /// Linear inequality constraints on the joints
    pub constraints: Option<&'a LinIneqConstr>,
}

/// Information passed to the iteration callback.
#[derive(Debug)]
pub struct IterationInfo<'a> {
    pub iteration: usize,

    /// Free joint angles at this iteration (rad)
    pub q: &'a [f64],

    /// End-effector pose at this iteration
    pub x: &'a [f64],
}

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Free joint angles (rad)
    pub q: Vec<f64>,

    /// Whether the primary task reached its tolerances
    pub converged: bool,

    pub iterations: usize,

    /// Final position error norm (m)
    pub position_error: f64,

    /// Final orientation error norm (rad), zero for position-only problems
    pub angle_error: f64,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// An inverse kinematics minimiser.
///
/// The chain's current free angles are the starting point of the solve. On return the chain holds
/// the solution. If the iteration cap is reached the best estimate is returned with
/// `converged == false`.
pub trait IkOptimizer: Send {
    fn solve(
        &self,
        chain: &mut KinematicChain,
        problem: &IkProblem,
        callback: Option<&mut dyn FnMut(&IterationInfo)>,
    ) -> IkSolution;

    /// Override the tolerance on the position error.
    fn set_translational_tol(&mut self, tol: f64);
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SecondTask {
    /// A disabled second task.
    pub fn disabled() -> Self {
        Self {
            link: None,
            xd: Vector3::zeros(),
            w: Vector3::zeros(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.link.is_some()
    }
}

impl Default for SecondTask {
    fn default() -> Self {
        Self::disabled()
    }
}
