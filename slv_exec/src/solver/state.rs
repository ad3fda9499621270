//! State of an open solver
//!
//! Everything in here is guarded by the solver lock.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::atomic::AtomicBool,
    thread,
    time::{Duration, Instant},
};
use log::{info, warn};
use comms_if::slv::{PoseMode, SolutionMsg, Switch};

use super::{OpenError, SolverOptions};
use crate::{
    chain::{pose_from_transform, transform_from_pose},
    device::{wait_part, DeviceBinding, DeviceContext, DeviceError},
    optimizer::{DampedLsqMin, IkOptimizer, IkProblem, IkSolution, IterationInfo, SecondTask},
    output::SolutionSink,
    part_desc::{build_descriptor, LimbVariant, PartDescriptor},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Weight of the second task
pub const WEIGHT_2ND_TASK: f64 = 0.01;

/// Weight of the rest task
pub const WEIGHT_3RD_TASK: f64 = 0.01;

/// Movement of the uncontrolled joints above which a new solve is triggered (deg)
pub const UNCTRL_JOINTS_THRES_DEG: f64 = 0.1;

/// Longest time spent waiting for a part's encoders when a blocking read is requested
const FEEDBACK_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SolverState {
    pub(super) name: String,

    pub(super) desc: PartDescriptor,

    /// One binding per part, in chain order
    pub(super) bindings: Vec<DeviceBinding>,

    pub(super) optimizer: Box<dyn IkOptimizer>,

    /// Current DOF mask, one entry per chain joint
    pub(super) dof: Vec<f64>,

    /// True if no joint is blocked
    pub(super) full_dof: bool,

    /// Rest position of every chain joint (rad)
    pub(super) rest_pos: Vec<f64>,

    pub(super) rest_weights: Vec<f64>,

    /// Rest targets of the free joints (rad)
    pub(super) qd_3rd: Vec<f64>,

    /// Effective rest weights of the free joints
    pub(super) w_3rd: Vec<f64>,

    /// 1 for the free joints excluded from the weighted rest task, 0 otherwise
    pub(super) idx_3rd: Vec<f64>,

    pub(super) task_2nd: SecondTask,

    pub(super) ctrl_pose: PoseMode,

    pub(super) verbosity: bool,

    pub(super) inter_points: bool,

    pub(super) period: Duration,

    /// Angles of the blocked joints at the last activation (rad)
    pub(super) unctrl_old: Vec<f64>,

    pub(super) num_unctrl: usize,
}

/// Outcome of a solve.
#[derive(Debug, Clone)]
pub struct SolveOutput {
    /// Achieved pose
    pub x: Vec<f64>,

    /// Free joint angles (deg)
    pub q: Vec<f64>,

    pub solution: IkSolution,

    pub elapsed: Duration,
}

/// Reply to an `ask` query.
#[derive(Debug, Clone)]
pub struct AskOutput {
    /// Achieved pose
    pub x: Vec<f64>,

    /// Angles of every chain joint, blocked ones included (deg)
    pub q: Vec<f64>,

    pub solution: IkSolution,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SolverState {
    /// Build the descriptor, bind the hardware and set up every task from the options.
    pub(super) fn open(
        name: &str,
        ctx: &dyn DeviceContext,
        variant: &LimbVariant,
        options: &SolverOptions,
        interrupt: &AtomicBool
    ) -> Result<Self, OpenError> {
        let desc = build_descriptor(variant, name, options)?;
        let n = desc.chain.n();

        // ---- DEVICES ----

        let mut bindings = Vec::with_capacity(desc.parts.len());
        let mut remaining = n;

        for part in desc.parts.iter() {
            info!("{}: allocating device driver for {} ...", name, part.remote);

            let handles = if options.ping_robot_tmo > 0.0 {
                wait_part(
                    ctx,
                    part,
                    Duration::from_secs_f64(options.ping_robot_tmo),
                    interrupt
                )?
            } else {
                ctx.open_part(part)?
            };

            let binding = DeviceBinding::bind(part, handles, remaining)?;
            remaining -= binding.joints();
            bindings.push(binding);
        }

        if remaining > 0 {
            return Err(OpenError::JointCountMismatch {
                expected: n,
                found: n - remaining,
            });
        }

        // ---- OPTIMIZER ----

        let mut optimizer = DampedLsqMin::new(options.tol, options.max_iter);
        optimizer.user_scaling = options.user_scaling == Switch::On;
        if let Some(tol) = options.xyz_tol {
            optimizer.set_translational_tol(tol);
        }

        let task_2nd = desc.variant.default_second_task();

        let mut state = Self {
            name: name.into(),
            desc,
            bindings,
            optimizer: Box::new(optimizer),
            dof: Vec::new(),
            full_dof: false,
            rest_pos: vec![0.0; n],
            rest_weights: vec![0.0; n],
            qd_3rd: Vec::new(),
            w_3rd: Vec::new(),
            idx_3rd: Vec::new(),
            task_2nd,
            ctrl_pose: options.pose,
            verbosity: options.verbose(),
            inter_points: options.inter_points == Switch::On,
            period: Duration::from_millis(options.period.max(1)),
            unctrl_old: Vec::new(),
            num_unctrl: 0,
        };

        // ---- DOF ----

        state.encode_dof();
        if let Some(dof) = options.dof.as_ref() {
            state.decode_dof(dof);
            state.encode_dof();
        }

        // Bounds come before the rest position, which is clamped into them
        state.align_bounds()?;

        // ---- REST TASK ----

        if let Some(pos) = options.rest_pos.as_ref() {
            state.handle_rest_pos(pos);
        }
        if let Some(w) = options.rest_weights.as_ref() {
            state.handle_rest_weights(w);
        }
        state.prepare_rest_task();

        if let Some(c) = state.desc.constraint.as_mut() {
            c.update(&state.desc.chain);
        }

        state.count_uncontrolled();

        Ok(state)
    }

    // ---- DOF ----

    /// Derive the DOF mask from the chain's blocked links.
    pub(super) fn encode_dof(&mut self) -> &[f64] {
        let chain = &self.desc.chain;
        self.dof = (0..chain.n())
            .map(|i| if chain.is_blocked(i) { 0.0 } else { 1.0 })
            .collect();
        self.full_dof = self.dof.iter().all(|d| *d != 0.0);

        &self.dof
    }

    /// Apply a DOF mask to the chain.
    ///
    /// Nonzero entries release the joint, zero entries block it and entries greater than one leave
    /// it untouched. The limb may adjust the mask first, see [`LimbVariant::filter_dof`].
    pub(super) fn decode_dof(&mut self, requested: &[f64]) {
        let dof = self.desc.variant.filter_dof(&self.dof, requested);
        let len = self.desc.chain.n().min(dof.len());

        for (i, d) in dof.iter().enumerate().take(len) {
            if *d > 1.0 {
                continue;
            } else if *d != 0.0 {
                self.desc.chain.release_link(i);
            } else {
                self.desc.chain.block_link(i);
            }
        }

        if let Some(c) = self.desc.constraint.as_mut() {
            c.update(&self.desc.chain);
        }

        self.prepare_rest_task();
    }

    /// Returns true if `dof` differs from the current mask, ignoring entries greater than one.
    pub(super) fn is_new_dof(&self, dof: &[f64]) -> bool {
        self.dof.iter()
            .zip(dof.iter())
            .any(|(cur, new)| *new <= 1.0 && cur != new)
    }

    /// Apply a new DOF mask. Returns true if the chain's structure changed, in which case the
    /// uncontrolled joints are counted again and latched from fresh feedback.
    pub(super) fn change_dof(&mut self, dof: &[f64]) -> bool {
        let cur = self.dof.clone();

        self.decode_dof(dof);
        self.encode_dof();

        if self.dof == cur {
            return false;
        }

        info!("{}: DOF changed to {:?}", self.name, self.dof);

        self.count_uncontrolled();
        self.read_feedback(false);
        self.unctrl_old = self.latch_uncontrolled();

        true
    }

    /// One entry per chain joint, 1 if the joint is free.
    pub(super) fn dof_info(&self) -> Vec<i64> {
        let chain = &self.desc.chain;
        (0..chain.n())
            .map(|i| if chain.is_blocked(i) { 0 } else { 1 })
            .collect()
    }

    // ---- REST TASK ----

    /// Derive the rest task of the free joints from the rest position and weights of the chain.
    ///
    /// Free joints with a zero weight are excluded from the weighted task: they get a unit weight
    /// and are held at their current angle when a solve starts.
    pub(super) fn prepare_rest_task(&mut self) {
        let free = self.desc.chain.free_indices();

        self.qd_3rd = free.iter().map(|i| self.rest_pos[*i]).collect();
        self.w_3rd = free.iter()
            .map(|i| if self.rest_weights[*i] != 0.0 { self.rest_weights[*i] } else { 1.0 })
            .collect();
        self.idx_3rd = free.iter()
            .map(|i| if self.rest_weights[*i] != 0.0 { 0.0 } else { 1.0 })
            .collect();
    }

    /// Set the rest position from values in degrees, each clamped into its joint's bounds.
    ///
    /// Only the first entries are set if fewer values than joints are given.
    pub(super) fn handle_rest_pos(&mut self, pos_deg: &[f64]) {
        for (i, (dst, src)) in self.rest_pos.iter_mut().zip(pos_deg.iter()).enumerate() {
            *dst = match self.desc.chain.link(i) {
                Some(l) => l.clamp(src.to_radians()),
                None => src.to_radians()
            };
        }
    }

    /// Set the rest weights, negative weights are replaced by zero.
    ///
    /// Only the first entries are set if fewer values than joints are given.
    pub(super) fn handle_rest_weights(&mut self, weights: &[f64]) {
        for (dst, src) in self.rest_weights.iter_mut().zip(weights.iter()) {
            *dst = src.max(0.0);
        }
    }

    pub(super) fn rest_pos_deg(&self) -> Vec<f64> {
        self.rest_pos.iter().map(|a| a.to_degrees()).collect()
    }

    // ---- FEEDBACK ----

    /// Read the encoders of every part into the chain.
    ///
    /// A part which can't be read keeps its previous angles. With `wait` each part is retried for
    /// up to a second before giving up.
    pub(super) fn read_feedback(&mut self, wait: bool) {
        let mut cnt = 0;

        for b in self.bindings.iter() {
            let read = if wait {
                read_blocking(b, self.period / 4)
            } else {
                b.read()
            };

            match read {
                Ok(angles) => {
                    for (j, ang) in angles.iter().enumerate() {
                        let i = cnt + j;
                        let ang = ang.to_radians();

                        if self.desc.chain.is_blocked(i) {
                            self.desc.chain.set_blocking_value(i, ang);
                        } else {
                            self.desc.chain.set_ang(i, ang);
                        }
                    }
                },
                Err(e) => {
                    warn!("{}: timeout detected on part {}: {}", self.name, b.part(), e);
                }
            }

            cnt += b.joints();
        }
    }

    /// Install the hardware joint limits as the chain's bounds.
    pub(super) fn align_bounds(&mut self) -> Result<(), DeviceError> {
        info!("{}: aligning joints bounds ...", self.name);

        let mut cnt = 0;
        for (p, b) in self.bindings.iter().enumerate() {
            info!("part #{}: {}", p, b.part());

            for j in 0..b.joints() {
                let (min, max) = b.limits(j)?;
                info!("joint #{}: [{}, {}] deg", cnt, min, max);

                self.desc.chain.set_bounds(cnt, min.to_radians(), max.to_radians());
                cnt += 1;
            }
        }

        Ok(())
    }

    /// Narrow the bounds of a chain joint (deg).
    ///
    /// Accepted only if the new range lies within the hardware limits of the joint.
    pub(super) fn set_limits(&mut self, axis: usize, min: f64, max: f64) -> bool {
        let mut cnt = 0;

        for b in self.bindings.iter() {
            if axis < cnt + b.joints() {
                return match b.limits(axis - cnt) {
                    Ok((hw_min, hw_max)) if min >= hw_min && max <= hw_max && min <= max => {
                        self.desc.chain.set_bounds(axis, min.to_radians(), max.to_radians())
                    },
                    Ok(_) => false,
                    Err(e) => {
                        warn!("{}: could not read the limits of joint {}: {}", self.name, axis, e);
                        false
                    }
                };
            }
            cnt += b.joints();
        }

        false
    }

    /// Bounds of a chain joint (deg).
    pub(super) fn limits(&self, axis: usize) -> Option<(f64, f64)> {
        self.desc.chain.link(axis).map(|l| (l.min.to_degrees(), l.max.to_degrees()))
    }

    // ---- UNCONTROLLED JOINTS ----

    pub(super) fn count_uncontrolled(&mut self) {
        self.num_unctrl = self.desc.chain.n() - self.desc.chain.dof();
    }

    /// Angles of the blocked joints (rad).
    pub(super) fn latch_uncontrolled(&self) -> Vec<f64> {
        let chain = &self.desc.chain;
        (0..chain.n())
            .filter(|i| chain.is_blocked(*i))
            .map(|i| chain.ang(i))
            .collect()
    }

    /// Latch the blocked joints and return how far they moved since the last latch (deg).
    pub(super) fn uncontrolled_movement(&mut self) -> f64 {
        let unctrl = self.latch_uncontrolled();

        let unctrl_deg: Vec<f64> = unctrl.iter().map(|a| a.to_degrees()).collect();
        let old_deg: Vec<f64> = self.unctrl_old.iter().map(|a| a.to_degrees()).collect();
        let dist = util::maths::norm(&unctrl_deg, &old_deg).unwrap_or(0.0);

        self.unctrl_old = unctrl;
        dist
    }

    // ---- TIP AND SECOND TASK ----

    /// Install a tip frame given as `[x y z ax ay az theta]`. Needs at least 7 values.
    pub(super) fn set_tip_frame(&mut self, tip: &[f64]) -> bool {
        if tip.len() < 7 {
            return false;
        }

        self.desc.chain.set_hn(transform_from_pose(&tip[..7]));
        true
    }

    pub(super) fn tip_frame(&self) -> Vec<f64> {
        pose_from_transform(self.desc.chain.hn())
    }

    /// Specify the second task. A negative link disables it.
    pub(super) fn set_second_task(&mut self, link: i64, xd: &[f64], w: &[f64]) -> bool {
        if xd.len() < 3 || w.len() < 3 || link >= self.desc.chain.n() as i64 {
            return false;
        }

        for i in 0..3 {
            self.task_2nd.xd[i] = xd[i];
            self.task_2nd.w[i] = w[i];
        }
        self.task_2nd.link = if link >= 0 { Some(link as usize) } else { None };

        true
    }

    // ---- SOLVE ----

    /// Solve for `xd` starting from the chain's current angles, leaving the solution in the chain.
    ///
    /// If intermediate points are enabled and a sink is given every iteration is published to it
    /// with `token`.
    pub(super) fn solve(
        &mut self,
        xd: &[f64],
        pose: PoseMode,
        sink: Option<&dyn SolutionSink>,
        token: Option<f64>
    ) -> SolveOutput {
        // Joints excluded from the rest task are held where they are
        let free = self.desc.chain.free_angles();
        for (i, ang) in free.iter().enumerate() {
            if self.idx_3rd.get(i).copied().unwrap_or(0.0) != 0.0 {
                if let Some(qd) = self.qd_3rd.get_mut(i) {
                    *qd = *ang;
                }
            }
        }

        let problem = IkProblem {
            xd,
            pose,
            weight_2nd: if self.task_2nd.is_enabled() { WEIGHT_2ND_TASK } else { 0.0 },
            task_2nd: &self.task_2nd,
            weight_3rd: WEIGHT_3RD_TASK,
            qd_3rd: &self.qd_3rd,
            w_3rd: &self.w_3rd,
            constraints: self.desc.constraint.as_ref(),
        };

        let start = Instant::now();

        let solution = match sink {
            Some(sink) if self.inter_points => {
                let mut publish = |info: &IterationInfo| {
                    sink.publish(&SolutionMsg {
                        xd: xd.to_vec(),
                        x: info.x.to_vec(),
                        q: info.q.iter().map(|a| a.to_degrees()).collect(),
                        token,
                    })
                };
                self.optimizer.solve(&mut self.desc.chain, &problem, Some(&mut publish))
            },
            _ => self.optimizer.solve(&mut self.desc.chain, &problem, None)
        };

        let elapsed = start.elapsed();

        if !solution.converged {
            warn!(
                "{}: solver did not converge after {} iterations (position error {:.3e} m)",
                self.name,
                solution.iterations,
                solution.position_error
            );
        }

        let out = SolveOutput {
            x: self.desc.chain.end_eff_pose(),
            q: solution.q.iter().map(|a| a.to_degrees()).collect(),
            solution,
            elapsed,
        };

        if self.verbosity {
            self.print_info(xd, &out, pose);
        }

        out
    }

    /// Solve a one-off query without altering the state used by the solver loop.
    ///
    /// The solve starts from `q0` (free joints, deg) if given, otherwise from the current
    /// feedback. `pose` overrides the pose mode for this query only.
    pub(super) fn ask(
        &mut self,
        xd: &[f64],
        q0: Option<&[f64]>,
        pose: Option<PoseMode>
    ) -> AskOutput {
        let chain = self.desc.chain.clone();
        let qd_3rd = self.qd_3rd.clone();

        match q0 {
            Some(q) => {
                let q: Vec<f64> = q.iter().map(|a| a.to_radians()).collect();
                self.desc.chain.set_free_angles(&q);
            },
            None => self.read_feedback(false)
        }

        let pose = pose.unwrap_or(self.ctrl_pose);
        let out = self.solve(xd, pose, None, None);
        let q = self.desc.chain.all_angles().iter().map(|a| a.to_degrees()).collect();

        self.desc.chain = chain;
        self.qd_3rd = qd_3rd;

        AskOutput {
            x: out.x,
            q,
            solution: out.solution,
        }
    }

    fn print_info(&self, xd: &[f64], out: &SolveOutput, pose: PoseMode) {
        let e: Vec<f64> = xd.iter().zip(out.x.iter()).map(|(a, b)| a - b).collect();
        let norm = |s: &[f64]| s.iter().map(|v| v * v).sum::<f64>().sqrt();

        info!("{}: target rxPose   [m] = {:?}", self.name, xd);
        info!("{}: target txPose   [m] = {:?}", self.name, out.x);
        info!("{}: target txJoints [deg] = {:?}", self.name, out.q);
        info!("{}: norm(rxPose-txPose) pos [m] = {}", self.name, norm(&e[..e.len().min(3)]));
        if pose == PoseMode::Full && e.len() > 3 {
            info!("{}: norm(rxPose-txPose) ang [*] = {}", self.name, norm(&e[3..]));
        }
        info!("{}: computed in [s] = {}", self.name, out.elapsed.as_secs_f64());
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read a part's encoders, retrying every `retry` until the read succeeds or the wait times out.
fn read_blocking(b: &DeviceBinding, retry: Duration) -> Result<Vec<f64>, DeviceError> {
    let start = Instant::now();

    loop {
        match b.read() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if start.elapsed() >= FEEDBACK_WAIT_TIMEOUT {
                    return Err(e);
                }
                thread::sleep(retry);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
