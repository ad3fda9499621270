//! # Cartesian solver
//!
//! The solver owns a kinematic chain bound to the robot's hardware and computes the joint angles
//! that bring the chain's end-effector to the targets received on its input channel. Three threads
//! share it:
//!
//! - the rate thread, which runs one activation of the solver loop every period,
//! - the input listener, which buffers targets and configuration updates,
//! - the command server, which reads and writes the solver's settings and answers one-off `ask`
//!   queries.
//!
//! The chain and everything derived from it live in a [`SolverState`] guarded by the solver lock,
//! which is held for a whole activation. The input channel has its own lock so that the listener is
//! never blocked by a solve.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod options;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use log::{info, warn};
use comms_if::slv::{InputMsg, PoseMode, SolutionMsg, TrackMode};

use crate::{
    device::{DeviceContext, DeviceError},
    input::InputChannel,
    output::SolutionSink,
    part_desc::{DescriptorError, LimbVariant},
    rate::{Periodic, RateThread},
};

pub use options::*;
pub use state::{AskOutput, SolveOutput, SolverState, UNCTRL_JOINTS_THRES_DEG};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest time a `set dof` waits for the solver loop to apply the new mask
const DOF_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A Cartesian inverse kinematics solver for one limb.
pub struct CartesianSolver {
    name: String,

    ctx: Arc<dyn DeviceContext>,

    variant: LimbVariant,

    core: Arc<SolverCore>,

    /// The rate thread, its lock also serialises opening and closing
    rate: Mutex<RateThread>,

    configured: AtomicBool,

    closed: AtomicBool,

    /// Raised to abort waiting for the hardware
    interrupting: AtomicBool,
}

/// The part of the solver shared with the rate thread.
pub struct SolverCore {
    name: String,

    /// The solver lock
    state: Mutex<Option<SolverState>>,

    input: InputChannel,

    sink: Arc<dyn SolutionSink>,

    /// Number of activations which handled the DOF mask, with its condition variable
    dof_event: (Mutex<u64>, Condvar),
}

/// Payload of the second task, `(link (x y z) (wx wy wz))`.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondTaskInfo {
    /// Index of the second end-effector's link, -1 if disabled
    pub link: i64,
    pub xd: [f64; 3],
    pub w: [f64; 3],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("The solver has been closed")]
    Closed,

    #[error("Invalid part description: {0}")]
    DescriptorError(#[from] DescriptorError),

    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),

    #[error("The parts provide {found} joints but the chain has {expected}")]
    JointCountMismatch {
        expected: usize,
        found: usize,
    },

    #[error("Could not start the solver thread")]
    StartFailed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CartesianSolver {
    /// Create a new, unconfigured, solver.
    ///
    /// Parts are opened through `ctx` and solutions are published to `sink`.
    pub fn new(
        name: &str,
        variant: LimbVariant,
        ctx: Arc<dyn DeviceContext>,
        sink: Arc<dyn SolutionSink>
    ) -> Self {
        let default = SolverOptions::default();

        Self {
            name: name.into(),
            ctx,
            variant,
            core: Arc::new(SolverCore {
                name: name.into(),
                state: Mutex::new(None),
                input: InputChannel::new(&[], default.pose, default.mode),
                sink,
                dof_event: (Mutex::new(0), Condvar::new()),
            }),
            rate: Mutex::new(RateThread::new(name, Duration::from_millis(DEFAULT_PERIOD_MS))),
            configured: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            interrupting: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &InputChannel {
        &self.core.input
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ---- LIFECYCLE ----

    /// Configure the solver and start its loop.
    ///
    /// Succeeds immediately if the solver is already configured. On failure everything acquired so
    /// far is released and the solver can be configured again.
    pub fn open(&self, options: &SolverOptions) -> Result<(), OpenError> {
        let mut rate = self.lock_rate();

        if self.is_closed() {
            return Err(OpenError::Closed);
        }

        if self.is_configured() {
            info!("{} already configured", self.name);
            return Ok(());
        }

        let state = SolverState::open(
            &self.name,
            &*self.ctx,
            &self.variant,
            options,
            &self.interrupting
        );
        self.interrupting.store(false, Ordering::SeqCst);
        let state = state?;

        // Input channel starts from the configured mask and modes
        let input = &self.core.input;
        input.set_dof(&state.dof);
        input.handle_pose(state.ctrl_pose);
        input.handle_mode(options.mode);

        rate.set_period(state.period);
        *self.core.lock_state() = Some(state);

        self.core.init_pos();

        if !rate.start(self.core.clone()) {
            *self.core.lock_state() = None;
            return Err(OpenError::StartFailed);
        }

        self.configured.store(true, Ordering::SeqCst);
        info!("{} configured", self.name);

        Ok(())
    }

    /// Stop the solver loop and release the hardware. Closing is final and idempotent.
    ///
    /// An open waiting for the hardware on another thread is interrupted first.
    pub fn close(&self) {
        self.interrupt();
        let mut rate = self.lock_rate();

        if self.is_closed() {
            return;
        }

        rate.stop();
        *self.core.lock_state() = None;

        self.configured.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);

        info!("{} closed", self.name);
    }

    /// Abort the wait for the hardware of the open in progress, or of the next one.
    pub fn interrupt(&self) {
        self.interrupting.store(true, Ordering::SeqCst);
    }

    /// Pause the solver loop.
    pub fn suspend(&self) {
        self.lock_rate().suspend();
        info!("{} suspended", self.name);
    }

    /// Start or resume the solver loop from the current configuration of the robot.
    pub fn run(&self) -> bool {
        let mut rate = self.lock_rate();

        if !self.is_configured() {
            return false;
        }

        if !rate.is_running() {
            self.core.init_pos();
            rate.start(self.core.clone())
        } else if rate.is_suspended() {
            info!("{} resumed", self.name);
            self.core.init_pos();
            rate.resume();
            true
        } else {
            info!("{} is already running", self.name);
            true
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_rate().is_running()
    }

    pub fn is_suspended(&self) -> bool {
        self.lock_rate().is_suspended()
    }

    /// Run a single activation of the solver loop on the calling thread.
    pub fn step(&self) {
        self.core.run();
    }

    // ---- INPUT ----

    /// Apply a message received on the input channel.
    ///
    /// The target is handled last so that it is solved with the rest of the message applied.
    pub fn apply_input(&self, msg: &InputMsg) {
        let input = &self.core.input;

        if let Some(mode) = msg.mode {
            input.handle_mode(mode);
        }

        if let Some(dof) = msg.dof.as_ref() {
            let _state = self.core.lock_state();
            if !input.handle_dof(dof) {
                warn!("{}: expected dof data", self.name);
            }
        }

        if let Some(pose) = msg.pose {
            input.handle_pose(pose);
        }

        if msg.rest_pos.is_some() || msg.rest_weights.is_some() {
            self.core.with_state(|s| {
                if let Some(pos) = msg.rest_pos.as_ref() {
                    s.handle_rest_pos(pos);
                }
                if let Some(w) = msg.rest_weights.as_ref() {
                    s.handle_rest_weights(w);
                }
                s.prepare_rest_task();
            });
        }

        match msg.xd.as_ref() {
            Some(xd) => if !input.handle_target(xd, msg.token) {
                warn!("{}: expected xd data", self.name);
            },
            None => warn!("{}: missing xd data; it shall be present", self.name)
        }
    }

    // ---- SETTINGS ----

    pub fn pose(&self) -> PoseMode {
        self.core.input.get_pose()
    }

    pub fn set_pose(&self, pose: PoseMode) {
        self.core.input.handle_pose(pose);
    }

    pub fn mode(&self) -> TrackMode {
        self.core.input.get_mode()
    }

    pub fn set_mode(&self, mode: TrackMode) {
        self.core.input.handle_mode(mode);
    }

    pub fn verbosity(&self) -> Option<bool> {
        self.core.with_state(|s| s.verbosity)
    }

    pub fn set_verbosity(&self, on: bool) -> bool {
        self.core.with_state(|s| s.verbosity = on).is_some()
    }

    /// Bounds of a chain joint (deg).
    pub fn joint_limits(&self, axis: usize) -> Option<(f64, f64)> {
        self.core.with_state(|s| s.limits(axis)).flatten()
    }

    /// Narrow the bounds of a chain joint (deg) within its hardware limits.
    pub fn set_joint_limits(&self, axis: usize, min: f64, max: f64) -> bool {
        self.core.with_state(|s| s.set_limits(axis, min, max)).unwrap_or(false)
    }

    /// The DOF mask, one entry per chain joint.
    pub fn dof(&self) -> Option<Vec<i64>> {
        self.core.with_state(|s| s.dof_info())
    }

    /// Request a new DOF mask and return the mask in force once it has been handled.
    ///
    /// While the loop is running the mask is applied by its next activation, otherwise it is
    /// applied immediately.
    pub fn set_dof(&self, dof: &[f64]) -> Option<Vec<i64>> {
        if !self.is_configured() {
            return None;
        }

        let (running, suspended) = {
            let rate = self.lock_rate();
            (rate.is_running(), rate.is_suspended())
        };

        let seen = {
            let _state = self.core.lock_state();
            if !self.core.input.handle_dof(dof) {
                return None;
            }
            self.core.dof_handled()
        };

        if running && !suspended {
            if !self.core.wait_dof_handling(seen, DOF_WAIT_TIMEOUT) {
                warn!("{}: timeout waiting for the DOF to be handled", self.name);
            }
        } else {
            self.core.handle_dof();
        }

        self.dof()
    }

    /// Rest position of every chain joint (deg).
    pub fn rest_pos(&self) -> Option<Vec<f64>> {
        self.core.with_state(|s| s.rest_pos_deg())
    }

    pub fn set_rest_pos(&self, pos: &[f64]) -> Option<Vec<f64>> {
        self.core.with_state(|s| {
            s.handle_rest_pos(pos);
            s.prepare_rest_task();
            s.rest_pos_deg()
        })
    }

    pub fn rest_weights(&self) -> Option<Vec<f64>> {
        self.core.with_state(|s| s.rest_weights.clone())
    }

    pub fn set_rest_weights(&self, weights: &[f64]) -> Option<Vec<f64>> {
        self.core.with_state(|s| {
            s.handle_rest_weights(weights);
            s.prepare_rest_task();
            s.rest_weights.clone()
        })
    }

    /// The tip frame as `[x y z ax ay az theta]`.
    pub fn tip_frame(&self) -> Option<Vec<f64>> {
        self.core.with_state(|s| s.tip_frame())
    }

    pub fn set_tip_frame(&self, tip: &[f64]) -> bool {
        self.core.with_state(|s| s.set_tip_frame(tip)).unwrap_or(false)
    }

    pub fn second_task(&self) -> Option<SecondTaskInfo> {
        self.core.with_state(|s| SecondTaskInfo {
            link: s.task_2nd.link.map(|l| l as i64).unwrap_or(-1),
            xd: [s.task_2nd.xd.x, s.task_2nd.xd.y, s.task_2nd.xd.z],
            w: [s.task_2nd.w.x, s.task_2nd.w.y, s.task_2nd.w.z],
        })
    }

    pub fn set_second_task(&self, link: i64, xd: &[f64], w: &[f64]) -> bool {
        self.core.with_state(|s| s.set_second_task(link, xd, w)).unwrap_or(false)
    }

    /// Solve a one-off query, see [`SolverState::ask`].
    ///
    /// Returns `None` if the solver is not configured or the target has fewer than 3 components.
    pub fn ask(&self, xd: &[f64], q0: Option<&[f64]>, pose: Option<PoseMode>) -> Option<AskOutput> {
        if xd.len() < 3 {
            return None;
        }

        self.core.with_state(|s| s.ask(xd, q0, pose))
    }

    fn lock_rate(&self) -> MutexGuard<RateThread> {
        self.rate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CartesianSolver {
    fn drop(&mut self) {
        self.close();
    }
}

impl SolverCore {
    fn lock_state(&self) -> MutexGuard<Option<SolverState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the state under the solver lock, `None` if the solver is not open.
    fn with_state<R>(&self, f: impl FnOnce(&mut SolverState) -> R) -> Option<R> {
        self.lock_state().as_mut().map(f)
    }

    /// Read the feedback, waiting for every part, and restart tracking from the current pose.
    fn init_pos(&self) {
        let pose = self.with_state(|s| {
            s.read_feedback(true);
            s.unctrl_old = s.latch_uncontrolled();
            s.desc.chain.end_eff_pose()
        });

        if let Some(pose) = pose {
            self.input.reset_xd(&pose);
        }
    }

    /// Apply the DOF mask requested on the input channel, if it is new.
    fn change_dof(&self, s: &mut SolverState) {
        let requested = self.input.get_dof();

        if s.is_new_dof(&requested) {
            s.change_dof(&requested);
            self.input.set_dof(&s.dof);
        }
    }

    /// Apply the requested DOF mask outside of the loop.
    fn handle_dof(&self) {
        if let Some(s) = self.lock_state().as_mut() {
            self.change_dof(s);
        }
        self.post_dof_handling();
    }

    fn dof_handled(&self) -> u64 {
        *self.dof_event.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post_dof_handling(&self) {
        let (lock, cvar) = &self.dof_event;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        cvar.notify_all();
    }

    /// Wait until the DOF has been handled after `seen`. Returns false on timeout.
    fn wait_dof_handling(&self, seen: u64, timeout: Duration) -> bool {
        let (lock, cvar) = &self.dof_event;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (_guard, res) = cvar
            .wait_timeout_while(guard, timeout, |handled| *handled <= seen)
            .unwrap_or_else(PoisonError::into_inner);

        !res.timed_out()
    }
}

impl Periodic for SolverCore {
    fn thread_init(&self) -> bool {
        let configured = self.lock_state().is_some();

        if configured {
            info!("Starting {}", self.name);
        } else {
            warn!("{} not configured", self.name);
        }

        configured
    }

    fn run(&self) {
        let mut guard = self.lock_state();
        let s = match guard.as_mut() {
            Some(s) => s,
            None => return
        };

        let mut do_solve = false;

        self.change_dof(s);
        self.post_dof_handling();

        s.read_feedback(false);

        // Movements of the uncontrolled joints
        if !s.full_dof {
            let dist = s.uncontrolled_movement();

            do_solve |= self.input.get_cont_mode() && dist > UNCTRL_JOINTS_THRES_DEG;
            if do_solve && s.verbosity {
                info!(
                    "{}: detected movements on uncontrolled joints (norm={} > {} deg)",
                    self.name,
                    dist,
                    UNCTRL_JOINTS_THRES_DEG
                );
            }
        }

        if self.input.is_new_data_event() {
            do_solve = true;
        }

        if do_solve {
            let xd = self.input.get_xd();
            let token = self.input.get_token();
            s.ctrl_pose = self.input.get_pose();

            let pose = s.ctrl_pose;
            let out = s.solve(&xd, pose, Some(&*self.sink), token);

            self.sink.publish(&SolutionMsg {
                xd,
                x: out.x,
                q: out.q,
                token,
            });
        }
    }

    fn thread_release(&self) {
        info!("Stopping {} ...", self.name);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{thread, time::Instant};
    use comms_if::slv::Switch;
    use crate::{device::sim::SimContext, output::SolutionBuffer};

    fn solver(variant: LimbVariant) -> (Arc<SimContext>, Arc<SolutionBuffer>, CartesianSolver) {
        let ctx = Arc::new(SimContext::icub("icub"));
        let sink = Arc::new(SolutionBuffer::new());
        let slv = CartesianSolver::new("slv", variant, ctx.clone(), sink.clone());
        (ctx, sink, slv)
    }

    /// A configured arm solver whose loop is suspended, driven by `step`
    fn stepped_arm() -> (Arc<SimContext>, Arc<SolutionBuffer>, CartesianSolver) {
        let (ctx, sink, slv) = solver(LimbVariant::Arm);
        slv.open(&SolverOptions::default()).unwrap();
        slv.suspend();
        (ctx, sink, slv)
    }

    #[test]
    fn test_open_twice() {
        let (ctx, _, slv) = solver(LimbVariant::Arm);
        assert!(!slv.is_configured());

        slv.open(&SolverOptions::default()).unwrap();
        let opens = ctx.num_opens();
        assert_eq!(opens, 2);
        assert!(slv.is_configured());
        assert!(slv.is_running());

        slv.open(&SolverOptions::default()).unwrap();
        assert_eq!(ctx.num_opens(), opens);
    }

    #[test]
    fn test_close_idempotent() {
        let (_, _, slv) = solver(LimbVariant::Arm);
        slv.open(&SolverOptions::default()).unwrap();

        slv.close();
        assert!(slv.is_closed());
        assert!(!slv.is_configured());
        assert!(!slv.is_running());
        slv.close();
        assert!(slv.is_closed());

        assert!(matches!(slv.open(&SolverOptions::default()), Err(OpenError::Closed)));
        assert!(slv.dof().is_none());
    }

    #[test]
    fn test_open_failure_is_not_terminal() {
        let ctx = Arc::new(SimContext::new());
        let sink = Arc::new(SolutionBuffer::new());
        let slv = CartesianSolver::new("slv", LimbVariant::Leg, ctx.clone(), sink);

        assert!(matches!(
            slv.open(&SolverOptions::default()),
            Err(OpenError::DeviceError(DeviceError::NotAvailable(_)))
        ));
        assert!(!slv.is_configured());
        assert!(!slv.is_closed());

        ctx.add_part("/icub/right_leg", vec![(-90.0, 90.0); 6]);
        slv.open(&SolverOptions::default()).unwrap();
        assert!(slv.is_configured());
    }

    #[test]
    fn test_close_interrupts_open() {
        let slv = Arc::new(CartesianSolver::new(
            "slv",
            LimbVariant::Leg,
            Arc::new(SimContext::new()),
            Arc::new(SolutionBuffer::new())
        ));
        let options = SolverOptions {
            ping_robot_tmo: 30.0,
            ..SolverOptions::default()
        };

        let closer = {
            let slv = slv.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                slv.close();
            })
        };

        let start = Instant::now();
        assert!(matches!(
            slv.open(&options),
            Err(OpenError::DeviceError(DeviceError::Interrupted(_)))
        ));
        assert!(start.elapsed() < Duration::from_secs(5));

        closer.join().unwrap();
        assert!(slv.is_closed());
        assert!(!slv.is_configured());
    }

    #[test]
    fn test_interrupt_before_open() {
        let ctx = Arc::new(SimContext::new());
        let slv = CartesianSolver::new(
            "slv", LimbVariant::Leg, ctx.clone(), Arc::new(SolutionBuffer::new())
        );
        let options = SolverOptions {
            ping_robot_tmo: 1.0,
            ..SolverOptions::default()
        };

        // A pending interrupt aborts the next wait only
        slv.interrupt();
        assert!(matches!(
            slv.open(&options),
            Err(OpenError::DeviceError(DeviceError::Interrupted(_)))
        ));

        ctx.add_part("/icub/right_leg", vec![(-90.0, 90.0); 6]);
        slv.open(&options).unwrap();
        assert!(slv.is_configured());
        slv.close();
    }

    #[test]
    fn test_joint_count_mismatch() {
        let ctx = Arc::new(SimContext::new());
        ctx.add_part("/icub/right_leg", vec![(-90.0, 90.0); 4]);
        let slv = CartesianSolver::new(
            "slv", LimbVariant::Leg, ctx, Arc::new(SolutionBuffer::new())
        );

        assert!(matches!(
            slv.open(&SolverOptions::default()),
            Err(OpenError::JointCountMismatch { expected: 6, found: 4 })
        ));
    }

    #[test]
    fn test_solve_on_new_target() {
        let (_, sink, slv) = stepped_arm();

        // Nothing to do without a target
        slv.step();
        assert!(sink.is_empty());

        // Target reachable from the current configuration
        let x0 = slv.input().get_xd();
        let xd = vec![x0[0] + 0.02, x0[1] - 0.02, x0[2] + 0.02];
        slv.apply_input(&InputMsg {
            xd: Some(xd.clone()),
            pose: Some(PoseMode::Xyz),
            token: Some(42.0),
            ..InputMsg::default()
        });

        slv.step();
        let sol = sink.last().unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(&sol.xd[..3], &xd[..]);
        assert_eq!(sol.token, Some(42.0));
        assert_eq!(sol.q.len(), 7);
        assert!(util::maths::norm(&sol.x[..3], &xd[..]).unwrap() < 1e-2);

        // Edge triggered, no new solve without new data
        slv.step();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_uncontrolled_movement_triggers_solve() {
        let (ctx, sink, slv) = stepped_arm();
        slv.set_mode(TrackMode::Track);

        slv.step();
        assert!(sink.is_empty());

        // Torso moves
        ctx.set_positions("/icub/torso", &[0.0, 0.0, 10.0]);
        slv.step();
        assert_eq!(sink.len(), 1);

        // Not in single-shot mode
        slv.set_mode(TrackMode::Single);
        ctx.set_positions("/icub/torso", &[0.0, 0.0, 20.0]);
        slv.step();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_set_dof_blocks_until_handled() {
        let (_, _, slv) = solver(LimbVariant::Arm);
        slv.open(&SolverOptions::default()).unwrap();
        assert!(slv.is_running());

        let dof = slv.set_dof(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(dof, vec![1; 10]);
        assert_eq!(slv.input().get_dof(), vec![1.0; 10]);

        // Suspended, applied inline
        slv.suspend();
        let dof = slv.set_dof(&[0.0, 2.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(dof, vec![0, 1, 0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_get_dof_length() {
        let (_, _, slv) = stepped_arm();
        assert_eq!(slv.dof().unwrap().len(), 10);
    }

    #[test]
    fn test_apply_rest_input() {
        let (_, _, slv) = stepped_arm();

        slv.apply_input(&InputMsg {
            rest_weights: Some(vec![1.0, 2.0]),
            ..InputMsg::default()
        });
        let w = slv.rest_weights().unwrap();
        assert_eq!(&w[..3], &[1.0, 2.0, 0.0]);
        assert_eq!(w.len(), 10);
    }

    #[test]
    fn test_inter_points_precede_solution() {
        let (_, sink, slv) = solver(LimbVariant::Arm);
        slv.open(&SolverOptions {
            inter_points: Switch::On,
            ..SolverOptions::default()
        }).unwrap();
        slv.suspend();

        let x0 = slv.input().get_xd();
        let xd = vec![x0[0] + 0.02, x0[1] - 0.02, x0[2] + 0.02];
        slv.apply_input(&InputMsg {
            xd: Some(xd.clone()),
            pose: Some(PoseMode::Xyz),
            token: Some(7.0),
            ..InputMsg::default()
        });
        slv.step();

        // At least one iteration plus the final solution, all carrying the token
        let msgs = sink.take();
        assert!(msgs.len() >= 2);
        assert!(msgs.iter().all(|m| m.token == Some(7.0) && m.xd == xd));
        assert!(msgs.iter().all(|m| m.q.len() == 7));

        // The first iteration starts at the feedback pose, the last message is the solution
        assert!(util::maths::norm(&msgs[0].x[..3], &x0[..3]).unwrap() < 1e-6);
        let last = msgs.last().unwrap();
        assert!(util::maths::norm(&last.x[..3], &xd[..]).unwrap() < 1e-2);

        // Queries never publish intermediate points
        slv.ask(&xd, None, None).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_ask_does_not_touch_loop() {
        let (ctx, sink, slv) = stepped_arm();
        ctx.set_positions("/icub/torso", &[0.0, 0.0, 5.0]);

        let xd_before = slv.input().get_xd();
        let dof_before = slv.dof().unwrap();

        let target = vec![xd_before[0] + 0.01, xd_before[1], xd_before[2]];
        let out = slv.ask(&target, None, None).unwrap();
        assert_eq!(out.q.len(), 10);
        assert!((out.q[0] - 5.0).abs() < 1e-9);
        assert_eq!(out.x.len(), 7);

        assert_eq!(slv.input().get_xd(), xd_before);
        assert_eq!(slv.dof().unwrap(), dof_before);
        assert!(sink.is_empty());

        assert!(slv.ask(&[0.1, 0.2], None, None).is_none());
    }

    #[test]
    fn test_resume_restarts_from_feedback() {
        let (ctx, _, slv) = stepped_arm();
        ctx.set_positions("/icub/right_arm", &[-20.0, 30.0, 10.0, 50.0]);

        assert!(slv.run());
        assert!(!slv.is_suspended());

        slv.suspend();
        let x = slv.input().get_xd();
        let x_fb = slv.core.with_state(|s| s.desc.chain.end_eff_pose()).unwrap();
        assert_eq!(x, x_fb);
        assert!(!slv.input().is_new_data_event());
    }
}
