//! # Input channel
//!
//! Buffer between the listener receiving targets and configuration updates and the solver loop.
//! The buffered fields are guarded by their own mutex so that the listener is never held up by a
//! solve. Arrival of a new target is signalled through an edge-triggered flag: it is raised by the
//! listener and consumed by the first poll of [`InputChannel::is_new_data_event`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering}
};
use comms_if::slv::{PoseMode, TrackMode};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum length of a target, 3 position and 4 axis-angle components
pub const MAX_TARGET_LEN: usize = 7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct InputChannel {
    buffer: Mutex<InputBuffer>,

    /// Raised when new data requiring a solve has been received
    new_data: AtomicBool,
}

struct InputBuffer {
    xd: Vec<f64>,
    dof: Vec<f64>,
    token: Option<f64>,
    pose: PoseMode,
    cont_mode: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InputChannel {
    pub fn new(dof: &[f64], pose: PoseMode, mode: TrackMode) -> Self {
        Self {
            buffer: Mutex::new(InputBuffer {
                xd: vec![0.0; MAX_TARGET_LEN],
                dof: dof.to_vec(),
                token: None,
                pose,
                cont_mode: mode == TrackMode::Track,
            }),
            new_data: AtomicBool::new(false),
        }
    }

    pub fn set_dof(&self, dof: &[f64]) {
        self.lock().dof = dof.to_vec();
    }

    pub fn get_dof(&self) -> Vec<f64> {
        self.lock().dof.clone()
    }

    pub fn get_xd(&self) -> Vec<f64> {
        self.lock().xd.clone()
    }

    /// Token received with the last target, if any.
    pub fn get_token(&self) -> Option<f64> {
        self.lock().token
    }

    pub fn get_pose(&self) -> PoseMode {
        self.lock().pose
    }

    /// True in continuous tracking mode, false in single-shot mode.
    pub fn get_cont_mode(&self) -> bool {
        self.lock().cont_mode
    }

    pub fn get_mode(&self) -> TrackMode {
        if self.get_cont_mode() {
            TrackMode::Track
        } else {
            TrackMode::Single
        }
    }

    /// Replace the target and drop any pending new data.
    pub fn reset_xd(&self, xd: &[f64]) {
        let mut buf = self.lock();
        buf.xd = xd.iter().copied().take(MAX_TARGET_LEN).collect();
        self.new_data.store(false, Ordering::SeqCst);
    }

    /// Returns true once for each raise of the new data flag.
    pub fn is_new_data_event(&self) -> bool {
        self.new_data
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Store a new target and its token.
    ///
    /// Values beyond the maximum target length are ignored, missing ones keep their previous
    /// value. In single-shot mode a target identical to the current one does not trigger a new
    /// solve and its token is dropped. Returns false if the target is empty.
    pub fn handle_target(&self, xd: &[f64], token: Option<f64>) -> bool {
        if xd.is_empty() {
            return false;
        }

        let changed = {
            let mut buf = self.lock();

            let mut changed = false;
            let len = xd.len().min(MAX_TARGET_LEN);
            if buf.xd.len() < len {
                buf.xd.resize(len, 0.0);
                changed = true;
            }

            for (dst, src) in buf.xd.iter_mut().zip(xd.iter()) {
                if *dst != *src {
                    *dst = *src;
                    changed = true;
                }
            }

            let changed = changed || buf.cont_mode;
            if changed {
                buf.token = token;
            }
            changed
        };

        if changed {
            self.raise();
        }

        true
    }

    /// Store a requested DOF mask, applied by the solver loop at its next activation.
    ///
    /// The caller must hold the solver's state lock, the mask drives a structural change of the
    /// chain. Returns false if the mask is empty.
    pub fn handle_dof(&self, dof: &[f64]) -> bool {
        if dof.is_empty() {
            return false;
        }

        self.set_dof(dof);
        true
    }

    /// Set the pose mode. A change of mode triggers a new solve, which is signalled by returning
    /// true.
    pub fn handle_pose(&self, pose: PoseMode) -> bool {
        let changed = {
            let mut buf = self.lock();
            let changed = buf.pose != pose;
            buf.pose = pose;
            changed
        };

        if changed {
            self.raise();
        }

        changed
    }

    pub fn handle_mode(&self, mode: TrackMode) {
        self.lock().cont_mode = mode == TrackMode::Track;
    }

    fn raise(&self) {
        self.new_data.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<InputBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn channel(mode: TrackMode) -> InputChannel {
        InputChannel::new(&[1.0; 7], PoseMode::Full, mode)
    }

    #[test]
    fn test_edge_triggering() {
        let ch = channel(TrackMode::Single);
        assert!(!ch.is_new_data_event());

        assert!(ch.handle_target(&[-0.3, 0.1, 0.1], Some(3.0)));
        assert!(ch.is_new_data_event());
        assert!(!ch.is_new_data_event());
        assert!(!ch.is_new_data_event());
        assert_eq!(ch.get_token(), Some(3.0));

        assert!(ch.handle_target(&[-0.3, 0.1, 0.2], None));
        assert!(ch.is_new_data_event());
        assert!(!ch.is_new_data_event());
        assert_eq!(ch.get_token(), None);
    }

    #[test]
    fn test_single_shot_dedupe() {
        let ch = channel(TrackMode::Single);
        ch.handle_target(&[-0.3, 0.1, 0.1], None);
        assert!(ch.is_new_data_event());

        // Same target, no new solve and the token of the pending solution is kept
        ch.handle_target(&[-0.3, 0.1, 0.1], Some(5.0));
        assert!(!ch.is_new_data_event());
        assert_eq!(ch.get_token(), None);

        // Continuous mode always solves
        ch.handle_mode(TrackMode::Track);
        ch.handle_target(&[-0.3, 0.1, 0.1], Some(6.0));
        assert!(ch.is_new_data_event());
        assert_eq!(ch.get_token(), Some(6.0));
    }

    #[test]
    fn test_partial_target() {
        let ch = channel(TrackMode::Single);
        ch.reset_xd(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.5]);

        ch.handle_target(&[-0.3, 0.1, 0.1, 0.0, 0.0, 1.0, 0.5, 9.0], None);
        assert_eq!(ch.get_xd(), vec![-0.3, 0.1, 0.1, 0.0, 0.0, 1.0, 0.5]);

        ch.handle_target(&[-0.2], None);
        assert_eq!(ch.get_xd(), vec![-0.2, 0.1, 0.1, 0.0, 0.0, 1.0, 0.5]);

        assert!(!ch.handle_target(&[], None));
    }

    #[test]
    fn test_reset_clears_flag() {
        let ch = channel(TrackMode::Track);
        ch.handle_target(&[-0.3, 0.1, 0.1], None);
        ch.reset_xd(&[0.1, 0.2, 0.3]);
        assert!(!ch.is_new_data_event());
        assert_eq!(ch.get_xd(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_pose_change() {
        let ch = channel(TrackMode::Single);
        assert!(!ch.handle_pose(PoseMode::Full));
        assert!(!ch.is_new_data_event());

        assert!(ch.handle_pose(PoseMode::Xyz));
        assert_eq!(ch.get_pose(), PoseMode::Xyz);
        assert!(ch.is_new_data_event());
    }

    #[test]
    fn test_dof() {
        let ch = channel(TrackMode::Single);
        assert!(ch.handle_dof(&[0.0, 1.0]));
        assert_eq!(ch.get_dof(), vec![0.0, 1.0]);
        assert!(!ch.handle_dof(&[]));
        assert_eq!(ch.get_mode(), TrackMode::Single);
    }
}
