//! # Simulated devices
//!
//! An in-process [`DeviceContext`] whose parts hold settable encoder positions and fixed limits. It
//! stands in for the robot when no hardware is present and is used throughout the tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, atomic::{AtomicBool, AtomicUsize, Ordering}},
};

use super::{ControlLimits, DeviceContext, DeviceError, DeviceHandles, Encoders};
use crate::{
    chain::{icub_arm, icub_leg, KinematicChain, Side, NUM_TORSO_LINKS},
    part_desc::PartConfig,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of axes of an iCub arm board, hand included
const ICUB_ARM_AXES: usize = 16;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A simulated device context.
#[derive(Default)]
pub struct SimContext {
    /// Parts keyed by their remote name
    parts: Mutex<HashMap<String, Arc<SimPart>>>,

    /// Number of successful part openings
    num_opens: AtomicUsize,
}

/// A simulated hardware part.
pub struct SimPart {
    name: String,

    /// Encoder positions (deg)
    positions: Mutex<Vec<f64>>,

    /// Axis limits (deg)
    limits: Vec<(f64, f64)>,

    /// Offline parts cannot be opened
    online: AtomicBool,

    /// While set every encoder read times out
    timeout: AtomicBool,
}

struct SimEncoders(Arc<SimPart>);

struct SimLimits(Arc<SimPart>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context with the iCub parts of `robot`: torso, both arms and both legs.
    ///
    /// Limits of the kinematic axes match the chain bounds, encoders start at the middle of each
    /// axis range.
    pub fn icub(robot: &str) -> Self {
        let ctx = Self::new();

        let arm = icub_arm(Side::Right);
        let mut torso: Vec<(f64, f64)> = limits_deg(&arm)[..NUM_TORSO_LINKS].to_vec();
        // The torso is read in reverse
        torso.reverse();
        ctx.add_part(&format!("/{}/torso", robot), torso);

        for side in [Side::Left, Side::Right].iter() {
            let mut arm_lims = limits_deg(&icub_arm(*side))[NUM_TORSO_LINKS..].to_vec();
            arm_lims.resize(ICUB_ARM_AXES, (0.0, 90.0));
            ctx.add_part(&format!("/{}/{}_arm", robot, side.as_str()), arm_lims);

            ctx.add_part(
                &format!("/{}/{}_leg", robot, side.as_str()),
                limits_deg(&icub_leg(*side))
            );
        }

        ctx
    }

    /// Add a part with the given axis limits (deg). Encoders start at the middle of each range.
    pub fn add_part(&self, remote: &str, limits: Vec<(f64, f64)>) -> Arc<SimPart> {
        let part = Arc::new(SimPart {
            name: remote.into(),
            positions: Mutex::new(limits.iter().map(|(min, max)| 0.5 * (min + max)).collect()),
            limits,
            online: AtomicBool::new(true),
            timeout: AtomicBool::new(false),
        });

        self.lock_parts().insert(remote.into(), part.clone());
        part
    }

    pub fn part(&self, remote: &str) -> Option<Arc<SimPart>> {
        self.lock_parts().get(remote).cloned()
    }

    /// Set the encoder positions of a part (deg). Returns false if the part doesn't exist.
    pub fn set_positions(&self, remote: &str, positions: &[f64]) -> bool {
        match self.part(remote) {
            Some(p) => {
                p.set_positions(positions);
                true
            },
            None => false
        }
    }

    /// Number of times a part has been successfully opened.
    pub fn num_opens(&self) -> usize {
        self.num_opens.load(Ordering::Relaxed)
    }

    fn lock_parts(&self) -> MutexGuard<HashMap<String, Arc<SimPart>>> {
        self.parts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceContext for SimContext {
    fn open_part(&self, cfg: &PartConfig) -> Result<DeviceHandles, DeviceError> {
        let part = match self.part(&cfg.remote) {
            Some(p) if p.online.load(Ordering::Relaxed) => p,
            _ => return Err(DeviceError::NotAvailable(cfg.remote.clone()))
        };

        self.num_opens.fetch_add(1, Ordering::Relaxed);

        Ok(DeviceHandles {
            encoders: Some(Box::new(SimEncoders(part.clone()))),
            limits: Some(Box::new(SimLimits(part))),
        })
    }
}

impl SimPart {
    /// Set the encoder positions (deg), extra values are ignored.
    pub fn set_positions(&self, positions: &[f64]) {
        let mut p = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
        for (dst, src) in p.iter_mut().zip(positions.iter()) {
            *dst = *src;
        }
    }

    pub fn positions(&self) -> Vec<f64> {
        self.positions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn set_timeout(&self, timeout: bool) {
        self.timeout.store(timeout, Ordering::Relaxed);
    }
}

impl Encoders for SimEncoders {
    fn axes(&self) -> usize {
        self.0.limits.len()
    }

    fn read_encoders(&self) -> Result<Vec<f64>, DeviceError> {
        if self.0.timeout.load(Ordering::Relaxed) {
            return Err(DeviceError::Timeout(self.0.name.clone()));
        }
        Ok(self.0.positions())
    }
}

impl ControlLimits for SimLimits {
    fn limits(&self, axis: usize) -> Result<(f64, f64), DeviceError> {
        self.0.limits.get(axis)
            .copied()
            .ok_or_else(|| DeviceError::InvalidAxis(self.0.name.clone(), axis))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn limits_deg(chain: &KinematicChain) -> Vec<(f64, f64)> {
    chain.links()
        .iter()
        .map(|l| (l.min.to_degrees(), l.max.to_degrees()))
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_icub_parts() {
        let ctx = SimContext::icub("icub");

        let torso = ctx.part("/icub/torso").unwrap();
        assert_eq!(torso.positions().len(), 3);

        let arm = ctx.part("/icub/left_arm").unwrap();
        assert_eq!(arm.positions().len(), ICUB_ARM_AXES);

        let leg = ctx.part("/icub/right_leg").unwrap();
        assert_eq!(leg.positions().len(), 6);

        assert!(ctx.part("/icub/head").is_none());
    }

    #[test]
    fn test_open_and_read() {
        let ctx = SimContext::icub("icub");
        let cfg = PartConfig::new("icub", "torso", "slv", true);

        let handles = ctx.open_part(&cfg).unwrap();
        assert_eq!(ctx.num_opens(), 1);

        let enc = handles.encoders.unwrap();
        ctx.set_positions("/icub/torso", &[1.0, 2.0, 3.0]);
        assert_eq!(enc.read_encoders().unwrap(), vec![1.0, 2.0, 3.0]);

        // Torso pitch is the last hardware axis
        let lims = handles.limits.unwrap();
        let (min, max) = lims.limits(2).unwrap();
        assert!((min + 22.0).abs() < 1e-9 && (max - 84.0).abs() < 1e-9);

        ctx.part("/icub/torso").unwrap().set_timeout(true);
        assert_eq!(enc.read_encoders(), Err(DeviceError::Timeout("/icub/torso".into())));
    }

    #[test]
    fn test_offline_part() {
        let ctx = SimContext::icub("icub");
        ctx.part("/icub/torso").unwrap().set_online(false);

        let cfg = PartConfig::new("icub", "torso", "slv", true);
        assert!(ctx.open_part(&cfg).is_err());
        assert_eq!(ctx.num_opens(), 0);
    }
}
