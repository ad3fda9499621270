//! # Device module
//!
//! Access to the robot's motor control boards. A hardware part (e.g. the torso) is opened through a
//! [`DeviceContext`], which hands back one handle per capability the part offers. A
//! [`DeviceBinding`] composes the capabilities the solver needs and maps between the chain's joint
//! order and the part's axis order.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};
use log::{info, warn};

use crate::part_desc::PartConfig;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval between two probes of a part while waiting for it
const WAIT_PART_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Granularity at which the wait loop checks for an interrupt
const WAIT_PART_POLL_STEP: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Encoder reading capability.
pub trait Encoders: Send {
    /// Number of axes of the part.
    fn axes(&self) -> usize;

    /// Read all encoders in the part's axis order (deg).
    fn read_encoders(&self) -> Result<Vec<f64>, DeviceError>;
}

/// Joint limits capability.
pub trait ControlLimits: Send {
    /// Limits of an axis in the part's axis order (deg).
    fn limits(&self, axis: usize) -> Result<(f64, f64), DeviceError>;
}

/// A context owning the connections to the robot's hardware.
///
/// Passed explicitly to the solver, there is no process-wide registry of devices.
pub trait DeviceContext: Send + Sync {
    /// Open a hardware part, returning the capabilities it provides.
    fn open_part(&self, cfg: &PartConfig) -> Result<DeviceHandles, DeviceError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The capabilities offered by an open part.
#[derive(Default)]
pub struct DeviceHandles {
    pub encoders: Option<Box<dyn Encoders>>,
    pub limits: Option<Box<dyn ControlLimits>>,
}

/// The binding between one hardware part and a segment of the chain.
pub struct DeviceBinding {
    /// Name of the part, for logging
    part: String,

    encoders: Box<dyn Encoders>,

    limits: Box<dyn ControlLimits>,

    /// Number of axes of the part
    axes: usize,

    /// Axis index of each chain joint of this segment
    remap: Vec<usize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device driver for {0} not available")]
    NotAvailable(String),

    #[error("Part {0} does not provide the {1} interface")]
    MissingCapability(String, &'static str),

    #[error("Timeout reading from part {0}")]
    Timeout(String),

    #[error("Axis {1} is out of range for part {0}")]
    InvalidAxis(String, usize),

    #[error("Interrupted while waiting for part {0}")]
    Interrupted(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DeviceBinding {
    /// Bind an opened part to the chain.
    ///
    /// `remaining_joints` is the number of chain joints still to be bound, the segment is clamped
    /// to it. Reversed parts read their axes in reverse order.
    pub fn bind(
        cfg: &PartConfig,
        handles: DeviceHandles,
        remaining_joints: usize
    ) -> Result<Self, DeviceError> {
        let encoders = handles.encoders
            .ok_or_else(|| DeviceError::MissingCapability(cfg.part.clone(), "encoders"))?;
        let limits = handles.limits
            .ok_or_else(|| DeviceError::MissingCapability(cfg.part.clone(), "control limits"))?;

        let axes = encoders.axes();
        let joints = axes.min(remaining_joints);
        let remap = (0..joints)
            .map(|j| if cfg.reversed { joints - j - 1 } else { j })
            .collect();

        Ok(Self {
            part: cfg.part.clone(),
            encoders,
            limits,
            axes,
            remap,
        })
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    /// Number of chain joints bound to this part.
    pub fn joints(&self) -> usize {
        self.remap.len()
    }

    /// Number of axes of the part.
    pub fn axes(&self) -> usize {
        self.axes
    }

    pub fn remap(&self) -> &[usize] {
        &self.remap
    }

    /// Read the segment's joint angles in chain order (deg).
    pub fn read(&self) -> Result<Vec<f64>, DeviceError> {
        let raw = self.encoders.read_encoders()?;

        self.remap.iter()
            .map(|a| raw.get(*a).copied().ok_or_else(|| DeviceError::InvalidAxis(self.part.clone(), *a)))
            .collect()
    }

    /// Limits of the `j`-th joint of the segment in chain order (deg).
    pub fn limits(&self, j: usize) -> Result<(f64, f64), DeviceError> {
        let axis = *self.remap.get(j)
            .ok_or_else(|| DeviceError::InvalidAxis(self.part.clone(), j))?;
        self.limits.limits(axis)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open a part, probing it once per second until it becomes available.
///
/// Gives up after `timeout`, or as soon as `interrupt` is raised.
pub fn wait_part(
    ctx: &dyn DeviceContext,
    cfg: &PartConfig,
    timeout: Duration,
    interrupt: &AtomicBool
) -> Result<DeviceHandles, DeviceError> {
    let start = Instant::now();

    info!("Checking if {} is active ...", cfg.remote);

    loop {
        match ctx.open_part(cfg) {
            Ok(h) => {
                info!("{} is active", cfg.remote);
                return Ok(h)
            },
            Err(e) => {
                if start.elapsed() >= timeout {
                    warn!("{} did not become active within {:.1} s", cfg.remote, timeout.as_secs_f64());
                    return Err(e);
                }
            }
        }

        // Wait for the next probe
        let probe_start = Instant::now();
        while probe_start.elapsed() < WAIT_PART_PROBE_INTERVAL {
            if interrupt.load(Ordering::Relaxed) {
                return Err(DeviceError::Interrupted(cfg.remote.clone()));
            }
            thread::sleep(WAIT_PART_POLL_STEP);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
