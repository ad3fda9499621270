//! # Cartesian solver library.
//!
//! This library allows other crates in the workspace to access items defined inside the solver
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Kinematic chains - links, joint bounds and the limbs of the supported robots
pub mod chain;

/// Linear inequality constrained damped least squares optimizer
pub mod optimizer;

/// Device access - binds the solver to the motor control boards of the robot parts
pub mod device;

/// Part descriptors - which chain and which hardware parts make up a limb
pub mod part_desc;

/// Input channel buffer - targets and configuration updates awaiting the solver loop
pub mod input;

/// Output channel - consumers of the computed solutions
pub mod output;

/// Periodic thread driving the solver loop
pub mod rate;

/// The solver itself - configuration, lifecycle and the periodic activation
pub mod solver;

/// Command processor - implements the control protocol on top of the solver
pub mod cmd;

/// Executable parameters
pub mod params;

/// RPC server - recieves protocol commands and sends back the replies
pub mod rpc_server;

/// Input server - subscribes to the input channel
pub mod input_server;

/// Solution server - publishes the solutions on the output channel
pub mod sol_server;
