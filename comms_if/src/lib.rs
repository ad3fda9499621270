//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the solver software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Wire types of the Cartesian solver: bottle values, protocol vocabulary and channel messages
pub mod slv;

/// Network module
pub mod net;
