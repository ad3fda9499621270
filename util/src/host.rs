//! Host platform utility functions

use std::{env, path::PathBuf};

/// Name of the environment variable pointing at the software root.
pub const SW_ROOT_ENV_VAR: &str = "CART_SLV_ROOT";

/// Get the software root directory from the `CART_SLV_ROOT` environment variable.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
