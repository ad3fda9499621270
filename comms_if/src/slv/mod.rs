//! # Solver wire types
//!
//! The control protocol exchanges "bottles": ordered lists of integers, doubles, strings and
//! nested lists. Requests and replies travel as JSON arrays of these values. The input and output
//! channels carry [`InputMsg`] and [`SolutionMsg`] objects.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod bottle;
mod msg;
mod vocab;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use bottle::{Value, BottleParseError, parse_bottle, format_bottle, find_option};
pub use msg::{InputMsg, SolutionMsg};
pub use vocab::{Command, Property, PoseMode, TrackMode, Switch, Reply, help_string};
