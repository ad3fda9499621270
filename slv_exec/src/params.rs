//! # Solver Executable Parameters
//!
//! This module provide parameters for the solver executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use crate::{part_desc::LimbVariant, solver::SolverOptions};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct SlvExecParams {

    /// Name of the solver, prefixes the local ports it opens
    pub name: String,

    /// Name of the robot providing the simulated devices
    pub robot: String,

    /// Network endpoint for the command server
    pub rpc_endpoint: String,

    /// Network endpoint for the input channel
    pub input_endpoint: String,

    /// Network endpoint for the output channel
    pub output_endpoint: String,

    /// Limb the solver works on
    pub limb: LimbVariant,

    /// Options to configure the solver with at startup. If not given the solver waits for a
    /// `configure` command.
    #[serde(default)]
    pub solver: Option<SolverOptions>,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::slv::PoseMode;

    #[test]
    fn test_load() {
        let p: SlvExecParams = util::params::from_str(r#"
            name = "cartesianSolver/right_arm"
            robot = "icub"
            rpc_endpoint = "tcp://*:5030"
            input_endpoint = "tcp://localhost:5031"
            output_endpoint = "tcp://*:5032"

            [limb]
            kind = "arm"

            [solver]
            type = "left"
            pose = "xyz"
            maxIter = 150
        "#).unwrap();

        assert_eq!(p.limb.name(), "arm");
        let s = p.solver.unwrap();
        assert_eq!(s.side, "left");
        assert_eq!(s.pose, PoseMode::Xyz);
        assert_eq!(s.max_iter, 150);

        let p: SlvExecParams = util::params::from_str(r#"
            name = "slv"
            robot = "icub"
            rpc_endpoint = "tcp://*:5030"
            input_endpoint = "tcp://localhost:5031"
            output_endpoint = "tcp://*:5032"

            [limb]
            kind = "leg"
        "#).unwrap();
        assert!(p.solver.is_none());
    }
}
