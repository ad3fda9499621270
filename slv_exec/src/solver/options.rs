//! Configuration options of a solver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use comms_if::slv::{PoseMode, Switch, TrackMode, Value};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default period of the solver loop (ms)
pub const DEFAULT_PERIOD_MS: u64 = 20;

/// Default tolerance of the optimizer
pub const DEFAULT_TOL: f64 = 1e-3;

/// Default iteration cap of the optimizer
pub const DEFAULT_MAX_ITER: usize = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Options given to a solver when it is configured.
///
/// They are read either from the `[solver]` table of the executable's parameters or from the
/// `(key value)` lists of a `configure` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Name of the robot, used to name the remote parts
    pub robot: String,

    /// Limb side, anything but `left` is treated as `right`
    #[serde(rename = "type")]
    pub side: String,

    pub pose: PoseMode,

    pub mode: TrackMode,

    pub verbosity: Switch,

    pub tol: f64,

    #[serde(alias = "maxIter")]
    pub max_iter: usize,

    /// Tolerance on the position error, defaults to `tol`
    #[serde(alias = "xyzTol")]
    pub xyz_tol: Option<f64>,

    /// Rest position of the joints (deg)
    pub rest_pos: Option<Vec<f64>>,

    pub rest_weights: Option<Vec<f64>>,

    /// Initial degrees of freedom mask
    pub dof: Option<Vec<f64>>,

    /// Period of the solver loop (ms)
    pub period: u64,

    /// Time to wait for each part to become available (s), 0 to not wait
    pub ping_robot_tmo: f64,

    /// Publish every intermediate solution of the optimizer
    #[serde(alias = "interPoints")]
    pub inter_points: Switch,

    /// Normalise the Jacobian columns of the optimizer
    pub user_scaling: Switch,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Option list is malformed: {0}")]
    Malformed(String),

    #[error("Invalid option value: {0}")]
    InvalidValue(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            robot: "icub".into(),
            side: "right".into(),
            pose: PoseMode::Full,
            mode: TrackMode::Single,
            verbosity: Switch::Off,
            tol: DEFAULT_TOL,
            max_iter: DEFAULT_MAX_ITER,
            xyz_tol: None,
            rest_pos: None,
            rest_weights: None,
            dof: None,
            period: DEFAULT_PERIOD_MS,
            ping_robot_tmo: 0.0,
            inter_points: Switch::Off,
            user_scaling: Switch::On,
        }
    }
}

impl SolverOptions {
    /// Read the options from the values of a `configure` command.
    ///
    /// Each option is a `(key value...)` list, options with several values are read as a list.
    /// Values which are not lists, such as the command itself, and unknown keys are ignored.
    pub fn from_bottle(values: &[Value]) -> Result<Self, OptionsError> {
        let mut map = serde_json::Map::new();

        for v in values {
            let list = match v.as_list() {
                Some(l) => l,
                None => continue
            };

            let key = match list.first().and_then(Value::as_str) {
                Some(k) => k,
                None => return Err(OptionsError::Malformed(v.to_string()))
            };

            let value = match list.len() {
                1 => return Err(OptionsError::Malformed(v.to_string())),
                2 => list[1].clone(),
                _ => Value::List(list[1..].to_vec())
            };

            map.insert(
                key.to_string(),
                serde_json::to_value(&value).map_err(OptionsError::InvalidValue)?
            );
        }

        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(OptionsError::InvalidValue)
    }

    pub fn verbose(&self) -> bool {
        self.verbosity == Switch::On
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::slv::parse_bottle;

    #[test]
    fn test_from_bottle() {
        let b = parse_bottle(
            "cfg (robot icubSim) (type left) (pose xyz) (mode cont) (maxIter 50) (tol 0.01) \
             (rest_pos (0 0 0 -30)) (dof 0 0 0 1 1 1 1) (interPoints on)"
        ).unwrap();
        let opts = SolverOptions::from_bottle(&b).unwrap();

        assert_eq!(opts.robot, "icubSim");
        assert_eq!(opts.side, "left");
        assert_eq!(opts.pose, PoseMode::Xyz);
        assert_eq!(opts.mode, TrackMode::Track);
        assert_eq!(opts.max_iter, 50);
        assert_eq!(opts.tol, 0.01);
        assert_eq!(opts.rest_pos, Some(vec![0.0, 0.0, 0.0, -30.0]));
        assert_eq!(opts.dof, Some(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]));
        assert_eq!(opts.inter_points, Switch::On);

        // Untouched options keep their defaults
        assert_eq!(opts.period, DEFAULT_PERIOD_MS);
        assert_eq!(opts.user_scaling, Switch::On);
        assert!(opts.xyz_tol.is_none());
    }

    #[test]
    fn test_invalid_options() {
        let b = parse_bottle("cfg (pose sideways)").unwrap();
        assert!(SolverOptions::from_bottle(&b).is_err());

        let b = parse_bottle("cfg (pose)").unwrap();
        assert!(SolverOptions::from_bottle(&b).is_err());

        // Unknown keys are ignored
        let b = parse_bottle("cfg (colour blue)").unwrap();
        assert_eq!(SolverOptions::from_bottle(&b).unwrap(), SolverOptions::default());
    }

    #[test]
    fn test_from_toml() {
        let opts: SolverOptions = toml::from_str(r#"
            type = "left"
            verbosity = "on"
            xyz_tol = 1e-4
            period = 10
        "#).unwrap();

        assert_eq!(opts.side, "left");
        assert!(opts.verbose());
        assert_eq!(opts.xyz_tol, Some(1e-4));
        assert_eq!(opts.period, 10);
    }
}
