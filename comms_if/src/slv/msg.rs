//! Input and output channel messages

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use super::vocab::{PoseMode, TrackMode};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A message received on the solver's input channel.
///
/// Every field is optional, only the present ones are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputMsg {
    /// Desired pose, 3 position components followed by up to 4 axis-angle components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xd: Option<Vec<f64>>,

    /// Degrees of freedom mask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dof: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TrackMode>,

    /// Rest position in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_pos: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_weights: Option<Vec<f64>>,

    /// Correlation token echoed back with the solution of `xd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<f64>,
}

/// A solution published on the solver's output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionMsg {
    /// Desired pose the solution was computed for
    pub xd: Vec<f64>,

    /// Pose achieved by the solution
    pub x: Vec<f64>,

    /// Joint angles of the free joints in degrees
    pub q: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_input() {
        let m: InputMsg = serde_json::from_str(r#"{"xd": [-0.3, 0.1, 0.1], "token": 7}"#).unwrap();
        assert_eq!(m.xd, Some(vec![-0.3, 0.1, 0.1]));
        assert_eq!(m.token, Some(7.0));
        assert!(m.dof.is_none());
        assert!(m.mode.is_none());

        let m: InputMsg = serde_json::from_str(r#"{"mode": "shot", "pose": "xyz"}"#).unwrap();
        assert_eq!(m.mode, Some(TrackMode::Single));
        assert_eq!(m.pose, Some(PoseMode::Xyz));
    }

    #[test]
    fn test_solution_without_token() {
        let s = SolutionMsg {
            xd: vec![0.0; 3],
            x: vec![0.0; 3],
            q: vec![1.0],
            token: None,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("token"));
        let back: SolutionMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
