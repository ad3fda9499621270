//! # Part descriptor module
//!
//! Static description of the hardware parts composing a solver's kinematic chain. Descriptors are
//! built from a [`LimbVariant`] by [`build_descriptor`], and the variant also decides the few
//! behaviours that differ between limbs (DOF filtering, default second task).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Matrix4, Vector3};
use serde::{Serialize, Deserialize};

use crate::{
    chain::{
        icub_arm, icub_leg, KinematicChain, LinIneqConstr, Link, Side, ARM_ELBOW_LINK
    },
    optimizer::SecondTask,
    solver::SolverOptions,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Chain indices of the coupled shoulder joints of the arm
const ARM_SHOULDER_JOINTS: [usize; 3] = [3, 4, 5];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Configuration of a single hardware part.
#[derive(Debug, Clone, PartialEq)]
pub struct PartConfig {
    pub robot: String,

    /// Name of the part on the robot, e.g. `torso`
    pub part: String,

    /// Remote name of the part, `/<robot>/<part>`
    pub remote: String,

    /// Local name of the solver's connection to the part, `/<solver>/<part>`
    pub local: String,

    /// If true the part's axes are in the reverse order of the chain's joints
    pub reversed: bool,
}

/// Description of a user defined limb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLimb {
    /// Base transform in row major order, identity if empty
    #[serde(default)]
    pub h0: Vec<f64>,

    /// Links of the chain, from the root
    pub links: Vec<CustomLink>,

    /// Parts driving the chain, from the root
    pub parts: Vec<CustomPart>,
}

/// A link of a custom limb, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLink {
    pub a: f64,
    pub d: f64,
    pub alpha: f64,
    #[serde(default)]
    pub offset: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPart {
    pub name: String,

    #[serde(default)]
    pub reversed: bool,
}

/// Everything the solver needs to know about its limb.
#[derive(Debug, Clone)]
pub struct PartDescriptor {
    pub variant: LimbVariant,

    pub side: Side,

    /// Parts in chain order
    pub parts: Vec<PartConfig>,

    pub constraint: Option<LinIneqConstr>,

    pub chain: KinematicChain,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The kind of limb a solver controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LimbVariant {
    /// Torso and arm
    Arm,

    Leg,

    Custom(CustomLimb),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DescriptorError {
    #[error("Custom limb has no links")]
    NoLinks,

    #[error("Custom limb has no parts")]
    NoParts,

    #[error("Custom limb base transform must have 16 elements, found {0}")]
    InvalidBaseTransform(usize),

    #[error("Link {0} has inconsistent bounds")]
    InvalidBounds(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PartConfig {
    pub fn new(robot: &str, part: &str, slv_name: &str, reversed: bool) -> Self {
        Self {
            robot: robot.into(),
            part: part.into(),
            remote: format!("/{}/{}", robot, part),
            local: format!("/{}/{}", slv_name, part),
            reversed,
        }
    }
}

impl LimbVariant {
    pub fn name(&self) -> &'static str {
        match self {
            LimbVariant::Arm => "arm",
            LimbVariant::Leg => "leg",
            LimbVariant::Custom(_) => "custom",
        }
    }

    /// Merge a requested DOF vector into the current one.
    ///
    /// The requested values overwrite the current ones position by position, values greater than
    /// one keep the current value. For the arm the three shoulder joints must be either all free or
    /// all blocked, a request mixing them keeps the shoulder's previous state.
    pub fn filter_dof(&self, current: &[f64], requested: &[f64]) -> Vec<f64> {
        let mut dof = current.to_vec();
        for (d, r) in dof.iter_mut().zip(requested.iter()) {
            if *r <= 1.0 {
                *d = *r;
            }
        }

        if let LimbVariant::Arm = self {
            if dof.len() > ARM_SHOULDER_JOINTS[2] && current.len() > ARM_SHOULDER_JOINTS[0] {
                let zeros = ARM_SHOULDER_JOINTS.iter().filter(|j| dof[**j] == 0.0).count();
                if zeros != 0 && zeros != ARM_SHOULDER_JOINTS.len() {
                    let prev = current[ARM_SHOULDER_JOINTS[0]];
                    for j in ARM_SHOULDER_JOINTS.iter() {
                        dof[*j] = prev;
                    }
                }
            }
        }

        dof
    }

    /// Second task installed when the solver is opened.
    ///
    /// The arm keeps its elbow low, other limbs have no second task.
    pub fn default_second_task(&self) -> SecondTask {
        match self {
            LimbVariant::Arm => SecondTask {
                link: Some(ARM_ELBOW_LINK),
                xd: Vector3::new(0.0, 0.0, -1.0),
                w: Vector3::new(0.0, 0.0, 1.0),
            },
            _ => SecondTask::disabled()
        }
    }
}

impl CustomLimb {
    fn chain(&self) -> Result<KinematicChain, DescriptorError> {
        if self.links.is_empty() {
            return Err(DescriptorError::NoLinks);
        }

        let h0 = match self.h0.len() {
            0 => Matrix4::identity(),
            16 => Matrix4::from_row_slice(&self.h0),
            n => return Err(DescriptorError::InvalidBaseTransform(n))
        };

        let mut links = Vec::with_capacity(self.links.len());
        for (i, l) in self.links.iter().enumerate() {
            if !(l.min <= l.max) {
                return Err(DescriptorError::InvalidBounds(i));
            }

            links.push(Link::new(
                l.a,
                l.d,
                l.alpha.to_radians(),
                l.offset.to_radians(),
                l.min.to_radians(),
                l.max.to_radians()
            ));
        }

        let mut chain = KinematicChain::new(h0, links);
        for (i, l) in self.links.iter().enumerate() {
            if l.blocked {
                chain.block_link(i);
            }
        }

        Ok(chain)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the descriptor of a limb.
///
/// The robot name and the limb side (`type`, anything but `left` meaning right) are taken from the
/// options, the solver name gives the local part names.
pub fn build_descriptor(
    variant: &LimbVariant,
    slv_name: &str,
    options: &SolverOptions
) -> Result<PartDescriptor, DescriptorError> {
    let side = Side::from_str_or_right(&options.side);
    let robot = options.robot.as_str();

    let (parts, constraint, chain) = match variant {
        LimbVariant::Arm => (
            vec![
                PartConfig::new(robot, "torso", slv_name, true),
                PartConfig::new(robot, &format!("{}_arm", side.as_str()), slv_name, false),
            ],
            Some(LinIneqConstr::icub_shoulder()),
            icub_arm(side)
        ),
        LimbVariant::Leg => (
            vec![PartConfig::new(robot, &format!("{}_leg", side.as_str()), slv_name, false)],
            None,
            icub_leg(side)
        ),
        LimbVariant::Custom(c) => {
            if c.parts.is_empty() {
                return Err(DescriptorError::NoParts);
            }

            (
                c.parts.iter()
                    .map(|p| PartConfig::new(robot, &p.name, slv_name, p.reversed))
                    .collect(),
                None,
                c.chain()?
            )
        }
    };

    Ok(PartDescriptor {
        variant: variant.clone(),
        side,
        parts,
        constraint,
        chain,
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn options(side: &str) -> SolverOptions {
        SolverOptions {
            side: side.into(),
            ..SolverOptions::default()
        }
    }

    #[test]
    fn test_arm_descriptor() {
        let desc = build_descriptor(&LimbVariant::Arm, "slv", &options("left")).unwrap();

        assert_eq!(desc.side, Side::Left);
        assert_eq!(desc.parts.len(), 2);
        assert_eq!(desc.parts[0].remote, "/icub/torso");
        assert!(desc.parts[0].reversed);
        assert_eq!(desc.parts[1].remote, "/icub/left_arm");
        assert_eq!(desc.parts[1].local, "/slv/left_arm");
        assert!(desc.constraint.is_some());
        assert_eq!(desc.chain.n(), 10);
    }

    #[test]
    fn test_invalid_side_is_right() {
        let desc = build_descriptor(&LimbVariant::Leg, "slv", &options("up")).unwrap();

        assert_eq!(desc.side, Side::Right);
        assert_eq!(desc.parts[0].remote, "/icub/right_leg");
        assert!(desc.constraint.is_none());
    }

    #[test]
    fn test_custom_descriptor() {
        let limb: LimbVariant = toml::from_str(r#"
            kind = "custom"

            [[links]]
            a = 0.3
            d = 0.0
            alpha = 0.0
            min = -90.0
            max = 90.0

            [[links]]
            a = 0.2
            d = 0.0
            alpha = 0.0
            min = -90.0
            max = 90.0
            blocked = true

            [[parts]]
            name = "planar"
        "#).unwrap();

        let desc = build_descriptor(&limb, "slv", &options("right")).unwrap();
        assert_eq!(desc.parts[0].remote, "/icub/planar");
        assert_eq!(desc.chain.n(), 2);
        assert_eq!(desc.chain.dof(), 1);
        assert!((desc.chain.link(0).unwrap().max - 90f64.to_radians()).abs() < 1e-12);

        let bad = LimbVariant::Custom(CustomLimb {
            h0: vec![1.0; 4],
            links: vec![],
            parts: vec![CustomPart { name: "p".into(), reversed: false }],
        });
        assert_eq!(
            build_descriptor(&bad, "slv", &options("right")).err(),
            Some(DescriptorError::NoLinks)
        );
    }

    #[test]
    fn test_arm_shoulder_filter() {
        let arm = LimbVariant::Arm;
        let current = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        // Shoulder all blocked is consistent
        let dof = arm.filter_dof(&current, &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(&dof[..7], &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(&dof[7..], &[1.0, 1.0, 1.0]);

        // Mixed shoulder keeps the previous state
        let dof = arm.filter_dof(&current, &[1.0, 1.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(&dof[3..6], &[1.0, 1.0, 1.0]);

        // Unchanged entries count as their current value
        let blocked = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let dof = arm.filter_dof(&blocked, &[1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0]);
        assert_eq!(&dof[3..6], &[0.0, 0.0, 0.0]);
        let dof = arm.filter_dof(&blocked, &[1.0, 1.0, 1.0, 2.0, 0.0, 5.0, 1.0]);
        assert_eq!(&dof[3..6], &[0.0, 0.0, 0.0]);
        let dof = arm.filter_dof(&current, &[2.0, 0.0, 2.0, 2.0, 2.0, 1.0]);
        assert_eq!(&dof[..6], &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        // Other limbs merge without filtering
        let dof = LimbVariant::Leg.filter_dof(&[1.0; 6], &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(dof, vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_default_second_task() {
        let task = LimbVariant::Arm.default_second_task();
        assert_eq!(task.link, Some(ARM_ELBOW_LINK));
        assert_eq!(task.xd.z, -1.0);
        assert!(!LimbVariant::Leg.default_second_task().is_enabled());
    }
}
