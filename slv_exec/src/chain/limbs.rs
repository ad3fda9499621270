//! Denavit-Hartenberg tables of the iCub limbs

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f64::consts::{FRAC_PI_2, PI};
use nalgebra::Matrix4;
use serde::{Serialize, Deserialize};

use super::{KinematicChain, Link};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of torso links at the root of the arm chain
pub const NUM_TORSO_LINKS: usize = 3;

/// Index of the elbow link in the arm chain
pub const ARM_ELBOW_LINK: usize = 6;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Limb side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Side {
    /// Parse a side, anything other than `left` gives `Right`.
    pub fn from_str_or_right(s: &str) -> Self {
        match s {
            "left" => Side::Left,
            _ => Side::Right
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The arm chain, torso included: 3 torso links followed by 7 arm links.
///
/// The torso links are blocked.
pub fn icub_arm(side: Side) -> KinematicChain {
    let h0 = Matrix4::new(
        0.0, -1.0,  0.0, 0.0,
        0.0,  0.0, -1.0, 0.0,
        1.0,  0.0,  0.0, 0.0,
        0.0,  0.0,  0.0, 1.0
    );

    // a, d, alpha, offset, min [deg], max [deg]
    let table: [(f64, f64, f64, f64, f64, f64); 10] = match side {
        Side::Right => [
            (0.032, 0.0, FRAC_PI_2, 0.0, -22.0, 84.0),
            (0.0, -0.0055, FRAC_PI_2, -FRAC_PI_2, -39.0, 39.0),
            (-0.0233647, -0.1433, FRAC_PI_2, -105.0f64.to_radians(), -59.0, 59.0),
            (0.0, 0.10774, FRAC_PI_2, -FRAC_PI_2, -95.5, 5.0),
            (0.0, 0.0, -FRAC_PI_2, -FRAC_PI_2, 0.0, 160.8),
            (0.0, 0.15228, -FRAC_PI_2, -105.0f64.to_radians(), -37.0, 100.0),
            (0.015, 0.0, FRAC_PI_2, 0.0, 5.5, 106.0),
            (0.0, 0.1373, FRAC_PI_2, -FRAC_PI_2, -90.0, 90.0),
            (0.0, 0.0, FRAC_PI_2, FRAC_PI_2, -90.0, 0.0),
            (0.0625, 0.016, 0.0, PI, -20.0, 40.0),
        ],
        Side::Left => [
            (0.032, 0.0, FRAC_PI_2, 0.0, -22.0, 84.0),
            (0.0, -0.0055, FRAC_PI_2, -FRAC_PI_2, -39.0, 39.0),
            (0.0233647, -0.1433, -FRAC_PI_2, 105.0f64.to_radians(), -59.0, 59.0),
            (0.0, -0.10774, FRAC_PI_2, -FRAC_PI_2, -95.5, 5.0),
            (0.0, 0.0, FRAC_PI_2, -FRAC_PI_2, 0.0, 160.8),
            (0.0, -0.15228, -FRAC_PI_2, -105.0f64.to_radians(), -37.0, 100.0),
            (-0.015, 0.0, FRAC_PI_2, 0.0, 5.5, 106.0),
            (0.0, -0.1373, FRAC_PI_2, -FRAC_PI_2, -90.0, 90.0),
            (0.0, 0.0, FRAC_PI_2, FRAC_PI_2, -90.0, 0.0),
            (0.0625, -0.016, 0.0, 0.0, -20.0, 40.0),
        ],
    };

    let mut chain = KinematicChain::new(h0, links_from_table(&table));
    for i in 0..NUM_TORSO_LINKS {
        chain.block_link(i);
    }

    chain
}

/// The leg chain, 6 links from the hip to the ankle.
pub fn icub_leg(side: Side) -> KinematicChain {
    let y0 = match side {
        Side::Right => 0.0681,
        Side::Left => -0.0681,
    };

    let h0 = Matrix4::new(
        0.0, -1.0,  0.0, 0.0,
        0.0,  0.0, -1.0, y0,
        1.0,  0.0,  0.0, -0.1199,
        0.0,  0.0,  0.0, 1.0
    );

    let d2 = match side {
        Side::Right => 0.2236,
        Side::Left => -0.2236,
    };

    let table: [(f64, f64, f64, f64, f64, f64); 6] = [
        (0.0, 0.0, FRAC_PI_2, FRAC_PI_2, -44.0, 132.0),
        (0.0, 0.0, FRAC_PI_2, FRAC_PI_2, -119.0, 17.0),
        (0.0, d2, -FRAC_PI_2, -FRAC_PI_2, -79.0, 79.0),
        (-0.213, 0.0, PI, FRAC_PI_2, -125.0, 23.0),
        (0.0, 0.0, FRAC_PI_2, 0.0, -42.0, 21.0),
        (-0.041, 0.0, PI, 0.0, -24.0, 24.0),
    ];

    KinematicChain::new(h0, links_from_table(&table))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn links_from_table(table: &[(f64, f64, f64, f64, f64, f64)]) -> Vec<Link> {
    table.iter()
        .map(|(a, d, alpha, offset, min, max)| {
            Link::new(*a, *d, *alpha, *offset, min.to_radians(), max.to_radians())
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arm_layout() {
        let chain = icub_arm(Side::Left);
        assert_eq!(chain.n(), 10);
        assert_eq!(chain.dof(), 7);
        assert!(chain.is_blocked(0) && chain.is_blocked(2));
        assert!(!chain.is_blocked(3));

        // Zero is outside the bounds of the elbow so it is clamped to the minimum
        assert!((chain.ang(6) - 5.5f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_leg_layout() {
        let chain = icub_leg(Side::Right);
        assert_eq!(chain.n(), 6);
        assert_eq!(chain.dof(), 6);
    }

    #[test]
    fn test_side() {
        assert_eq!(Side::from_str_or_right("left"), Side::Left);
        assert_eq!(Side::from_str_or_right("middle"), Side::Right);
    }
}
