//! # Kinematic chain module
//!
//! Serial chains of revolute joints described by Denavit-Hartenberg parameters. Each link can be
//! blocked, in which case it is held at its blocking value and takes no part in the solution.
//!
//! Angles are stored in radians. Vectors indexed by "free" joints only contain the links which are
//! not blocked, in chain order.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod constr;
mod limbs;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, Matrix3, Matrix4, Rotation3, Unit, Vector3};
use serde::{Serialize, Deserialize};

pub use constr::*;
pub use limbs::*;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single revolute link of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Link length (m)
    pub a: f64,

    /// Link offset (m)
    pub d: f64,

    /// Link twist (rad)
    pub alpha: f64,

    /// Joint angle offset (rad)
    pub offset: f64,

    /// Lower joint bound (rad)
    pub min: f64,

    /// Upper joint bound (rad)
    pub max: f64,

    /// Current joint angle (rad)
    #[serde(default)]
    pub ang: f64,

    /// Blocked links keep their angle and are excluded from the free joints
    #[serde(default)]
    pub blocked: bool,
}

/// A serial kinematic chain.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicChain {
    /// Base transform, from the root frame to the first link
    h0: Matrix4<f64>,

    /// Tip transform, from the last link to the end-effector
    hn: Matrix4<f64>,

    links: Vec<Link>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Link {
    pub fn new(a: f64, d: f64, alpha: f64, offset: f64, min: f64, max: f64) -> Self {
        Self {
            a,
            d,
            alpha,
            offset,
            min,
            max,
            ang: 0.0,
            blocked: false,
        }
    }

    /// The homogeneous transform of this link for the given joint angle.
    pub fn transform(&self, ang: f64) -> Matrix4<f64> {
        let theta = ang + self.offset;
        let (st, ct) = theta.sin_cos();
        let (sa, ca) = self.alpha.sin_cos();

        Matrix4::new(
            ct, -st * ca,  st * sa, ct * self.a,
            st,  ct * ca, -ct * sa, st * self.a,
            0.0,      sa,       ca,      self.d,
            0.0,     0.0,      0.0,         1.0
        )
    }

    /// Clamp an angle into the bounds of this link.
    pub fn clamp(&self, ang: f64) -> f64 {
        util::maths::clamp(&ang, &self.min, &self.max)
    }
}

impl KinematicChain {
    /// Create a new chain from its base transform and links.
    ///
    /// Initial angles are clamped into the link bounds.
    pub fn new(h0: Matrix4<f64>, links: Vec<Link>) -> Self {
        let mut links = links;
        for l in links.iter_mut() {
            l.ang = l.clamp(l.ang);
        }

        Self {
            h0,
            hn: Matrix4::identity(),
            links,
        }
    }

    /// Total number of links.
    pub fn n(&self) -> usize {
        self.links.len()
    }

    /// Number of free (not blocked) links.
    pub fn dof(&self) -> usize {
        self.links.iter().filter(|l| !l.blocked).count()
    }

    pub fn link(&self, i: usize) -> Option<&Link> {
        self.links.get(i)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Chain indices of the free links, in order.
    pub fn free_indices(&self) -> Vec<usize> {
        self.links.iter()
            .enumerate()
            .filter(|(_, l)| !l.blocked)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_blocked(&self, i: usize) -> bool {
        self.links.get(i).map(|l| l.blocked).unwrap_or(false)
    }

    /// Block a link at its current angle. Returns false if the index is out of range.
    pub fn block_link(&mut self, i: usize) -> bool {
        match self.links.get_mut(i) {
            Some(l) => {
                l.blocked = true;
                true
            },
            None => false
        }
    }

    /// Release a blocked link. Returns false if the index is out of range.
    pub fn release_link(&mut self, i: usize) -> bool {
        match self.links.get_mut(i) {
            Some(l) => {
                l.blocked = false;
                true
            },
            None => false
        }
    }

    /// Set the angle a blocked link is held at.
    ///
    /// Has no effect and returns false if the link is not blocked.
    pub fn set_blocking_value(&mut self, i: usize, ang: f64) -> bool {
        match self.links.get_mut(i) {
            Some(l) if l.blocked => {
                l.ang = ang;
                true
            },
            _ => false
        }
    }

    /// Angle of link `i`, free or blocked.
    pub fn ang(&self, i: usize) -> f64 {
        self.links.get(i).map(|l| l.ang).unwrap_or(0.0)
    }

    /// Set the angle of a free link `i`, clamped into its bounds. The applied angle is returned.
    pub fn set_ang(&mut self, i: usize, ang: f64) -> f64 {
        match self.links.get_mut(i) {
            Some(l) if !l.blocked => {
                l.ang = l.clamp(ang);
                l.ang
            },
            Some(l) => l.ang,
            None => 0.0
        }
    }

    /// Angles of every link in chain order.
    pub fn all_angles(&self) -> Vec<f64> {
        self.links.iter().map(|l| l.ang).collect()
    }

    /// Angles of the free links.
    pub fn free_angles(&self) -> Vec<f64> {
        self.links.iter().filter(|l| !l.blocked).map(|l| l.ang).collect()
    }

    /// Set the angles of the free links, each clamped into its bounds.
    ///
    /// If fewer values than free links are given only the first ones are set.
    pub fn set_free_angles(&mut self, q: &[f64]) -> Vec<f64> {
        for (l, ang) in self.links.iter_mut().filter(|l| !l.blocked).zip(q.iter()) {
            l.ang = l.clamp(*ang);
        }
        self.free_angles()
    }

    /// Set the bounds of link `i`.
    pub fn set_bounds(&mut self, i: usize, min: f64, max: f64) -> bool {
        match self.links.get_mut(i) {
            Some(l) => {
                l.min = min;
                l.max = max;
                true
            },
            None => false
        }
    }

    /// Bounds of the free links.
    pub fn free_bounds(&self) -> Vec<(f64, f64)> {
        self.links.iter().filter(|l| !l.blocked).map(|l| (l.min, l.max)).collect()
    }

    pub fn hn(&self) -> &Matrix4<f64> {
        &self.hn
    }

    /// Set the tip transform.
    pub fn set_hn(&mut self, hn: Matrix4<f64>) {
        self.hn = hn;
    }

    /// Expand a free angles vector into a full angles vector using the current blocked values.
    pub fn expand_free(&self, q_free: &[f64]) -> Vec<f64> {
        let mut free = q_free.iter();

        self.links.iter()
            .map(|l| {
                if l.blocked {
                    l.ang
                } else {
                    free.next().map(|a| l.clamp(*a)).unwrap_or(l.ang)
                }
            })
            .collect()
    }

    /// Frames of the chain for the full angles vector `q`.
    ///
    /// Element `k` is the transform from the root to the base of link `k`, element `n` is the frame
    /// at the end of the last link (excluding the tip transform).
    pub fn frames(&self, q: &[f64]) -> Vec<Matrix4<f64>> {
        let mut frames = Vec::with_capacity(self.n() + 1);
        let mut h = self.h0;
        frames.push(h);

        for (l, ang) in self.links.iter().zip(q.iter()) {
            h = h * l.transform(*ang);
            frames.push(h);
        }

        frames
    }

    /// End-effector transform for the full angles vector `q`.
    pub fn end_eff_transform(&self, q: &[f64]) -> Matrix4<f64> {
        let frames = self.frames(q);
        frames[frames.len() - 1] * self.hn
    }

    /// Current end-effector pose as `[x y z ax ay az theta]`.
    pub fn end_eff_pose(&self) -> Vec<f64> {
        pose_from_transform(&self.end_eff_transform(&self.all_angles()))
    }

    /// End-effector pose for the given free angles, without changing the chain.
    pub fn end_eff_pose_for(&self, q_free: &[f64]) -> Vec<f64> {
        pose_from_transform(&self.end_eff_transform(&self.expand_free(q_free)))
    }

    /// Position of the frame at the end of link `link` for the full angles vector `q`.
    pub fn link_position(&self, q: &[f64], link: usize) -> Option<Vector3<f64>> {
        self.frames(q).get(link + 1).map(translation)
    }

    /// Geometric Jacobian over the free links for a point attached to frame `frame`.
    ///
    /// `frame` is an index into [`frames`](Self::frames), or `None` for the end-effector. Only
    /// links before `frame` contribute. The result has 3 rows (position only) or 6 rows (position
    /// and orientation) and one column per free link.
    pub fn jacobian(&self, q: &[f64], frame: Option<usize>, rows: usize) -> DMatrix<f64> {
        let frames = self.frames(q);
        let (end, upto) = match frame {
            Some(f) if f < frames.len() => (translation(&frames[f]), f),
            _ => (translation(&(frames[frames.len() - 1] * self.hn)), self.n()),
        };

        let mut jac = DMatrix::zeros(rows, self.dof());

        for (col, i) in self.free_indices().into_iter().enumerate() {
            if i >= upto {
                break;
            }

            // Joint i rotates about the z axis of the frame at its base
            let z = Vector3::new(frames[i][(0, 2)], frames[i][(1, 2)], frames[i][(2, 2)]);
            let lin = z.cross(&(end - translation(&frames[i])));

            jac[(0, col)] = lin.x;
            jac[(1, col)] = lin.y;
            jac[(2, col)] = lin.z;

            if rows >= 6 {
                jac[(3, col)] = z.x;
                jac[(4, col)] = z.y;
                jac[(5, col)] = z.z;
            }
        }

        jac
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Translation part of a homogeneous transform.
pub fn translation(h: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(h[(0, 3)], h[(1, 3)], h[(2, 3)])
}

/// Rotation part of a homogeneous transform.
pub fn rotation(h: &Matrix4<f64>) -> Matrix3<f64> {
    Matrix3::new(
        h[(0, 0)], h[(0, 1)], h[(0, 2)],
        h[(1, 0)], h[(1, 1)], h[(1, 2)],
        h[(2, 0)], h[(2, 1)], h[(2, 2)]
    )
}

/// Convert a homogeneous transform into a `[x y z ax ay az theta]` pose.
///
/// For a null rotation the axis is reported as `z` with a zero angle.
pub fn pose_from_transform(h: &Matrix4<f64>) -> Vec<f64> {
    let p = translation(h);
    let rot = Rotation3::from_matrix_unchecked(rotation(h));

    let (axis, angle) = match rot.axis_angle() {
        Some((axis, angle)) => (axis.into_inner(), angle),
        None => (Vector3::z(), 0.0)
    };

    vec![p.x, p.y, p.z, axis.x, axis.y, axis.z, angle]
}

/// Convert a `[x y z ax ay az theta]` pose into a homogeneous transform.
///
/// Missing orientation components give an identity rotation.
pub fn transform_from_pose(pose: &[f64]) -> Matrix4<f64> {
    let mut h = Matrix4::identity();

    if pose.len() >= 7 {
        let axis = Vector3::new(pose[3], pose[4], pose[5]);
        if axis.norm() > f64::EPSILON {
            let r = Rotation3::from_axis_angle(&Unit::new_normalize(axis), pose[6]);
            let m = r.matrix();
            for i in 0..3 {
                for j in 0..3 {
                    h[(i, j)] = m[(i, j)];
                }
            }
        }
    }

    for i in 0..pose.len().min(3) {
        h[(i, 3)] = pose[i];
    }

    h
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    /// Planar two link chain in the xy plane, 0.3 m and 0.2 m long
    fn planar() -> KinematicChain {
        KinematicChain::new(
            Matrix4::identity(),
            vec![
                Link::new(0.3, 0.0, 0.0, 0.0, -3.0, 3.0),
                Link::new(0.2, 0.0, 0.0, 0.0, -3.0, 3.0),
            ]
        )
    }

    #[test]
    fn test_forward_kinematics() {
        let mut chain = planar();

        let pose = chain.end_eff_pose();
        assert!((pose[0] - 0.5).abs() < 1e-12);
        assert!(pose[1].abs() < 1e-12);

        chain.set_ang(0, FRAC_PI_2);
        let pose = chain.end_eff_pose();
        assert!(pose[0].abs() < 1e-12);
        assert!((pose[1] - 0.5).abs() < 1e-12);
        // Rotation about z by pi/2
        assert!((pose[5] - 1.0).abs() < 1e-9);
        assert!((pose[6] - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_block_release() {
        let mut chain = planar();
        assert_eq!(chain.dof(), 2);

        chain.set_ang(0, 0.5);
        assert!(chain.block_link(0));
        assert_eq!(chain.dof(), 1);
        assert_eq!(chain.free_indices(), vec![1]);

        // Blocked links ignore set_ang but take blocking values
        assert_eq!(chain.set_ang(0, 1.0), 0.5);
        assert!(chain.set_blocking_value(0, 1.0));
        assert_eq!(chain.ang(0), 1.0);
        assert!(!chain.set_blocking_value(1, 1.0));

        assert_eq!(chain.expand_free(&[0.25]), vec![1.0, 0.25]);

        assert!(chain.release_link(0));
        assert_eq!(chain.dof(), 2);
        assert!(!chain.block_link(5));
    }

    #[test]
    fn test_clamped_angles() {
        let mut chain = planar();
        chain.set_bounds(1, -0.5, 0.5);
        assert_eq!(chain.set_ang(1, 2.0), 0.5);
        assert_eq!(chain.set_free_angles(&[4.0, -1.0]), vec![3.0, -0.5]);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let mut chain = icub_arm(Side::Right);
        for i in 0..3 {
            chain.release_link(i);
        }
        let q: Vec<f64> = chain.links().iter().map(|l| 0.5 * (l.min + l.max)).collect();
        let jac = chain.jacobian(&q, None, 3);

        let h = 1e-7;
        let p0 = translation(&chain.end_eff_transform(&q));
        for j in 0..chain.n() {
            let mut qh = q.clone();
            qh[j] += h;
            let ph = translation(&chain.end_eff_transform(&qh));
            let fd = (ph - p0) / h;
            for r in 0..3 {
                assert!((fd[r] - jac[(r, j)]).abs() < 1e-5, "joint {} row {}", j, r);
            }
        }
    }

    #[test]
    fn test_pose_transform_conversion() {
        let pose = vec![0.1, -0.2, 0.3, 0.0, 1.0, 0.0, 0.7];
        let back = pose_from_transform(&transform_from_pose(&pose));
        for (a, b) in pose.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        let h = transform_from_pose(&[1.0, 2.0, 3.0]);
        assert_eq!(translation(&h), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(rotation(&h), Matrix3::identity());
    }
}
