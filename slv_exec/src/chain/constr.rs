//! Linear inequality constraints over chain joints

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};

use super::KinematicChain;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single constraint `lb <= sum(coeff * q[joint]) <= ub`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrRow {
    /// Pairs of chain joint index and coefficient
    pub coeffs: Vec<(usize, f64)>,

    pub lb: f64,

    pub ub: f64,
}

/// A set of linear inequality constraints on the joints of a chain.
///
/// The constraints are only enforced while every joint they involve is free, see
/// [`update`](Self::update).
#[derive(Debug, Clone, PartialEq)]
pub struct LinIneqConstr {
    rows: Vec<ConstrRow>,

    active: bool,
}

/// Constraints expressed over the free joints of a chain: `lb <= c q <= ub`.
#[derive(Debug, Clone)]
pub struct FreeConstr {
    pub c: DMatrix<f64>,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LinIneqConstr {
    pub fn new(rows: Vec<ConstrRow>) -> Self {
        Self {
            rows,
            active: true,
        }
    }

    /// Coupling limits of the iCub shoulder, acting on arm chain joints 3, 4 and 5.
    pub fn icub_shoulder() -> Self {
        let deg = |d: f64| d.to_radians();
        let k = 1.71;

        Self::new(vec![
            ConstrRow {
                coeffs: vec![(3, k), (4, -k)],
                lb: deg(-347.00),
                ub: f64::INFINITY,
            },
            ConstrRow {
                coeffs: vec![(3, k), (4, -k), (5, -k)],
                lb: deg(-366.57),
                ub: deg(112.42),
            },
            ConstrRow {
                coeffs: vec![(4, 1.0), (5, 1.0)],
                lb: deg(-66.60),
                ub: deg(213.30),
            },
        ])
    }

    pub fn rows(&self) -> &[ConstrRow] {
        &self.rows
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-evaluate whether the constraints apply to the chain's current blocking state.
    pub fn update(&mut self, chain: &KinematicChain) {
        self.active = self.rows.iter()
            .flat_map(|r| r.coeffs.iter())
            .all(|(j, _)| *j < chain.n() && !chain.is_blocked(*j));
    }

    /// Express the constraints over the free joints of the chain.
    ///
    /// `None` is returned if the constraints are inactive.
    pub fn for_free(&self, chain: &KinematicChain) -> Option<FreeConstr> {
        if !self.active {
            return None;
        }

        let free = chain.free_indices();
        let mut c = DMatrix::zeros(self.rows.len(), free.len());
        let mut lb = DVector::zeros(self.rows.len());
        let mut ub = DVector::zeros(self.rows.len());

        for (r, row) in self.rows.iter().enumerate() {
            for (j, coeff) in row.coeffs.iter() {
                let col = free.iter().position(|f| f == j)?;
                c[(r, col)] = *coeff;
            }
            lb[r] = row.lb;
            ub[r] = row.ub;
        }

        Some(FreeConstr { c, lb, ub })
    }
}

impl FreeConstr {
    /// Returns true if `q` satisfies every constraint within `tol`.
    pub fn satisfied(&self, q: &DVector<f64>, tol: f64) -> bool {
        let v = &self.c * q;
        (0..v.len()).all(|i| v[i] >= self.lb[i] - tol && v[i] <= self.ub[i] + tol)
    }

    /// Project `q` onto the violated constraints, one row at a time.
    pub fn project(&self, q: &mut DVector<f64>) {
        for i in 0..self.c.nrows() {
            let row = self.c.row(i).transpose();
            let v = row.dot(q);
            let norm_sq = row.norm_squared();
            if norm_sq <= f64::EPSILON {
                continue;
            }

            let bound = if v < self.lb[i] {
                self.lb[i]
            } else if v > self.ub[i] {
                self.ub[i]
            } else {
                continue
            };

            *q += row * ((bound - v) / norm_sq);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::{icub_arm, Side};

    #[test]
    fn test_shoulder_activation() {
        let mut chain = icub_arm(Side::Right);
        let mut cns = LinIneqConstr::icub_shoulder();

        cns.update(&chain);
        assert!(cns.is_active());

        let free = cns.for_free(&chain).unwrap();
        assert_eq!(free.c.nrows(), 3);
        assert_eq!(free.c.ncols(), 7);
        // Joint 3 is the first free joint since the torso is blocked
        assert_eq!(free.c[(0, 0)], 1.71);

        chain.block_link(4);
        cns.update(&chain);
        assert!(!cns.is_active());
        assert!(cns.for_free(&chain).is_none());
    }

    #[test]
    fn test_projection() {
        let chain = icub_arm(Side::Right);
        let cns = LinIneqConstr::icub_shoulder();
        let free = cns.for_free(&chain).unwrap();

        // Shoulder roll and yaw summing well above the bound
        let mut q = DVector::zeros(7);
        q[1] = 2.0;
        q[2] = 2.0;
        assert!(!free.satisfied(&q, 1e-9));

        for _ in 0..10 {
            free.project(&mut q);
        }
        assert!(free.satisfied(&q, 1e-6));
    }
}
