//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimentions then `None` is
/// returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T>
where
    T: Float + std::ops::AddAssign,
{
    // Check that the dimentions match
    if point_0.len() != point_1.len() {
        return None;
    }

    let mut sum = T::zero();

    for (a, b) in point_0.iter().zip(point_1.iter()) {
        sum += (*a - *b).powi(2);
    }

    Some(sum.sqrt())
}

/// Clamp a value into `[min, max]`.
///
/// If `min > max` the value is clamped to `min`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Returns true if `a` and `b` are within `tol` of each other.
pub fn approx_eq<T>(a: T, b: T, tol: T) -> bool
where
    T: Float,
{
    (a - b).abs() <= tol
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_norm() {
        assert_eq!(norm(&[0f64, 0.0, 0.0], &[3.0, 4.0, 0.0]), Some(5.0));
        assert_eq!(norm(&[0f64, 0.0], &[3.0, 4.0, 0.0]), None);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&5f64, &0.0, &3.0), 3.0);
        assert_eq!(clamp(&-5f64, &0.0, &3.0), 0.0);
        assert_eq!(clamp(&1.5f64, &0.0, &3.0), 1.5);
    }

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(1.0f64, 1.0 + 1e-9, 1e-6));
        assert!(!approx_eq(1.0f64, 1.1, 1e-6));
    }
}
