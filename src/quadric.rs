use std::ops::{Add, AddAssign};

use nalgebra::Point3;

/// A symmetric 4x4 error quadric stored as its ten upper-triangular
/// entries:
///
/// ```text
/// | m0 m1 m2 m3 |
/// |    m4 m5 m6 |
/// |       m7 m8 |
/// |          m9 |
/// ```
///
/// Each vertex accumulates the plane quadrics of its incident triangles;
/// evaluating the quadric at a point gives the sum of squared distances
/// to those planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricQuadric {
    m: [f64; 10],
}

impl SymmetricQuadric {
    pub fn zero() -> Self {
        SymmetricQuadric { m: [0.0; 10] }
    }

    /// The rank-1 quadric of the plane `ax + by + cz + d = 0`.
    pub fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        SymmetricQuadric {
            m: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.m[index]
    }

    /// Determinant of the 3x3 submatrix picked out by the given entry
    /// indices. The collapse-point solve uses this as a cofactor
    /// expansion over the upper-left block and its column replacements.
    pub fn det(
        &self,
        a11: usize,
        a12: usize,
        a13: usize,
        a21: usize,
        a22: usize,
        a23: usize,
        a31: usize,
        a32: usize,
        a33: usize,
    ) -> f64 {
        self.m[a11] * self.m[a22] * self.m[a33]
            + self.m[a13] * self.m[a21] * self.m[a32]
            + self.m[a12] * self.m[a23] * self.m[a31]
            - self.m[a13] * self.m[a22] * self.m[a31]
            - self.m[a11] * self.m[a23] * self.m[a32]
            - self.m[a12] * self.m[a21] * self.m[a33]
    }

    /// Evaluate `[p, 1] Q [p, 1]^T`.
    pub fn vertex_error(&self, p: &Point3<f64>) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        self.m[0] * x * x
            + 2.0 * self.m[1] * x * y
            + 2.0 * self.m[2] * x * z
            + 2.0 * self.m[3] * x
            + self.m[4] * y * y
            + 2.0 * self.m[5] * y * z
            + 2.0 * self.m[6] * y
            + self.m[7] * z * z
            + 2.0 * self.m[8] * z
            + self.m[9]
    }
}

impl Add for SymmetricQuadric {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let mut m = self.m;
        for (a, b) in m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
        SymmetricQuadric { m }
    }
}

impl AddAssign for SymmetricQuadric {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_quadric_distance() {
        // quadric of the plane z = 2, i.e. z - 2 = 0
        let q = SymmetricQuadric::from_plane(0.0, 0.0, 1.0, -2.0);

        // on the plane the error is zero
        assert_relative_eq!(
            q.vertex_error(&Point3::new(5.0, -3.0, 2.0)),
            0.0,
            epsilon = 1e-12
        );

        // three above the plane the error is the squared distance
        assert_relative_eq!(
            q.vertex_error(&Point3::new(0.0, 0.0, 5.0)),
            9.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_quadric_sum() {
        // two parallel planes z = 0 and z = 2: the summed quadric at the
        // midplane should give 1 + 1
        let a = SymmetricQuadric::from_plane(0.0, 0.0, 1.0, 0.0);
        let b = SymmetricQuadric::from_plane(0.0, 0.0, 1.0, -2.0);
        let mut q = a + b;
        assert_relative_eq!(
            q.vertex_error(&Point3::new(0.0, 0.0, 1.0)),
            2.0,
            epsilon = 1e-12
        );

        q += SymmetricQuadric::zero();
        assert_relative_eq!(
            q.vertex_error(&Point3::new(0.0, 0.0, 1.0)),
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_upper_left_det() {
        // the 3x3 block of a unit x-plane quadric is rank one
        let q = SymmetricQuadric::from_plane(1.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(q.det(0, 1, 2, 1, 4, 5, 2, 5, 7), 0.0, epsilon = 1e-15);

        // three orthogonal planes give a full-rank block
        let q = SymmetricQuadric::from_plane(1.0, 0.0, 0.0, 0.0)
            + SymmetricQuadric::from_plane(0.0, 1.0, 0.0, 0.0)
            + SymmetricQuadric::from_plane(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(q.det(0, 1, 2, 1, 4, 5, 2, 5, 7), 1.0, epsilon = 1e-12);
    }
}
