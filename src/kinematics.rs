//! Minkowski-space helpers for four-vectors stored as `[E, px, py, pz]`.
use crate::core::{lit, Real};

/// A four-vector with the energy component first.
pub type FourVector<T> = [T; 4];

/// Minkowski product with metric $(+, -, -, -)$.
pub fn dot<T: Real>(a: &FourVector<T>, b: &FourVector<T>) -> T {
    a[0] * b[0] - a[1] * b[1] - a[2] * b[2] - a[3] * b[3]
}

/// The invariant mass squared, $p^2$.
pub fn mass2<T: Real>(p: &FourVector<T>) -> T {
    dot(p, p)
}

/// Component-wise sum.
pub fn add<T: Real>(a: &FourVector<T>, b: &FourVector<T>) -> FourVector<T> {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

/// Length of the spatial part.
pub fn spatial_norm<T: Real>(p: &FourVector<T>) -> T {
    (p[1] * p[1] + p[2] * p[2] + p[3] * p[3]).sqrt()
}

/// Källén function $\lambda(a, b, c) = a^2 + b^2 + c^2 - 2ab - 2ac - 2bc$.
pub fn kallen<T: Real>(a: T, b: T, c: T) -> T {
    let two = lit::<T>(2.0);
    a * a + b * b + c * c - two * (a * b + a * c + b * c)
}

/// Boosts `p`, given in the rest frame of `q`, into the frame in which `q` is given. `mass` must be
/// the mass of `q`.
pub fn boost<T: Real>(p: &FourVector<T>, q: &FourVector<T>, mass: T) -> FourVector<T> {
    let qp = q[1] * p[1] + q[2] * p[2] + q[3] * p[3];
    let energy = (q[0] * p[0] + qp) / mass;
    let factor = (p[0] + energy) / (q[0] + mass);

    [
        energy,
        p[1] + factor * q[1],
        p[2] + factor * q[2],
        p[3] + factor * q[3],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_boost_preserves_mass() {
        let q: [f64; 4] = [10.0, 1.0, -2.0, 3.0];
        let m = mass2(&q).sqrt();
        let p = [3.0, 0.5, 1.5, -2.0];
        let boosted = boost(&p, &q, m);

        assert_approx_eq!(mass2(&boosted), mass2(&p), 1e-12);
        // the rest frame of q moves with q
        let rest = boost(&[m, 0.0, 0.0, 0.0], &q, m);
        for i in 0..4 {
            assert_approx_eq!(rest[i], q[i], 1e-12);
        }
    }

    #[test]
    fn test_kallen() {
        assert_eq!(kallen(1.0, 0.0, 0.0), 1.0);
        // two-body momentum of 100 -> 30 + 40
        let m = 100.0f64;
        let p = kallen(m * m, 900.0, 1600.0).sqrt() / (2.0 * m);
        assert_approx_eq!((900.0 + p * p).sqrt() + (1600.0 + p * p).sqrt(), m, 1e-12);
    }
}
