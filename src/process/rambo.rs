//! RAMBO: flat generation of $n$ final-state momenta in the centre-of-mass frame (R. Kleiss,
//! W. J. Stirling and S. D. Ellis, Comput. Phys. Commun. 40 (1986) 359).
//!
//! Phase-space volumes follow the convention
//!
//! $$ \mathrm{d}\Phi_n = (2\pi)^{4 - 3n} \delta^{(4)} \left( P - \sum_i p_i \right) \prod_i
//! \frac{\mathrm{d}^3 p_i}{2 E_i} \, . $$
use crate::core::{count, lit, uniform, Miss, Real};
use crate::kinematics::{spatial_norm, FourVector};
use rand::Rng;

/// Number of Newton-Raphson iterations used to find the rescaling of massive momenta.
const NEWTON_ITERATIONS: usize = 16;

/// Volume of the massless $n$-particle phase space at the squared energy `s`,
///
/// $$ \Phi_n = (2\pi)^{4 - 3n} \left( \frac{\pi}{2} \right)^{n - 1}
/// \frac{s^{n - 2}}{(n - 1)! (n - 2)!} \, . $$
pub fn massless_volume<T: Real>(n: usize, s: T) -> T {
    assert!(n >= 2, "phase space needs at least two particles");

    let factorial = |k: usize| (1..=k).fold(T::one(), |acc, i| acc * count::<T>(i));
    let two_pi = T::PI() + T::PI();

    two_pi.powi(4 - 3 * n as i32) * T::FRAC_PI_2().powi(n as i32 - 1) * s.powi(n as i32 - 2)
        / (factorial(n - 1) * factorial(n - 2))
}

/// Ratio of the massive to the massless phase-space density for the massive momenta `momenta`,
/// whose energies add up to `e_cm`.
pub fn massive_factor<T: Real>(momenta: &[FourVector<T>], e_cm: T) -> T {
    let n = momenta.len();
    let mut sum_p = T::zero();
    let mut product = T::one();
    let mut sum_p2_e = T::zero();

    for p in momenta {
        let norm = spatial_norm(p);
        sum_p += norm;
        product *= norm / p[0];
        sum_p2_e += norm * norm / p[0];
    }

    (sum_p / e_cm).powi(2 * n as i32 - 3) * product * e_cm / sum_p2_e
}

/// Generates momenta for particles with masses `masses` that add up to $(\sqrt{s}, 0, 0, 0)$, with
/// $\sqrt{s} = $ `e_cm`. Returns the momenta and the phase-space weight.
pub fn generate<T: Real, R: Rng + ?Sized>(
    e_cm: T,
    masses: &[T],
    rng: &mut R,
) -> Result<(Vec<FourVector<T>>, T), Miss> {
    let n = masses.len();
    let mass_sum = masses.iter().fold(T::zero(), |acc, &m| acc + m);

    if n < 2 || !(e_cm > mass_sum) {
        return Err(Miss::Infeasible);
    }

    let one = T::one();
    let two = lit::<T>(2.0);
    let two_pi = T::PI() + T::PI();

    // isotropic massless momenta with energies following E exp(-E)
    let q: Vec<FourVector<T>> = (0..n)
        .map(|_| {
            let r: [T; 4] = [uniform(rng), uniform(rng), uniform(rng), uniform(rng)];
            let cos_theta = two * r[0] - one;
            let sin_theta = (one - cos_theta * cos_theta).max(T::zero()).sqrt();
            let (sin_phi, cos_phi) = (two_pi * r[1]).sin_cos();
            // `1 - r` keeps the logarithm finite
            let energy = -((one - r[2]) * (one - r[3])).ln();

            [
                energy,
                energy * sin_theta * cos_phi,
                energy * sin_theta * sin_phi,
                energy * cos_theta,
            ]
        })
        .collect();

    // boost and rescale the sum into the centre-of-mass frame
    let total = q.iter().fold([T::zero(); 4], |acc, p| {
        [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2], acc[3] + p[3]]
    });
    let total_mass = (total[0] * total[0] - total[1] * total[1] - total[2] * total[2]
        - total[3] * total[3])
        .sqrt();
    let b = [
        -total[1] / total_mass,
        -total[2] / total_mass,
        -total[3] / total_mass,
    ];
    let gamma = total[0] / total_mass;
    let a = (one + gamma).recip();
    let x = e_cm / total_mass;

    let mut momenta: Vec<FourVector<T>> = q
        .iter()
        .map(|q| {
            let bq = b[0] * q[1] + b[1] * q[2] + b[2] * q[3];
            let c = q[0] + a * bq;

            [
                x * (gamma * q[0] + bq),
                x * (b[0] * c + q[1]),
                x * (b[1] * c + q[2]),
                x * (b[2] * c + q[3]),
            ]
        })
        .collect();

    let mut weight = massless_volume(n, e_cm * e_cm);

    if mass_sum > T::zero() {
        let xi = rescaling(e_cm, &momenta, masses);

        for (p, &m) in momenta.iter_mut().zip(masses) {
            p[0] = (m * m + xi * xi * p[0] * p[0]).sqrt();
            p[1] *= xi;
            p[2] *= xi;
            p[3] *= xi;
        }

        weight *= massive_factor(&momenta, e_cm);
    }

    if weight.is_finite() && weight > T::zero() {
        Ok((momenta, weight))
    } else {
        Err(Miss::Infeasible)
    }
}

/// Solves $\sum_i \sqrt{m_i^2 + \xi^2 E_i^2} = \sqrt{s}$ for $\xi$.
fn rescaling<T: Real>(e_cm: T, momenta: &[FourVector<T>], masses: &[T]) -> T {
    let mass_sum = masses.iter().fold(T::zero(), |acc, &m| acc + m);
    let ratio = mass_sum / e_cm;
    let mut xi = (T::one() - ratio * ratio).sqrt();

    for _ in 0..NEWTON_ITERATIONS {
        let mut f = -e_cm;
        let mut derivative = T::zero();

        for (p, &m) in momenta.iter().zip(masses) {
            let e2 = p[0] * p[0];
            let energy = (m * m + xi * xi * e2).sqrt();
            f += energy;
            derivative += xi * e2 / energy;
        }

        if derivative == T::zero() {
            break;
        }

        xi -= f / derivative;
    }

    xi
}
