//! Analytic densities used by the channels, together with their cumulative distribution functions
//! and its inverses.
use crate::core::Real;
use serde::{Deserialize, Serialize};

/// Position of a sampling domain relative to the pole of a power-law density.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Side {
    /// The domain lies completely above the pole.
    Above,
    /// The domain lies completely below the pole.
    Below,
    /// The pole lies inside the domain.
    Across,
}

impl Side {
    /// Determines on which side of `pole` the interval from `lower` to `upper` lies.
    pub fn of<T: Real>(pole: T, lower: T, upper: T) -> Self {
        if lower >= pole {
            Self::Above
        } else if upper <= pole {
            Self::Below
        } else {
            Self::Across
        }
    }
}

/// An unnormalised one-dimensional density with the parameters resolved from the resonance it
/// describes.
///
/// For every continuous variant `cdf` is monotonically increasing and `inverse_cdf` is its inverse,
/// so that $x = \mathrm{cdf}^{-1}(\rho)$ with $\rho$ uniform in $[\mathrm{cdf}(a), \mathrm{cdf}(b)]$
/// is distributed according to `pdf` in $[a, b]$.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum Density<T> {
    /// Constant density.
    Uniform,
    /// $1 / ((x - m^2)^2 + m^2 \Gamma^2)$.
    BreitWigner {
        /// The squared mass $m^2$.
        mass2: T,
        /// The product $m \Gamma$.
        mass_width: T,
    },
    /// $1 / |x - m^2|^\nu$.
    PowerLaw {
        /// The position of the pole, $m^2$.
        pole: T,
        /// The exponent $\nu$.
        nu: T,
        /// Where the domain lies relative to the pole.
        side: Side,
    },
    /// Dirac delta at $m^2$.
    OnShell {
        /// The squared mass $m^2$.
        mass2: T,
    },
    /// The parameters do not define a density, e.g. a Breit-Wigner without width.
    Degenerate,
}

impl<T: Real> Density<T> {
    /// Returns `true` for every density that has a continuous cumulative distribution.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, Self::OnShell { .. } | Self::Degenerate)
    }

    /// The unnormalised density at `x`. The on-shell density is one, so that its Jacobian is one.
    pub fn pdf(&self, x: T) -> T {
        match *self {
            Self::Uniform => T::one(),
            Self::BreitWigner { mass2, mass_width } => {
                let d = x - mass2;
                (d * d + mass_width * mass_width).recip()
            }
            Self::PowerLaw { pole, nu, .. } => (x - pole).abs().powf(-nu),
            Self::OnShell { .. } => T::one(),
            Self::Degenerate => T::zero(),
        }
    }

    /// The cumulative distribution at `x`, up to an arbitrary constant.
    pub fn cdf(&self, x: T) -> T {
        match *self {
            Self::Uniform => x,
            Self::BreitWigner { mass2, mass_width } => ((x - mass2) / mass_width).atan() / mass_width,
            Self::PowerLaw { pole, nu, side } => {
                let above = match side {
                    Side::Above => true,
                    Side::Below => false,
                    Side::Across => x >= pole,
                };

                if above {
                    primitive(x - pole, nu)
                } else {
                    -primitive(pole - x, nu)
                }
            }
            Self::OnShell { mass2 } => {
                if x >= mass2 {
                    T::one()
                } else {
                    T::zero()
                }
            }
            Self::Degenerate => T::zero(),
        }
    }

    /// The inverse of `cdf`.
    pub fn inverse_cdf(&self, rho: T) -> T {
        match *self {
            Self::Uniform => rho,
            Self::BreitWigner { mass2, mass_width } => {
                mass2 + mass_width * (mass_width * rho).tan()
            }
            Self::PowerLaw { pole, nu, side } => {
                let above = match side {
                    Side::Above => true,
                    Side::Below => false,
                    Side::Across => rho >= T::zero(),
                };

                if above {
                    pole + inverse_primitive(rho, nu)
                } else {
                    pole - inverse_primitive(-rho, nu)
                }
            }
            Self::OnShell { mass2 } => mass2,
            Self::Degenerate => T::nan(),
        }
    }
}

/// Primitive of $t^{-\nu}$ for $t \geq 0$.
fn primitive<T: Real>(t: T, nu: T) -> T {
    if nu == T::one() {
        t.ln()
    } else {
        let p = T::one() - nu;
        t.powf(p) / p
    }
}

/// Inverse of `primitive`.
fn inverse_primitive<T: Real>(y: T, nu: T) -> T {
    if nu == T::one() {
        y.exp()
    } else {
        let p = T::one() - nu;
        (p * y).powf(p.recip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn check_inverse(density: Density<f64>, xs: &[f64]) {
        for &x in xs {
            assert_approx_eq!(density.inverse_cdf(density.cdf(x)), x, 1e-9 * x.abs().max(1.0));
        }
    }

    #[test]
    fn test_breit_wigner_inverse() {
        let density = Density::BreitWigner {
            mass2: 91.19f64.powi(2),
            mass_width: 91.19 * 2.5,
        };

        check_inverse(density, &[0.0, 100.0, 8000.0, 8315.6, 8400.0, 10000.0]);
    }

    #[test]
    fn test_power_law_inverse() {
        for &nu in &[-1.5, 0.0, 0.5, 1.0, 1.7] {
            check_inverse(
                Density::PowerLaw {
                    pole: 1.0,
                    nu,
                    side: Side::Above,
                },
                &[1.5, 2.0, 10.0, 100.0],
            );
            check_inverse(
                Density::PowerLaw {
                    pole: 100.0,
                    nu,
                    side: Side::Below,
                },
                &[1.5, 2.0, 10.0, 99.0],
            );
        }

        check_inverse(
            Density::PowerLaw {
                pole: 5.0,
                nu: 0.5,
                side: Side::Across,
            },
            &[0.0, 2.0, 4.9, 5.1, 10.0],
        );
    }

    #[test]
    fn test_power_law_cdf_increasing() {
        for &(nu, side, xs) in &[
            (1.7, Side::Above, [1.1, 2.0, 3.0]),
            (1.7, Side::Below, [-3.0, -2.0, -1.1]),
            (0.5, Side::Across, [-2.0, 0.0, 2.0]),
            (1.0, Side::Below, [-3.0, -2.0, -1.1]),
        ] {
            let density = Density::PowerLaw {
                pole: if side == Side::Above { 1.0 } else { 0.0 },
                nu,
                side,
            };
            assert!(density.cdf(xs[0]) < density.cdf(xs[1]));
            assert!(density.cdf(xs[1]) < density.cdf(xs[2]));
        }
    }

    #[test]
    fn test_side_of() {
        assert_eq!(Side::of(1.0, 1.0, 2.0), Side::Above);
        assert_eq!(Side::of(2.0, 1.0, 2.0), Side::Below);
        assert_eq!(Side::of(1.5, 1.0, 2.0), Side::Across);
    }
}
