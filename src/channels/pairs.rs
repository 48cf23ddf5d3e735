//! Integrals over pairs of channels constrained by the available energy,
//!
//! $$ I(s) = \int \mathrm{d}s_1 \, \mathrm{d}s_2 \, \rho_1(s_1) \, \rho_2(s_2) \, \Theta \left(
//! \sqrt{s} - \sqrt{s_1} - \sqrt{s_2} \right) \, , $$
//!
//! where each $s_i$ runs over the domain of its channel with negative values excluded. They are
//! used to cross-check Monte Carlo estimates of two-particle phase-space volumes. The rule used for
//! a pair is looked up from the kinds of both channels.
use super::{Channel, ChannelKind, Density};
use crate::core::{count, lit, Miss, Real};

/// How the integral of a pair of channels is computed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PairRule {
    /// Both channels are flat; the area of the allowed region is known in closed form.
    UniformUniform,
    /// The first channel is on-shell; the second is integrated with its cumulant.
    OnShellFirst,
    /// The second channel is on-shell; the first is integrated with its cumulant.
    OnShellSecond,
    /// Both channels are on-shell; the integral is one or zero.
    OnShellBoth,
    /// Simpson quadrature in the uniform variable of the first channel, using the cumulant of the
    /// second channel for the inner integral.
    Quadrature,
}

const RULES: [[PairRule; 4]; 4] = {
    use PairRule::*;
    // rows/columns: uniform, Breit-Wigner, power law, on-shell
    [
        [UniformUniform, Quadrature, Quadrature, OnShellSecond],
        [Quadrature, Quadrature, Quadrature, OnShellSecond],
        [Quadrature, Quadrature, Quadrature, OnShellSecond],
        [OnShellFirst, OnShellFirst, OnShellFirst, OnShellBoth],
    ]
};

const QUADRATURE_INTERVALS: usize = 2048;

fn index(kind: ChannelKind) -> usize {
    match kind {
        ChannelKind::Uniform => 0,
        ChannelKind::BreitWigner => 1,
        ChannelKind::PowerLaw => 2,
        ChannelKind::OnShell => 3,
    }
}

/// Returns the rule used to integrate a channel of kind `first` together with one of kind
/// `second`.
pub fn pair_rule(first: ChannelKind, second: ChannelKind) -> PairRule {
    RULES[index(first)][index(second)]
}

impl<T: Real> Channel<T> {
    /// Integrates the product of the densities of `self` and `other` over the region where the sum
    /// of the square roots of both values does not exceed $\sqrt{s}$. On-shell channels contribute
    /// a delta function with unit weight. Fails if one of the channels is not normalisable.
    pub fn integrate_with(&self, other: &Self, s: T) -> Result<T, Miss> {
        if !self.normalisable() || !other.normalisable() {
            return Err(Miss::NotNormalisable);
        }

        if !(s > T::zero()) {
            return Ok(T::zero());
        }

        let result = match pair_rule(self.kind(), other.kind()) {
            PairRule::UniformUniform => uniform_uniform(self, other, s),
            PairRule::OnShellFirst => on_shell_times(self, other, s),
            PairRule::OnShellSecond => on_shell_times(other, self, s),
            PairRule::OnShellBoth => {
                let m1 = on_shell_mass(self);
                let m2 = on_shell_mass(other);

                if m1 + m2 <= s.sqrt() {
                    T::one()
                } else {
                    T::zero()
                }
            }
            PairRule::Quadrature => quadrature(self, other, s),
        };

        Ok(result)
    }
}

/// Lower end of the physical part of the domain.
fn physical_lower<T: Real>(channel: &Channel<T>) -> T {
    channel.lower().max(T::zero())
}

/// The largest value the partner of a particle with squared mass `s1` can have.
fn partner_limit<T: Real>(s: T, s1: T) -> T {
    let d = s.sqrt() - s1.sqrt();
    d * d
}

/// Integral of the density of `channel` from its lower bound up to `upper`.
fn partial_norm<T: Real>(channel: &Channel<T>, upper: T) -> T {
    let lower = physical_lower(channel);
    let upper = upper.min(channel.upper());

    if upper <= lower {
        return T::zero();
    }

    let density = channel.density();
    density.cdf(upper) - density.cdf(lower)
}

fn on_shell_mass<T: Real>(channel: &Channel<T>) -> T {
    match *channel.density() {
        Density::OnShell { mass2 } => mass2.max(T::zero()).sqrt(),
        _ => unreachable!(),
    }
}

fn on_shell_times<T: Real>(on_shell: &Channel<T>, other: &Channel<T>, s: T) -> T {
    let m = on_shell_mass(on_shell);

    if m > s.sqrt() {
        return T::zero();
    }

    partial_norm(other, partner_limit(s, m * m))
}

fn uniform_uniform<T: Real>(first: &Channel<T>, second: &Channel<T>, s: T) -> T {
    let a1 = physical_lower(first);
    let b1 = first.upper();
    let a2 = physical_lower(second);
    let b2 = second.upper();

    if a2 >= s || b2 <= a2 || b1 <= a1 {
        return T::zero();
    }

    // below `full` the whole second domain is allowed, above `zero` nothing is
    let full = if b2 < s {
        partner_limit(s, b2)
    } else {
        T::zero()
    };
    let zero = partner_limit(s, a2);

    let mut area = T::zero();

    let hi = b1.min(full);
    if hi > a1 {
        area += (hi - a1) * (b2 - a2);
    }

    let lo = a1.max(full);
    let hi = b1.min(zero);
    if hi > lo {
        let sqrt_s = s.sqrt();
        let primitive =
            |u: T| s * u - lit::<T>(4.0 / 3.0) * sqrt_s * u.powf(lit(1.5)) + u * u / lit(2.0) - a2 * u;
        area += primitive(hi) - primitive(lo);
    }

    area
}

fn quadrature<T: Real>(first: &Channel<T>, second: &Channel<T>, s: T) -> T {
    let inner = |r: T| {
        let s1 = first.map(r);

        if !(s1 >= T::zero()) || s1 > s {
            T::zero()
        } else {
            partial_norm(second, partner_limit(s, s1))
        }
    };

    let n = QUADRATURE_INTERVALS;
    let h = count::<T>(n).recip();
    let mut sum = inner(T::zero()) + inner(T::one());

    for i in 1..n {
        let factor: T = if i % 2 == 1 { lit(4.0) } else { lit(2.0) };
        sum += factor * inner(count::<T>(i) * h);
    }

    sum * h / lit(3.0) * first.norm()
}

#[cfg(test)]
mod tests {
    use super::super::{Resonance, Shape};
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rule_lookup() {
        assert_eq!(
            pair_rule(ChannelKind::Uniform, ChannelKind::Uniform),
            PairRule::UniformUniform
        );
        assert_eq!(
            pair_rule(ChannelKind::OnShell, ChannelKind::BreitWigner),
            PairRule::OnShellFirst
        );
        assert_eq!(
            pair_rule(ChannelKind::PowerLaw, ChannelKind::OnShell),
            PairRule::OnShellSecond
        );
        assert_eq!(
            pair_rule(ChannelKind::OnShell, ChannelKind::OnShell),
            PairRule::OnShellBoth
        );
        assert_eq!(
            pair_rule(ChannelKind::Uniform, ChannelKind::PowerLaw),
            PairRule::Quadrature
        );
    }

    #[test]
    fn test_uniform_uniform_massless_triangle() {
        // with both domains covering [0, s] the area is s^2 / 6
        let first = Channel::<f64>::uniform(0.0, 100.0);
        let second = Channel::uniform(0.0, 100.0);

        assert_approx_eq!(first.integrate_with(&second, 100.0).unwrap(), 10_000.0 / 6.0);
    }

    #[test]
    fn test_uniform_uniform_matches_quadrature() {
        let first = Channel::<f64>::uniform(0.0, 30.0);
        let second = Channel::uniform(4.0, 20.0);
        let s = 80.0;

        let exact = first.integrate_with(&second, s).unwrap();
        let numeric = quadrature(&first, &second, s);

        assert!(exact > 0.0);
        assert_approx_eq!(exact, numeric, 1e-4 * exact);
        // negative values never contribute
        let extended = Channel::uniform(-5.0, 30.0);
        assert_approx_eq!(extended.integrate_with(&second, s).unwrap(), exact);
        // the integral is symmetric
        assert_approx_eq!(second.integrate_with(&first, s).unwrap(), exact, 1e-9 * exact);
    }

    #[test]
    fn test_on_shell_pairs() {
        let z = Channel::<f64>::new(Shape::OnShell, Resonance::stable(3.0), 0.0, 100.0);
        let w = Channel::new(Shape::OnShell, Resonance::stable(4.0), 0.0, 100.0);
        let flat = Channel::uniform(0.0, 100.0);

        assert_eq!(z.integrate_with(&w, 49.0), Ok(1.0));
        assert_eq!(z.integrate_with(&w, 48.0), Ok(0.0));

        // (10 - 3)^2 = 49
        assert_approx_eq!(z.integrate_with(&flat, 100.0).unwrap(), 49.0);
        assert_approx_eq!(flat.integrate_with(&z, 100.0).unwrap(), 49.0);
    }

    #[test]
    fn test_breit_wigner_times_on_shell() {
        let bw = Channel::<f64>::new(
            Shape::BreitWigner,
            Resonance::new(91.19, 2.5),
            0.0,
            10_000.0,
        );
        let photon = Channel::new(Shape::OnShell, Resonance::massless(), 0.0, 1.0);

        // a massless partner leaves the full domain of the resonance below s
        assert_approx_eq!(bw.integrate_with(&photon, 20_000.0).unwrap(), bw.norm());
        // below the peak only the lower tail is left
        let tail = bw.integrate_with(&photon, 4_000.0).unwrap();
        assert!(tail > 0.0 && tail < 0.02 * bw.norm());
    }

    #[test]
    fn test_not_normalisable() {
        let first = Channel::uniform(1.0, 1.0);
        let second = Channel::uniform(0.0, 1.0);

        assert_eq!(
            first.integrate_with(&second, 10.0),
            Err(Miss::NotNormalisable)
        );
    }
}
