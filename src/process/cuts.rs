use crate::core::Real;
use crate::kinematics::{add, mass2, FourVector};
use serde::{Deserialize, Serialize};

/// Generation cuts applied to the final-state momenta. A cut with a non-positive threshold is not
/// applied.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Cuts<T> {
    min_energy: T,
    min_pair_mass2: T,
}

impl<T: Real> Default for Cuts<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T: Real> Cuts<T> {
    /// Requires every final-state particle to have at least the energy `min_energy` and every pair
    /// of final-state particles to have at least the invariant mass squared `min_pair_mass2`.
    pub fn new(min_energy: T, min_pair_mass2: T) -> Self {
        Self {
            min_energy,
            min_pair_mass2,
        }
    }

    /// Cuts that accept everything.
    pub fn none() -> Self {
        Self::new(T::zero(), T::zero())
    }

    /// Returns the minimum energy of each particle.
    pub fn min_energy(&self) -> T {
        self.min_energy
    }

    /// Returns the minimum invariant mass squared of each pair of particles.
    pub fn min_pair_mass2(&self) -> T {
        self.min_pair_mass2
    }

    /// Returns `true` if `momenta` pass all cuts.
    pub fn passes(&self, momenta: &[FourVector<T>]) -> bool {
        if self.min_energy > T::zero() && momenta.iter().any(|p| p[0] < self.min_energy) {
            return false;
        }

        if self.min_pair_mass2 > T::zero() {
            for (i, p) in momenta.iter().enumerate() {
                for q in &momenta[i + 1..] {
                    if mass2(&add(p, q)) < self.min_pair_mass2 {
                        return false;
                    }
                }
            }
        }

        true
    }
}
