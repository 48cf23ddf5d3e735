//! Integrators and event generators that combine samplers with matrix elements.
mod multichannel;
mod unweighting;

pub use multichannel::{MultiChannel, SubProcess};
pub use unweighting::Unweighter;
