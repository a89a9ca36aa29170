//! Custom request extractors.

pub mod pair;

pub use pair::PairPath;
