pub mod compile;
pub mod pset;
pub mod tree;
