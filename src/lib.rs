//! A tree-based genetic programming engine.
//!
//! Programs are expression trees built from a user-declared vocabulary of
//! primitives and terminals (a [`gp::pset::PrimitiveSet`]). A program may call
//! into separately evolved sub-programs (Automatically Defined Functions);
//! each individual carries its own tree for every registry it uses, and the
//! whole bundle is compiled into a single callable at evaluation time.
//!
//! The [`evolution::EvolutionEngine`] drives the generational loop: tournament
//! selection, one-point subtree crossover, subtree-regrowth mutation, full
//! generational replacement, with a [`stats::HallOfFame`] and running
//! [`stats::Statistics`] observing every generation.

pub mod config;
pub mod evolution;
pub mod gp;
pub mod stats;
pub mod symreg;
