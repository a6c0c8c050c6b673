use crate::evolution::Individual;
use crate::gp::pset::{PrimitiveSet, PsetError};
use crate::gp::tree::{generate, GenStrategy, PrimitiveTree};
use rand::rngs::StdRng;
use rand::Rng;
use std::cmp::Ordering;

/// Tournament selection with replacement.
///
/// Each of the `n` picks draws `tournsize` contestants uniformly at random
/// (with replacement, across and within picks) and keeps the one with the
/// best fitness. Larger `tournsize` means more selection pressure. The
/// returned individuals are independent deep copies of the winners.
pub fn sel_tournament(
    population: &[Individual],
    n: usize,
    tournsize: usize,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let mut chosen = Vec::with_capacity(n);
    for _ in 0..n {
        let mut winner: Option<&Individual> = None;
        for _ in 0..tournsize {
            let contestant = &population[rng.random_range(0..population.len())];
            let beats = winner.map_or(true, |w| {
                contestant.fitness.partial_cmp(&w.fitness) == Some(Ordering::Greater)
            });
            if beats {
                winner = Some(contestant);
            }
        }
        if let Some(winner) = winner {
            chosen.push(winner.clone());
        }
    }
    chosen
}

/// Uniform one-point subtree crossover.
///
/// One node position is drawn uniformly in each tree (leaves included) and
/// the two subtrees rooted there are exchanged atomically. Because whole
/// arity-closed subsequences are swapped, both results stay well-formed with
/// no further checks.
pub fn cx_one_point(tree1: &mut PrimitiveTree, tree2: &mut PrimitiveTree, rng: &mut StdRng) {
    if tree1.is_empty() || tree2.is_empty() {
        return;
    }
    let range1 = tree1.subtree(rng.random_range(0..tree1.len()));
    let range2 = tree2.subtree(rng.random_range(0..tree2.len()));
    let donor = tree2.nodes()[range2.clone()].to_vec();
    let removed = tree1.replace_subtree(range1, donor);
    tree2.replace_subtree(range2, removed);
}

/// Uniform subtree-regrowth mutation.
///
/// Discards the subtree rooted at a uniformly drawn position and grafts a
/// freshly generated one in its place.
pub fn mut_uniform(
    tree: &mut PrimitiveTree,
    pset: &PrimitiveSet,
    strategy: GenStrategy,
    min_depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Result<(), PsetError> {
    if tree.is_empty() {
        return Ok(());
    }
    let range = tree.subtree(rng.random_range(0..tree.len()));
    let replacement = generate(pset, min_depth, max_depth, strategy, rng)?;
    tree.replace_subtree(range, replacement.into_nodes());
    Ok(())
}
