pub mod operators;

use crate::config::GaConfig;
use crate::gp::compile::CompileError;
use crate::gp::pset::{PsetError, PsetGraph, PsetId};
use crate::gp::tree::{generate, GenStrategy, PrimitiveTree};
use crate::stats::{HallOfFame, Statistics};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::cmp::Ordering;
use thiserror::Error;

/// A weighted objective tuple plus a validity flag.
///
/// Weights orient each objective (negative minimizes, positive maximizes);
/// ranking compares the weighted tuples lexicographically, so "greater" always
/// means better. Any structural change to the owning individual's trees must
/// invalidate the fitness until the next evaluation.
#[derive(Clone, Debug)]
pub struct Fitness {
    weights: Vec<f64>,
    values: Option<Vec<f64>>,
}

impl Fitness {
    pub fn new(weights: Vec<f64>) -> Self {
        Self {
            weights,
            values: None,
        }
    }

    pub fn set_values(&mut self, values: Vec<f64>) {
        self.values = Some(values);
    }

    /// Clears the objective values; the fitness compares as unordered until
    /// values are set again.
    pub fn invalidate(&mut self) {
        self.values = None;
    }

    pub fn is_valid(&self) -> bool {
        self.values.is_some()
    }

    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn weighted(&self) -> Option<Vec<f64>> {
        self.values
            .as_ref()
            .map(|values| values.iter().zip(&self.weights).map(|(v, w)| v * w).collect())
    }
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        match (self.weighted(), other.weighted()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.weighted(), other.weighted()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

/// The unit of selection: one tree per registry, conventionally
/// `[MAIN, ADF0, ADF1, ...]`, plus one fitness. The slot-to-registry mapping
/// is fixed at engine construction and never changes across generations.
/// `Clone` deep-copies every tree; offspring never alias parent storage.
#[derive(Clone, Debug)]
pub struct Individual {
    pub trees: Vec<PrimitiveTree>,
    pub fitness: Fitness,
}

impl Individual {
    /// Total node count across all trees.
    pub fn size(&self) -> usize {
        self.trees.iter().map(PrimitiveTree::len).sum()
    }
}

/// Ties one tree slot of every individual to a registry and an initial
/// generation recipe.
#[derive(Clone, Copy, Debug)]
pub struct TreeSlot {
    pub set: PsetId,
    pub strategy: GenStrategy,
    pub min_depth: usize,
    pub max_depth: usize,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pset(#[from] PsetError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("evaluation produced {got} objective value(s) but the fitness declares {expected}")]
    ObjectiveMismatch { expected: usize, got: usize },
}

/// The generational evolutionary loop.
///
/// Per generation: tournament-select a full offspring set (deep copies),
/// cross over adjacent pairs tree-by-tree with probability `crossover_rate`,
/// mutate every individual tree-by-tree with probability `mutation_rate`,
/// re-evaluate only what variation invalidated, then replace the population
/// wholesale. The hall of fame and statistics observe each new population.
///
/// All randomness flows through one seeded generator in a fixed draw order
/// (selection, then crossover coin-flips pair by pair, then mutation
/// coin-flips individual by individual in tree order), so identical
/// configurations reproduce bit-for-bit. Evaluation is pure and runs in
/// parallel without affecting that ordering.
pub struct EvolutionEngine<'a, F> {
    config: &'a GaConfig,
    graph: &'a PsetGraph,
    slots: Vec<TreeSlot>,
    weights: Vec<f64>,
    evaluate: F,
    population: Vec<Individual>,
    hall_of_fame: HallOfFame,
    stats: Statistics,
    rng: StdRng,
}

impl<'a, F> EvolutionEngine<'a, F>
where
    F: Fn(&Individual) -> Result<Vec<f64>, CompileError> + Sync,
{
    /// Creates an engine over a fixed registry graph.
    ///
    /// # Arguments
    /// * `config` - Run parameters (population size, rates, seed, ...).
    /// * `graph` - The registry arena; immutable for the whole run.
    /// * `slots` - One entry per tree of every individual, MAIN first.
    /// * `weights` - Objective weights shared by every fitness.
    /// * `evaluate` - The external fitness function; its returned tuple must
    ///   match `weights` in length.
    pub fn new(
        config: &'a GaConfig,
        graph: &'a PsetGraph,
        slots: Vec<TreeSlot>,
        weights: Vec<f64>,
        evaluate: F,
    ) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            hall_of_fame: HallOfFame::new(config.hall_of_fame_size),
            stats: Statistics::with_defaults(),
            population: Vec::with_capacity(config.population_size),
            config,
            graph,
            slots,
            weights,
            evaluate,
        }
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Fills the population with freshly generated individuals, every ADF
    /// tree generated independently per individual. All fitnesses start
    /// invalid.
    pub fn initialize_population(&mut self) -> Result<(), PsetError> {
        let mut population = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            let mut trees = Vec::with_capacity(self.slots.len());
            for slot in &self.slots {
                trees.push(generate(
                    self.graph.get(slot.set),
                    slot.min_depth,
                    slot.max_depth,
                    slot.strategy,
                    &mut self.rng,
                )?);
            }
            population.push(Individual {
                trees,
                fitness: Fitness::new(self.weights.clone()),
            });
        }
        self.population = population;
        Ok(())
    }

    /// Evaluates every individual whose fitness is invalid, in parallel, and
    /// returns how many were evaluated. A failed evaluation aborts the run;
    /// degenerate expressions are the primitives' job to absorb.
    pub fn evaluate_population(&mut self) -> Result<usize, EngineError> {
        let invalid: Vec<usize> = self
            .population
            .iter()
            .enumerate()
            .filter(|(_, ind)| !ind.fitness.is_valid())
            .map(|(i, _)| i)
            .collect();
        if invalid.is_empty() {
            return Ok(0);
        }

        let population = &self.population;
        let evaluate = &self.evaluate;
        let results: Vec<(usize, Result<Vec<f64>, CompileError>)> = invalid
            .par_iter()
            .map(|&i| (i, evaluate(&population[i])))
            .collect();

        let evaluated = results.len();
        for (i, outcome) in results {
            let values = outcome?;
            if values.len() != self.weights.len() {
                return Err(EngineError::ObjectiveMismatch {
                    expected: self.weights.len(),
                    got: values.len(),
                });
            }
            self.population[i].fitness.set_values(values);
        }
        Ok(evaluated)
    }

    /// Runs the full evolution: initialization, first unconditional
    /// evaluation, then `num_generations` rounds of selection, variation,
    /// re-evaluation and replacement. Terminates only by generation count.
    ///
    /// # Returns
    /// The final population. The hall of fame and statistics stay available
    /// through the accessors afterwards.
    pub fn evolve(&mut self) -> Result<Vec<Individual>, EngineError> {
        info!(
            "Initializing population of {} individuals ({} trees each)...",
            self.config.population_size,
            self.slots.len()
        );
        self.initialize_population()?;
        self.evaluate_population()?;
        self.hall_of_fame.update(&self.population);
        self.stats.record(&self.population);
        self.log_generation(0, self.population.len());

        for generation in 1..=self.config.num_generations {
            let mut offspring = operators::sel_tournament(
                &self.population,
                self.population.len(),
                self.config.tournament_size,
                &mut self.rng,
            );

            // Crossover over adjacent pairs, tree by tree.
            for pair in offspring.chunks_mut(2) {
                if pair.len() < 2 {
                    break;
                }
                let (left, right) = pair.split_at_mut(1);
                let (first, second) = (&mut left[0], &mut right[0]);
                for t in 0..self.slots.len() {
                    if self.rng.random::<f64>() < self.config.crossover_rate {
                        operators::cx_one_point(
                            &mut first.trees[t],
                            &mut second.trees[t],
                            &mut self.rng,
                        );
                        first.fitness.invalidate();
                        second.fitness.invalidate();
                    }
                }
            }

            // Mutation, independently per individual and per tree.
            for ind in &mut offspring {
                for (t, slot) in self.slots.iter().enumerate() {
                    if self.rng.random::<f64>() < self.config.mutation_rate {
                        operators::mut_uniform(
                            &mut ind.trees[t],
                            self.graph.get(slot.set),
                            GenStrategy::Full,
                            self.config.mut_min_depth,
                            self.config.mut_max_depth,
                            &mut self.rng,
                        )?;
                        ind.fitness.invalidate();
                    }
                }
            }

            // Full generational replacement; elitism lives in the hall of
            // fame only.
            self.population = offspring;
            let evaluated = self.evaluate_population()?;
            self.hall_of_fame.update(&self.population);
            self.stats.record(&self.population);
            self.log_generation(generation, evaluated);
        }

        info!(
            "Evolution complete after {} generations.",
            self.config.num_generations
        );
        Ok(self.population.clone())
    }

    fn log_generation(&self, generation: usize, evaluated: usize) {
        let summary: Vec<String> = self
            .stats
            .latest()
            .map(|(name, values)| {
                format!("{}={:.4}", name, values.first().copied().unwrap_or(f64::NAN))
            })
            .collect();
        let avg_size = self.population.iter().map(Individual::size).sum::<usize>() as f64
            / self.population.len().max(1) as f64;
        info!(
            "Gen {}/{}: {} | evaluated={} | avg nodes={:.1}",
            generation,
            self.config.num_generations,
            summary.join(" "),
            evaluated,
            avg_size
        );
        if let Some(best) = self.hall_of_fame.best() {
            debug!("Best-ever fitness: {:?}", best.fitness.values());
        }
    }
}
