use crate::evolution::Individual;
use std::cmp::Ordering;

/// Bounded archive of the best individuals ever observed.
///
/// Entries are deep copies, kept sorted best-to-worst, so later changes to the
/// living population can never corrupt them. On equal fitness the earlier
/// entry keeps its rank; a newly observed equal individual is inserted behind
/// it and only survives if capacity allows.
pub struct HallOfFame {
    maxsize: usize,
    items: Vec<Individual>,
}

impl HallOfFame {
    pub fn new(maxsize: usize) -> Self {
        Self {
            maxsize,
            items: Vec::with_capacity(maxsize),
        }
    }

    /// Merges a population snapshot into the archive. Individuals without a
    /// valid fitness are ignored.
    pub fn update(&mut self, population: &[Individual]) {
        if self.maxsize == 0 {
            return;
        }
        for ind in population {
            if !ind.fitness.is_valid() {
                continue;
            }
            let beats_worst = self
                .items
                .last()
                .map_or(true, |w| ind.fitness.partial_cmp(&w.fitness) == Some(Ordering::Greater));
            if self.items.len() == self.maxsize && !beats_worst {
                continue;
            }
            let pos = self
                .items
                .iter()
                .position(|e| ind.fitness.partial_cmp(&e.fitness) == Some(Ordering::Greater))
                .unwrap_or(self.items.len());
            self.items.insert(pos, ind.clone());
            self.items.truncate(self.maxsize);
        }
    }

    /// The best individual ever seen, if any.
    pub fn best(&self) -> Option<&Individual> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Individual> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A reducer collapses one objective's values across the population.
pub type Reducer = fn(&[f64]) -> f64;

struct StatEntry {
    name: String,
    reduce: Reducer,
    /// One row per recorded generation, one value per objective.
    history: Vec<Vec<f64>>,
}

/// Named per-generation summaries of the population's fitness values.
///
/// Each registered reducer is applied objective-wise after every generation
/// and its result appended to an append-only history.
#[derive(Default)]
pub struct Statistics {
    entries: Vec<StatEntry>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard mean / std-dev / min / max set.
    pub fn with_defaults() -> Self {
        let mut stats = Self::new();
        stats.register("avg", mean);
        stats.register("std", std_dev);
        stats.register("min", minimum);
        stats.register("max", maximum);
        stats
    }

    pub fn register(&mut self, name: impl Into<String>, reduce: Reducer) {
        self.entries.push(StatEntry {
            name: name.into(),
            reduce,
            history: Vec::new(),
        });
    }

    /// Appends one generation's summaries, computed over every individual
    /// holding a valid fitness.
    pub fn record(&mut self, population: &[Individual]) {
        let mut columns: Vec<Vec<f64>> = Vec::new();
        for ind in population {
            if let Some(values) = ind.fitness.values() {
                for (j, v) in values.iter().enumerate() {
                    if columns.len() <= j {
                        columns.push(Vec::with_capacity(population.len()));
                    }
                    columns[j].push(*v);
                }
            }
        }
        for entry in &mut self.entries {
            entry
                .history
                .push(columns.iter().map(|c| (entry.reduce)(c)).collect());
        }
    }

    /// Full history of one reducer, oldest generation first.
    pub fn history(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.history.as_slice())
    }

    /// Latest value of every reducer, in registration order.
    pub fn latest(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries
            .iter()
            .filter_map(|e| e.history.last().map(|v| (e.name.as_str(), v.as_slice())))
    }

    /// Number of generations recorded so far.
    pub fn generations(&self) -> usize {
        self.entries.first().map_or(0, |e| e.history.len())
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn minimum(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn maximum(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::Fitness;
    use crate::gp::tree::{Node, PrimitiveTree};

    fn individual(error: f64) -> Individual {
        let mut fitness = Fitness::new(vec![-1.0]);
        fitness.set_values(vec![error]);
        Individual {
            trees: vec![PrimitiveTree::from_nodes(vec![Node::Constant(error)])],
            fitness,
        }
    }

    #[test]
    fn test_hof_capacity_one_tracks_best() {
        let mut hof = HallOfFame::new(1);
        hof.update(&[individual(5.0), individual(2.0), individual(9.0)]);
        // Minimizing weights: lowest error is best.
        assert_eq!(hof.len(), 1);
        assert_eq!(hof.best().unwrap().fitness.values(), Some(&[2.0][..]));

        hof.update(&[individual(3.0)]);
        assert_eq!(hof.best().unwrap().fitness.values(), Some(&[2.0][..]));

        hof.update(&[individual(1.0)]);
        assert_eq!(hof.best().unwrap().fitness.values(), Some(&[1.0][..]));
    }

    #[test]
    fn test_hof_deep_copy_isolation() {
        let mut hof = HallOfFame::new(1);
        let mut pop = vec![individual(4.0)];
        hof.update(&pop);

        // Mutating the living individual must not reach the archived copy.
        pop[0]
            .trees[0]
            .replace_subtree(0..1, vec![Node::Constant(99.0)]);
        pop[0].fitness.invalidate();

        let archived = hof.best().unwrap();
        assert_eq!(archived.trees[0].nodes(), &[Node::Constant(4.0)]);
        assert!(archived.fitness.is_valid());
    }

    #[test]
    fn test_hof_keeps_sorted_order() {
        let mut hof = HallOfFame::new(3);
        hof.update(&[individual(7.0), individual(1.0), individual(4.0), individual(3.0)]);
        let errors: Vec<f64> = hof
            .iter()
            .map(|ind| ind.fitness.values().unwrap()[0])
            .collect();
        assert_eq!(errors, vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_hof_equal_fitness_keeps_incumbent() {
        let mut hof = HallOfFame::new(1);
        let first = individual(2.0);
        hof.update(&[first.clone()]);

        let mut challenger = individual(2.0);
        challenger.trees[0].replace_subtree(0..1, vec![Node::Constant(-2.0)]);
        hof.update(&[challenger]);

        // Equal fitness does not evict the earlier entry.
        assert_eq!(hof.best().unwrap().trees[0].nodes(), first.trees[0].nodes());
    }

    #[test]
    fn test_hof_ignores_invalid_fitness() {
        let mut hof = HallOfFame::new(2);
        let mut ind = individual(1.0);
        ind.fitness.invalidate();
        hof.update(&[ind]);
        assert!(hof.is_empty());
    }

    #[test]
    fn test_statistics_history_grows_per_generation() {
        let mut stats = Statistics::with_defaults();
        let pop = vec![individual(1.0), individual(2.0), individual(3.0)];
        stats.record(&pop);
        stats.record(&pop);

        assert_eq!(stats.generations(), 2);
        let avg = stats.history("avg").unwrap();
        assert_eq!(avg.len(), 2);
        assert_eq!(avg[0], vec![2.0]);
        assert_eq!(stats.history("min").unwrap()[1], vec![1.0]);
        assert_eq!(stats.history("max").unwrap()[1], vec![3.0]);
    }

    #[test]
    fn test_reducers() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(std_dev(&values), 2.0);
        assert_eq!(minimum(&values), 2.0);
        assert_eq!(maximum(&values), 9.0);
    }
}
