//! Quartic-polynomial symbolic regression with three nested ADF registries.
//!
//! The MAIN programs take one input `x` and may call ADF0, ADF1 and ADF2
//! (each binary); ADF0 may call ADF1 and ADF2, ADF1 may call ADF2. Fitness is
//! the sum of squared errors against `x^4 + x^3 + x^2 + x` over 20 sample
//! points in `[-1, 1)`.

use crate::config::GaConfig;
use crate::evolution::{Individual, TreeSlot};
use crate::gp::compile::{compile_individual, CompileError};
use crate::gp::pset::{PrimitiveSet, PsetError, PsetGraph, PsetId};
use crate::gp::tree::GenStrategy;
use rand::Rng;

/// Division that owns its whole domain: a near-zero denominator yields 0
/// instead of a non-finite value, so no expression can poison a fitness.
pub fn protected_div(left: f64, right: f64) -> f64 {
    if right.abs() < 1e-9 {
        0.0
    } else {
        left / right
    }
}

/// The regression target.
pub fn quartic(x: f64) -> f64 {
    x.powi(4) + x.powi(3) + x.powi(2) + x
}

/// The fixed evaluation grid: x in {-1.0, -0.9, ..., 0.9}.
pub fn sample_points() -> impl Iterator<Item = f64> {
    (-10..10).map(|i| i as f64 / 10.0)
}

fn add_arithmetic(set: &mut PrimitiveSet) -> Result<(), PsetError> {
    set.add_primitive("add", 2, |a| a[0] + a[1])?;
    set.add_primitive("sub", 2, |a| a[0] - a[1])?;
    set.add_primitive("mul", 2, |a| a[0] * a[1])?;
    set.add_primitive("div", 2, |a| protected_div(a[0], a[1]))?;
    set.add_primitive("neg", 1, |a| -a[0])?;
    set.add_primitive("cos", 1, |a| a[0].cos())?;
    set.add_primitive("sin", 1, |a| a[0].sin())?;
    Ok(())
}

/// The assembled registry graph plus the per-individual tree order,
/// MAIN first.
pub struct QuarticProblem {
    pub graph: PsetGraph,
    pub slots: Vec<PsetId>,
}

/// Builds the four registries and wires the ADF references:
/// MAIN -> {ADF0, ADF1, ADF2}, ADF0 -> {ADF1, ADF2}, ADF1 -> {ADF2}.
pub fn build_problem() -> Result<QuarticProblem, PsetError> {
    let mut graph = PsetGraph::new();

    let mut adf2 = PrimitiveSet::new("ADF2", 2);
    add_arithmetic(&mut adf2)?;
    let adf2 = graph.insert(adf2);

    let mut adf1 = PrimitiveSet::new("ADF1", 2);
    add_arithmetic(&mut adf1)?;
    let adf1 = graph.insert(adf1);
    graph.add_adf(adf1, adf2)?;

    let mut adf0 = PrimitiveSet::new("ADF0", 2);
    add_arithmetic(&mut adf0)?;
    let adf0 = graph.insert(adf0);
    graph.add_adf(adf0, adf1)?;
    graph.add_adf(adf0, adf2)?;

    let mut main = PrimitiveSet::new("MAIN", 1);
    add_arithmetic(&mut main)?;
    main.add_ephemeral("rand101", |rng| rng.random_range(-1..=1) as f64)?;
    main.rename_arguments(&[("ARG0", "x")])?;
    let main = graph.insert(main);
    graph.add_adf(main, adf0)?;
    graph.add_adf(main, adf1)?;
    graph.add_adf(main, adf2)?;

    Ok(QuarticProblem {
        graph,
        slots: vec![main, adf0, adf1, adf2],
    })
}

/// Generation recipes per tree slot: a ramped MAIN tree for shape diversity,
/// full ADF trees.
pub fn tree_slots(problem: &QuarticProblem, config: &GaConfig) -> Vec<TreeSlot> {
    problem
        .slots
        .iter()
        .enumerate()
        .map(|(i, &set)| TreeSlot {
            set,
            strategy: if i == 0 {
                GenStrategy::RampedHalfAndHalf
            } else {
                GenStrategy::Full
            },
            min_depth: config.init_min_depth,
            max_depth: config.init_max_depth,
        })
        .collect()
}

/// Sum-of-squared-error fitness over the sample grid.
pub fn evaluate(ind: &Individual, problem: &QuarticProblem) -> Result<Vec<f64>, CompileError> {
    let program = compile_individual(&ind.trees, &problem.graph, &problem.slots)?;
    let error = sample_points()
        .map(|x| {
            let diff = program.call(&[x]) - quartic(x);
            diff * diff
        })
        .sum();
    Ok(vec![error])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::Fitness;
    use crate::gp::tree::{Node, PrimitiveTree};

    #[test]
    fn test_protected_div() {
        assert_eq!(protected_div(1.0, 0.0), 0.0);
        assert_eq!(protected_div(-7.5, 0.0), 0.0);
        assert_eq!(protected_div(0.0, 0.0), 0.0);
        assert_eq!(protected_div(6.0, 2.0), 3.0);
    }

    #[test]
    fn test_quartic() {
        assert_eq!(quartic(0.0), 0.0);
        assert_eq!(quartic(1.0), 4.0);
        assert_eq!(quartic(-1.0), 0.0);
    }

    #[test]
    fn test_sample_grid() {
        let points: Vec<f64> = sample_points().collect();
        assert_eq!(points.len(), 20);
        assert_eq!(points[0], -1.0);
        assert_eq!(points[19], 0.9);
    }

    #[test]
    fn test_problem_wiring() {
        let problem = build_problem().unwrap();
        assert_eq!(problem.slots.len(), 4);
        let main = problem.graph.get(problem.slots[0]);
        assert_eq!(main.name(), "MAIN");
        assert_eq!(main.arity(), 1);
        assert_eq!(main.arg_name(0), "x");
        assert_eq!(main.adfs().len(), 3);
        assert_eq!(problem.graph.get(problem.slots[1]).adfs().len(), 2);
        assert_eq!(problem.graph.get(problem.slots[2]).adfs().len(), 1);
        assert_eq!(problem.graph.get(problem.slots[3]).adfs().len(), 0);
    }

    #[test]
    fn test_exact_solution_scores_zero() {
        let problem = build_problem().unwrap();

        // mul(x, add(1, mul(x, add(1, mul(x, add(1, x))))))  ==  quartic(x),
        // written with add=0 and mul=2 in registration order.
        fn horner_step(inner: Vec<Node>) -> Vec<Node> {
            let mut nodes = vec![
                Node::Primitive { id: 2, arity: 2 },
                Node::Argument(0),
                Node::Primitive { id: 0, arity: 2 },
                Node::Constant(1.0),
            ];
            nodes.extend(inner);
            nodes
        }
        let main_tree = PrimitiveTree::from_nodes(horner_step(horner_step(vec![
            Node::Primitive { id: 2, arity: 2 },
            Node::Argument(0),
            Node::Primitive { id: 0, arity: 2 },
            Node::Constant(1.0),
            Node::Argument(0),
        ])));
        assert!(main_tree.is_well_formed());

        let adf_stub =
            PrimitiveTree::from_nodes(vec![Node::Argument(0)]);
        let ind = Individual {
            trees: vec![
                main_tree,
                adf_stub.clone(),
                adf_stub.clone(),
                adf_stub,
            ],
            fitness: Fitness::new(vec![-1.0]),
        };

        let values = evaluate(&ind, &problem).unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0].abs() < 1e-12, "error was {}", values[0]);
    }

    #[test]
    fn test_constant_zero_program_error() {
        let problem = build_problem().unwrap();
        let leaf = PrimitiveTree::from_nodes(vec![Node::Constant(0.0)]);
        let adf_stub = PrimitiveTree::from_nodes(vec![Node::Argument(0)]);
        let ind = Individual {
            trees: vec![leaf, adf_stub.clone(), adf_stub.clone(), adf_stub],
            fitness: Fitness::new(vec![-1.0]),
        };

        let expected: f64 = sample_points().map(|x| quartic(x) * quartic(x)).sum();
        let values = evaluate(&ind, &problem).unwrap();
        assert!((values[0] - expected).abs() < 1e-9);
    }
}
