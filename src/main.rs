use koza::config::Config;
use koza::evolution::{EvolutionEngine, Individual};
use koza::symreg;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    log::info!("Booting GP engine...");

    let config = match Config::load(Path::new("config.toml")) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {e}");
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    let problem = match symreg::build_problem() {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to assemble primitive sets: {e}");
            process::exit(1);
        }
    };
    log::info!(
        "Primitive sets assembled: {} registries, MAIN plus {} ADFs.",
        problem.slots.len(),
        problem.slots.len() - 1
    );

    let slots = symreg::tree_slots(&problem, &config.ga);
    let evaluate = |ind: &Individual| symreg::evaluate(ind, &problem);
    let mut engine = EvolutionEngine::new(&config.ga, &problem.graph, slots, vec![-1.0], evaluate);

    if let Err(e) = engine.evolve() {
        log::error!("Evolution aborted: {e}");
        process::exit(1);
    }

    if let Some(best) = engine.hall_of_fame().best() {
        let error = best
            .fitness
            .values()
            .and_then(|v| v.first().copied())
            .unwrap_or(f64::NAN);
        println!("Best individual (squared error = {error:.6}):");
        for (tree, &set_id) in best.trees.iter().zip(&problem.slots) {
            let pset = problem.graph.get(set_id);
            println!("  {} = {}", pset.name(), tree.display(pset));
        }
    }

    println!("Final population statistics:");
    for (name, values) in engine.statistics().latest() {
        println!("  {} = {:.6}", name, values.first().copied().unwrap_or(f64::NAN));
    }
}
