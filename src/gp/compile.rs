use crate::gp::pset::{PrimitiveFn, PrimitiveSet, PsetGraph, PsetId};
use crate::gp::tree::{Node, PrimitiveTree};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("tree for '{caller}' invokes ADF '{callee}' but no tree was compiled for that registry")]
    UnresolvedAdf { caller: String, callee: String },
    #[error("prefix sequence for '{0}' ended before every argument slot was filled")]
    TruncatedTree(String),
    #[error("individual carries {trees} tree(s) but {slots} registries were given")]
    SlotMismatch { trees: usize, slots: usize },
}

/// A compiled expression. ADF calls hold the callee's already-compiled body,
/// so evaluation needs no registry lookups.
enum Expr {
    Const(f64),
    Arg(usize),
    Call { func: PrimitiveFn, args: Vec<Expr> },
    Invoke { body: Rc<Expr>, args: Vec<Expr> },
}

impl Expr {
    fn eval(&self, env: &[f64]) -> f64 {
        match self {
            Expr::Const(v) => *v,
            Expr::Arg(i) => env[*i],
            Expr::Call { func, args } => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(env)).collect();
                func(&values)
            }
            Expr::Invoke { body, args } => {
                // The callee sees its own argument frame, nothing else.
                let values: Vec<f64> = args.iter().map(|a| a.eval(env)).collect();
                body.eval(&values)
            }
        }
    }
}

/// The executable form of one individual's MAIN tree, with every ADF
/// reference bound to that same individual's compiled ADF bodies.
///
/// Calling is side-effect-free and referentially transparent: the same
/// arguments always produce the same result.
pub struct CompiledProgram {
    root: Rc<Expr>,
    arity: usize,
}

impl CompiledProgram {
    /// Evaluates the program. `args` must hold exactly [`Self::arity`] values.
    pub fn call(&self, args: &[f64]) -> f64 {
        debug_assert_eq!(args.len(), self.arity);
        self.root.eval(args)
    }

    /// Number of external input arguments the program accepts.
    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// Compiles one individual's trees into a callable for the MAIN tree.
///
/// `slots[i]` names the registry `trees[i]` belongs to; `slots[0]` is MAIN.
/// Trees compile bottom-up: a tree is only compiled once every registry it
/// references is available, so each ADF node binds to the compiled body from
/// this same individual, never a shared template.
///
/// # Errors
/// [`CompileError::UnresolvedAdf`] if a referenced registry has no tree among
/// `slots`, [`CompileError::SlotMismatch`] if trees and registries disagree in
/// number. Both indicate an assembly bug, not a data problem.
pub fn compile_individual(
    trees: &[PrimitiveTree],
    graph: &PsetGraph,
    slots: &[PsetId],
) -> Result<CompiledProgram, CompileError> {
    if trees.len() != slots.len() || slots.is_empty() {
        return Err(CompileError::SlotMismatch {
            trees: trees.len(),
            slots: slots.len(),
        });
    }

    let mut compiled: HashMap<PsetId, Rc<Expr>> = HashMap::new();
    let mut pending: Vec<usize> = (0..slots.len()).collect();
    while !pending.is_empty() {
        let ready = pending.iter().position(|&i| {
            graph
                .get(slots[i])
                .adfs()
                .iter()
                .all(|a| compiled.contains_key(&a.set()))
        });
        match ready {
            Some(k) => {
                let i = pending.remove(k);
                let pset = graph.get(slots[i]);
                let mut pos = 0;
                let expr = build(&trees[i], &mut pos, pset, &compiled)?;
                compiled.insert(slots[i], Rc::new(expr));
            }
            None => {
                // Stalled: some tree references a registry nothing will ever
                // compile (the reference graph itself is acyclic).
                let pset = graph.get(slots[pending[0]]);
                let callee = pset
                    .adfs()
                    .iter()
                    .find(|a| !compiled.contains_key(&a.set()))
                    .map(|a| a.name().to_string())
                    .unwrap_or_default();
                return Err(CompileError::UnresolvedAdf {
                    caller: pset.name().to_string(),
                    callee,
                });
            }
        }
    }

    let root = Rc::clone(&compiled[&slots[0]]);
    Ok(CompiledProgram {
        root,
        arity: graph.get(slots[0]).arity(),
    })
}

fn build(
    tree: &PrimitiveTree,
    pos: &mut usize,
    pset: &PrimitiveSet,
    compiled: &HashMap<PsetId, Rc<Expr>>,
) -> Result<Expr, CompileError> {
    let node = tree
        .nodes()
        .get(*pos)
        .ok_or_else(|| CompileError::TruncatedTree(pset.name().to_string()))?
        .clone();
    *pos += 1;
    match node {
        Node::Constant(v) => Ok(Expr::Const(v)),
        Node::Terminal(id) => Ok(Expr::Const(pset.const_value(id))),
        Node::Argument(i) => Ok(Expr::Arg(i)),
        Node::Primitive { id, arity } => Ok(Expr::Call {
            func: pset.primitive_fn(id),
            args: build_args(tree, pos, pset, compiled, arity)?,
        }),
        Node::Adf { id, arity } => {
            let decl = &pset.adfs()[id];
            let body = compiled
                .get(&decl.set())
                .cloned()
                .ok_or_else(|| CompileError::UnresolvedAdf {
                    caller: pset.name().to_string(),
                    callee: decl.name().to_string(),
                })?;
            Ok(Expr::Invoke {
                body,
                args: build_args(tree, pos, pset, compiled, arity)?,
            })
        }
    }
}

fn build_args(
    tree: &PrimitiveTree,
    pos: &mut usize,
    pset: &PrimitiveSet,
    compiled: &HashMap<PsetId, Rc<Expr>>,
    arity: usize,
) -> Result<Vec<Expr>, CompileError> {
    (0..arity).map(|_| build(tree, pos, pset, compiled)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::pset::PrimitiveSet;

    fn arith_set(name: &str, n_args: usize) -> PrimitiveSet {
        let mut set = PrimitiveSet::new(name, n_args);
        set.add_primitive("add", 2, |a| a[0] + a[1]).unwrap();
        set.add_primitive("mul", 2, |a| a[0] * a[1]).unwrap();
        set
    }

    #[test]
    fn test_compile_main_only() {
        let mut graph = PsetGraph::new();
        let main = graph.insert(arith_set("MAIN", 1));

        // add(x, mul(x, x))
        let tree = PrimitiveTree::from_nodes(vec![
            Node::Primitive { id: 0, arity: 2 },
            Node::Argument(0),
            Node::Primitive { id: 1, arity: 2 },
            Node::Argument(0),
            Node::Argument(0),
        ]);
        let program = compile_individual(&[tree], &graph, &[main]).unwrap();
        assert_eq!(program.arity(), 1);
        assert_eq!(program.call(&[2.0]), 6.0);
        assert_eq!(program.call(&[3.0]), 12.0);
    }

    #[test]
    fn test_named_terminal_compiles_to_its_value() {
        let mut graph = PsetGraph::new();
        let mut set = arith_set("MAIN", 1);
        set.add_terminal("half", 0.5).unwrap();
        let main = graph.insert(set);

        // add(half, 1.0)
        let tree = PrimitiveTree::from_nodes(vec![
            Node::Primitive { id: 0, arity: 2 },
            Node::Terminal(0),
            Node::Constant(1.0),
        ]);
        let program = compile_individual(&[tree], &graph, &[main]).unwrap();
        assert_eq!(program.call(&[0.0]), 1.5);
    }

    #[test]
    fn test_adf_binds_to_same_individual() {
        let mut graph = PsetGraph::new();
        let adf = graph.insert(arith_set("ADF0", 2));
        let main_id = graph.insert(arith_set("MAIN", 1));
        graph.add_adf(main_id, adf).unwrap();

        // MAIN: ADF0(x, x), where the ADF node sits after both primitives.
        let main_tree = PrimitiveTree::from_nodes(vec![
            Node::Adf { id: 0, arity: 2 },
            Node::Argument(0),
            Node::Argument(0),
        ]);
        // ADF0: mul(add(ARG0, ARG1), ARG0)
        let adf_tree = PrimitiveTree::from_nodes(vec![
            Node::Primitive { id: 1, arity: 2 },
            Node::Primitive { id: 0, arity: 2 },
            Node::Argument(0),
            Node::Argument(1),
            Node::Argument(0),
        ]);

        let program =
            compile_individual(&[main_tree, adf_tree], &graph, &[main_id, adf]).unwrap();
        // (x + x) * x
        assert_eq!(program.call(&[3.0]), 18.0);
    }

    #[test]
    fn test_nested_adf_chain() {
        // MAIN -> ADF0 -> ADF1, compiled deepest-first.
        let mut graph = PsetGraph::new();
        let adf1 = graph.insert(arith_set("ADF1", 1));
        let adf0 = graph.insert(arith_set("ADF0", 1));
        let main_id = graph.insert(arith_set("MAIN", 1));
        graph.add_adf(adf0, adf1).unwrap();
        graph.add_adf(main_id, adf0).unwrap();

        // ADF1: add(ARG0, ARG0)   (doubles)
        let adf1_tree = PrimitiveTree::from_nodes(vec![
            Node::Primitive { id: 0, arity: 2 },
            Node::Argument(0),
            Node::Argument(0),
        ]);
        // ADF0: ADF1(mul(ARG0, ARG0))   (doubles the square)
        let adf0_tree = PrimitiveTree::from_nodes(vec![
            Node::Adf { id: 0, arity: 1 },
            Node::Primitive { id: 1, arity: 2 },
            Node::Argument(0),
            Node::Argument(0),
        ]);
        // MAIN: ADF0(x)
        let main_tree =
            PrimitiveTree::from_nodes(vec![Node::Adf { id: 0, arity: 1 }, Node::Argument(0)]);

        let program = compile_individual(
            &[main_tree, adf0_tree, adf1_tree],
            &graph,
            &[main_id, adf0, adf1],
        )
        .unwrap();
        assert_eq!(program.call(&[3.0]), 18.0);
    }

    #[test]
    fn test_unresolved_adf_is_fatal() {
        let mut graph = PsetGraph::new();
        let adf = graph.insert(arith_set("ADF0", 2));
        let main_id = graph.insert(arith_set("MAIN", 1));
        graph.add_adf(main_id, adf).unwrap();

        let main_tree =
            PrimitiveTree::from_nodes(vec![Node::Argument(0)]);
        // No tree supplied for ADF0's registry.
        let result = compile_individual(&[main_tree], &graph, &[main_id]);
        assert!(matches!(result, Err(CompileError::UnresolvedAdf { .. })));
    }

    #[test]
    fn test_slot_mismatch_is_fatal() {
        let mut graph = PsetGraph::new();
        let main_id = graph.insert(arith_set("MAIN", 1));
        let tree = PrimitiveTree::from_nodes(vec![Node::Argument(0)]);
        let result = compile_individual(&[tree.clone(), tree], &graph, &[main_id]);
        assert!(matches!(result, Err(CompileError::SlotMismatch { .. })));
    }

    #[test]
    fn test_truncated_tree_is_fatal() {
        let mut graph = PsetGraph::new();
        let main_id = graph.insert(arith_set("MAIN", 1));
        let tree = PrimitiveTree::from_nodes(vec![Node::Primitive { id: 0, arity: 2 }]);
        let result = compile_individual(&[tree], &graph, &[main_id]);
        assert!(matches!(result, Err(CompileError::TruncatedTree(_))));
    }
}
