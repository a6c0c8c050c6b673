use crate::gp::pset::{PrimitiveSet, PsetError};
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use std::ops::Range;

/// One node of a program tree, carrying its arity inline so that tree
/// algorithms (slot walks, subtree addressing) never need the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Call to a registered primitive, by registry slot.
    Primitive { id: usize, arity: usize },
    /// Call to a nested ADF registry, by slot in the declaring set's ADF list.
    /// The arity equals the referenced registry's input-argument count.
    Adf { id: usize, arity: usize },
    /// External input argument of the owning registry.
    Argument(usize),
    /// Named constant terminal, by registry slot.
    Terminal(usize),
    /// Literal leaf holding the value an ephemeral constant drew at
    /// tree-construction time. Never re-sampled.
    Constant(f64),
}

impl Node {
    pub fn arity(&self) -> usize {
        match self {
            Node::Primitive { arity, .. } | Node::Adf { arity, .. } => *arity,
            Node::Argument(_) | Node::Terminal(_) | Node::Constant(_) => 0,
        }
    }
}

/// A program as an owned prefix-order node sequence.
///
/// Invariant: the sequence is always a complete tree. Walking it while a slot
/// counter starts at 1 and gains `arity - 1` per node, the counter stays
/// positive until the final node and reaches exactly 0 there. Subtree bounds
/// are recovered by the same walk, so no pointer structure is stored and a
/// `clone` is a fully independent deep copy.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PrimitiveTree {
    nodes: Vec<Node>,
}

impl PrimitiveTree {
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks the arity-slot invariant over the whole sequence.
    pub fn is_well_formed(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut open = 1usize;
        for (i, node) in self.nodes.iter().enumerate() {
            if open == 0 {
                return false;
            }
            open = open - 1 + node.arity();
            if open == 0 && i + 1 != self.nodes.len() {
                return false;
            }
        }
        open == 0
    }

    /// Bounds of the subtree rooted at `begin`, found by walking arities.
    pub fn subtree(&self, begin: usize) -> Range<usize> {
        let mut end = begin;
        let mut open = 1usize;
        while open > 0 {
            open = open - 1 + self.nodes[end].arity();
            end += 1;
        }
        begin..end
    }

    /// Depth of the deepest node; a single leaf has height 0.
    pub fn height(&self) -> usize {
        let mut stack: Vec<usize> = Vec::new();
        let mut max_depth = 0;
        for node in &self.nodes {
            max_depth = max_depth.max(stack.len());
            if let Some(top) = stack.last_mut() {
                *top -= 1;
            }
            if node.arity() > 0 {
                stack.push(node.arity());
            } else {
                while stack.last() == Some(&0) {
                    stack.pop();
                }
            }
        }
        max_depth
    }

    /// Replaces the nodes in `range` (a subtree's bounds) with `replacement`,
    /// returning the removed nodes. Swapping whole subtrees through this keeps
    /// the sequence well-formed by construction.
    pub fn replace_subtree(&mut self, range: Range<usize>, replacement: Vec<Node>) -> Vec<Node> {
        self.nodes.splice(range, replacement).collect()
    }

    /// Human-readable rendering against the registry the tree was built from,
    /// e.g. `add(x, mul(x, x))`.
    pub fn display<'a>(&'a self, pset: &'a PrimitiveSet) -> TreeDisplay<'a> {
        TreeDisplay { tree: self, pset }
    }
}

pub struct TreeDisplay<'a> {
    tree: &'a PrimitiveTree,
    pset: &'a PrimitiveSet,
}

impl TreeDisplay<'_> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, pos: &mut usize) -> fmt::Result {
        let node = &self.tree.nodes[*pos];
        *pos += 1;
        match node {
            Node::Primitive { id, arity } => {
                write!(f, "{}(", self.pset.primitive_name(*id))?;
                self.write_args(f, pos, *arity)
            }
            Node::Adf { id, arity } => {
                write!(f, "{}(", self.pset.adfs()[*id].name())?;
                self.write_args(f, pos, *arity)
            }
            Node::Argument(i) => write!(f, "{}", self.pset.arg_name(*i)),
            Node::Terminal(id) => write!(f, "{}", self.pset.const_name(*id)),
            Node::Constant(v) => write!(f, "{v}"),
        }
    }

    fn write_args(&self, f: &mut fmt::Formatter<'_>, pos: &mut usize, arity: usize) -> fmt::Result {
        for i in 0..arity {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.write_node(f, pos)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pos = 0;
        self.write_node(f, &mut pos)
    }
}

/// How random trees are shaped within the `[min_depth, max_depth]` bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenStrategy {
    /// Every branch reaches exactly the drawn target depth.
    Full,
    /// Branches may terminate early; internal vs. leaf is drawn uniformly
    /// over the union of both vocabularies.
    Grow,
    /// Per tree, a uniform coin picks Full or Grow (ramped half-and-half).
    RampedHalfAndHalf,
}

/// Generates a random well-formed tree for `pset`.
///
/// The target depth is drawn uniformly from `min_depth..=max_depth`. Nodes at
/// the target depth are always leaves; above it, `Full` always picks an
/// internal node while `Grow` may terminate the branch early once `min_depth`
/// is reached. A set with no internal vocabulary degrades to a single leaf;
/// a set with no leaves at all is a configuration error.
///
/// # Errors
/// [`PsetError::NoTerminals`] if a leaf is required but the set declares no
/// arguments, constants, or ephemeral generators.
pub fn generate(
    pset: &PrimitiveSet,
    min_depth: usize,
    max_depth: usize,
    strategy: GenStrategy,
    rng: &mut StdRng,
) -> Result<PrimitiveTree, PsetError> {
    let height = rng.random_range(min_depth..=max_depth);
    let grow = match strategy {
        GenStrategy::Full => false,
        GenStrategy::Grow => true,
        GenStrategy::RampedHalfAndHalf => rng.random(),
    };

    let mut nodes = Vec::new();
    let mut stack = vec![0usize];
    while let Some(depth) = stack.pop() {
        let leaf = depth >= height
            || pset.internal_len() == 0
            || (grow
                && depth >= min_depth
                && rng.random_range(0..pset.internal_len() + pset.leaf_len()) < pset.leaf_len());
        if leaf {
            nodes.push(pick_leaf(pset, rng)?);
        } else {
            let node = pick_internal(pset, rng);
            stack.extend(std::iter::repeat(depth + 1).take(node.arity()));
            nodes.push(node);
        }
    }
    Ok(PrimitiveTree { nodes })
}

fn pick_leaf(pset: &PrimitiveSet, rng: &mut StdRng) -> Result<Node, PsetError> {
    let total = pset.leaf_len();
    if total == 0 {
        return Err(PsetError::NoTerminals(pset.name().to_string()));
    }
    let mut idx = rng.random_range(0..total);
    if idx < pset.arity() {
        return Ok(Node::Argument(idx));
    }
    idx -= pset.arity();
    if idx < pset.const_count() {
        return Ok(Node::Terminal(idx));
    }
    idx -= pset.const_count();
    Ok(Node::Constant(pset.sample_ephemeral(idx, rng)))
}

fn pick_internal(pset: &PrimitiveSet, rng: &mut StdRng) -> Node {
    let idx = rng.random_range(0..pset.internal_len());
    if idx < pset.primitive_count() {
        Node::Primitive {
            id: idx,
            arity: pset.primitive_arity(idx),
        }
    } else {
        let id = idx - pset.primitive_count();
        Node::Adf {
            id,
            arity: pset.adfs()[id].arity(),
        }
    }
}
