use rand::rngs::StdRng;
use std::sync::Arc;
use thiserror::Error;

/// A registered primitive's implementation. Receives exactly `arity` evaluated
/// argument values. Primitives own their full input domain: anything that
/// could fail numerically (division by zero, log of a negative) must return a
/// sentinel value instead of panicking.
pub type PrimitiveFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Generator behind an ephemeral constant. Sampled once when the terminal is
/// instantiated into a tree; the drawn value is a plain literal from then on.
pub type EphemeralFn = Arc<dyn Fn(&mut StdRng) -> f64 + Send + Sync>;

#[derive(Error, Debug)]
pub enum PsetError {
    #[error("name '{name}' is already registered in primitive set '{set}'")]
    DuplicateName { name: String, set: String },
    #[error("primitive '{name}' in set '{set}' must take at least one argument")]
    ZeroArityPrimitive { name: String, set: String },
    #[error("registering '{child}' as an ADF of '{parent}' would create a reference cycle")]
    CyclicReference { parent: String, child: String },
    #[error("primitive set '{0}' has no terminals to terminate a branch with")]
    NoTerminals(String),
    #[error("primitive set '{set}' has no argument named '{name}'")]
    UnknownArgument { set: String, name: String },
}

#[derive(Clone)]
struct PrimitiveDecl {
    name: String,
    arity: usize,
    func: PrimitiveFn,
}

#[derive(Clone)]
struct ConstDecl {
    name: String,
    value: f64,
}

#[derive(Clone)]
struct EphemeralDecl {
    name: String,
    gen: EphemeralFn,
}

/// Handle to a [`PrimitiveSet`] owned by a [`PsetGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PsetId(usize);

/// A reference to another registry, callable from trees of the declaring
/// registry exactly like a primitive of the child's input-argument arity.
#[derive(Clone)]
pub struct AdfDecl {
    name: String,
    set: PsetId,
    arity: usize,
}

impl AdfDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self) -> PsetId {
        self.set
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

/// The closed vocabulary trees of one registry are built from: primitives,
/// terminals (named constants and ephemeral-constant generators), the external
/// input arguments, and references to nested ADF registries.
///
/// All registration happens at setup time; once trees have been generated the
/// set is treated as immutable.
#[derive(Clone)]
pub struct PrimitiveSet {
    name: String,
    n_args: usize,
    arg_names: Vec<String>,
    primitives: Vec<PrimitiveDecl>,
    consts: Vec<ConstDecl>,
    ephemerals: Vec<EphemeralDecl>,
    adfs: Vec<AdfDecl>,
}

impl PrimitiveSet {
    /// Creates an empty set whose programs accept `n_args` external inputs,
    /// named `ARG0`..`ARGn` until renamed.
    pub fn new(name: impl Into<String>, n_args: usize) -> Self {
        Self {
            name: name.into(),
            n_args,
            arg_names: (0..n_args).map(|i| format!("ARG{i}")).collect(),
            primitives: Vec::new(),
            consts: Vec::new(),
            ephemerals: Vec::new(),
            adfs: Vec::new(),
        }
    }

    /// Registers a named primitive of fixed arity.
    ///
    /// # Arguments
    /// * `name` - Display name, unique within the set.
    /// * `arity` - Number of arguments, at least 1.
    /// * `func` - The implementation; must be total over its numeric domain.
    pub fn add_primitive<F>(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        func: F,
    ) -> Result<(), PsetError>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        let name = name.into();
        if arity == 0 {
            return Err(PsetError::ZeroArityPrimitive {
                name,
                set: self.name.clone(),
            });
        }
        self.check_name(&name)?;
        self.primitives.push(PrimitiveDecl {
            name,
            arity,
            func: Arc::new(func),
        });
        Ok(())
    }

    /// Registers a named constant terminal.
    pub fn add_terminal(&mut self, name: impl Into<String>, value: f64) -> Result<(), PsetError> {
        let name = name.into();
        self.check_name(&name)?;
        self.consts.push(ConstDecl { name, value });
        Ok(())
    }

    /// Registers an ephemeral-constant generator. Each instantiation into a
    /// tree draws one fresh value which is then fixed for that leaf's lifetime.
    pub fn add_ephemeral<F>(&mut self, name: impl Into<String>, gen: F) -> Result<(), PsetError>
    where
        F: Fn(&mut StdRng) -> f64 + Send + Sync + 'static,
    {
        let name = name.into();
        self.check_name(&name)?;
        self.ephemerals.push(EphemeralDecl {
            name,
            gen: Arc::new(gen),
        });
        Ok(())
    }

    /// Relabels input argument slots for display purposes. Arity and
    /// evaluation semantics are unaffected.
    ///
    /// # Arguments
    /// * `mapping` - Pairs of (current name, new name), e.g. `("ARG0", "x")`.
    pub fn rename_arguments(&mut self, mapping: &[(&str, &str)]) -> Result<(), PsetError> {
        for (from, to) in mapping {
            if from == to {
                continue;
            }
            let idx = self.arg_names.iter().position(|n| n == from).ok_or_else(|| {
                PsetError::UnknownArgument {
                    set: self.name.clone(),
                    name: (*from).to_string(),
                }
            })?;
            self.check_name(to)?;
            self.arg_names[idx] = (*to).to_string();
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), PsetError> {
        let taken = self.primitives.iter().any(|p| p.name == name)
            || self.consts.iter().any(|c| c.name == name)
            || self.ephemerals.iter().any(|e| e.name == name)
            || self.adfs.iter().any(|a| a.name == name)
            || self.arg_names.iter().any(|a| a == name);
        if taken {
            return Err(PsetError::DuplicateName {
                name: name.to_string(),
                set: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of external input arguments programs of this set accept.
    pub fn arity(&self) -> usize {
        self.n_args
    }

    pub fn arg_name(&self, index: usize) -> &str {
        &self.arg_names[index]
    }

    pub fn adfs(&self) -> &[AdfDecl] {
        &self.adfs
    }

    /// Size of the internal-node vocabulary (primitives plus ADF references).
    pub fn internal_len(&self) -> usize {
        self.primitives.len() + self.adfs.len()
    }

    /// Size of the leaf vocabulary (arguments, constants, ephemerals).
    pub fn leaf_len(&self) -> usize {
        self.n_args + self.consts.len() + self.ephemerals.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn primitive_name(&self, id: usize) -> &str {
        &self.primitives[id].name
    }

    pub fn primitive_arity(&self, id: usize) -> usize {
        self.primitives[id].arity
    }

    pub fn primitive_fn(&self, id: usize) -> PrimitiveFn {
        Arc::clone(&self.primitives[id].func)
    }

    pub fn const_count(&self) -> usize {
        self.consts.len()
    }

    pub fn const_name(&self, id: usize) -> &str {
        &self.consts[id].name
    }

    pub fn const_value(&self, id: usize) -> f64 {
        self.consts[id].value
    }

    pub fn ephemeral_count(&self) -> usize {
        self.ephemerals.len()
    }

    /// Draws one value from the given ephemeral generator.
    pub fn sample_ephemeral(&self, id: usize, rng: &mut StdRng) -> f64 {
        (self.ephemerals[id].gen)(rng)
    }
}

/// Arena owning every registry of a run and the ADF reference edges between
/// them. The reference relation must stay acyclic: a registry may never
/// transitively invoke itself.
#[derive(Clone, Default)]
pub struct PsetGraph {
    sets: Vec<PrimitiveSet>,
}

impl PsetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a set and returns its handle.
    pub fn insert(&mut self, set: PrimitiveSet) -> PsetId {
        self.sets.push(set);
        PsetId(self.sets.len() - 1)
    }

    pub fn get(&self, id: PsetId) -> &PrimitiveSet {
        &self.sets[id.0]
    }

    /// Declares `child` invocable as an ADF from `parent`'s trees. The
    /// reference's effective arity is the child's input-argument count.
    ///
    /// Fails with [`PsetError::CyclicReference`] if the edge would let
    /// `parent` reach itself, and with [`PsetError::DuplicateName`] if the
    /// child's name collides with anything already visible in `parent`.
    pub fn add_adf(&mut self, parent: PsetId, child: PsetId) -> Result<(), PsetError> {
        if parent == child || self.reaches(child, parent) {
            return Err(PsetError::CyclicReference {
                parent: self.sets[parent.0].name.clone(),
                child: self.sets[child.0].name.clone(),
            });
        }
        let name = self.sets[child.0].name.clone();
        let arity = self.sets[child.0].n_args;
        self.sets[parent.0].check_name(&name)?;
        self.sets[parent.0].adfs.push(AdfDecl {
            name,
            set: child,
            arity,
        });
        Ok(())
    }

    /// Whether `target` is reachable from `from` over ADF references.
    fn reaches(&self, from: PsetId, target: PsetId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.sets.len()];
        while let Some(PsetId(i)) = stack.pop() {
            if i == target.0 {
                return true;
            }
            if seen[i] {
                continue;
            }
            seen[i] = true;
            stack.extend(self.sets[i].adfs.iter().map(|a| a.set));
        }
        false
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
