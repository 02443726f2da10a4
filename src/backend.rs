//! The abstract cheminformatics collaborator (§4.1) and the opaque,
//! multi-owner `Molecule`/`Reaction` handles it produces (§3 "Molecule (M)",
//! "Reaction (R)").
//!
//! Nothing in this module knows about SMILES, SMARTS, substructure matching,
//! or sanitization algorithms — those live entirely behind [`ChemistryBackend`],
//! provided by an embedder. The core only requires that molecule/reaction
//! payloads can be boxed, cloned, downcast by the concrete backend that
//! produced them, and shared cheaply across threads.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Backend-owned opaque data, shared behind [`Molecule`], [`Reaction`], and
/// [`Pattern`].
///
/// A blanket implementation covers any `Any + Send + Sync + fmt::Debug +
/// Clone` type, so a concrete backend crate typically just derives `Clone`
/// and `Debug` on its internal molecule/reaction/pattern representation and
/// gets `Payload` for free.
pub trait Payload: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn clone_payload(&self) -> Box<dyn Payload>;
}

impl<T> Payload for T
where
    T: Any + Send + Sync + fmt::Debug + Clone,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_payload(&self) -> Box<dyn Payload> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Payload> {
    fn clone(&self) -> Self {
        self.clone_payload()
    }
}

/// Well-known annotation keys.
pub const ORIGINAL_INDEX: &str = "original_index";
pub const BUILDING_BLOCK_INDEX: &str = "building_block_index";
pub const REACTION_INDEX: &str = "reaction_index";

/// A small string-keyed integer annotation dict attached to molecules and
/// reactions, for backend- or pipeline-specific bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations(HashMap<&'static str, i64>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: i64) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.0.get(key).copied()
    }

    pub fn set(&mut self, key: &'static str, value: i64) {
        self.0.insert(key, value);
    }
}

struct MoleculeInner {
    payload: Box<dyn Payload>,
    annotations: Annotations,
}

impl fmt::Debug for MoleculeInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoleculeInner")
            .field("payload", &self.payload)
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// An immutable, cheaply-clonable handle to a sanitized chemical graph.
///
/// Two `Molecule` values are considered the same molecule only if they share
/// the same underlying allocation (`Arc::ptr_eq`), never by structural
/// comparison of the payload.
#[derive(Clone)]
pub struct Molecule(Arc<MoleculeInner>);

impl fmt::Debug for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Molecule {
    pub fn new(payload: Box<dyn Payload>, annotations: Annotations) -> Self {
        Molecule(Arc::new(MoleculeInner {
            payload,
            annotations,
        }))
    }

    pub fn payload(&self) -> &dyn Payload {
        self.0.payload.as_ref()
    }

    pub fn annotations(&self) -> &Annotations {
        &self.0.annotations
    }

    pub fn original_index(&self) -> Option<i64> {
        self.0.annotations.get(ORIGINAL_INDEX)
    }

    pub fn building_block_index(&self) -> Option<i64> {
        self.0.annotations.get(BUILDING_BLOCK_INDEX)
    }

    /// Two handles refer to the same underlying molecule ("backend identity").
    pub fn identity_eq(&self, other: &Molecule) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable-for-this-process identity key, used only to put a
    /// deterministic total order on a set of molecules before permutation
    /// enumeration. Carries
    /// no chemical meaning.
    pub fn identity_key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Returns a molecule with the same payload and annotations but a fresh,
    /// independently-owned copy of the backend payload.
    ///
    /// Some backends mutate a molecule's property dict through operations
    /// that look `const` from Rust's point of view (they go through an FFI
    /// boundary the borrow checker can't see). Call this before handing a
    /// molecule to a backend operation whose mutation behavior you don't
    /// trust.
    pub fn deep_copy(&self) -> Molecule {
        Molecule::new(self.0.payload.clone_payload(), self.0.annotations.clone())
    }

    /// Attaches or overwrites an annotation, returning a new handle that
    /// shares no storage with `self` (annotations, unlike payload, are not
    /// behind the `Arc`, so this always deep-copies the small dict but never
    /// the chemistry payload).
    pub fn with_annotation(&self, key: &'static str, value: i64) -> Molecule {
        let mut annotations = self.0.annotations.clone();
        annotations.set(key, value);
        Molecule::new(self.0.payload.clone_payload(), annotations)
    }
}

/// An opaque sub-structure pattern for one reactant slot of a [`Reaction`].
#[derive(Clone)]
pub struct Pattern(Arc<dyn Payload>);

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Pattern {
    pub fn new(payload: impl Payload) -> Self {
        Pattern(Arc::new(payload))
    }

    pub fn payload(&self) -> &dyn Payload {
        self.0.as_ref()
    }
}

struct ReactionInner {
    payload: Box<dyn Payload>,
    patterns: Vec<Pattern>,
    num_products: usize,
    annotations: Annotations,
}

impl fmt::Debug for ReactionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionInner")
            .field("payload", &self.payload)
            .field("num_reactant_slots", &self.patterns.len())
            .field("num_products", &self.num_products)
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// An immutable, cheaply-clonable handle to a reaction template with
/// `k = num_reactant_slots()` reactant slots.
#[derive(Clone)]
pub struct Reaction(Arc<ReactionInner>);

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Reaction {
    pub fn new(
        payload: Box<dyn Payload>,
        patterns: Vec<Pattern>,
        num_products: usize,
        annotations: Annotations,
    ) -> Self {
        Reaction(Arc::new(ReactionInner {
            payload,
            patterns,
            num_products,
            annotations,
        }))
    }

    pub fn payload(&self) -> &dyn Payload {
        self.0.payload.as_ref()
    }

    pub fn num_reactant_slots(&self) -> usize {
        self.0.patterns.len()
    }

    pub fn num_products(&self) -> usize {
        self.0.num_products
    }

    /// The `s`-th reactant slot's substructure pattern.
    pub fn reactant_pattern(&self, slot: usize) -> Result<&Pattern> {
        self.0
            .patterns
            .get(slot)
            .ok_or(Error::IndexOutOfRange {
                index: slot,
                len: self.0.patterns.len(),
            })
    }

    pub fn reaction_index(&self) -> Option<i64> {
        self.0.annotations.get(REACTION_INDEX)
    }

    pub fn identity_eq(&self, other: &Reaction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn with_annotation(&self, key: &'static str, value: i64) -> Reaction {
        let mut annotations = self.0.annotations.clone();
        annotations.set(key, value);
        Reaction::new(
            self.0.payload.clone_payload(),
            self.0.patterns.clone(),
            self.0.num_products,
            annotations,
        )
    }
}

/// The cheminformatics toolkit the core depends on.
///
/// Every method is pure except that [`ChemistryBackend::apply_reaction`] may
/// return its product groups in a non-deterministic order — callers treat
/// the result as a set, never relying on ordering.
pub trait ChemistryBackend: Send + Sync {
    fn parse_smiles(&self, smiles: &str) -> Result<Molecule>;

    fn parse_reaction_smarts(&self, smarts: &str) -> Result<Reaction>;

    /// Returns `None` if sanitization fails; never an `Err` — a molecule
    /// that cannot be sanitized is simply unusable, not an exceptional
    /// condition.
    fn sanitize(&self, mol: &Molecule) -> Option<Molecule>;

    fn substructure_match(&self, mol: &Molecule, pattern: &Pattern) -> bool;

    /// `reactants[i]` must bind to `reaction.reactant_pattern(i)` — a total,
    /// duplicate-free assignment over `[0, reaction.num_reactant_slots())`.
    /// Violating this is a caller bug, not a recoverable condition:
    /// implementations may `debug_assert!` on
    /// `reactants.len() == reaction.num_reactant_slots()`.
    ///
    /// Returns one `Vec<Molecule>` of length `reaction.num_products()` per
    /// product group; an empty outer `Vec` means the reaction did not apply
    /// to this particular reactant assignment.
    fn apply_reaction(&self, reaction: &Reaction, reactants: &[Molecule]) -> Vec<Vec<Molecule>>;

    fn num_heavy_atoms(&self, mol: &Molecule) -> usize;

    /// Opaque serialized form consumed/produced only by this same backend.
    fn pickle_molecule(&self, mol: &Molecule) -> Vec<u8>;
    fn unpickle_molecule(&self, bytes: &[u8]) -> Result<Molecule>;

    fn pickle_reaction(&self, reaction: &Reaction) -> Vec<u8>;
    fn unpickle_reaction(&self, bytes: &[u8]) -> Result<Reaction>;
}

#[cfg(test)]
pub mod testing {
    //! A trivial in-memory `ChemistryBackend` used by this crate's own unit
    //! and integration tests. It has no real chemistry: "molecules" are
    //! strings, "reactions" concatenate their sorted inputs, and
    //! substructure matching is substring containment. This is enough to
    //! exercise every backend contract without a real cheminformatics
    //! dependency.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TestMol(pub String);

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TestPattern(pub String);

    #[derive(Debug, Clone)]
    pub struct TestReactionPayload {
        pub name: String,
    }

    pub struct TestBackend {
        sanitize_fail: std::collections::HashSet<String>,
        heavy_atoms: AtomicUsize,
    }

    impl Default for TestBackend {
        fn default() -> Self {
            TestBackend {
                sanitize_fail: Default::default(),
                heavy_atoms: AtomicUsize::new(1),
            }
        }
    }

    impl TestBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every molecule whose string representation is `name` fail
        /// sanitization, for exercising `MoleculeError` paths.
        pub fn fail_sanitize(mut self, name: &str) -> Self {
            self.sanitize_fail.insert(name.to_string());
            self
        }

        fn text(mol: &Molecule) -> String {
            mol.payload()
                .as_any()
                .downcast_ref::<TestMol>()
                .expect("TestBackend only produces TestMol payloads")
                .0
                .clone()
        }
    }

    impl ChemistryBackend for TestBackend {
        fn parse_smiles(&self, smiles: &str) -> Result<Molecule> {
            if smiles.is_empty() {
                return Err(Error::Molecule("empty SMILES".into()));
            }
            Ok(Molecule::new(
                Box::new(TestMol(smiles.to_string())),
                Annotations::new(),
            ))
        }

        fn parse_reaction_smarts(&self, smarts: &str) -> Result<Reaction> {
            // Grammar: "A.B>>C" where A, B are substrings each reactant slot
            // must contain, and the number of '.'-separated LHS fragments is
            // `k(R)`.
            let (lhs, _rhs) = smarts
                .split_once(">>")
                .ok_or_else(|| Error::Reaction(format!("malformed SMARTS: {smarts}")))?;
            let patterns: Vec<Pattern> = lhs
                .split('.')
                .map(|p| Pattern::new(TestPattern(p.to_string())))
                .collect();
            Ok(Reaction::new(
                Box::new(TestReactionPayload {
                    name: smarts.to_string(),
                }),
                patterns,
                1,
                Annotations::new(),
            ))
        }

        fn sanitize(&self, mol: &Molecule) -> Option<Molecule> {
            let text = Self::text(mol);
            if self.sanitize_fail.contains(&text) {
                None
            } else {
                Some(mol.clone())
            }
        }

        fn substructure_match(&self, mol: &Molecule, pattern: &Pattern) -> bool {
            let text = Self::text(mol);
            let needle = &pattern
                .payload()
                .as_any()
                .downcast_ref::<TestPattern>()
                .expect("TestBackend only produces TestPattern payloads")
                .0;
            text.contains(needle.as_str())
        }

        fn apply_reaction(&self, reaction: &Reaction, reactants: &[Molecule]) -> Vec<Vec<Molecule>> {
            debug_assert_eq!(reactants.len(), reaction.num_reactant_slots());
            if reactants
                .iter()
                .enumerate()
                .any(|(slot, mol)| !self.substructure_match(mol, reaction.reactant_pattern(slot).unwrap()))
            {
                return Vec::new();
            }
            let mut parts: Vec<String> = reactants.iter().map(Self::text).collect();
            parts.sort();
            let product = Molecule::new(Box::new(TestMol(parts.join("+"))), Annotations::new());
            vec![vec![product]]
        }

        fn num_heavy_atoms(&self, mol: &Molecule) -> usize {
            let _ = self.heavy_atoms.load(Ordering::Relaxed);
            Self::text(mol).split('+').count()
        }

        fn pickle_molecule(&self, mol: &Molecule) -> Vec<u8> {
            Self::text(mol).into_bytes()
        }

        fn unpickle_molecule(&self, bytes: &[u8]) -> Result<Molecule> {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Molecule(e.to_string()))?;
            Ok(Molecule::new(Box::new(TestMol(text)), Annotations::new()))
        }

        fn pickle_reaction(&self, reaction: &Reaction) -> Vec<u8> {
            reaction
                .payload()
                .as_any()
                .downcast_ref::<TestReactionPayload>()
                .unwrap()
                .name
                .clone()
                .into_bytes()
        }

        fn unpickle_reaction(&self, bytes: &[u8]) -> Result<Reaction> {
            let name =
                String::from_utf8(bytes.to_vec()).map_err(|e| Error::Reaction(e.to_string()))?;
            self.parse_reaction_smarts(&name)
        }
    }
}

#[cfg(test)]
mod molecule {
    use super::testing::*;
    use super::*;

    #[test]
    fn identity_eq_distinguishes_separately_constructed_equal_molecules() {
        let a = Molecule::new(Box::new(TestMol("C".into())), Annotations::new());
        let b = Molecule::new(Box::new(TestMol("C".into())), Annotations::new());
        assert!(!a.identity_eq(&b));
        assert!(a.identity_eq(&a.clone()));
    }

    #[test]
    fn deep_copy_preserves_identity_semantics_but_not_pointer() {
        let a = Molecule::new(Box::new(TestMol("C".into())), Annotations::new());
        let copy = a.deep_copy();
        assert!(!a.identity_eq(&copy));
        assert_eq!(
            a.payload().as_any().downcast_ref::<TestMol>(),
            copy.payload().as_any().downcast_ref::<TestMol>()
        );
    }

    #[test]
    fn annotations_round_trip() {
        let a = Molecule::new(Box::new(TestMol("C".into())), Annotations::new())
            .with_annotation(BUILDING_BLOCK_INDEX, 3);
        assert_eq!(a.building_block_index(), Some(3));
    }
}
