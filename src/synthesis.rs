//! `Synthesis`: postfix program + stack evaluator.

use itertools::Itertools;

use crate::backend::{ChemistryBackend, Molecule, Reaction};
use crate::error::{Error, Result};
use crate::postfix::{PostfixNotation, Token};

/// The outcome of one stack frame: the backend-deduplicated set of molecules
/// a prefix of the program evaluates to.
///
/// Deduplication is by backend identity (`Molecule::identity_eq`), not
/// structural equality — a linear scan is used since reaction product
/// groups and building-block sets are expected to stay small (single digits
/// to low tens of molecules per frame).
#[derive(Debug, Clone, Default)]
pub struct MolSet(Vec<Molecule>);

impl MolSet {
    pub fn new() -> Self {
        MolSet(Vec::new())
    }

    pub fn singleton(mol: Molecule) -> Self {
        MolSet(vec![mol])
    }

    pub fn from_vec_deduped(mols: Vec<Molecule>) -> Self {
        let mut set = MolSet::new();
        for mol in mols {
            set.insert(mol);
        }
        set
    }

    pub fn insert(&mut self, mol: Molecule) {
        if !self.0.iter().any(|existing| existing.identity_eq(&mol)) {
            self.0.push(mol);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Molecule> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Molecule] {
        &self.0
    }

    /// `true` if every molecule in `self` has a backend-identical
    /// counterpart in `other` and vice versa (used by tests to compare
    /// product sets by identity rather than structural equality).
    pub fn set_eq(&self, other: &MolSet) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|m| other.0.iter().any(|o| m.identity_eq(o)))
    }
}

/// A postfix program paired with the evaluator's stack of [`MolSet`]s.
///
/// Invariants: the program is valid at every
/// prefix; after evaluating a complete program `stack.len() == 1`; an empty
/// `Synthesis` has an empty postfix and an empty stack.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    postfix: PostfixNotation,
    stack: Vec<MolSet>,
}

/// Upper bound on how many sanitized main products [`Synthesis::push_reaction`]
/// accumulates before stopping early.
pub const DEFAULT_MAX_PRODUCTS: usize = 8;

impl Synthesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a molecule token and pushes a singleton stack frame containing
    /// a defensive copy of `mol`").
    pub fn push_molecule(&mut self, mol: &Molecule) {
        let copy = mol.deep_copy();
        self.stack.push(MolSet::singleton(copy.clone()));
        self.postfix.append(Token::Molecule(copy));
    }

    /// Applies `reaction` to the top `k = reaction.num_reactant_slots()`
    /// stack frames, one reactant drawn from each, replacing them with the
    /// resulting product frame(s) (capped at `max_products`).
    pub fn push_reaction(
        &mut self,
        backend: &dyn ChemistryBackend,
        reaction: &Reaction,
        max_products: usize,
    ) -> Result<()> {
        let k = reaction.num_reactant_slots();
        if self.stack.len() < k {
            return Err(Error::PushReaction(format!(
                "not enough reactants: need {k}, have {}",
                self.stack.len()
            )));
        }

        let start = self.stack.len() - k;
        let reactant_sets = &self.stack[start..];

        let mut main_products: Vec<Molecule> = Vec::new();
        'combinations: for combination in reactant_sets
            .iter()
            .map(|frame| frame.iter().cloned().collect::<Vec<_>>())
            .multi_cartesian_product()
        {
            let mut canonical = combination;
            canonical.sort_by_key(Molecule::identity_key);

            for assignment in canonical.iter().cloned().permutations(k) {
                let product_groups = backend.apply_reaction(reaction, &assignment);
                for group in product_groups {
                    let Some(main) = group.into_iter().next() else {
                        continue;
                    };
                    if let Some(sanitized) = backend.sanitize(&main) {
                        main_products.push(sanitized);
                        if main_products.len() >= max_products {
                            break 'combinations;
                        }
                    }
                }
            }
        }

        if main_products.is_empty() {
            return Err(Error::PushReaction(
                "no sanitized product from any reactant assignment".into(),
            ));
        }

        self.stack.truncate(start);
        self.stack.push(MolSet::from_vec_deduped(main_products));
        self.postfix.append(Token::Reaction(reaction.clone()));
        Ok(())
    }

    /// Concatenates `other`'s postfix onto `self`'s and extends the stack
    /// with copies of `other`'s frames").
    pub fn push_synthesis(&mut self, other: Synthesis) {
        self.stack.extend(other.stack.clone());
        self.postfix.extend(other.postfix);
    }

    pub fn top(&self) -> Option<&MolSet> {
        self.stack.last()
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn count_reactions(&self) -> usize {
        self.postfix.count_reactions()
    }

    pub fn count_building_blocks(&self) -> usize {
        self.postfix.count_building_blocks()
    }

    pub fn postfix(&self) -> &PostfixNotation {
        &self.postfix
    }

    pub fn is_empty(&self) -> bool {
        self.postfix.is_empty() && self.stack.is_empty()
    }

    /// Re-evaluates `postfix` from an empty synthesis using `backend`,
    /// returning the resulting stack. Used to check the "postfix validity"
    /// invariant and to reconstruct a `Synthesis` after
    /// unpickling without re-serializing stack frames verbatim.
    pub fn evaluate(
        postfix: &PostfixNotation,
        backend: &dyn ChemistryBackend,
        max_products: usize,
    ) -> Result<Synthesis> {
        let mut synthesis = Synthesis::new();
        for token in postfix.iter() {
            match token {
                Token::Molecule(mol) => synthesis.push_molecule(mol),
                Token::Reaction(reaction) => {
                    synthesis.push_reaction(backend, reaction, max_products)?
                }
            }
        }
        Ok(synthesis)
    }

    /// Tagged-stream pickle: postfix tokens, then stack frames, each
    /// molecule/reaction written as a backend-opaque blob.
    pub fn pickle(&self, backend: &dyn ChemistryBackend) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((self.postfix.len() as u64).to_le_bytes());
        for token in self.postfix.iter() {
            match token {
                Token::Molecule(mol) => {
                    out.push(0);
                    write_blob(&mut out, &backend.pickle_molecule(mol));
                }
                Token::Reaction(reaction) => {
                    out.push(1);
                    write_blob(&mut out, &backend.pickle_reaction(reaction));
                }
            }
        }
        out.extend((self.stack.len() as u64).to_le_bytes());
        for frame in &self.stack {
            out.extend((frame.len() as u64).to_le_bytes());
            for mol in frame.iter() {
                write_blob(&mut out, &backend.pickle_molecule(mol));
            }
        }
        out
    }

    /// Inverse of [`Synthesis::pickle`]. Round-trips preserve `top()`
    /// product-set equality.
    pub fn unpickle(bytes: &[u8], backend: &dyn ChemistryBackend) -> Result<Synthesis> {
        let mut cursor = bytes;
        let token_count = read_u64(&mut cursor)?;
        let mut postfix = PostfixNotation::new();
        for _ in 0..token_count {
            let tag = read_u8(&mut cursor)?;
            let blob = read_blob(&mut cursor)?;
            let token = match tag {
                0 => Token::Molecule(backend.unpickle_molecule(&blob)?),
                1 => Token::Reaction(backend.unpickle_reaction(&blob)?),
                other => {
                    return Err(Error::CorruptCache(format!("bad token tag {other}")))
                }
            };
            postfix.append(token);
        }
        let frame_count = read_u64(&mut cursor)?;
        let mut stack = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let mol_count = read_u64(&mut cursor)?;
            let mut frame = MolSet::new();
            for _ in 0..mol_count {
                let blob = read_blob(&mut cursor)?;
                frame.insert(backend.unpickle_molecule(&blob)?);
            }
            stack.push(frame);
        }
        Ok(Synthesis { postfix, stack })
    }
}

fn write_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend((bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.len() < 8 {
        return Err(Error::CorruptCache("truncated u64".into()));
    }
    let (head, rest) = cursor.split_at(8);
    *cursor = rest;
    Ok(u64::from_le_bytes(head.try_into().unwrap()))
}

fn read_u8(cursor: &mut &[u8]) -> Result<u8> {
    if cursor.is_empty() {
        return Err(Error::CorruptCache("truncated tag".into()));
    }
    let (head, rest) = cursor.split_at(1);
    *cursor = rest;
    Ok(head[0])
}

fn read_blob(cursor: &mut &[u8]) -> Result<Vec<u8>> {
    if cursor.len() < 4 {
        return Err(Error::CorruptCache("truncated blob length".into()));
    }
    let (head, rest) = cursor.split_at(4);
    let len = u32::from_le_bytes(head.try_into().unwrap()) as usize;
    if rest.len() < len {
        return Err(Error::CorruptCache("truncated blob".into()));
    }
    let (blob, rest) = rest.split_at(len);
    *cursor = rest;
    Ok(blob.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestBackend;

    fn amide_like_reaction(backend: &TestBackend) -> Reaction {
        backend.parse_reaction_smarts("NH2.COOH>>AMIDE").unwrap()
    }

    #[test]
    fn single_step_synthesis_produces_expected_product() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xNH2x").unwrap();
        let m2 = backend.parse_smiles("xCOOHx").unwrap();
        let r = amide_like_reaction(&backend);

        let mut s = Synthesis::new();
        s.push_molecule(&m1);
        s.push_molecule(&m2);
        s.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap();

        assert_eq!(s.stack_size(), 1);
        assert_eq!(s.top().unwrap().len(), 1);
        assert_eq!(s.count_reactions(), 1);
        assert_eq!(s.count_building_blocks(), 2);
    }

    #[test]
    fn push_fails_on_mismatched_reactants_and_state_is_unchanged() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xNH2x").unwrap();
        let r = amide_like_reaction(&backend);

        let mut s = Synthesis::new();
        s.push_molecule(&m1);
        s.push_molecule(&m1);
        let err = s.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap_err();
        assert!(matches!(err, Error::PushReaction(_)));
        assert_eq!(s.stack_size(), 2);
        assert_eq!(s.postfix().count_reactions(), 0);
    }

    #[test]
    fn push_fails_on_under_filled_stack() {
        let backend = TestBackend::new();
        let r = amide_like_reaction(&backend);
        let mut s = Synthesis::new();
        let err = s.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap_err();
        assert!(matches!(err, Error::PushReaction(_)));
        assert!(s.is_empty());
    }

    #[test]
    fn product_equality_is_independent_of_push_order() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xNH2x").unwrap();
        let m2 = backend.parse_smiles("xCOOHx").unwrap();
        let r = amide_like_reaction(&backend);

        let mut a = Synthesis::new();
        a.push_molecule(&m1);
        a.push_molecule(&m2);
        a.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap();

        let mut b = Synthesis::new();
        b.push_molecule(&m2);
        b.push_molecule(&m1);
        b.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap();

        assert_eq!(a.top().unwrap().len(), b.top().unwrap().len());
    }

    #[test]
    fn pickle_round_trip_preserves_top_product_set() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xNH2x").unwrap();
        let m2 = backend.parse_smiles("xCOOHx").unwrap();
        let r = amide_like_reaction(&backend);

        let mut s = Synthesis::new();
        s.push_molecule(&m1);
        s.push_molecule(&m2);
        s.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap();

        let bytes = s.pickle(&backend);
        let restored = Synthesis::unpickle(&bytes, &backend).unwrap();

        let a: Vec<_> = s
            .top()
            .unwrap()
            .iter()
            .map(|m| m.payload().as_any().downcast_ref::<crate::backend::testing::TestMol>().unwrap().0.clone())
            .collect();
        let b: Vec<_> = restored
            .top()
            .unwrap()
            .iter()
            .map(|m| m.payload().as_any().downcast_ref::<crate::backend::testing::TestMol>().unwrap().0.clone())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn evaluating_postfix_from_empty_reproduces_stack() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xNH2x").unwrap();
        let m2 = backend.parse_smiles("xCOOHx").unwrap();
        let r = amide_like_reaction(&backend);

        let mut s = Synthesis::new();
        s.push_molecule(&m1);
        s.push_molecule(&m2);
        s.push_reaction(&backend, &r, DEFAULT_MAX_PRODUCTS).unwrap();

        let replayed = Synthesis::evaluate(s.postfix(), &backend, DEFAULT_MAX_PRODUCTS).unwrap();
        assert_eq!(replayed.stack_size(), s.stack_size());
        assert_eq!(replayed.top().unwrap().len(), s.top().unwrap().len());
    }

    #[test]
    fn push_synthesis_concatenates_programs_and_stacks() {
        let backend = TestBackend::new();
        let m1 = backend.parse_smiles("xA").unwrap();
        let m2 = backend.parse_smiles("xB").unwrap();

        let mut a = Synthesis::new();
        a.push_molecule(&m1);
        let mut b = Synthesis::new();
        b.push_molecule(&m2);

        a.push_synthesis(b);
        assert_eq!(a.stack_size(), 2);
        assert_eq!(a.postfix().len(), 2);
    }
}
