//! `ReactantIndex`: the inverted `(reaction, slot) -> building blocks` index
//! used to sample a compatible building block for a reaction slot in O(1).

use rayon::prelude::*;

use crate::backend::ChemistryBackend;
use crate::error::{Error, Result};
use crate::reactions::ReactionList;

/// A three-dimensional jagged table `index[r][s] = [m0, m1, ...]`.
///
/// Built once from a collection of molecules (or synthesis top-products, via
/// [`ReactantIndex::build_over_syntheses`]) against a [`ReactionList`], then
/// read-only. Queries are O(1) slice access.
#[derive(Debug, Clone)]
pub struct ReactantIndex {
    /// `index[r][s]`
    index: Vec<Vec<Vec<u32>>>,
}

impl ReactantIndex {
    /// Builds the index over a flat molecule collection: `molecules[i]`
    /// contributes to `(r, s)` whenever it substructure-matches reaction
    /// `r`'s `s`-th pattern.
    ///
    /// This is an embarrassingly parallel double loop over `(i, r)`
    /// — parallelized over `i` with `rayon`, each worker
    /// producing a private partial table that is then merged in index
    /// order so the result is deterministic regardless of scheduling.
    pub fn build(
        backend: &dyn ChemistryBackend,
        molecules: &[crate::backend::Molecule],
        reactions: &ReactionList,
    ) -> Result<Self> {
        Self::build_with(reactions, |r, s, pattern| {
            molecules
                .par_iter()
                .enumerate()
                .filter_map(|(i, mol)| {
                    backend
                        .substructure_match(mol, pattern)
                        .then_some(i as u32)
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|i| (r, s, i))
                .collect()
        })
    }

    /// Builds the index over a collection of syntheses: synthesis `i`
    /// contributes to `(r, s)` if *any* molecule in its top frame matches
    /// reaction `r`'s slot `s` pattern.
    pub fn build_over_syntheses(
        backend: &dyn ChemistryBackend,
        syntheses: &[crate::synthesis::Synthesis],
        reactions: &ReactionList,
    ) -> Result<Self> {
        Self::build_with(reactions, |r, s, pattern| {
            syntheses
                .par_iter()
                .enumerate()
                .filter_map(|(i, synth)| {
                    let top = synth.top()?;
                    top.iter()
                        .any(|mol| backend.substructure_match(mol, pattern))
                        .then_some(i as u32)
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|i| (r, s, i))
                .collect()
        })
    }

    fn build_with(
        reactions: &ReactionList,
        matches_for_slot: impl Fn(usize, usize, &crate::backend::Pattern) -> Vec<(usize, usize, u32)>
            + Sync,
    ) -> Result<Self> {
        let slot_jobs: Vec<(usize, usize)> = reactions
            .iter()
            .enumerate()
            .flat_map(|(r, reaction)| (0..reaction.num_reactant_slots()).map(move |s| (r, s)))
            .collect();

        let mut index: Vec<Vec<Vec<u32>>> = reactions
            .iter()
            .map(|reaction| vec![Vec::new(); reaction.num_reactant_slots()])
            .collect();

        let results: Vec<Vec<(usize, usize, u32)>> = slot_jobs
            .into_iter()
            .map(|(r, s)| {
                let pattern = reactions.get(r)?.reactant_pattern(s)?;
                Ok(matches_for_slot(r, s, pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        for hits in results {
            for (r, s, i) in hits {
                index[r][s].push(i);
            }
        }
        // `matches_for_slot` collects from a parallel iterator before
        // converting back to a plain `Vec`, so within one `(r, s)` bucket the
        // order already follows ascending `i` (see `build`/`build_over_syntheses`);
        // sort defensively so determinism never depends on that detail.
        for slots in &mut index {
            for entries in slots {
                entries.sort_unstable();
            }
        }

        Ok(ReactantIndex { index })
    }

    pub fn num_reactions(&self) -> usize {
        self.index.len()
    }

    pub fn num_reactant_slots(&self, reaction: usize) -> Result<usize> {
        self.index
            .get(reaction)
            .map(|slots| slots.len())
            .ok_or(Error::IndexOutOfRange {
                index: reaction,
                len: self.index.len(),
            })
    }

    pub fn molecular_indices(&self, reaction: usize, slot: usize) -> Result<&[u32]> {
        let slots = self
            .index
            .get(reaction)
            .ok_or(Error::IndexOutOfRange {
                index: reaction,
                len: self.index.len(),
            })?;
        slots
            .get(slot)
            .map(Vec::as_slice)
            .ok_or(Error::IndexOutOfRange {
                index: slot,
                len: slots.len(),
            })
    }

    pub fn save(&self, out: &mut impl std::io::Write) -> Result<()> {
        crate::cache::write_jagged_index(out, &self.index)
    }

    pub fn load(input: &mut impl std::io::Read) -> Result<Self> {
        let index = crate::cache::read_jagged_index(input)?;
        Ok(ReactantIndex { index })
    }
}
