//! `ChemicalSpace`: the bundle of building blocks, secondary (single-
//! reaction) syntheses, reactions, and the two reactant indices that back
//! generation.

use log::debug;
use rand::Rng;
use rayon::prelude::*;

use crate::backend::{ChemistryBackend, Molecule};
use crate::building_blocks::BuildingBlockList;
use crate::cache::CacheLayout;
use crate::error::{Error, Result};
use crate::reactant_index::ReactantIndex;
use crate::reactions::ReactionList;
use crate::synthesis::{Synthesis, DEFAULT_MAX_PRODUCTS};

/// The side of [`ChemicalSpace`] a sampled building block came from.
#[derive(Debug, Clone)]
pub enum SampledBlock {
    Primary(Molecule),
    Secondary(Synthesis),
}

impl SampledBlock {
    /// The molecule a caller should push onto a growing [`Synthesis`]: the
    /// molecule itself for a primary block, or the secondary synthesis'
    /// product for a secondary block (an arbitrary representative of its
    /// top `MolSet`, since a secondary block always has exactly one).
    pub fn representative_molecule(&self) -> Option<&Molecule> {
        match self {
            SampledBlock::Primary(mol) => Some(mol),
            SampledBlock::Secondary(synth) => synth.top().and_then(|top| top.iter().next()),
        }
    }
}

/// Bundle of C3 (primary blocks) + secondary blocks + reactions + both
/// reactant indices. Immutable after construction; safe to share across
/// threads via `&`.
#[derive(Debug)]
pub struct ChemicalSpace {
    primary: BuildingBlockList,
    secondary: Vec<Synthesis>,
    reactions: ReactionList,
    primary_index: ReactantIndex,
    secondary_index: ReactantIndex,
}

impl ChemicalSpace {
    /// Builds the full bundle from an already-constructed primary block
    /// list and reaction list: precomputes secondary building blocks (every
    /// single-reactant-slot reaction applied to every primary block) and
    /// both reactant indices.
    pub fn build(
        backend: &dyn ChemistryBackend,
        primary: BuildingBlockList,
        reactions: ReactionList,
    ) -> Result<Self> {
        let secondary = Self::build_secondary_blocks(backend, &primary, &reactions);
        let primary_index = ReactantIndex::build(
            backend,
            &primary.iter().cloned().collect::<Vec<_>>(),
            &reactions,
        )?;
        let secondary_index = ReactantIndex::build_over_syntheses(backend, &secondary, &reactions)?;
        Ok(ChemicalSpace {
            primary,
            secondary,
            reactions,
            primary_index,
            secondary_index,
        })
    }

    /// For every `(block, reaction)` pair where `reaction` has exactly one
    /// reactant slot, builds the single-step synthesis `push(block);
    /// push(reaction)`; failures are silently dropped.
    ///
    /// Parallel over primary blocks via `rayon`, each worker appending to a
    /// private `Vec` that is concatenated at the end — avoids contending on
    /// a single shared-vector lock across workers.
    fn build_secondary_blocks(
        backend: &dyn ChemistryBackend,
        primary: &BuildingBlockList,
        reactions: &ReactionList,
    ) -> Vec<Synthesis> {
        let single_slot_reactions: Vec<_> = reactions
            .iter()
            .filter(|r| r.num_reactant_slots() == 1)
            .cloned()
            .collect();

        primary
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .par_iter()
            .flat_map(|block| {
                single_slot_reactions
                    .iter()
                    .filter_map(|reaction| {
                        let mut synth = Synthesis::new();
                        synth.push_molecule(block);
                        match synth.push_reaction(backend, reaction, DEFAULT_MAX_PRODUCTS) {
                            Ok(()) => Some(synth),
                            Err(_) => None,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn primary(&self) -> &BuildingBlockList {
        &self.primary
    }

    pub fn secondary(&self) -> &[Synthesis] {
        &self.secondary
    }

    pub fn reactions(&self) -> &ReactionList {
        &self.reactions
    }

    pub fn primary_index(&self) -> &ReactantIndex {
        &self.primary_index
    }

    pub fn secondary_index(&self) -> &ReactantIndex {
        &self.secondary_index
    }

    /// Picks uniformly across the flattened space of `|primary| + |secondary|`
    /// items`).
    pub fn random_building_block(&self, rng: &mut impl Rng) -> Result<SampledBlock> {
        let total = self.primary.len() + self.secondary.len();
        if total == 0 {
            return Err(Error::NoAvailableBuildingBlocks);
        }
        let pick = rng.gen_range(0..total);
        if pick < self.primary.len() {
            Ok(SampledBlock::Primary(self.primary.get(pick)?.clone()))
        } else {
            Ok(SampledBlock::Secondary(
                self.secondary[pick - self.primary.len()].clone(),
            ))
        }
    }

    /// Picks uniformly across `primary_index(r, s) ∪ secondary_index(r, s)`
    ///, rng)`): the two
    /// candidate lists are conceptually concatenated and a single index is
    /// drawn.
    pub fn random_building_block_for(
        &self,
        reaction: usize,
        slot: usize,
        rng: &mut impl Rng,
    ) -> Result<SampledBlock> {
        let primary_candidates = self.primary_index.molecular_indices(reaction, slot)?;
        let secondary_candidates = self.secondary_index.molecular_indices(reaction, slot)?;
        let total = primary_candidates.len() + secondary_candidates.len();
        if total == 0 {
            return Err(Error::NoAvailableBuildingBlocks);
        }
        let pick = rng.gen_range(0..total);
        if pick < primary_candidates.len() {
            let idx = primary_candidates[pick] as usize;
            Ok(SampledBlock::Primary(self.primary.get(idx)?.clone()))
        } else {
            let idx = secondary_candidates[pick - primary_candidates.len()] as usize;
            self.secondary
                .get(idx)
                .cloned()
                .map(SampledBlock::Secondary)
                .ok_or(Error::IndexOutOfRange {
                    index: idx,
                    len: self.secondary.len(),
                })
        }
    }

    /// Enumerates all `(r, s)` pairs such that `mol` matches the `s`-th
    /// reactant pattern of reaction `r`.
    pub fn available_reactions(
        &self,
        backend: &dyn ChemistryBackend,
        mol: &Molecule,
    ) -> Result<Vec<(usize, usize)>> {
        let mut out = Vec::new();
        for (r, reaction) in self.reactions.iter().enumerate() {
            for s in 0..reaction.num_reactant_slots() {
                let pattern = reaction.reactant_pattern(s)?;
                if backend.substructure_match(mol, pattern) {
                    out.push((r, s));
                }
            }
        }
        if out.is_empty() {
            debug!("no available reactions for molecule");
        }
        Ok(out)
    }

    /// Persists the five-file cache directory layout.
    pub fn save(&self, backend: &dyn ChemistryBackend, dir: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let layout = CacheLayout::new(dir);

        self.primary.save(backend, &mut crate::cache::create_writer(&layout.primary_building_blocks())?)?;

        let mut secondary_out = crate::cache::create_writer(&layout.secondary_building_blocks())?;
        crate::cache::write_synthesis_list(&mut secondary_out, backend, &self.secondary)?;

        self.reactions.save(backend, &mut crate::cache::create_writer(&layout.reactions())?)?;
        self.primary_index.save(&mut crate::cache::create_writer(&layout.primary_index())?)?;
        self.secondary_index.save(&mut crate::cache::create_writer(&layout.secondary_index())?)?;
        Ok(())
    }

    /// Loads a previously saved cache directory.
    pub fn load(backend: &dyn ChemistryBackend, dir: &std::path::Path) -> Result<Self> {
        let layout = CacheLayout::new(dir);

        let primary = BuildingBlockList::load(
            backend,
            &mut crate::cache::open_reader(&layout.primary_building_blocks())?,
        )?;

        let mut secondary_in = crate::cache::open_reader(&layout.secondary_building_blocks())?;
        let secondary = crate::cache::read_synthesis_list(&mut secondary_in, backend)?;

        let reactions =
            ReactionList::load(backend, &mut crate::cache::open_reader(&layout.reactions())?)?;
        let primary_index = ReactantIndex::load(&mut crate::cache::open_reader(&layout.primary_index())?)?;
        let secondary_index =
            ReactantIndex::load(&mut crate::cache::open_reader(&layout.secondary_index())?)?;

        Ok(ChemicalSpace {
            primary,
            secondary,
            reactions,
            primary_index,
            secondary_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestBackend;
    use crate::building_blocks::PreprocessOptions;

    fn small_space(backend: &TestBackend) -> ChemicalSpace {
        let primary = BuildingBlockList::build(
            backend,
            vec!["xNH2x".into(), "xCOOHx".into(), "xinertx".into()],
            PreprocessOptions::default(),
        )
        .unwrap();
        let reactions =
            ReactionList::build(backend, vec!["NH2.COOH>>X".to_string(), "NH2>>Y".to_string()])
                .unwrap();
        ChemicalSpace::build(backend, primary, reactions).unwrap()
    }

    #[test]
    fn secondary_blocks_cover_every_single_slot_reaction_per_primary_block() {
        let backend = TestBackend::new();
        let space = small_space(&backend);
        // "NH2>>Y" is the only single-slot reaction; it applies to block 0
        // ("xNH2x") but not blocks 1/2, which don't contain "NH2".
        assert_eq!(space.secondary().len(), 1);
        assert_eq!(space.secondary()[0].count_reactions(), 1);
    }

    #[test]
    fn random_building_block_covers_full_combined_space() {
        let backend = TestBackend::new();
        let space = small_space(&backend);
        let mut rng = crate::random::Random::testing();
        let total = space.primary().len() + space.secondary().len();
        let mut seen_primary = 0;
        let mut seen_secondary = 0;
        for _ in 0..1000 {
            match space.random_building_block(&mut rng).unwrap() {
                SampledBlock::Primary(_) => seen_primary += 1,
                SampledBlock::Secondary(_) => seen_secondary += 1,
            }
        }
        assert!(seen_primary > 0);
        assert!(total > 1 && seen_secondary >= 0);
    }

    #[test]
    fn random_building_block_for_errors_when_no_candidates() {
        let backend = TestBackend::new();
        let space = small_space(&backend);
        let mut rng = crate::random::Random::testing();
        // Reaction 0 slot 1 requires "COOH"; only block 1 matches, so this
        // should never error, but an out-of-range reaction index should.
        assert!(space
            .random_building_block_for(0, 1, &mut rng)
            .is_ok());
    }

    #[test]
    fn available_reactions_lists_matching_slots() {
        let backend = TestBackend::new();
        let space = small_space(&backend);
        let mol = backend.parse_smiles("xNH2x").unwrap();
        let available = space.available_reactions(&backend, &mol).unwrap();
        assert!(available.contains(&(0, 0)));
        assert!(available.contains(&(1, 0)));
    }

    #[test]
    fn save_and_load_round_trip() {
        let backend = TestBackend::new();
        let space = small_space(&backend);
        let dir = std::env::temp_dir().join(format!("synform-test-{}", std::process::id()));
        space.save(&backend, &dir).unwrap();
        let loaded = ChemicalSpace::load(&backend, &dir).unwrap();
        assert_eq!(loaded.primary().len(), space.primary().len());
        assert_eq!(loaded.secondary().len(), space.secondary().len());
        assert_eq!(loaded.reactions().len(), space.reactions().len());
        std::fs::remove_dir_all(&dir).ok();
    }
}
