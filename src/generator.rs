//! `SynthesisGenerator`: a bounded random walk that grows syntheses by
//! chaining reactions.

use log::debug;
use rand::Rng;

use crate::backend::ChemistryBackend;
use crate::chemical_space::ChemicalSpace;
use crate::error::{Error, Result};
use crate::random::Random;
use crate::synthesis::{Synthesis, DEFAULT_MAX_PRODUCTS};

/// Default cutoffs: a synthesis this large is handed back and the
/// generator moves on to a fresh one.
pub const DEFAULT_NUM_REACTIONS_CUTOFF: usize = 5;
pub const DEFAULT_NUM_PRODUCT_ATOMS_CUTOFF: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct SynthesisGeneratorOptions {
    pub num_reactions_cutoff: usize,
    pub num_product_atoms_cutoff: usize,
    pub max_products_per_reaction: usize,
}

impl Default for SynthesisGeneratorOptions {
    fn default() -> Self {
        SynthesisGeneratorOptions {
            num_reactions_cutoff: DEFAULT_NUM_REACTIONS_CUTOFF,
            num_product_atoms_cutoff: DEFAULT_NUM_PRODUCT_ATOMS_CUTOFF,
            max_products_per_reaction: DEFAULT_MAX_PRODUCTS,
        }
    }
}

/// Distinguishes a clean single-step success from a recoverable dead end or
/// an unexpected (fatal) error, replacing the source's exception-based
/// control flow.
enum StepOutcome {
    Grew,
    DeadEnd,
    Fatal(Error),
}

/// Single-threaded bounded random walk over a [`ChemicalSpace`].
///
/// Not `Send`-shared: parallelism comes from each [`crate::pipeline::DataPipeline`]
/// worker owning one generator with a distinct seed.
pub struct SynthesisGenerator<'space> {
    space: &'space ChemicalSpace,
    current: Synthesis,
    rng: Random,
    options: SynthesisGeneratorOptions,
}

impl<'space> SynthesisGenerator<'space> {
    pub fn new(space: &'space ChemicalSpace, seed: u64, options: SynthesisGeneratorOptions) -> Self {
        SynthesisGenerator {
            space,
            current: Synthesis::new(),
            rng: Random::seeded(seed),
            options,
        }
    }

    /// Produces the next synthesis snapshot. The returned value always
    /// satisfies `stack_size() == 1`.
    pub fn next(&mut self, backend: &dyn ChemistryBackend) -> Result<Synthesis> {
        loop {
            if self.current.stack_size() == 0 {
                match self.seed_fresh_block(backend) {
                    Ok(()) => return self.finish_step(backend),
                    Err(Error::NoAvailableBuildingBlocks) => {
                        debug!("dead end: chemical space has no building block to seed with");
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            match self.try_grow(backend) {
                StepOutcome::Grew => return self.finish_step(backend),
                StepOutcome::DeadEnd => {
                    self.current = Synthesis::new();
                    continue;
                }
                StepOutcome::Fatal(err) => return Err(err),
            }
        }
    }

    /// Samples a fresh primary/secondary building block and pushes it onto
    /// (necessarily empty) `self.current`.
    fn seed_fresh_block(&mut self, _backend: &dyn ChemistryBackend) -> Result<()> {
        let block = self.space.random_building_block(&mut self.rng)?;
        push_sampled_block(&mut self.current, &block);
        Ok(())
    }

    /// One chaining attempt: pick a molecule from
    /// the current top frame, an available `(reaction, slot)` for it, fill
    /// the reaction's other slots, and push the reaction.
    ///
    /// Slot-filling pushes mutate `self.current` directly and are *not*
    /// rolled back if a later slot or the final reaction push fails — only
    /// the caller (`next`) resets the whole synthesis on `DeadEnd`.
    fn try_grow(&mut self, backend: &dyn ChemistryBackend) -> StepOutcome {
        let top = match self.current.top() {
            Some(top) if !top.is_empty() => top,
            _ => return StepOutcome::DeadEnd,
        };
        let molecules: Vec<_> = top.iter().cloned().collect();
        let chosen_molecule = &molecules[self.rng.gen_range(0..molecules.len())];

        let available = match self.space.available_reactions(backend, chosen_molecule) {
            Ok(pairs) => pairs,
            Err(err) => return StepOutcome::Fatal(err),
        };
        if available.is_empty() {
            debug!("dead end: no available reactions for sampled molecule");
            return StepOutcome::DeadEnd;
        }

        let (r, chosen_slot) = available[self.rng.gen_range(0..available.len())];
        let reaction = match self.space.reactions().get(r) {
            Ok(reaction) => reaction.clone(),
            Err(err) => return StepOutcome::Fatal(err),
        };

        for slot in 0..reaction.num_reactant_slots() {
            if slot == chosen_slot {
                continue;
            }
            match self.space.random_building_block_for(r, slot, &mut self.rng) {
                Ok(block) => push_sampled_block(&mut self.current, &block),
                Err(Error::NoAvailableBuildingBlocks) => {
                    debug!("dead end: no building block for reaction {r} slot {slot}");
                    return StepOutcome::DeadEnd;
                }
                Err(err) => return StepOutcome::Fatal(err),
            }
        }

        match self.current.push_reaction(
            backend,
            &reaction,
            self.options.max_products_per_reaction,
        ) {
            Ok(()) => StepOutcome::Grew,
            Err(Error::PushReaction(reason)) => {
                debug!("dead end: reaction {r} failed to apply ({reason})");
                StepOutcome::DeadEnd
            }
            Err(err) => StepOutcome::Fatal(err),
        }
    }

    /// Takes the snapshot to return (step 4), then applies the reaction-count
    /// and heavy-atom cutoffs (step 5) to `self.current` so the *next* call
    /// starts fresh — the already-taken snapshot is unaffected.
    fn finish_step(&mut self, backend: &dyn ChemistryBackend) -> Result<Synthesis> {
        let snapshot = self.current.clone();
        debug_assert_eq!(snapshot.stack_size(), 1, "generator invariant violated");

        let exceeds_reactions = snapshot.count_reactions() >= self.options.num_reactions_cutoff;
        let exceeds_atoms = snapshot
            .top()
            .map(|top| {
                top.iter()
                    .map(|mol| backend.num_heavy_atoms(mol))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            >= self.options.num_product_atoms_cutoff;

        if exceeds_reactions || exceeds_atoms {
            self.current = Synthesis::new();
        }
        Ok(snapshot)
    }

    pub fn options(&self) -> SynthesisGeneratorOptions {
        self.options
    }
}

fn push_sampled_block(synthesis: &mut Synthesis, block: &crate::chemical_space::SampledBlock) {
    match block {
        crate::chemical_space::SampledBlock::Primary(mol) => synthesis.push_molecule(mol),
        crate::chemical_space::SampledBlock::Secondary(sub) => synthesis.push_synthesis(sub.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestBackend;
    use crate::building_blocks::{BuildingBlockList, PreprocessOptions};
    use crate::reactions::ReactionList;

    fn space_with_chain(backend: &TestBackend) -> ChemicalSpace {
        let primary = BuildingBlockList::build(
            backend,
            vec!["xAx".into(), "xBx".into()],
            PreprocessOptions::default(),
        )
        .unwrap();
        let reactions = ReactionList::build(&backend, vec!["A.B>>AB".to_string()]).unwrap();
        ChemicalSpace::build(backend, primary, reactions).unwrap()
    }

    #[test]
    fn next_always_returns_single_frame_stack() {
        let backend = TestBackend::new();
        let space = space_with_chain(&backend);
        let mut gen = SynthesisGenerator::new(&space, 42, SynthesisGeneratorOptions::default());
        for _ in 0..200 {
            let synth = gen.next(&backend).unwrap();
            assert_eq!(synth.stack_size(), 1);
        }
    }

    #[test]
    fn cutoff_is_never_exceeded_across_many_calls() {
        let backend = TestBackend::new();
        let space = space_with_chain(&backend);
        let options = SynthesisGeneratorOptions {
            num_reactions_cutoff: 3,
            ..Default::default()
        };
        let mut gen = SynthesisGenerator::new(&space, 7, options);
        for _ in 0..1000 {
            let synth = gen.next(&backend).unwrap();
            assert!(synth.count_reactions() < 3);
            assert_eq!(synth.stack_size(), 1);
        }
    }

    #[test]
    fn different_seeds_produce_different_walks() {
        let backend = TestBackend::new();
        let space = space_with_chain(&backend);
        let mut a = SynthesisGenerator::new(&space, 1, SynthesisGeneratorOptions::default());
        let mut b = SynthesisGenerator::new(&space, 2, SynthesisGeneratorOptions::default());
        let seq_a: Vec<_> = (0..20).map(|_| a.next(&backend).unwrap().count_reactions()).collect();
        let seq_b: Vec<_> = (0..20).map(|_| b.next(&backend).unwrap().count_reactions()).collect();
        assert_ne!(seq_a, seq_b);
    }

    /// Demonstrates the no-rollback contract directly at
    /// the `Synthesis` level: slot-filling pushes that happen before a
    /// reaction push fails are not rolled back by that failure — only an
    /// explicit reset (here, replacing the whole value) clears them. The
    /// generator's `try_grow`/`next` rely on exactly this property.
    #[test]
    fn partial_pushes_are_visible_until_outer_reset() {
        let backend = TestBackend::new();
        let a = backend.parse_smiles("xAx").unwrap();
        let mismatched = backend.parse_smiles("xZx").unwrap();
        let reaction = backend.parse_reaction_smarts("A.B>>AB").unwrap();

        let mut synth = Synthesis::new();
        synth.push_molecule(&a);
        synth.push_molecule(&mismatched);
        assert_eq!(synth.stack_size(), 2);

        let err = synth
            .push_reaction(&backend, &reaction, DEFAULT_MAX_PRODUCTS)
            .unwrap_err();
        assert!(matches!(err, Error::PushReaction(_)));
        // The two slot-filling pushes are still on the stack: push_reaction
        // only pops on success.
        assert_eq!(synth.stack_size(), 2);

        // Only an explicit reset clears them, mirroring the generator's
        // outer-handler reset.
        synth = Synthesis::new();
        assert_eq!(synth.stack_size(), 0);
    }
}
