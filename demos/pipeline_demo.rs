//! End-to-end walkthrough: a toy backend, a small chemical space, and a
//! pipeline of workers streaming featurized batches to a single consumer.
//!
//! Run with `cargo run --example pipeline_demo`.

use synform::backend::{Annotations, ChemistryBackend, Molecule, Pattern, Reaction};
use synform::building_blocks::{BuildingBlockList, PreprocessOptions};
use synform::chemical_space::ChemicalSpace;
use synform::featurizer::demo::ReactionCountFeaturizer;
use synform::pipeline::{DataPipeline, PipelineConfig};
use synform::reactions::ReactionList;
use synform::{Error, Result};

/// A toy backend where a "molecule" is just a tag string and a "reaction"
/// `"A.B>>AB"` matches reactants by substring containment. Good enough to
/// exercise every core operation without a real cheminformatics dependency.
#[derive(Debug, Clone)]
struct ToyMol(String);

#[derive(Debug, Clone)]
struct ToyReaction {
    reactant_tags: Vec<String>,
}

#[derive(Debug, Default)]
struct ToyBackend;

impl ChemistryBackend for ToyBackend {
    fn parse_smiles(&self, smiles: &str) -> Result<Molecule> {
        Ok(Molecule::new(
            Box::new(ToyMol(smiles.to_string())),
            Annotations::new(),
        ))
    }

    fn parse_reaction_smarts(&self, smarts: &str) -> Result<Reaction> {
        let (lhs, _rhs) = smarts
            .split_once(">>")
            .ok_or_else(|| Error::Reaction(format!("malformed reaction: {smarts:?}")))?;
        let tags: Vec<String> = lhs.split('.').map(str::to_string).collect();
        let patterns: Vec<Pattern> = tags.iter().map(|tag| Pattern::new(tag.clone())).collect();
        Ok(Reaction::new(
            Box::new(ToyReaction { reactant_tags: tags }),
            patterns,
            1,
            Annotations::new(),
        ))
    }

    fn sanitize(&self, mol: &Molecule) -> Option<Molecule> {
        Some(mol.clone())
    }

    fn substructure_match(&self, mol: &Molecule, pattern: &Pattern) -> bool {
        let tag: &str = pattern.payload().as_any().downcast_ref::<String>().unwrap();
        mol.payload()
            .as_any()
            .downcast_ref::<ToyMol>()
            .map(|m| m.0.contains(tag))
            .unwrap_or(false)
    }

    fn apply_reaction(&self, reaction: &Reaction, reactants: &[Molecule]) -> Vec<Vec<Molecule>> {
        let combined = reactants
            .iter()
            .filter_map(|m| m.payload().as_any().downcast_ref::<ToyMol>().map(|m| m.0.clone()))
            .collect::<Vec<_>>()
            .join("");
        let _ = reaction;
        vec![vec![Molecule::new(Box::new(ToyMol(combined)), Annotations::new())]]
    }

    fn num_heavy_atoms(&self, mol: &Molecule) -> usize {
        mol.payload()
            .as_any()
            .downcast_ref::<ToyMol>()
            .map(|m| m.0.len())
            .unwrap_or(0)
    }

    fn pickle_molecule(&self, mol: &Molecule) -> Vec<u8> {
        mol.payload()
            .as_any()
            .downcast_ref::<ToyMol>()
            .unwrap()
            .0
            .clone()
            .into_bytes()
    }

    fn unpickle_molecule(&self, bytes: &[u8]) -> Result<Molecule> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Molecule(e.to_string()))?;
        Ok(Molecule::new(Box::new(ToyMol(text)), Annotations::new()))
    }

    fn pickle_reaction(&self, reaction: &Reaction) -> Vec<u8> {
        reaction
            .payload()
            .as_any()
            .downcast_ref::<ToyReaction>()
            .unwrap()
            .reactant_tags
            .join(".")
            .into_bytes()
    }

    fn unpickle_reaction(&self, bytes: &[u8]) -> Result<Reaction> {
        let lhs = String::from_utf8(bytes.to_vec()).map_err(|e| Error::Reaction(e.to_string()))?;
        self.parse_reaction_smarts(&format!("{lhs}>>product"))
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let backend = ToyBackend;
    let primary = BuildingBlockList::build(
        &backend,
        vec!["NH2-fragment".into(), "COOH-fragment".into()],
        PreprocessOptions::default(),
    )?;
    let reactions = ReactionList::build(&backend, vec!["NH2.COOH>>amide".to_string()])?;
    let space = ChemicalSpace::build(&backend, primary, reactions)?;

    let config = PipelineConfig {
        num_workers: 2,
        buffer_capacity: 32,
        ..PipelineConfig::default()
    };
    let mut pipeline = DataPipeline::new(backend, space, ReactionCountFeaturizer, config);
    pipeline.start();

    for batch in 0..3 {
        pipeline.get(4, |reads| {
            println!("batch {batch}: {} columns ready", reads.len());
            for read in reads {
                println!("  {} ({:?}, {:?})", read.name, read.dtype, read.shape.dims());
            }
        });
    }

    pipeline.stop();
    Ok(())
}
