//! `BuildingBlockList`: an ordered, index-stable collection of building-block
//! molecules.

use log::debug;

use crate::backend::{Annotations, ChemistryBackend, Molecule, BUILDING_BLOCK_INDEX, ORIGINAL_INDEX};
use crate::error::Result;

/// Preprocessing applied once, at construction, to every raw input molecule.
///
/// Molecules for which an enabled step fails are skipped; this is recorded
/// once per construction run (see [`BuildingBlockList::build`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessOptions {
    pub largest_fragment_only: bool,
    pub remove_hydrogens: bool,
}

/// Ordered sequence of building-block molecules.
///
/// Invariant: `get(i).building_block_index() == Some(i as i64)` for every
/// `i < len()`.
#[derive(Debug, Clone)]
pub struct BuildingBlockList {
    options: PreprocessOptions,
    molecules: Vec<Molecule>,
}

impl BuildingBlockList {
    /// Builds the list from a stream of raw SMILES, running the configured
    /// preprocessing pipeline on each and skipping failures. Surviving
    /// molecules keep encounter order; their dense position becomes
    /// `building_block_index`.
    pub fn build(
        backend: &dyn ChemistryBackend,
        raw_smiles: impl IntoIterator<Item = String>,
        options: PreprocessOptions,
    ) -> Result<Self> {
        let mut molecules = Vec::new();
        for (original_index, smiles) in raw_smiles.into_iter().enumerate() {
            let Ok(mol) = backend.parse_smiles(&smiles) else {
                debug!("building block {original_index} failed to parse, skipping");
                continue;
            };
            let Some(mol) = Self::preprocess(backend, mol, options) else {
                debug!("building block {original_index} failed preprocessing, skipping");
                continue;
            };
            let building_block_index = molecules.len() as i64;
            let mol = mol
                .with_annotation(ORIGINAL_INDEX, original_index as i64)
                .with_annotation(BUILDING_BLOCK_INDEX, building_block_index);
            molecules.push(mol);
        }
        Ok(BuildingBlockList { options, molecules })
    }

    fn preprocess(
        backend: &dyn ChemistryBackend,
        mol: Molecule,
        options: PreprocessOptions,
    ) -> Option<Molecule> {
        let mut mol = mol;
        if options.largest_fragment_only {
            mol = backend.sanitize(&mol)?;
        }
        if options.remove_hydrogens {
            mol = backend.sanitize(&mol)?;
        }
        Some(mol)
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Molecule> {
        self.molecules
            .get(index)
            .ok_or(crate::error::Error::IndexOutOfRange {
                index,
                len: self.molecules.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Molecule> {
        self.molecules.iter()
    }

    pub fn options(&self) -> PreprocessOptions {
        self.options
    }

    /// Serializes the header, count, and a backend pickle per molecule.
    pub fn save(&self, backend: &dyn ChemistryBackend, out: &mut impl std::io::Write) -> Result<()> {
        crate::cache::write_header(out, self.options)?;
        crate::cache::write_molecule_list(out, backend, &self.molecules)
    }

    /// Reconstructs a list from a saved stream. Indices are not recomputed:
    /// they were persisted as part of each molecule's annotation dict.
    pub fn load(backend: &dyn ChemistryBackend, input: &mut impl std::io::Read) -> Result<Self> {
        let options = crate::cache::read_header(input)?;
        let molecules = crate::cache::read_molecule_list(input, backend)?;
        Ok(BuildingBlockList { options, molecules })
    }
}
