//! Synthetic-chemistry synthesis generator and training-data pipeline.
//!
//! The crate is chemistry-agnostic: all structure-aware work (SMILES/SMARTS
//! parsing, substructure matching, reaction application) is delegated to a
//! [`backend::ChemistryBackend`] implementation supplied by the caller. What
//! lives here is the synthesis evaluator, the chemical-space index, the
//! random synthesis generator, the featurizer pipeline, and the
//! fixed-capacity ring buffer that feeds a worker pool's output to a
//! consumer.

pub mod backend;
pub mod building_blocks;
pub mod buffer;
pub mod cache;
pub mod chemical_space;
pub mod dtype;
pub mod error;
pub mod featurizer;
pub mod generator;
pub mod pipeline;
pub mod postfix;
pub mod random;
pub mod reactant_index;
pub mod reactions;
pub mod semaphore;
pub mod synthesis;

pub use backend::{ChemistryBackend, Molecule, Pattern, Reaction};
pub use chemical_space::{ChemicalSpace, SampledBlock};
pub use error::{Error, Result};
pub use generator::{SynthesisGenerator, SynthesisGeneratorOptions};
pub use pipeline::{DataPipeline, PipelineConfig};
pub use random::Random;
pub use synthesis::Synthesis;
