//! A minimal concrete featurizer, demonstrating the [`Featurizer`] contract
//! without depending on any backend-specific fingerprint or pharmacophore
//! function.

use super::{Builder, Featurizer};
use crate::backend::ChemistryBackend;
use crate::error::Result;
use crate::synthesis::Synthesis;

/// Writes two scalar i64 columns derived purely from `Synthesis`
/// observability accessors: `num_reactions` and `num_building_blocks`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReactionCountFeaturizer;

impl Featurizer for ReactionCountFeaturizer {
    fn apply(
        &self,
        _backend: &dyn ChemistryBackend,
        synthesis: &Synthesis,
        builder: &mut dyn Builder,
    ) -> Result<()> {
        builder.write_scalar_i64("num_reactions", synthesis.count_reactions() as i64)?;
        builder.write_scalar_i64(
            "num_building_blocks",
            synthesis.count_building_blocks() as i64,
        )?;
        Ok(())
    }
}
