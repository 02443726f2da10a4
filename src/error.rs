//! The closed, programmatically matched error surface shared by every
//! fallible operation in this crate.

use thiserror::Error;

/// Every way the public API of this crate can fail.
///
/// The four "recoverable" variants ([`Error::PushReaction`],
/// [`Error::NoAvailableBuildingBlocks`], [`Error::NoAvailableReactions`], and
/// construction failures surfaced as [`Error::Molecule`]/[`Error::Reaction`])
/// are expected during normal operation of a [`crate::generator::SynthesisGenerator`]
/// and are logged at debug level rather than treated as exceptional.
#[derive(Debug, Error)]
pub enum Error {
    /// A [`crate::synthesis::Synthesis::push_reaction`] call could not produce
    /// at least one sanitized product.
    #[error("reaction could not be applied: {0}")]
    PushReaction(String),

    /// [`crate::chemical_space::ChemicalSpace::random_building_block_for`]
    /// found no building block (primary or secondary) compatible with the
    /// requested reactant slot.
    #[error("no building block available for the requested reactant slot")]
    NoAvailableBuildingBlocks,

    /// [`crate::chemical_space::ChemicalSpace::available_reactions`] returned
    /// no `(reaction, slot)` pairs for a molecule.
    #[error("no reaction available for the given molecule")]
    NoAvailableReactions,

    /// A molecule failed to parse or sanitize.
    #[error("molecule error: {0}")]
    Molecule(String),

    /// A reaction failed to parse or initialize its substructure matchers.
    #[error("reaction error: {0}")]
    Reaction(String),

    /// An index was out of the valid range for the collection it addresses.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Cache load/save failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk cache was structurally malformed (bad magic, truncated
    /// record, inconsistent counts).
    #[error("corrupt cache: {0}")]
    CorruptCache(String),
}

pub type Result<T> = std::result::Result<T, Error>;
