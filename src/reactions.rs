//! `ReactionList`: an ordered, index-stable collection of reaction templates
//! with initialized substructure matchers.

use log::debug;

use crate::backend::{ChemistryBackend, Reaction, REACTION_INDEX};
use crate::error::Result;

/// Ordered sequence of reactions.
///
/// Invariant: `get(i).reaction_index() == Some(i as i64)` for every
/// `i < len()`.
#[derive(Debug, Clone)]
pub struct ReactionList {
    reactions: Vec<Reaction>,
}

impl ReactionList {
    /// Builds the list from one SMARTS string per raw reaction. A reaction
    /// that fails to parse is skipped; surviving reactions keep encounter
    /// order and are stamped with their dense `reaction_index`.
    pub fn build(
        backend: &dyn ChemistryBackend,
        raw_smarts: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let mut reactions = Vec::new();
        for (position, smarts) in raw_smarts.into_iter().enumerate() {
            let Ok(reaction) = backend.parse_reaction_smarts(&smarts) else {
                debug!("reaction at line {position} failed to initialize, skipping");
                continue;
            };
            let index = reactions.len() as i64;
            reactions.push(reaction.with_annotation(REACTION_INDEX, index));
        }
        Ok(ReactionList { reactions })
    }

    /// Parses `text`, treating each non-empty line as one reaction SMARTS
    /// string.
    pub fn from_text(backend: &dyn ChemistryBackend, text: &str) -> Result<Self> {
        Self::build(
            backend,
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        )
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Reaction> {
        self.reactions
            .get(index)
            .ok_or(crate::error::Error::IndexOutOfRange {
                index,
                len: self.reactions.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    pub fn save(&self, backend: &dyn ChemistryBackend, out: &mut impl std::io::Write) -> Result<()> {
        crate::cache::write_reaction_list(out, backend, &self.reactions)
    }

    pub fn load(backend: &dyn ChemistryBackend, input: &mut impl std::io::Read) -> Result<Self> {
        let reactions = crate::cache::read_reaction_list(input, backend)?;
        Ok(ReactionList { reactions })
    }
}
