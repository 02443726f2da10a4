//! Binary persistence for the chemical-space cache directory.
//!
//! This module implements only the structural framing: little-endian
//! integer framing, length-prefixed opaque backend blobs, and the
//! five-file directory layout. No claim is made about
//! cross-version compatibility of the blobs themselves — those are owned by
//! whichever [`crate::backend::ChemistryBackend`] produced them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::backend::{ChemistryBackend, Molecule, Reaction};
use crate::building_blocks::{BuildingBlockList, PreprocessOptions};
use crate::error::{Error, Result};
use crate::reactions::ReactionList;

const MAGIC: u32 = 0x5359_4e46; // "SYNF"
const VERSION: u32 = 1;

const FLAG_LARGEST_FRAGMENT_ONLY: u8 = 0b01;
const FLAG_REMOVE_HYDROGENS: u8 = 0b10;

pub(crate) fn write_header(out: &mut impl Write, options: PreprocessOptions) -> Result<()> {
    let mut flags = 0u8;
    if options.largest_fragment_only {
        flags |= FLAG_LARGEST_FRAGMENT_ONLY;
    }
    if options.remove_hydrogens {
        flags |= FLAG_REMOVE_HYDROGENS;
    }
    write_raw_header(out, flags)
}

fn write_raw_header(out: &mut impl Write, flags: u8) -> Result<()> {
    out.write_all(&MAGIC.to_le_bytes())?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&[flags])?;
    Ok(())
}

pub(crate) fn read_header(input: &mut impl Read) -> Result<PreprocessOptions> {
    let flags = read_raw_header(input)?;
    Ok(PreprocessOptions {
        largest_fragment_only: flags & FLAG_LARGEST_FRAGMENT_ONLY != 0,
        remove_hydrogens: flags & FLAG_REMOVE_HYDROGENS != 0,
    })
}

fn read_raw_header(input: &mut impl Read) -> Result<u8> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if u32::from_le_bytes(magic) != MAGIC {
        return Err(Error::CorruptCache("bad magic".into()));
    }
    let mut version = [0u8; 4];
    input.read_exact(&mut version)?;
    if u32::from_le_bytes(version) != VERSION {
        return Err(Error::CorruptCache(format!(
            "unsupported version {}",
            u32::from_le_bytes(version)
        )));
    }
    let mut flags = [0u8; 1];
    input.read_exact(&mut flags)?;
    Ok(flags[0])
}

fn write_blob(out: &mut impl Write, bytes: &[u8]) -> Result<()> {
    out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    out.write_all(bytes)?;
    Ok(())
}

fn read_blob(input: &mut impl Read) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    input.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn write_molecule_list(
    out: &mut impl Write,
    backend: &dyn ChemistryBackend,
    molecules: &[Molecule],
) -> Result<()> {
    out.write_all(&(molecules.len() as u64).to_le_bytes())?;
    for mol in molecules {
        write_blob(out, &backend.pickle_molecule(mol))?;
    }
    Ok(())
}

pub(crate) fn read_molecule_list(
    input: &mut impl Read,
    backend: &dyn ChemistryBackend,
) -> Result<Vec<Molecule>> {
    let mut count = [0u8; 8];
    input.read_exact(&mut count)?;
    let count = u64::from_le_bytes(count);
    let mut molecules = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let blob = read_blob(input)?;
        molecules.push(backend.unpickle_molecule(&blob)?);
    }
    Ok(molecules)
}

pub(crate) fn write_reaction_list(
    out: &mut impl Write,
    backend: &dyn ChemistryBackend,
    reactions: &[Reaction],
) -> Result<()> {
    write_raw_header(out, 0)?;
    out.write_all(&(reactions.len() as u64).to_le_bytes())?;
    for reaction in reactions {
        write_blob(out, &backend.pickle_reaction(reaction))?;
    }
    Ok(())
}

pub(crate) fn read_reaction_list(
    input: &mut impl Read,
    backend: &dyn ChemistryBackend,
) -> Result<Vec<Reaction>> {
    read_raw_header(input)?;
    let mut count = [0u8; 8];
    input.read_exact(&mut count)?;
    let count = u64::from_le_bytes(count);
    let mut reactions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let blob = read_blob(input)?;
        reactions.push(backend.unpickle_reaction(&blob)?);
    }
    Ok(reactions)
}

/// Writes a three-level jagged table `index[r][s] = [m0, m1, ...]` as a flat
/// binary pickle.
pub(crate) fn write_jagged_index(out: &mut impl Write, index: &[Vec<Vec<u32>>]) -> Result<()> {
    write_raw_header(out, 0)?;
    out.write_all(&(index.len() as u64).to_le_bytes())?;
    for slots in index {
        out.write_all(&(slots.len() as u64).to_le_bytes())?;
        for entries in slots {
            out.write_all(&(entries.len() as u64).to_le_bytes())?;
            for &m in entries {
                out.write_all(&(m as u64).to_le_bytes())?;
            }
        }
    }
    Ok(())
}

pub(crate) fn read_jagged_index(input: &mut impl Read) -> Result<Vec<Vec<Vec<u32>>>> {
    read_raw_header(input)?;
    let num_reactions = read_u64(input)? as usize;
    let mut index = Vec::with_capacity(num_reactions);
    for _ in 0..num_reactions {
        let num_slots = read_u64(input)? as usize;
        let mut slots = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            let num_entries = read_u64(input)? as usize;
            let mut entries = Vec::with_capacity(num_entries);
            for _ in 0..num_entries {
                entries.push(read_u64(input)? as u32);
            }
            slots.push(entries);
        }
        index.push(slots);
    }
    Ok(index)
}

fn read_u64(input: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// The five children of a `ChemicalSpace` cache directory.
pub struct CacheLayout<'a> {
    pub dir: &'a Path,
}

impl<'a> CacheLayout<'a> {
    pub fn new(dir: &'a Path) -> Self {
        CacheLayout { dir }
    }

    pub fn primary_building_blocks(&self) -> std::path::PathBuf {
        self.dir.join("primary_building_blocks")
    }

    pub fn secondary_building_blocks(&self) -> std::path::PathBuf {
        self.dir.join("secondary_building_blocks")
    }

    pub fn reactions(&self) -> std::path::PathBuf {
        self.dir.join("reactions")
    }

    pub fn primary_index(&self) -> std::path::PathBuf {
        self.dir.join("primary_index")
    }

    pub fn secondary_index(&self) -> std::path::PathBuf {
        self.dir.join("secondary_index")
    }
}

pub(crate) fn open_reader(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

pub(crate) fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Also persists a pickled [`crate::synthesis::Synthesis`] list for the
/// secondary building blocks file, used by [`crate::chemical_space::ChemicalSpace`].
pub(crate) fn write_synthesis_list(
    out: &mut impl Write,
    backend: &dyn ChemistryBackend,
    syntheses: &[crate::synthesis::Synthesis],
) -> Result<()> {
    out.write_all(&(syntheses.len() as u64).to_le_bytes())?;
    for synthesis in syntheses {
        write_blob(out, &synthesis.pickle(backend))?;
    }
    Ok(())
}

pub(crate) fn read_synthesis_list(
    input: &mut impl Read,
    backend: &dyn ChemistryBackend,
) -> Result<Vec<crate::synthesis::Synthesis>> {
    let count = read_u64_no_header(input)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let blob = read_blob(input)?;
        out.push(crate::synthesis::Synthesis::unpickle(&blob, backend)?);
    }
    Ok(out)
}

fn read_u64_no_header(input: &mut impl Read) -> Result<u64> {
    read_u64(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let options = PreprocessOptions {
            largest_fragment_only: true,
            remove_hydrogens: false,
        };
        let mut buf = Vec::new();
        write_header(&mut buf, options).unwrap();
        let read = read_header(&mut buf.as_slice()).unwrap();
        assert_eq!(read.largest_fragment_only, true);
        assert_eq!(read.remove_hydrogens, false);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = vec![0u8; 16];
        assert!(matches!(
            read_header(&mut buf.as_slice()),
            Err(Error::CorruptCache(_))
        ));
    }

    #[test]
    fn jagged_index_round_trips() {
        let index = vec![vec![vec![1, 2, 3], vec![]], vec![vec![4]]];
        let mut buf = Vec::new();
        write_jagged_index(&mut buf, &index).unwrap();
        let read = read_jagged_index(&mut buf.as_slice()).unwrap();
        assert_eq!(read, index);
    }
}
