//! Featurizer pipeline: turns a [`Synthesis`] into named typed tensors
//! written through a [`Builder`].

pub mod demo;

use crate::backend::ChemistryBackend;
use crate::dtype::Shape;
use crate::error::{Error, Result};
use crate::synthesis::Synthesis;

/// Sink a [`Featurizer`] writes named values into. Implemented by
/// [`crate::buffer::WriteTransaction`] in the pipeline, and by
/// [`RecordingBuilder`] in tests.
///
/// Shapes are fixed by configuration, not by the data: a featurizer pads or
/// truncates to its configured maxima so every call to the same featurizer
/// on the same builder writes the same shape for a given name.
pub trait Builder {
    fn write_i64(&mut self, name: &'static str, shape: Shape, values: &[i64]) -> Result<()>;
    fn write_f32(&mut self, name: &'static str, shape: Shape, values: &[f32]) -> Result<()>;
    fn write_bool(&mut self, name: &'static str, shape: Shape, values: &[bool]) -> Result<()>;

    fn write_scalar_i64(&mut self, name: &'static str, value: i64) -> Result<()> {
        self.write_i64(name, Shape::scalar(), &[value])
    }

    fn write_scalar_f32(&mut self, name: &'static str, value: f32) -> Result<()> {
        self.write_f32(name, Shape::scalar(), &[value])
    }

    fn write_scalar_bool(&mut self, name: &'static str, value: bool) -> Result<()> {
        self.write_bool(name, Shape::scalar(), &[value])
    }
}

/// A single stage of the pipeline. Implementations read whatever they need
/// from `synthesis` (and, via `backend`, fingerprints/pharmacophores not
/// exposed on `Synthesis` directly) and write their named outputs.
pub trait Featurizer: Send + Sync {
    fn apply(
        &self,
        backend: &dyn ChemistryBackend,
        synthesis: &Synthesis,
        builder: &mut dyn Builder,
    ) -> Result<()>;
}

/// Ordered list of featurizers run against the same builder in sequence.
#[derive(Default)]
pub struct FeaturizerSet {
    stages: Vec<Box<dyn Featurizer>>,
}

impl FeaturizerSet {
    pub fn new() -> Self {
        FeaturizerSet { stages: Vec::new() }
    }

    pub fn push(&mut self, featurizer: Box<dyn Featurizer>) -> &mut Self {
        self.stages.push(featurizer);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Featurizer for FeaturizerSet {
    fn apply(
        &self,
        backend: &dyn ChemistryBackend,
        synthesis: &Synthesis,
        builder: &mut dyn Builder,
    ) -> Result<()> {
        for stage in &self.stages {
            stage.apply(backend, synthesis, builder)?;
        }
        Ok(())
    }
}

/// An in-memory [`Builder`] that records every write, for use outside a
/// real [`crate::buffer::DataBuffer`] (unit tests, inline examples).
///
/// Enforces the "repeated names within one transaction are a logic error"
/// rule by erroring on a duplicate name rather than silently
/// overwriting.
#[derive(Debug, Clone)]
pub struct RecordingBuilder {
    pub entries: Vec<RecordedValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedBytes {
    I64(Vec<i64>),
    F32(Vec<f32>),
    Bool(Vec<bool>),
}

#[derive(Debug, Clone)]
pub struct RecordedValue {
    pub name: &'static str,
    pub shape: Shape,
    pub values: RecordedBytes,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        RecordingBuilder { entries: Vec::new() }
    }

    fn check_fresh(&self, name: &'static str) -> Result<()> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(Error::PushReaction(format!(
                "featurizer wrote column {name:?} twice in one transaction"
            )));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RecordedValue> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder for RecordingBuilder {
    fn write_i64(&mut self, name: &'static str, shape: Shape, values: &[i64]) -> Result<()> {
        self.check_fresh(name)?;
        self.entries.push(RecordedValue {
            name,
            shape,
            values: RecordedBytes::I64(values.to_vec()),
        });
        Ok(())
    }

    fn write_f32(&mut self, name: &'static str, shape: Shape, values: &[f32]) -> Result<()> {
        self.check_fresh(name)?;
        self.entries.push(RecordedValue {
            name,
            shape,
            values: RecordedBytes::F32(values.to_vec()),
        });
        Ok(())
    }

    fn write_bool(&mut self, name: &'static str, shape: Shape, values: &[bool]) -> Result<()> {
        self.check_fresh(name)?;
        self.entries.push(RecordedValue {
            name,
            shape,
            values: RecordedBytes::Bool(values.to_vec()),
        });
        Ok(())
    }
}
