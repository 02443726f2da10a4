//! `DataPipeline`: a worker pool of producers running the generator and
//! featurizer pipeline into a shared `DataBuffer`, with a consumer-facing
//! batch-read API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::backend::ChemistryBackend;
use crate::buffer::{ColumnRead, DataBuffer};
use crate::chemical_space::ChemicalSpace;
use crate::generator::{SynthesisGenerator, SynthesisGeneratorOptions};

/// Configuration for a [`DataPipeline`]: worker count, the immutable chemical
/// space and generator options shared read-only across workers, the
/// featurizer stages, and the base RNG seed.
pub struct PipelineConfig {
    pub num_workers: usize,
    pub buffer_capacity: usize,
    pub generator_options: SynthesisGeneratorOptions,
    pub base_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            num_workers: 4,
            buffer_capacity: 256,
            generator_options: SynthesisGeneratorOptions::default(),
            base_seed: 0,
        }
    }
}

/// Orchestrates `W` producer threads (each owning a [`SynthesisGenerator`]
/// seeded `base_seed + i`) writing through a shared [`FeaturizerSet`] into a
/// [`DataBuffer`], plus a consumer-facing `get` that reads batches off the
/// buffer. Requires `'static` backend/space/featurizers since worker threads
/// outlive the call that spawns them.
pub struct DataPipeline<B, F> {
    backend: Arc<B>,
    space: Arc<ChemicalSpace>,
    featurizers: Arc<F>,
    config: PipelineConfig,
    buffer: Arc<DataBuffer>,
    stop_flag: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<B, F> DataPipeline<B, F>
where
    B: ChemistryBackend + 'static,
    F: crate::featurizer::Featurizer + 'static,
{
    pub fn new(backend: B, space: ChemicalSpace, featurizers: F, config: PipelineConfig) -> Self {
        let buffer = DataBuffer::new(config.buffer_capacity);
        DataPipeline {
            backend: Arc::new(backend),
            space: Arc::new(space),
            featurizers: Arc::new(featurizers),
            config,
            buffer: Arc::new(buffer),
            stop_flag: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    pub fn buffer(&self) -> &DataBuffer {
        &self.buffer
    }

    /// Spawns `W` worker threads, each running its own
    /// `SynthesisGenerator(seed = base_seed + i)` in a loop:
    /// `syn = generator.next(); txn = buffer.begin_write(); featurizer(syn,
    /// txn); txn.commit()` — a featurizer error drops the transaction (no
    /// commit) and the worker continues.
    pub fn start(&mut self) {
        assert!(self.workers.is_empty(), "pipeline already started");
        self.stop_flag.store(false, Ordering::SeqCst);

        for i in 0..self.config.num_workers {
            let backend = Arc::clone(&self.backend);
            let space = Arc::clone(&self.space);
            let featurizers = Arc::clone(&self.featurizers);
            let buffer = Arc::clone(&self.buffer);
            let stop_flag = Arc::clone(&self.stop_flag);
            let seed = self.config.base_seed + i as u64;
            let options = self.config.generator_options;

            self.workers.push(thread::spawn(move || {
                let mut generator = SynthesisGenerator::new(&space, seed, options);
                while !stop_flag.load(Ordering::SeqCst) {
                    let synthesis = match generator.next(backend.as_ref()) {
                        Ok(synthesis) => synthesis,
                        Err(err) => {
                            warn!("worker {i}: generator error, stopping: {err}");
                            break;
                        }
                    };

                    let mut txn = buffer.begin_write();
                    match featurizers.apply(backend.as_ref(), &synthesis, &mut txn) {
                        Ok(()) => {
                            if txn.commit().is_err() {
                                warn!("worker {i}: commit failed");
                            }
                        }
                        Err(err) => {
                            debug!("worker {i}: featurizer error, dropping transaction: {err}");
                        }
                    }
                }
            }));
        }
    }

    /// Blocks until `n` items are ready and invokes `callback` exactly once
    /// with the per-column read entries; the slots are released on return.
    pub fn get<R>(&self, n: usize, callback: impl FnOnce(&[ColumnRead<'_>]) -> R) -> R {
        self.buffer.begin_read(n, callback)
    }

    /// Requests stop on all workers, clears the buffer to unblock anyone
    /// waiting on the empty semaphore, joins, then clears again to drop any
    /// late commits. Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.buffer.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.buffer.clear();
    }
}

impl<B, F> Drop for DataPipeline<B, F> {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.buffer.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestBackend;
    use crate::building_blocks::{BuildingBlockList, PreprocessOptions};
    use crate::featurizer::demo::ReactionCountFeaturizer;
    use crate::reactions::ReactionList;

    fn demo_space(backend: &TestBackend) -> ChemicalSpace {
        let primary = BuildingBlockList::build(
            backend,
            vec!["xAx".into(), "xBx".into()],
            PreprocessOptions::default(),
        )
        .unwrap();
        let reactions = ReactionList::build(backend, vec!["A.B>>AB".to_string()]).unwrap();
        ChemicalSpace::build(backend, primary, reactions).unwrap()
    }

    #[test]
    fn pipeline_produces_readable_batches_then_stops_cleanly() {
        let backend = TestBackend::new();
        let space = demo_space(&backend);
        let config = PipelineConfig {
            num_workers: 2,
            buffer_capacity: 8,
            ..PipelineConfig::default()
        };
        let mut pipeline = DataPipeline::new(backend, space, ReactionCountFeaturizer, config);
        pipeline.start();

        pipeline.get(4, |reads| {
            assert!(reads.iter().any(|r| r.name == "num_reactions"));
            assert!(reads.iter().any(|r| r.name == "num_building_blocks"));
        });

        pipeline.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let backend = TestBackend::new();
        let space = demo_space(&backend);
        let config = PipelineConfig {
            num_workers: 1,
            buffer_capacity: 4,
            ..PipelineConfig::default()
        };
        let mut pipeline = DataPipeline::new(backend, space, ReactionCountFeaturizer, config);
        pipeline.start();
        pipeline.stop();
        pipeline.stop();
    }
}
