//! Partition the canonical universe into batches, dispatch them to a bounded
//! worker pool, checkpoint each result, and bulk-load into the store.
//!
//! A batch is never re-probed once its checkpoint file exists: restarting the
//! pipeline re-derives the same enumeration order from the cached universe,
//! rescans the checkpoint directory and dispatches only the gaps. Workers
//! write checkpoints in completion order, each atomically, so an interrupted
//! run leaves either a complete checkpoint or nothing. The load phase only
//! runs once every batch file is present.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use rustc_hash::FxHashSet;
use tracing::{error, info, warn};

use crate::{
    arrangement::{self, Arrangement},
    errors::GenerateError,
    files,
    material::Signature,
    probe::{self, ProbeRow, ProberFactory},
    store::Store,
};

/// Tuning knobs for one generation run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Arrangements per checkpointed unit of work.
    pub batch_size: usize,
    /// Bounded number of concurrent probe workers.
    pub workers: usize,
    /// Directory holding the universe cache and per-signature checkpoints.
    pub cache_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig { batch_size: 4096, workers: 8, cache_dir: PathBuf::from("tmp") }
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Copy)]
pub struct GenerateSummary {
    /// Size of the deduplicated canonical universe.
    pub canonical: usize,
    /// Number of batches it was partitioned into.
    pub batches: usize,
    /// Rows in the store after the load phase.
    pub rows: u64,
}

/// The generation pipeline for one prober backend.
///
/// The factory and store are injected explicitly; nothing here is global.
#[derive(Debug)]
pub struct Pipeline<F> {
    factory: F,
    config: PipelineConfig,
}

impl<F: ProberFactory> Pipeline<F> {
    pub fn new(factory: F, config: PipelineConfig) -> Pipeline<F> {
        Pipeline { factory, config }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Generate (or resume generating) the database for one signature and
    /// load it into the store.
    ///
    /// # Errors
    ///
    /// Errors on i/o or storage failure, and with
    /// [`GenerateError::IncompleteBatches`] when some batches failed to
    /// checkpoint; rerunning with identical arguments resumes from the gaps
    /// without re-probing completed work.
    pub fn generate(
        &self,
        signature: &Signature,
        store: &mut Store,
    ) -> Result<GenerateSummary, GenerateError> {
        let universe = arrangement::load_or_enumerate(signature, &self.config.cache_dir)?;
        let checkpoint_dir = self.config.cache_dir.join(signature.name());
        fs::create_dir_all(&checkpoint_dir)?;

        let batches: Vec<&[Arrangement]> = universe.chunks(self.config.batch_size.max(1)).collect();
        let total = batches.len();
        let processed = processed_batches(&checkpoint_dir)?;
        let missing: Vec<(usize, &[Arrangement])> = batches
            .iter()
            .enumerate()
            .filter(|(index, _)| !processed.contains(index))
            .map(|(index, &batch)| (index, batch))
            .collect();

        info!(
            signature = %signature,
            batches = total,
            resumed = total - missing.len(),
            dispatching = missing.len(),
            "starting batch pipeline"
        );

        let cursor = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..self.config.workers.max(1) {
                scope.spawn(|| loop {
                    let next = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(&(index, batch)) = missing.get(next) else {
                        break;
                    };
                    match self.run_batch(signature, index, batch, &checkpoint_dir) {
                        Ok(rows) => {
                            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                            info!(
                                batch = index,
                                rows,
                                progress = format!("{done}/{}", missing.len()),
                                "batch checkpointed"
                            );
                        }
                        Err(err) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            error!(batch = index, %err, "batch failed, left for the next run");
                        }
                    }
                });
            }
        });

        let failed = failed.into_inner();
        if failed > 0 {
            return Err(GenerateError::IncompleteBatches { failed, total });
        }

        self.load(signature, store, &checkpoint_dir, total)?;
        let rows = store.count_rows(signature)?;
        info!(signature = %signature, rows, "database updated");
        Ok(GenerateSummary { canonical: universe.len(), batches: total, rows })
    }

    /// Open readers, probe one batch and checkpoint it atomically.
    fn run_batch(
        &self,
        signature: &Signature,
        index: usize,
        batch: &[Arrangement],
        checkpoint_dir: &Path,
    ) -> Result<usize, GenerateError> {
        let mut prober = self.factory.open()?;
        let rows = probe::probe_batch(&mut prober, signature, batch);
        files::write_json_atomic(&checkpoint_dir.join(format!("{index:04}.json")), &rows)?;
        Ok(rows.len())
    }

    /// Truncate the signature's table and stream every checkpoint into it in
    /// batch-index order. A failing batch insert is retried once, then fatal
    /// for this signature only.
    fn load(
        &self,
        signature: &Signature,
        store: &mut Store,
        checkpoint_dir: &Path,
        total: usize,
    ) -> Result<(), GenerateError> {
        let checkpoints = checkpoint_files(checkpoint_dir)?;
        if checkpoints.len() < total {
            return Err(GenerateError::IncompleteBatches {
                failed: total - checkpoints.len(),
                total,
            });
        }

        store.create_table(signature)?;
        store.clear_table(signature)?;
        for (index, path) in checkpoints {
            let rows: Vec<ProbeRow> = files::read_json(&path)?;
            if let Err(err) = store.insert_batch(signature, &rows) {
                warn!(batch = index, %err, "batch load failed, retrying once");
                store.insert_batch(signature, &rows)?;
            }
        }
        Ok(())
    }
}

/// Batch indices that already have a checkpoint file. The filename is the
/// only signal; `.tmp` leftovers from interrupted writes are ignored.
fn processed_batches(checkpoint_dir: &Path) -> Result<FxHashSet<usize>, GenerateError> {
    Ok(checkpoint_files(checkpoint_dir)?
        .into_iter()
        .map(|(index, _)| index)
        .collect())
}

fn checkpoint_files(checkpoint_dir: &Path) -> Result<Vec<(usize, PathBuf)>, GenerateError> {
    let mut checkpoints = Vec::new();
    for entry in fs::read_dir(checkpoint_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let index = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok());
        if let Some(index) = index {
            checkpoints.push((index, path));
        }
    }
    checkpoints.sort_unstable();
    Ok(checkpoints)
}
