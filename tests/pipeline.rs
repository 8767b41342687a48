//! End-to-end pipeline tests with a deterministic fake prober: generation,
//! crash-resume, load idempotence, and the sampler round trip.

use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use rand::{rngs::StdRng, SeedableRng};
use shakmaty::{Chess, Color, Position};

use endgame_db::{
    arrangement, DistanceProber, Distances, FilterCriteria, GenerateError, Pipeline,
    PipelineConfig, ProbeError, ProbeRow, ProberFactory, Sampler, Signature, Store,
};

/// Deterministic distances derived from the piece placement, standing in for
/// real tablebase lookups.
struct FakeProber;

impl DistanceProber for FakeProber {
    fn probe(&mut self, pos: &Chess) -> Result<Distances, ProbeError> {
        let dtz = (u64::from(pos.board().occupied()) % 31) as u32;
        Ok(Distances { dtz, dtm: Some(dtz + 1) })
    }
}

#[derive(Default)]
struct FakeFactory {
    opens: AtomicUsize,
}

impl ProberFactory for FakeFactory {
    type Prober = FakeProber;

    fn open(&self) -> Result<FakeProber, ProbeError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(FakeProber)
    }
}

/// Succeeds for the first `allow` batches, then fails every open, simulating
/// a run that dies partway through.
struct FlakyFactory {
    allow: usize,
    opens: AtomicUsize,
}

impl FlakyFactory {
    fn new(allow: usize) -> FlakyFactory {
        FlakyFactory { allow, opens: AtomicUsize::new(0) }
    }
}

impl ProberFactory for FlakyFactory {
    type Prober = FakeProber;

    fn open(&self) -> Result<FakeProber, ProbeError> {
        if self.opens.fetch_add(1, Ordering::Relaxed) < self.allow {
            Ok(FakeProber)
        } else {
            Err(ProbeError::Open(io::Error::other("simulated crash")))
        }
    }
}

fn kvk() -> Signature {
    "KvK".parse().expect("valid signature")
}

fn config(cache: &std::path::Path) -> PipelineConfig {
    PipelineConfig { batch_size: 64, workers: 4, cache_dir: cache.to_path_buf() }
}

fn all_rows(store: &Store, signature: &Signature) -> Vec<ProbeRow> {
    let mut rows = store
        .find_positions(signature, &FilterCriteria::default())
        .expect("query");
    rows.sort_by(|a, b| {
        (&a.key, a.white, a.white_to_move).cmp(&(&b.key, b.white, b.white_to_move))
    });
    rows
}

#[test]
fn full_run_loads_every_checkpoint() {
    let signature = kvk();
    let cache = tempfile::tempdir().expect("tempdir");
    let mut store = Store::open_in_memory().expect("open");

    let pipeline = Pipeline::new(FakeFactory::default(), config(cache.path()));
    let summary = pipeline.generate(&signature, &mut store).expect("generate");

    assert!(summary.canonical > 0);
    assert_eq!(summary.batches, summary.canonical.div_ceil(64));
    assert_eq!(summary.rows, store.count_rows(&signature).expect("count"));
    assert!(summary.rows > 0);

    let checkpoints = std::fs::read_dir(cache.path().join("KvK"))
        .expect("read dir")
        .count();
    assert_eq!(checkpoints, summary.batches);

    let rows = all_rows(&store, &signature);
    assert_eq!(rows.len() as u64, summary.rows);
    assert!(rows.iter().all(|row| row.dtz <= 31));
    assert!(rows.iter().all(|row| row.bishop_light.is_none()));

    let available = store.list_available_signatures().expect("list");
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].name(), "KvK");
}

#[test]
fn interrupted_run_resumes_to_an_identical_store() {
    let signature = kvk();

    // Reference: one uninterrupted run.
    let cache_a = tempfile::tempdir().expect("tempdir");
    let mut store_a = Store::open_in_memory().expect("open");
    Pipeline::new(FakeFactory::default(), config(cache_a.path()))
        .generate(&signature, &mut store_a)
        .expect("generate");
    let reference = all_rows(&store_a, &signature);

    // Interrupted: only three batches checkpoint before the crash.
    let cache_b = tempfile::tempdir().expect("tempdir");
    let mut store_b = Store::open_in_memory().expect("open");
    let crashed = Pipeline::new(FlakyFactory::new(3), config(cache_b.path()))
        .generate(&signature, &mut store_b);
    assert!(matches!(crashed, Err(GenerateError::IncompleteBatches { .. })));
    assert_eq!(store_b.count_rows(&signature).expect("count"), 0);

    // Restart with identical arguments; only the gaps are probed.
    let factory = FakeFactory::default();
    let pipeline = Pipeline::new(factory, config(cache_b.path()));
    let summary = pipeline.generate(&signature, &mut store_b).expect("resume");
    assert!(pipeline_opens(&pipeline) <= summary.batches - 3);

    assert_eq!(all_rows(&store_b, &signature), reference);
}

fn pipeline_opens(pipeline: &Pipeline<FakeFactory>) -> usize {
    pipeline.factory().opens.load(Ordering::Relaxed)
}

#[test]
fn reload_from_existing_checkpoints_is_idempotent() {
    let signature = kvk();
    let cache = tempfile::tempdir().expect("tempdir");
    let mut store = Store::open_in_memory().expect("open");

    let first = Pipeline::new(FakeFactory::default(), config(cache.path()))
        .generate(&signature, &mut store)
        .expect("generate");

    // Everything is checkpointed; a second run must not probe at all and
    // must end with the same row set.
    let factory = FakeFactory::default();
    let pipeline = Pipeline::new(factory, config(cache.path()));
    let second = pipeline.generate(&signature, &mut store).expect("reload");
    assert_eq!(pipeline_opens(&pipeline), 0);
    assert_eq!(first.rows, second.rows);
}

#[test]
fn sampled_positions_satisfy_their_filters() {
    let signature = kvk();
    let cache = tempfile::tempdir().expect("tempdir");
    let mut store = Store::open_in_memory().expect("open");
    Pipeline::new(FakeFactory::default(), config(cache.path()))
        .generate(&signature, &mut store)
        .expect("generate");

    let sampler = Sampler::new(&store);
    let mut rng = StdRng::seed_from_u64(42);

    let some_dtz = all_rows(&store, &signature)[0].dtz;
    let criteria = FilterCriteria {
        dtz: Some(some_dtz),
        white: Some(true),
        white_to_move: Some(true),
        ..Default::default()
    };
    for _ in 0..64 {
        let row = sampler.draw(&signature, &criteria, &mut rng).expect("draw");
        assert_eq!(row.dtz & !1, some_dtz & !1, "dtz matches its even/odd pair");
        assert!(row.white);
        assert!(row.white_to_move);

        let training = sampler
            .materialize(&signature, &row, Color::White, None, &mut rng)
            .expect("materialize");
        assert_eq!(training.dtz, row.dtz);
        assert_eq!(training.position.board().occupied().count(), 2);
        assert_eq!(training.position.turn(), Color::White);
    }
}

#[test]
fn krvk_canonical_universe_is_an_eighth_of_raw() {
    let signature: Signature = "KRvK".parse().expect("valid signature");
    let canonical = arrangement::enumerate_canonical(&signature).len();
    let raw = 64 * 63 * 62;
    assert!(canonical < raw);
    // Orbits have at most 8 members, and only arrangements on symmetry axes
    // have smaller orbits, so the count sits just above raw / 8.
    assert!(canonical >= raw / 8);
    assert!(canonical <= raw / 8 + raw / 32);
}
