//! Generate, deduplicate and sample chess endgame position databases.
//!
//! For a material signature like `KBNvK` this crate enumerates every
//! arrangement of the pieces on the board, collapses arrangements that are
//! equal under board symmetry, probes distance metrics for each canonical
//! position from endgame tablebases in a crash-resumable batch pipeline, and
//! loads the results into a per-signature SQLite table. A trainer then draws
//! positions by distance criteria and gets back a concrete, randomly
//! re-oriented board.
//!
//! ```no_run
//! use endgame_db::{
//!     FilterCriteria, Pipeline, PipelineConfig, Sampler, Signature, Store,
//!     TablebaseProberFactory,
//! };
//! use shakmaty::Color;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signature: Signature = "KRvK".parse()?;
//! let mut store = Store::open("endgames.sqlite")?;
//!
//! let factory = TablebaseProberFactory::new("tables/syzygy");
//! let pipeline = Pipeline::new(factory, PipelineConfig::default());
//! pipeline.generate(&signature, &mut store)?;
//!
//! let sampler = Sampler::new(&store);
//! let criteria = FilterCriteria { dtz: Some(16), white: Some(true), ..Default::default() };
//! let mut rng = rand::thread_rng();
//! let row = sampler.draw(&signature, &criteria, &mut rng)?;
//! let training = sampler.materialize(&signature, &row, Color::White, None, &mut rng)?;
//! println!("dtz {}: {:?}", training.dtz, training.position);
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod arrangement;
pub mod errors;
mod files;
pub mod material;
pub mod pipeline;
pub mod probe;
pub mod sampler;
pub mod store;
pub mod symmetry;

pub use crate::{
    arrangement::Arrangement,
    errors::{GenerateError, ProbeError, SampleError, SignatureError, StoreError},
    material::{Signature, MAX_PIECES},
    pipeline::{GenerateSummary, Pipeline, PipelineConfig},
    probe::{
        DistanceProber, Distances, DtmProber, ProbeRow, ProberFactory, TablebaseProber,
        TablebaseProberFactory,
    },
    sampler::{Sampler, TrainingPosition},
    store::{FilterCriteria, Store},
    symmetry::{SymmetryGroup, Transform},
};
