use std::{io, path::PathBuf};

use thiserror::Error;

use crate::material::MAX_PIECES;

/// Error when parsing a material signature.
///
/// Signature errors are configuration errors: they are raised before any work
/// starts and are fatal to the whole run.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// A letter other than `P`, `N`, `B`, `R`, `Q` or `K` was given.
    #[error("unsupported piece letter `{letter}` in material signature")]
    UnsupportedPiece { letter: char },
    /// The signature did not consist of exactly two `v`-separated groups.
    #[error("expected exactly two piece groups separated by `v`")]
    GroupCount,
    /// One of the groups has no king.
    #[error("each group needs exactly one king")]
    MissingKing,
    /// More pieces than the enumerator supports.
    #[error("{count} pieces in signature, at most {MAX_PIECES} supported")]
    TooManyPieces { count: usize },
}

/// Error when probing distance metrics for a single position.
///
/// Probe errors are recovered locally: the affected position is skipped and
/// the batch continues.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Opening a tablebase directory failed.
    #[error("failed to open tablebase directory: {0}")]
    Open(#[source] io::Error),
    /// Syzygy probe failed or the position is outside table coverage.
    #[error("syzygy probe failed: {0}")]
    Syzygy(#[from] shakmaty_syzygy::SyzygyError),
    /// The configured DTM reader failed for this position.
    #[error("dtm probe failed: {0}")]
    Dtm(String),
}

/// Error when talking to the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Error while generating a database for one signature.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed cache or checkpoint file: {0}")]
    Serde(#[from] serde_json::Error),
    /// A cached universe file does not fit the signature it is named after.
    #[error("cached universe {path} does not fit its signature")]
    CorruptCache { path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Opening the tablebase readers for a batch failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// One or more batches failed to checkpoint. The run can be restarted
    /// with identical arguments and will resume from the gaps.
    #[error("{failed} of {total} batches failed to checkpoint, rerun to resume")]
    IncompleteBatches { failed: usize, total: usize },
}

/// Error when drawing or materializing a training position.
#[derive(Debug, Error)]
pub enum SampleError {
    /// No stored row matches the requested filter criteria.
    #[error("no stored position matches the given criteria")]
    NoMatchingPosition,
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The stored arrangement key does not fit the signature.
    #[error("stored key `{key}` does not fit signature {signature}")]
    BadKey { key: String, signature: String },
    /// A stored row reconstructed into an illegal position.
    #[error("stored key `{key}` reconstructed into an illegal position")]
    IllegalPosition { key: String },
}
