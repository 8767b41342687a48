//! Probing distance metrics for one batch of canonical arrangements.
//!
//! The tablebase readers sit behind [`DistanceProber`]/[`ProberFactory`] so
//! the pipeline can be driven by the real syzygy tables or by test doubles.
//! A factory is invoked once per batch, not once per position, to amortize
//! the open cost; each worker owns its prober exclusively.

use std::{fmt, num::NonZeroU32, path::PathBuf};

use serde::{Deserialize, Serialize};
use shakmaty::{Bitboard, Board, CastlingMode, Chess, Color, FromSetup, Setup};
use shakmaty_syzygy::Tablebase;
use tracing::debug;

use crate::{arrangement::Arrangement, errors::ProbeError, material::Signature};

/// Distance metrics for one probed position. DTZ is always available from
/// syzygy tables; DTM only when a DTM reader is configured.
#[derive(Debug, Clone, Copy)]
pub struct Distances {
    pub dtz: u32,
    pub dtm: Option<u32>,
}

/// A handle on opened tablebase readers.
pub trait DistanceProber {
    /// Probe both distance metrics for a position.
    ///
    /// # Errors
    ///
    /// Errors if the position is outside table coverage or a lookup fails.
    /// Callers treat this as "no metric available" and skip the position.
    fn probe(&mut self, pos: &Chess) -> Result<Distances, ProbeError>;
}

/// Opens fresh reader handles for one batch.
pub trait ProberFactory: Sync {
    type Prober: DistanceProber;

    /// # Errors
    ///
    /// Errors when the underlying tables cannot be opened; the whole batch is
    /// then treated as failed and retried on the next run.
    fn open(&self) -> Result<Self::Prober, ProbeError>;
}

/// Plug-in distance-to-mate reader (e.g. a gaviota binding).
pub trait DtmProber: Send {
    /// # Errors
    ///
    /// Errors when the position is outside coverage or the lookup fails.
    fn probe_dtm(&mut self, pos: &Chess) -> Result<u32, ProbeError>;
}

type DtmFactory = Box<dyn Fn() -> Result<Box<dyn DtmProber>, ProbeError> + Send + Sync>;

/// Factory for the production prober backed by on-disk tablebases.
pub struct TablebaseProberFactory {
    syzygy_dir: PathBuf,
    dtm: Option<DtmFactory>,
}

impl TablebaseProberFactory {
    pub fn new(syzygy_dir: impl Into<PathBuf>) -> TablebaseProberFactory {
        TablebaseProberFactory { syzygy_dir: syzygy_dir.into(), dtm: None }
    }

    /// Attach a distance-to-mate reader. Without one, rows carry no DTM.
    pub fn with_dtm(mut self, dtm: DtmFactory) -> TablebaseProberFactory {
        self.dtm = Some(dtm);
        self
    }
}

impl fmt::Debug for TablebaseProberFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablebaseProberFactory")
            .field("syzygy_dir", &self.syzygy_dir)
            .field("dtm", &self.dtm.is_some())
            .finish()
    }
}

impl ProberFactory for TablebaseProberFactory {
    type Prober = TablebaseProber;

    fn open(&self) -> Result<TablebaseProber, ProbeError> {
        let mut syzygy = Tablebase::new();
        syzygy.add_directory(&self.syzygy_dir).map_err(ProbeError::Open)?;
        let dtm = self.dtm.as_ref().map(|factory| factory()).transpose()?;
        Ok(TablebaseProber { syzygy, dtm })
    }
}

/// Production prober: syzygy tables for DTZ plus an optional DTM reader.
pub struct TablebaseProber {
    syzygy: Tablebase<Chess>,
    dtm: Option<Box<dyn DtmProber>>,
}

impl fmt::Debug for TablebaseProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablebaseProber")
            .field("syzygy", &self.syzygy)
            .field("dtm", &self.dtm.is_some())
            .finish()
    }
}

impl DistanceProber for TablebaseProber {
    fn probe(&mut self, pos: &Chess) -> Result<Distances, ProbeError> {
        let dtz = self.syzygy.probe_dtz(pos)?;
        let dtz = i32::from(dtz.ignore_rounding()).unsigned_abs();
        let dtm = match &mut self.dtm {
            Some(prober) => Some(prober.probe_dtm(pos)?),
            None => None,
        };
        Ok(Distances { dtz, dtm })
    }
}

/// One successfully probed position: the checkpoint and storage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRow {
    /// Canonical arrangement key.
    pub key: String,
    /// True when the first signature group plays white.
    pub white: bool,
    pub white_to_move: bool,
    /// Distance-to-zero magnitude.
    pub dtz: u32,
    /// Distance-to-mate magnitude, when a DTM reader was configured.
    pub dtm: Option<u32>,
    /// Square color of the lone bishop, when the signature tracks one.
    pub bishop_light: Option<bool>,
}

/// Probe one batch: every arrangement under both color assignments and both
/// sides to move. Illegal positions (side not to move in check, adjacent
/// kings, pawns on back ranks) and individual probe failures are skipped
/// without failing the batch.
pub fn probe_batch<P: DistanceProber>(
    prober: &mut P,
    signature: &Signature,
    batch: &[Arrangement],
) -> Vec<ProbeRow> {
    let mut rows = Vec::new();
    for arrangement in batch {
        let key = arrangement.key();
        let bishop_light = lone_bishop_light(signature, arrangement);
        for white in [true, false] {
            let board = place(signature, arrangement, white);
            for turn in [Color::White, Color::Black] {
                let setup = Setup {
                    board: board.clone(),
                    turn,
                    castling_rights: Bitboard::EMPTY,
                    ep_square: None,
                    halfmoves: 0,
                    fullmoves: NonZeroU32::MIN,
                    promoted: Bitboard::EMPTY,
                    pockets: None,
                    remaining_checks: None,
                };
                let pos = match Chess::from_setup(setup, CastlingMode::Standard) {
                    Ok(pos) => pos,
                    Err(_) => continue,
                };
                match prober.probe(&pos) {
                    Ok(distances) => rows.push(ProbeRow {
                        key: key.clone(),
                        white,
                        white_to_move: turn.is_white(),
                        dtz: distances.dtz,
                        dtm: distances.dtm,
                        bishop_light,
                    }),
                    Err(err) => {
                        debug!(key = %key, white, ?turn, %err, "skipping unprobeable position");
                    }
                }
            }
        }
    }
    rows
}

/// Board for one color assignment of an arrangement.
fn place(signature: &Signature, arrangement: &Arrangement, white_first: bool) -> Board {
    let mut board = Board::empty();
    for (tag, set) in signature.tags().iter().zip(arrangement.sets()) {
        let color = tag.group.color(white_first);
        for &square in set.iter() {
            board.set_piece_at(square, tag.role.of(color));
        }
    }
    board
}

fn lone_bishop_light(signature: &Signature, arrangement: &Arrangement) -> Option<bool> {
    let tag = signature.lone_bishop_tag()?;
    arrangement.sets()[tag].first().map(|square| square.is_light())
}
