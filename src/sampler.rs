//! Draw stored positions matching filter criteria and rebuild concrete,
//! correctly-oriented boards from their canonical records.
//!
//! Canonical records carry no orientation bias: whatever representative the
//! enumerator happened to keep, a fresh random symmetry transform is applied
//! on every materialization. When the caller constrains the lone bishop's
//! square color, the choice is restricted to the transforms that put it
//! there; when the requested playing side differs from the stored color
//! assignment, the whole position is mirrored end to end.

use std::num::NonZeroU32;

use rand::{seq::SliceRandom, Rng};
use shakmaty::{Bitboard, Board, CastlingMode, Chess, Color, FromSetup, Setup};

use crate::{
    arrangement::Arrangement,
    errors::SampleError,
    material::Signature,
    probe::ProbeRow,
    store::{FilterCriteria, Store},
    symmetry::Transform,
};

/// A concrete board handed to the trainer, with its stored metrics.
#[derive(Debug, Clone)]
pub struct TrainingPosition {
    pub position: Chess,
    pub dtz: u32,
    pub dtm: Option<u32>,
}

/// Samples positions from a store. Borrows the store it was given; there is
/// no global lookup.
#[derive(Debug)]
pub struct Sampler<'a> {
    store: &'a Store,
}

impl<'a> Sampler<'a> {
    pub fn new(store: &'a Store) -> Sampler<'a> {
        Sampler { store }
    }

    /// Pick uniformly at random among the stored rows matching `criteria`.
    ///
    /// # Errors
    ///
    /// [`SampleError::NoMatchingPosition`] when nothing matches.
    pub fn draw(
        &self,
        signature: &Signature,
        criteria: &FilterCriteria,
        rng: &mut impl Rng,
    ) -> Result<ProbeRow, SampleError> {
        let rows = self.store.find_positions(signature, criteria)?;
        rows.choose(rng).cloned().ok_or(SampleError::NoMatchingPosition)
    }

    /// Rebuild a concrete board from a drawn row.
    ///
    /// `desired_side` is the color the first signature group should play;
    /// `desired_bishop_light` constrains the lone bishop's square color when
    /// the signature tracks one.
    ///
    /// # Errors
    ///
    /// Errors when the stored key does not fit the signature or rebuilds
    /// into an illegal position, both signs of store corruption.
    pub fn materialize(
        &self,
        signature: &Signature,
        row: &ProbeRow,
        desired_side: Color,
        desired_bishop_light: Option<bool>,
        rng: &mut impl Rng,
    ) -> Result<TrainingPosition, SampleError> {
        let arrangement = Arrangement::from_key(signature, &row.key).ok_or_else(|| {
            SampleError::BadKey { key: row.key.clone(), signature: signature.name().to_owned() }
        })?;
        let mirror = desired_side.is_white() != row.white;

        let transforms = signature.symmetry_group().transforms();
        let transform = match (signature.lone_bishop_tag(), desired_bishop_light) {
            (Some(tag), Some(want)) => {
                let bishop = arrangement.sets()[tag][0];
                let candidates: Vec<Transform> = transforms
                    .iter()
                    .copied()
                    .filter(|t| oriented(*t, mirror, bishop).is_light() == want)
                    .collect();
                candidates
                    .choose(rng)
                    .copied()
                    .ok_or(SampleError::NoMatchingPosition)?
            }
            _ => transforms
                .choose(rng)
                .copied()
                .ok_or(SampleError::NoMatchingPosition)?,
        };

        let mut board = Board::empty();
        for (tag, set) in signature.tags().iter().zip(arrangement.sets()) {
            let color = tag.group.color(row.white ^ mirror);
            for &square in set.iter() {
                board.set_piece_at(oriented(transform, mirror, square), tag.role.of(color));
            }
        }

        let setup = Setup {
            board,
            turn: Color::from_white(row.white_to_move ^ mirror),
            castling_rights: Bitboard::EMPTY,
            ep_square: None,
            halfmoves: 0,
            fullmoves: NonZeroU32::MIN,
            promoted: Bitboard::EMPTY,
            pockets: None,
            remaining_checks: None,
        };
        let position = Chess::from_setup(setup, CastlingMode::Standard)
            .map_err(|_| SampleError::IllegalPosition { key: row.key.clone() })?;

        Ok(TrainingPosition { position, dtz: row.dtz, dtm: row.dtm })
    }
}

/// Apply the chosen transform, then the side mirror (rank flip) when the
/// stored orientation is being swapped.
fn oriented(transform: Transform, mirror: bool, square: shakmaty::Square) -> shakmaty::Square {
    let square = transform.apply(square);
    if mirror {
        Transform::FlipRank.apply(square)
    } else {
        square
    }
}
