//! Board symmetries used to collapse equivalent arrangements.
//!
//! Transforms map square indices by file/rank arithmetic only, no board
//! involved. Pawnless signatures use the full 8-element automorphism group of
//! the board; signatures with pawns only admit the file mirror, since pawns
//! fix the direction of play.

use shakmaty::{File, Rank, Square};

/// A board automorphism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Identity,
    /// Mirror files, a1 -> h1.
    FlipFile,
    /// Mirror ranks, a1 -> a8.
    FlipRank,
    /// Reflect across the a1-h8 diagonal.
    FlipDiagonal,
    /// Reflect across the a8-h1 diagonal.
    FlipAntiDiagonal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Transform {
    /// Map a square to its image under this transform.
    pub fn apply(self, square: Square) -> Square {
        let file = u32::from(square.file());
        let rank = u32::from(square.rank());
        let (file, rank) = match self {
            Transform::Identity => (file, rank),
            Transform::FlipFile => (7 - file, rank),
            Transform::FlipRank => (file, 7 - rank),
            Transform::FlipDiagonal => (rank, file),
            Transform::FlipAntiDiagonal => (7 - rank, 7 - file),
            Transform::Rotate90 => (rank, 7 - file),
            Transform::Rotate180 => (7 - file, 7 - rank),
            Transform::Rotate270 => (7 - rank, file),
        };
        Square::from_coords(File::new(file), Rank::new(rank))
    }

    /// Whether this transform maps light squares to light squares.
    ///
    /// The sampler restricts itself to this subgroup (or its complement) when
    /// a bishop square color is requested.
    pub fn preserves_square_color(self) -> bool {
        matches!(
            self,
            Transform::Identity
                | Transform::FlipDiagonal
                | Transform::FlipAntiDiagonal
                | Transform::Rotate180
        )
    }
}

/// A closed set of board automorphisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryGroup {
    /// All 8 automorphisms of the board.
    Full,
    /// Identity and file mirror, for signatures with pawns.
    MirrorOnly,
}

const FULL: [Transform; 8] = [
    Transform::Identity,
    Transform::FlipFile,
    Transform::FlipRank,
    Transform::FlipDiagonal,
    Transform::FlipAntiDiagonal,
    Transform::Rotate90,
    Transform::Rotate180,
    Transform::Rotate270,
];

const MIRROR_ONLY: [Transform; 2] = [Transform::Identity, Transform::FlipFile];

impl SymmetryGroup {
    pub fn transforms(self) -> &'static [Transform] {
        match self {
            SymmetryGroup::Full => &FULL,
            SymmetryGroup::MirrorOnly => &MIRROR_ONLY,
        }
    }
}
