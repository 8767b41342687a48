//! Arrangements of signature pieces on the board and the canonical universe.
//!
//! An arrangement assigns distinct squares to the slots of a signature,
//! grouped into one unordered square set per interchangeability tag. The
//! enumerator walks every permutation of distinct squares in lexicographic
//! order and keeps the first representative of each symmetry orbit, so its
//! output order is stable across runs and batch indices are resumable.
//!
//! The deduplicated universe is expensive to recompute and is cached on disk
//! keyed by signature name; an existing cache file always wins.

use std::{
    fs,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use arrayvec::ArrayVec;
use rustc_hash::{FxHashSet, FxHasher};
use shakmaty::{Bitboard, Square};
use tracing::info;

use crate::{
    errors::GenerateError,
    files,
    material::{Signature, MAX_PIECES},
    symmetry::Transform,
};

/// Squares assigned to the slots of one interchangeability tag, kept sorted.
pub type SquareSet = ArrayVec<Square, MAX_PIECES>;

/// An assignment of distinct squares to the slots of a signature, one
/// unordered set per tag. Two arrangements are equal when every tag's set
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arrangement {
    sets: ArrayVec<SquareSet, MAX_PIECES>,
}

impl Arrangement {
    /// Group per-slot squares into tag sets. Squares are given in signature
    /// slot order and must be distinct.
    pub fn from_slot_squares(signature: &Signature, squares: &[Square]) -> Arrangement {
        debug_assert_eq!(squares.len(), signature.count());
        let mut sets: ArrayVec<SquareSet, MAX_PIECES> = signature
            .tags()
            .iter()
            .map(|_| SquareSet::new())
            .collect();
        for (&square, &tag) in squares.iter().zip(signature.slot_tags()) {
            sets[tag].push(square);
        }
        for set in &mut sets {
            set.sort_unstable();
        }
        Arrangement { sets }
    }

    /// Square sets in tag order.
    pub fn sets(&self) -> &[SquareSet] {
        &self.sets
    }

    /// Image of this arrangement under a board transform.
    pub fn transform(&self, transform: Transform) -> Arrangement {
        let mut sets: ArrayVec<SquareSet, MAX_PIECES> = self
            .sets
            .iter()
            .map(|set| set.iter().map(|&sq| transform.apply(sq)).collect())
            .collect();
        for set in &mut sets {
            set.sort_unstable();
        }
        Arrangement { sets }
    }

    /// Swap the first and second piece groups. Only meaningful for
    /// self-symmetric signatures, where the tag sequence of the second group
    /// mirrors the first.
    pub fn swap_groups(&self) -> Arrangement {
        let half = self.sets.len() / 2;
        let mut sets: ArrayVec<SquareSet, MAX_PIECES> = ArrayVec::new();
        sets.extend(self.sets[half..].iter().cloned());
        sets.extend(self.sets[..half].iter().cloned());
        Arrangement { sets }
    }

    /// Hash identifying this arrangement within its signature's universe.
    pub fn orbit_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.sets.hash(&mut hasher);
        hasher.finish()
    }

    /// Storage key: square indices comma-joined, tag order fixed, sorted
    /// within each tag.
    pub fn key(&self) -> String {
        let mut key = String::new();
        for set in &self.sets {
            for &square in set {
                if !key.is_empty() {
                    key.push(',');
                }
                key.push_str(&u32::from(square).to_string());
            }
        }
        key
    }

    /// Parse a storage key back into tag square sets. Returns `None` when the
    /// key does not fit the signature.
    pub fn from_key(signature: &Signature, key: &str) -> Option<Arrangement> {
        if key.split(',').count() != signature.count() {
            return None;
        }
        let squares = key
            .split(',')
            .map(|part| part.parse::<u32>().ok().and_then(|n| Square::try_from(n).ok()))
            .collect::<Option<ArrayVec<Square, MAX_PIECES>>>()?;
        Arrangement::from_flat(signature, &squares)
    }

    fn from_flat(signature: &Signature, squares: &[Square]) -> Option<Arrangement> {
        if squares.len() != signature.count() {
            return None;
        }
        let mut distinct = Bitboard::EMPTY;
        let mut sets: ArrayVec<SquareSet, MAX_PIECES> = ArrayVec::new();
        let mut rest = squares;
        for tag in signature.tags() {
            let (chunk, tail) = rest.split_at(tag.count);
            let mut set: SquareSet = chunk.iter().copied().collect();
            set.sort_unstable();
            sets.push(set);
            rest = tail;
        }
        for &square in squares {
            if distinct.contains(square) {
                return None;
            }
            distinct = distinct | Bitboard::from(square);
        }
        Some(Arrangement { sets })
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.sets
            .iter()
            .flat_map(|set| set.iter().map(|&sq| u32::from(sq) as u8))
            .collect()
    }

    fn from_bytes(signature: &Signature, bytes: &[u8]) -> Option<Arrangement> {
        if bytes.len() != signature.count() {
            return None;
        }
        let squares = bytes
            .iter()
            .map(|&b| Square::try_from(u32::from(b)).ok())
            .collect::<Option<ArrayVec<Square, MAX_PIECES>>>()?;
        Arrangement::from_flat(signature, &squares)
    }
}

/// Produce every canonical arrangement of the signature exactly once, in
/// enumeration order.
///
/// Every permutation of distinct squares is grouped into an arrangement; the
/// first arrangement of each symmetry orbit is kept and the hashes of its
/// whole orbit (and, for self-symmetric signatures, of the group-swapped
/// orbit) are recorded so later members are skipped.
pub fn enumerate_canonical(signature: &Signature) -> Vec<Arrangement> {
    let transforms = signature.symmetry_group().transforms();
    let mut seen: FxHashSet<u64> = FxHashSet::default();
    let mut universe = Vec::new();

    let mut slots: ArrayVec<Square, MAX_PIECES> = ArrayVec::new();
    permute(signature.count(), Bitboard::EMPTY, &mut slots, &mut |squares| {
        let arrangement = Arrangement::from_slot_squares(signature, squares);
        if seen.contains(&arrangement.orbit_hash()) {
            return;
        }
        for &transform in transforms {
            seen.insert(arrangement.transform(transform).orbit_hash());
        }
        if signature.is_symmetric() {
            let swapped = arrangement.swap_groups();
            for &transform in transforms {
                seen.insert(swapped.transform(transform).orbit_hash());
            }
        }
        universe.push(arrangement);
    });

    info!(
        signature = %signature,
        canonical = universe.len(),
        "enumerated canonical arrangements"
    );
    universe
}

fn permute<F: FnMut(&[Square])>(
    count: usize,
    used: Bitboard,
    slots: &mut ArrayVec<Square, MAX_PIECES>,
    visit: &mut F,
) {
    if slots.len() == count {
        visit(slots);
        return;
    }
    for square in Square::ALL {
        if used.contains(square) {
            continue;
        }
        slots.push(square);
        permute(count, used | Bitboard::from(square), slots, visit);
        slots.pop();
    }
}

fn cache_path(signature: &Signature, cache_dir: &Path) -> PathBuf {
    cache_dir.join(format!("{}.universe.json", signature.name()))
}

/// Load the cached canonical universe for a signature, or enumerate it and
/// cache it. The cache write is atomic, so a present file is always complete.
pub fn load_or_enumerate(
    signature: &Signature,
    cache_dir: &Path,
) -> Result<Vec<Arrangement>, GenerateError> {
    fs::create_dir_all(cache_dir)?;
    let path = cache_path(signature, cache_dir);
    if path.exists() {
        let raw: Vec<Vec<u8>> = files::read_json(&path)?;
        let universe = raw
            .iter()
            .map(|bytes| Arrangement::from_bytes(signature, bytes))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| GenerateError::CorruptCache { path: path.clone() })?;
        info!(
            signature = %signature,
            canonical = universe.len(),
            "loaded canonical universe from cache"
        );
        return Ok(universe);
    }

    let universe = enumerate_canonical(signature);
    let raw: Vec<Vec<u8>> = universe.iter().map(Arrangement::to_bytes).collect();
    files::write_json_atomic(&path, &raw)?;
    Ok(universe)
}
