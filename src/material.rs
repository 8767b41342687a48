use std::{fmt, str::FromStr};

use shakmaty::{Color, Role};

use crate::{errors::SignatureError, symmetry::SymmetryGroup};

/// Maximum number of pieces in a supported signature.
///
/// The enumerator materializes the whole deduplicated universe in memory,
/// which is only tractable for small configurations. Lifting this bound
/// requires a streaming enumerator.
pub const MAX_PIECES: usize = 5;

/// The two sides of a material signature, in the order they were written.
///
/// Which group plays white is decided later, per probe: every arrangement is
/// probed under both color assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    First,
    Second,
}

impl Group {
    /// Piece color of this group under the given color assignment.
    pub fn color(self, white_first: bool) -> Color {
        match self {
            Group::First => Color::from_white(white_first),
            Group::Second => Color::from_white(!white_first),
        }
    }
}

/// An interchangeability class of slots: pieces of the same kind on the same
/// side can swap squares without changing the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub role: Role,
    pub group: Group,
    /// Number of slots sharing this tag.
    pub count: usize,
}

/// A material signature like `KBNvK`: ordered piece slots split into a first
/// and a second group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    tags: Vec<Tag>,
    slot_tags: Vec<usize>,
    has_pawns: bool,
    symmetric: bool,
    lone_bishop_tag: Option<usize>,
}

impl Signature {
    /// The normalized signature string, e.g. `KRvK`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of pieces.
    pub fn count(&self) -> usize {
        self.slot_tags.len()
    }

    /// Interchangeability classes in slot first-occurrence order. This order
    /// fixes the layout of arrangement keys.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Tag index of each slot, in signature order.
    pub fn slot_tags(&self) -> &[usize] {
        &self.slot_tags
    }

    /// Pawns break vertical symmetry and restrict the symmetry group.
    pub fn has_pawns(&self) -> bool {
        self.has_pawns
    }

    /// Whether the first group equals the second, enabling an extra
    /// group-swap reduction during enumeration.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Tag index of the bishop, if the whole signature contains exactly one.
    /// Only then is square-color metadata tracked for it.
    pub fn lone_bishop_tag(&self) -> Option<usize> {
        self.lone_bishop_tag
    }

    /// The symmetry group under which arrangements of this signature are
    /// considered equivalent.
    pub fn symmetry_group(&self) -> SymmetryGroup {
        if self.has_pawns {
            SymmetryGroup::MirrorOnly
        } else {
            SymmetryGroup::Full
        }
    }
}

fn role_from_letter(letter: char) -> Option<Role> {
    if letter.is_ascii_uppercase() {
        Role::from_char(letter)
    } else {
        None
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Signature, SignatureError> {
        let (first, second) = match s.split('v').collect::<Vec<_>>()[..] {
            [first, second] if !first.is_empty() && !second.is_empty() => (first, second),
            _ => return Err(SignatureError::GroupCount),
        };

        let mut tags: Vec<Tag> = Vec::new();
        let mut slot_tags = Vec::new();
        for (group, letters) in [(Group::First, first), (Group::Second, second)] {
            let mut kings = 0;
            for letter in letters.chars() {
                let role =
                    role_from_letter(letter).ok_or(SignatureError::UnsupportedPiece { letter })?;
                if role == Role::King {
                    kings += 1;
                }
                let tag = match tags.iter().position(|t| t.role == role && t.group == group) {
                    Some(tag) => tag,
                    None => {
                        tags.push(Tag { role, group, count: 0 });
                        tags.len() - 1
                    }
                };
                tags[tag].count += 1;
                slot_tags.push(tag);
            }
            if kings != 1 {
                return Err(SignatureError::MissingKing);
            }
        }

        if slot_tags.len() > MAX_PIECES {
            return Err(SignatureError::TooManyPieces { count: slot_tags.len() });
        }

        let bishops = tags
            .iter()
            .filter(|t| t.role == Role::Bishop)
            .map(|t| t.count)
            .sum::<usize>();

        Ok(Signature {
            name: format!("{first}v{second}"),
            lone_bishop_tag: if bishops == 1 {
                tags.iter().position(|t| t.role == Role::Bishop)
            } else {
                None
            },
            has_pawns: slot_tags
                .iter()
                .any(|&tag| tags[tag].role == Role::Pawn),
            symmetric: first == second,
            tags,
            slot_tags,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
