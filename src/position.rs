use serde::{Deserialize, Serialize};
use std::fmt;

/// A column in reference space, extended with an insertion index.
///
/// `insertion` is 0 for the reference column itself and counts inserted bases
/// that follow it. Ordering is lexicographic on `(reference, insertion)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub reference: i64,
    pub insertion: u32,
}

impl Position {
    pub fn new(reference: i64, insertion: u32) -> Self {
        Self {
            reference,
            insertion,
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.insertion != 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.reference, self.insertion)
    }
}

/// Checks that positions are strictly increasing.
pub fn is_strictly_increasing(positions: &[Position]) -> bool {
    positions.windows(2).all(|pair| pair[0] < pair[1])
}
