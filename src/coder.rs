//! Six-symbol alphabet shared by labels and feature matrices.
//!
//! Symbols `A`, `C`, `G`, `T`, `*` (gap) and `N` (unknown) map to the
//! integers 0 to 5 in that order.

/// Symbol used for a gap column.
pub const GAP: u8 = b'*';
/// Symbol used for an unknown base.
pub const UNKNOWN: u8 = b'N';
/// Number of symbols in the alphabet.
pub const ALPHABET_SIZE: usize = 6;

const ALPHABET: [u8; ALPHABET_SIZE] = [b'A', b'C', b'G', b'T', GAP, UNKNOWN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderError {
    InvalidSymbol(u8),
    InvalidEncoding(u8),
}

impl std::fmt::Display for CoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoderError::InvalidSymbol(s) => {
                write!(f, "Invalid alphabet symbol {:?}", char::from(*s))
            }
            CoderError::InvalidEncoding(e) => {
                write!(f, "Invalid alphabet encoding {} (expected 0-5)", e)
            }
        }
    }
}

impl std::error::Error for CoderError {}

/// A base of the label alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Base {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
    Gap = 4,
    Unknown = 5,
}

impl Base {
    const ALL: [Base; ALPHABET_SIZE] = [
        Base::A,
        Base::C,
        Base::G,
        Base::T,
        Base::Gap,
        Base::Unknown,
    ];

    pub fn from_symbol(symbol: u8) -> Result<Self, CoderError> {
        ALPHABET
            .iter()
            .position(|&s| s == symbol)
            .map(|i| Self::ALL[i])
            .ok_or(CoderError::InvalidSymbol(symbol))
    }

    /// Upper-cases the symbol and falls back to `Unknown` for anything
    /// outside the alphabet.
    pub fn from_symbol_lossy(symbol: u8) -> Self {
        Self::from_symbol(symbol.to_ascii_uppercase()).unwrap_or(Base::Unknown)
    }

    pub fn from_code(code: u8) -> Result<Self, CoderError> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(CoderError::InvalidEncoding(code))
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> u8 {
        ALPHABET[self as usize]
    }
}

pub fn encode(symbol: u8) -> Result<u8, CoderError> {
    Base::from_symbol(symbol).map(Base::code)
}

pub fn decode(code: u8) -> Result<u8, CoderError> {
    Base::from_code(code).map(Base::symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_symbols() {
        for (expected, &symbol) in ALPHABET.iter().enumerate() {
            let code = encode(symbol).unwrap();
            assert_eq!(code as usize, expected);
            assert_eq!(decode(code).unwrap(), symbol);
        }
    }

    #[test]
    fn test_rejects_foreign_symbols() {
        assert_eq!(encode(b'X'), Err(CoderError::InvalidSymbol(b'X')));
        assert_eq!(encode(b'a'), Err(CoderError::InvalidSymbol(b'a')));
        assert_eq!(encode(b'-'), Err(CoderError::InvalidSymbol(b'-')));
    }

    #[test]
    fn test_rejects_out_of_range_codes() {
        assert_eq!(decode(6), Err(CoderError::InvalidEncoding(6)));
        assert_eq!(decode(u8::MAX), Err(CoderError::InvalidEncoding(u8::MAX)));
    }

    #[test]
    fn test_lossy_conversion() {
        assert_eq!(Base::from_symbol_lossy(b'g'), Base::G);
        assert_eq!(Base::from_symbol_lossy(b'R'), Base::Unknown);
        assert_eq!(Base::from_symbol_lossy(b'*'), Base::Gap);
    }
}
