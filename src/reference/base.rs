/// Number of observation classes tracked per position (A, C, G, T, other).
pub const BASE_CLASSES: usize = 5;

/// The four canonical bases in code order.
pub const CANONICAL_BASES: [BaseCode; 4] = [BaseCode::A, BaseCode::C, BaseCode::G, BaseCode::T];

/// Nucleotide class used by the reference and by the per-position counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BaseCode {
    /// Adenine.
    A = 0,
    /// Cytosine.
    C = 1,
    /// Guanine.
    G = 2,
    /// Thymine/Uracil.
    T = 3,
    /// Ambiguous base (`N`); in counters, any non-canonical observation.
    N = 4,
}

impl BaseCode {
    /// Attempt to parse an ASCII base into a [`BaseCode`].
    pub fn from_ascii(base: u8) -> Option<Self> {
        match base {
            b'A' | b'a' => Some(BaseCode::A),
            b'C' | b'c' => Some(BaseCode::C),
            b'G' | b'g' => Some(BaseCode::G),
            b'T' | b't' | b'U' | b'u' => Some(BaseCode::T),
            b'N' | b'n' => Some(BaseCode::N),
            _ => None,
        }
    }

    /// Decode a class index (`0..BASE_CLASSES`).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(BaseCode::A),
            1 => Some(BaseCode::C),
            2 => Some(BaseCode::G),
            3 => Some(BaseCode::T),
            4 => Some(BaseCode::N),
            _ => None,
        }
    }

    /// Uppercase ASCII representation.
    pub fn to_ascii(self) -> u8 {
        match self {
            BaseCode::A => b'A',
            BaseCode::C => b'C',
            BaseCode::G => b'G',
            BaseCode::T => b'T',
            BaseCode::N => b'N',
        }
    }

    /// Convert the base code to an index into count tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this is one of A/C/G/T.
    #[inline]
    pub fn is_canonical(self) -> bool {
        self != BaseCode::N
    }
}
