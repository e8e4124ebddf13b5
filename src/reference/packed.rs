use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bitvec::prelude::*;
use thiserror::Error;

use super::BaseCode;
use crate::util::binary::{is_short_read, read_array, read_u64, write_u64};

/// Leading bytes of a packed reference file.
pub const PAC_MAGIC: [u8; 8] = *b"SNAPPAC1";
/// Suffix appended to the index prefix to locate the packed reference.
pub const PAC_SUFFIX: &str = ".pac";

/// Number of bases encoded per `u64` chunk.
const BASES_PER_WORD: usize = 32;
/// Bits used to encode a single DNA base (A/C/G/T).
const BITS_PER_BASE: usize = 2;
const HEADER_BYTES: u64 = 16;

/// Errors that can occur while building or loading a packed reference.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// Encountered a base that cannot be represented in the 2-bit alphabet.
    #[error("unsupported nucleotide '{0}' at position {1}")]
    UnsupportedBase(char, usize),

    /// Index file missing or unreadable.
    #[error("failed to access reference index {}: {source}", .path.display())]
    Io {
        /// Path of the packed reference.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// File ended before the declared sequence length was read.
    #[error("reference index {} is truncated", .path.display())]
    Truncated {
        /// Path of the packed reference.
        path: PathBuf,
    },

    /// File content does not follow the packed layout.
    #[error("reference index {} is malformed: {reason}", .path.display())]
    Malformed {
        /// Path of the packed reference.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
}

/// Reference sequence compressed using 2-bit encoding per base.
///
/// Only the canonical bases (A, C, G, T) are stored directly; ambiguous bases
/// are tracked separately via an ambiguity mask so that decoding restores `N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedReference {
    data: Vec<u64>,
    len: usize,
    ambiguity: BitVec<u64, Lsb0>,
}

impl PackedReference {
    /// Compress an ASCII sequence into the packed representation.
    pub fn compress(sequence: &[u8]) -> Result<Self, ReferenceError> {
        let len = sequence.len();
        let mut data = vec![0u64; len.div_ceil(BASES_PER_WORD)];
        let mut ambiguity = bitvec![u64, Lsb0; 0; len];

        for (idx, &byte) in sequence.iter().enumerate() {
            let base = BaseCode::from_ascii(byte)
                .ok_or(ReferenceError::UnsupportedBase(byte as char, idx))?;
            let code = if base.is_canonical() {
                base.index() as u64
            } else {
                ambiguity.set(idx, true);
                0
            };
            let (word_idx, bit_shift) = word_position(idx);
            data[word_idx] |= code << bit_shift;
        }

        Ok(Self {
            data,
            len,
            ambiguity,
        })
    }

    /// Number of bases in the sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base at `idx`, or `None` past the end of the sequence.
    pub fn base_at(&self, idx: usize) -> Option<BaseCode> {
        if idx >= self.len {
            return None;
        }
        if self.ambiguity[idx] {
            return Some(BaseCode::N);
        }
        let (word_idx, bit_shift) = word_position(idx);
        let code = ((self.data[word_idx] >> bit_shift) & 0b11) as usize;
        BaseCode::from_index(code)
    }

    /// Load `<prefix>.pac`.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let file = File::open(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_len = file
            .metadata()
            .map_err(|source| ReferenceError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let mut reader = BufReader::new(file);
        let map_io = |err: io::Error| classify_io(path, err);

        let magic: [u8; 8] = read_array(&mut reader).map_err(map_io)?;
        if magic != PAC_MAGIC {
            return Err(ReferenceError::Malformed {
                path: path.to_path_buf(),
                reason: "bad magic".to_string(),
            });
        }
        let declared = read_u64(&mut reader).map_err(map_io)?;
        let len = usize::try_from(declared).map_err(|_| ReferenceError::Malformed {
            path: path.to_path_buf(),
            reason: format!("length {declared} does not fit in memory"),
        })?;

        let words = len.div_ceil(BASES_PER_WORD);
        let mask_words = len.div_ceil(64);
        let expected = HEADER_BYTES + 8 * (words as u64 + mask_words as u64);
        if file_len < expected {
            return Err(ReferenceError::Truncated {
                path: path.to_path_buf(),
            });
        }

        let data = read_words(&mut reader, words).map_err(map_io)?;
        let mask = read_words(&mut reader, mask_words).map_err(map_io)?;
        let mut ambiguity = BitVec::<u64, Lsb0>::from_vec(mask);
        ambiguity.truncate(len);

        Ok(Self {
            data,
            len,
            ambiguity,
        })
    }

    /// Write the packed layout to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ReferenceError> {
        let map_io = |source: io::Error| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(map_io)?);
        writer.write_all(&PAC_MAGIC).map_err(map_io)?;
        write_u64(&mut writer, self.len as u64).map_err(map_io)?;
        for &word in &self.data {
            write_u64(&mut writer, word).map_err(map_io)?;
        }
        let mask = self.ambiguity.as_raw_slice();
        for idx in 0..self.len.div_ceil(64) {
            write_u64(&mut writer, mask.get(idx).copied().unwrap_or(0)).map_err(map_io)?;
        }
        writer.flush().map_err(map_io)
    }
}

fn read_words<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<u64>> {
    (0..count).map(|_| read_u64(reader)).collect()
}

fn classify_io(path: &Path, err: io::Error) -> ReferenceError {
    if is_short_read(&err) {
        ReferenceError::Truncated {
            path: path.to_path_buf(),
        }
    } else {
        ReferenceError::Io {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

fn word_position(idx: usize) -> (usize, usize) {
    let word_idx = idx / BASES_PER_WORD;
    let bit_shift = (idx % BASES_PER_WORD) * BITS_PER_BASE;
    (word_idx, bit_shift)
}
