use std::io::{self, Read, Write};

use thiserror::Error;

use crate::counters::{BaseCounts, CounterError};
use crate::reference::{BaseCode, BASE_CLASSES};

use super::scoring::Genotype;

/// Encoded size of one [`CandidateAttributeRecord`].
pub const RECORD_BYTES: usize = 48;

/// Errors decoding the intermediate candidate stream.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying stream failure.
    #[error("candidate stream I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Stream ended in the middle of a record.
    #[error("candidate stream ends inside a record ({read} of 48 bytes)")]
    PartialRecord {
        /// Bytes of the incomplete record that were present.
        read: usize,
    },

    /// Base field holds no known code.
    #[error("invalid base code {0} in candidate record")]
    InvalidBase(u8),

    /// Genotype field holds no known code.
    #[error("invalid genotype code {0} in candidate record")]
    InvalidGenotype(u8),

    /// Per-class counts are inconsistent with the depth.
    #[error("inconsistent counts in candidate record: {0}")]
    Counts(#[from] CounterError),
}

/// Everything the calibrator needs to know about one emitted candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateAttributeRecord {
    /// Zero-based reference position.
    pub position: u64,
    /// Reference base at the position.
    pub reference: BaseCode,
    /// Proposed alternate base.
    pub alternate: BaseCode,
    /// Better-supported variant genotype.
    pub genotype: Genotype,
    /// Observed counters.
    pub counts: BaseCounts,
    /// Log-likelihood ratio that caused emission.
    pub statistic: f64,
}

impl CandidateAttributeRecord {
    /// Observations supporting the reference base.
    pub fn ref_count(&self) -> u32 {
        self.counts.count(self.reference)
    }

    /// Observations supporting the alternate base.
    pub fn alt_count(&self) -> u32 {
        self.counts.count(self.alternate)
    }

    /// Total depth at the position.
    pub fn depth(&self) -> u32 {
        self.counts.depth()
    }

    /// Alternate observations over depth; zero at zero depth.
    pub fn allele_fraction(&self) -> f64 {
        ratio(self.alt_count(), self.depth())
    }

    /// Observations that are neither reference nor alternate, over depth.
    pub fn other_fraction(&self) -> f64 {
        let other = self
            .depth()
            .saturating_sub(self.ref_count())
            .saturating_sub(self.alt_count());
        ratio(other, self.depth())
    }

    /// Fixed-width little-endian encoding.
    pub fn encode(&self) -> [u8; RECORD_BYTES] {
        let mut buf = [0u8; RECORD_BYTES];
        buf[0..8].copy_from_slice(&self.position.to_le_bytes());
        buf[8] = self.reference as u8;
        buf[9] = self.alternate as u8;
        buf[10] = self.genotype as u8;
        for (idx, count) in self.counts.counts().iter().enumerate() {
            let at = 12 + idx * 4;
            buf[at..at + 4].copy_from_slice(&count.to_le_bytes());
        }
        buf[32..36].copy_from_slice(&self.counts.depth().to_le_bytes());
        buf[36..44].copy_from_slice(&self.statistic.to_le_bytes());
        buf
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(buf: &[u8; RECORD_BYTES]) -> Result<Self, RecordError> {
        let base = |code: u8| {
            BaseCode::from_index(usize::from(code)).ok_or(RecordError::InvalidBase(code))
        };
        let word =
            |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        let mut position = [0u8; 8];
        position.copy_from_slice(&buf[0..8]);
        let mut statistic = [0u8; 8];
        statistic.copy_from_slice(&buf[36..44]);

        let mut counts = [0u32; BASE_CLASSES];
        for (idx, count) in counts.iter_mut().enumerate() {
            *count = word(12 + idx * 4);
        }

        Ok(Self {
            position: u64::from_le_bytes(position),
            reference: base(buf[8])?,
            alternate: base(buf[9])?,
            genotype: Genotype::from_code(buf[10]).ok_or(RecordError::InvalidGenotype(buf[10]))?,
            counts: BaseCounts::new(counts, word(32))?,
            statistic: f64::from_le_bytes(statistic),
        })
    }

    /// Append the encoded record to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    /// Read the next record; `Ok(None)` at a clean end of stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>, RecordError> {
        let mut buf = [0u8; RECORD_BYTES];
        let mut filled = 0;
        while filled < RECORD_BYTES {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_BYTES => Self::decode(&buf).map(Some),
            read => Err(RecordError::PartialRecord { read }),
        }
    }
}

fn ratio(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CandidateAttributeRecord {
        CandidateAttributeRecord {
            position: 1_234_567,
            reference: BaseCode::C,
            alternate: BaseCode::A,
            genotype: Genotype::Homozygous,
            counts: BaseCounts::new([40, 1, 0, 0, 2], 45).unwrap(),
            statistic: 201.25,
        }
    }

    #[test]
    fn layout_is_fixed() {
        let bytes = record().encode();
        assert_eq!(&bytes[0..8], &1_234_567u64.to_le_bytes());
        assert_eq!(bytes[8..12], [1, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &40u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &45u32.to_le_bytes());
        assert_eq!(&bytes[44..], &[0u8; 4]);
        assert_eq!(CandidateAttributeRecord::decode(&bytes).unwrap(), record());
    }

    #[test]
    fn derived_fractions() {
        let rec = record();
        assert_eq!(rec.ref_count(), 1);
        assert_eq!(rec.alt_count(), 40);
        assert!((rec.allele_fraction() - 40.0 / 45.0).abs() < 1e-12);
        assert!((rec.other_fraction() - 4.0 / 45.0).abs() < 1e-12);
    }

    #[test]
    fn stream_reads_until_clean_end() {
        let mut stream = Vec::new();
        record().write_to(&mut stream).unwrap();
        record().write_to(&mut stream).unwrap();

        let mut reader = stream.as_slice();
        assert!(CandidateAttributeRecord::read_from(&mut reader).unwrap().is_some());
        assert!(CandidateAttributeRecord::read_from(&mut reader).unwrap().is_some());
        assert!(CandidateAttributeRecord::read_from(&mut reader).unwrap().is_none());
    }

    #[test]
    fn partial_record_is_an_error() {
        let bytes = record().encode();
        let mut reader = &bytes[..30];
        assert!(matches!(
            CandidateAttributeRecord::read_from(&mut reader),
            Err(RecordError::PartialRecord { read: 30 })
        ));
    }

    #[test]
    fn bad_codes_are_rejected() {
        let mut bytes = record().encode();
        bytes[9] = 7;
        assert!(matches!(
            CandidateAttributeRecord::decode(&bytes),
            Err(RecordError::InvalidBase(7))
        ));
        let mut bytes = record().encode();
        bytes[10] = 2;
        assert!(matches!(
            CandidateAttributeRecord::decode(&bytes),
            Err(RecordError::InvalidGenotype(2))
        ));
        let mut bytes = record().encode();
        bytes[32..36].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            CandidateAttributeRecord::decode(&bytes),
            Err(RecordError::Counts(_))
        ));
    }
}
