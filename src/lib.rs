//! This library decompresses CRINEX (Compact RINEX) observation
//! files, also known as Hatanaka compressed RINEX, back into plain
//! RINEX observation text. CRINEX revisions 1.0 (RINEX 2 payload) and
//! 3.0 / 3.1 (RINEX 3 and 4 payloads) are supported.
//!
//! Two entry points are provided:
//! - [Decompressor], a one-shot reader: it consumes a CRINEX byte
//!   source eagerly and serves the recovered RINEX through [std::io::Read],
//! - [Scanner], a pull scanner: it recovers one epoch per call and
//!   exposes the timestamp, satellite list, clock offset and
//!   observations as values, or as ready to write RINEX bytes.
//!
//! Decoding is resilient: a handful of malformed record shapes known
//! from archived files are repaired on the fly, anything else
//! resynchronizes on the next initialization record. Every repair and
//! resync is reported as a [Warning] and through the `log` facade.
use thiserror::Error as ThisError;

mod constants;
mod epoch;
mod formatter;
mod header;
mod numdiff;
mod obs;
mod reader;
mod scanner;
mod textdiff;
mod version;
mod warning;

pub use constants::VALID_SATSYS;
pub use formatter::value_field;
pub use header::ObsTypes;
pub use numdiff::NumDiff;
pub use obs::SatDiff;
pub use reader::{BufferedReader, Decompressor};
pub use scanner::{ObsData, SatObservations, Scanner};
pub use textdiff::TextDiff;
pub use version::Version;
pub use warning::{Warning, WarningList};

pub use hifitime::Epoch;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("i/o error")]
    IoError(#[from] std::io::Error),
    #[error("bad magic value")]
    BadMagic,
    #[error("non supported revision \"{0}\"")]
    NonSupportedVersion(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("invalid epoch record: {0}")]
    InvalidEpochStr(String),
    #[error("invalid data record: {0}")]
    InvalidData(String),
    #[error("compression order out of range: {0}")]
    InvalidMaxDiff(u8),
    #[error("invalid satellite list: {0}")]
    InvalidSatList(String),
}

impl Error {
    /// True for errors confined to the current epoch: the scan may
    /// resynchronize on the next initialization record.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidEpochStr(_)
                | Self::InvalidData(_)
                | Self::InvalidMaxDiff(_)
                | Self::InvalidSatList(_)
        )
    }
}
