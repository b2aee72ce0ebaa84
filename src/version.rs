//! CRINEX revision description
use crate::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// [Version] describes the supported CRINEX compression revisions.
/// The revision is read once from the file magic and fixes all
/// column offsets of the epoch records that follow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Version {
    /// CRINEX 1.0, compressing RINEX 2 observations
    V1_0,
    /// CRINEX 3.0, compressing RINEX 3/4 observations
    #[default]
    V3_0,
    /// CRINEX 3.1, like 3.0 with an optional pico-second clock field
    V3_1,
}

impl Version {
    /// True for the modern (3.x) revisions.
    pub fn is_v3(&self) -> bool {
        !matches!(self, Self::V1_0)
    }

    /// Byte offset of the 3-byte satellite counter in the epoch record.
    pub(crate) fn numsat_offset(&self) -> usize {
        match self {
            Self::V1_0 => 29,
            _ => 32,
        }
    }

    /// Byte offset of the satellite list in the epoch record.
    pub(crate) fn satlist_offset(&self) -> usize {
        match self {
            Self::V1_0 => 32,
            _ => 41,
        }
    }

}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::V1_0 => f.write_str("1.0"),
            Self::V3_0 => f.write_str("3.0"),
            Self::V3_1 => f.write_str("3.1"),
        }
    }
}

impl std::str::FromStr for Version {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" => Ok(Self::V1_0),
            "3.0" => Ok(Self::V3_0),
            "3.1" => Ok(Self::V3_1),
            other => Err(Error::NonSupportedVersion(other.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parsing() {
        for (desc, expected) in [
            ("1.0", Version::V1_0),
            ("3.0", Version::V3_0),
            ("3.1", Version::V3_1),
            ("  3.1  ", Version::V3_1),
        ] {
            let version = Version::from_str(desc).unwrap();
            assert_eq!(version, expected);
        }
        assert!(Version::from_str("2.0").is_err());
        assert!(Version::from_str("").is_err());
    }

    #[test]
    fn offsets() {
        assert_eq!(Version::V1_0.numsat_offset(), 29);
        assert_eq!(Version::V1_0.satlist_offset(), 32);
        assert_eq!(Version::V3_0.numsat_offset(), 32);
        assert_eq!(Version::V3_1.satlist_offset(), 41);
        assert!(Version::V3_0.is_v3());
        assert!(!Version::V1_0.is_v3());
    }

    #[test]
    fn display() {
        assert_eq!(Version::V1_0.to_string(), "1.0");
        assert_eq!(Version::V3_1.to_string(), "3.1");
    }
}
