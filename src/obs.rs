//! Per satellite decompression state
use crate::{NumDiff, TextDiff};

/// [SatDiff] groups the decompression kernels of one satellite:
/// one numerical kernel per observable, plus the loss-of-lock and
/// signal-strength flag columns, all indexed by the position of the
/// observable in the system's observation code list.
#[derive(Debug, Clone)]
pub struct SatDiff {
    /// Observation kernels
    pub data: Vec<NumDiff>,
    /// Loss-of-lock indicator columns
    pub lli: Vec<TextDiff>,
    /// Signal strength columns
    pub ssi: Vec<TextDiff>,
}

impl SatDiff {
    /// Builds the state for a satellite tracked on `numobs` observables.
    pub fn new(numobs: usize) -> Self {
        Self {
            data: vec![NumDiff::new(); numobs],
            lli: vec![TextDiff::new(); numobs],
            ssi: vec![TextDiff::new(); numobs],
        }
    }

    /// V1 variant: the revision defines no initialization marker for
    /// the flag columns, so they start as blanks.
    pub fn new_v1(numobs: usize) -> Self {
        Self {
            data: vec![NumDiff::new(); numobs],
            lli: vec![TextDiff::single_space(); numobs],
            ssi: vec![TextDiff::single_space(); numobs],
        }
    }

    /// Number of observables this satellite is tracked on.
    pub fn numobs(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn allocation() {
        let sat = SatDiff::new(4);
        assert_eq!(sat.numobs(), 4);
        assert!(sat.data[0].missing());
        assert!(sat.lli[0].is_empty());

        let sat = SatDiff::new_v1(2);
        assert_eq!(sat.lli[1].as_bytes(), b" ");
        assert_eq!(sat.ssi[0].as_bytes(), b" ");
    }
}
