//! Numerical differentiation kernel
//!
//! Signal observations and receiver clock offsets are compressed as
//! integer differences of increasing order, following the scheme
//! developed by Y. Hatanaka. The encoder picks the order (1..=9) per
//! arc and announces it in the initialization token `M&value`; every
//! following token carries the highest order difference only.
use crate::Error;

/// [NumDiff] recovers one integer observation stream from its
/// transmitted differences.
///
/// After an initialization at order `m`, the kernel keeps the last
/// known value and a stack of at most `m` running differences,
/// ordered from the lowest to the highest order:
///
/// ```text
///          --> epoch
///       0:  v1   v2   v3    v4
/// diff 1:       d2   d3    d4
/// diff 2:           dd3   dd4
/// diff 3:                ddd4
/// ```
///
/// The stream carries `v1, d2, dd3, ddd4, ddd5, ...` for `m = 3`.
/// Once the stack is full, every new sample first realigns it to the
/// current epoch (prefix sums from the bottom), then integrates it
/// back down to a single first order increment which updates the
/// reference value. All arithmetic is exact 64-bit integer work, the
/// recovered values are never rounded.
#[derive(Debug, Clone, Default)]
pub struct NumDiff {
    /// Difference order of the current arc, 0 until initialized
    max_order: u8,
    /// Latest recovered value
    reference: i64,
    /// Running differences, lowest order first
    history: Vec<i64>,
    /// True while nothing was recovered for the current epoch
    missing: bool,
}

impl NumDiff {
    /// Creates a kernel awaiting its initialization token.
    pub fn new() -> Self {
        Self {
            max_order: 0,
            reference: 0,
            history: Vec::with_capacity(9),
            missing: true,
        }
    }

    /// Latest recovered value, in the integer units of the stream
    /// (thousandths of the observation unit, or clock offset ticks).
    pub fn value(&self) -> i64 {
        self.reference
    }

    /// True when the current epoch carried no sample for this stream.
    pub fn missing(&self) -> bool {
        self.missing
    }

    pub(crate) fn set_missing(&mut self) {
        self.missing = true;
    }

    /// Decodes one transmitted token:
    /// `M&value` re-initializes the arc at order `M`, a bare integer
    /// is the next highest order difference, an empty token flags the
    /// sample as absent for this epoch.
    pub fn decode(&mut self, token: &[u8]) -> Result<(), Error> {
        if token.len() >= 3 && token[1] == b'&' {
            // arc initialization
            let digit = token[0];
            if !digit.is_ascii_digit() {
                return Err(Error::InvalidData(format!(
                    "invalid compression order '{}'",
                    digit as char
                )));
            }
            let order = digit - b'0';
            if order == 0 {
                return Err(Error::InvalidMaxDiff(order));
            }

            let reference = parse_i64(&token[2..])?;

            self.max_order = order;
            self.reference = reference;
            self.history.clear();
            self.missing = false;
        } else if !token.is_empty() {
            if self.max_order == 0 {
                self.missing = true;
                return Err(Error::InvalidData(
                    "difference received before arc initialization".to_string(),
                ));
            }

            let value = match parse_i64(token) {
                Ok(value) => value,
                Err(e) => {
                    self.missing = true;
                    return Err(e);
                },
            };

            self.history.push(value);

            // realign the stack to the current epoch once it is full:
            // prefix sums promote each kept difference by one epoch,
            // the oldest entry drops out
            let m = self.max_order as usize;
            if self.history.len() > m {
                for i in (2..=m).rev() {
                    self.history[i - 1] += self.history[i - 2];
                }
                self.history.remove(0);
            }

            // integrate down to a single first order increment
            let mut dv = self.history.clone();
            while dv.len() > 1 {
                for i in 0..dv.len() - 1 {
                    dv[i] += dv[i + 1];
                }
                dv.pop();
            }
            self.reference += dv[0];
            self.missing = false;
        } else {
            // sample absent for this epoch
            self.missing = true;
        }

        Ok(())
    }
}

fn parse_i64(b: &[u8]) -> Result<i64, Error> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            Error::InvalidData(format!(
                "failed to parse integer \"{}\"",
                String::from_utf8_lossy(b)
            ))
        })
}
