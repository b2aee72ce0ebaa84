//! Column exact RINEX emission helpers
use log::warn;
use num_integer::div_ceil;

use crate::TextDiff;

/// Formats an observation held as integer thousandths into the exact
/// 14-byte RINEX field (`%14.3f` of `n * 0.001`), in pure integer
/// arithmetic. Values outside the signed 13-digit field are clamped
/// to the representable extreme and reported, the stream goes on.
pub fn value_field(n: i64) -> [u8; 14] {
    if !(-999_999_999_999..=9_999_999_999_999).contains(&n) {
        warn!("observation value overflow: v='{}'", n);
        return if n > 0 {
            *b"9999999999.999"
        } else {
            *b"-999999999.999"
        };
    }

    let mut buf: [u8; 14] = *b"         0.000";
    let neg = n < 0;
    let mut n = n.unsigned_abs();

    let mut pos = buf.len();
    let mut i = 0;
    loop {
        pos -= 1;
        buf[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if i == 2 {
            // skip over the decimal point already in place
            pos -= 1;
        }
        if n == 0 {
            if neg {
                pos -= 1;
                if i < 3 {
                    // magnitude below 1.000: sign sits against "0.xxx"
                    buf[8] = b'-';
                } else {
                    buf[pos] = b'-';
                }
            }
            return buf;
        }
        i += 1;
    }
}

/// Recovers the modern (RINEX 3/4) epoch line: the epoch record
/// truncated at the satellite list, the optional receiver clock in
/// units of 1e-12 s, and for CRINEX 3.1 the optional pico-second
/// field, right aligned on 5 columns.
pub(crate) fn epoch_line_v3(epoch: &TextDiff, clock: Option<i64>, pico: Option<&[u8]>) -> Vec<u8> {
    let view = String::from_utf8_lossy(epoch.epoch_v3());
    let mut line = format!("{:<35.35}", view);
    if let Some(clock) = clock {
        line.push_str(&format!("      {:15.12}", clock as f64 * 1.0e-12));
    }
    if let Some(pico) = pico {
        line.push_str(&format!("{:>5}", String::from_utf8_lossy(pico)));
    }
    line.push('\n');
    line.into_bytes()
}

/// Recovers the old (RINEX 2) epoch lines from the V1 epoch record:
/// the satellite list wraps after 12 IDs onto 32-column indented
/// continuation lines, and the optional receiver clock (units of
/// 1e-9 s) is appended to the first line only.
pub(crate) fn epoch_line_v1(epoch: &TextDiff, clock: Option<i64>) -> Vec<u8> {
    let buf = epoch.as_bytes();
    let numsat = std::str::from_utf8(buf.get(29..32).unwrap_or(b""))
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut out = String::with_capacity(80 * div_ceil(numsat.max(1), 12));

    if numsat > 12 {
        let first = slice_lossy(buf, 1, 68);
        match clock {
            Some(clock) => out.push_str(&format!(
                " {:>67}{:12.9}\n",
                first,
                clock as f64 * 1.0e-9
            )),
            None => out.push_str(&format!(" {:>67}\n", first)),
        }

        // continuation lines, 12 IDs each
        let mut i = 1;
        while numsat > 12 * i {
            if numsat >= 12 * (i + 1) {
                let ids = slice_lossy(buf, 32 + 36 * i, 32 + 36 * (i + 1));
                out.push_str(&format!("{:32}{:<36.36}\n", "", ids));
            } else {
                let ids = slice_lossy(buf, 32 + 36 * i, 32 + 36 * i + 3 * (numsat % 12));
                out.push_str(&format!("{:32}{}\n", "", ids));
            }
            i += 1;
        }
    } else {
        let first = slice_lossy(buf, 1, 32 + 3 * numsat);
        match clock {
            Some(clock) => out.push_str(&format!(
                " {:<67}{:12.9}\n",
                first,
                clock as f64 * 1.0e-9
            )),
            None => out.push_str(&format!(" {}\n", first)),
        }
    }

    out.into_bytes()
}

fn slice_lossy(buf: &[u8], start: usize, end: usize) -> std::borrow::Cow<'_, str> {
    let start = start.min(buf.len());
    let end = end.min(buf.len());
    String::from_utf8_lossy(&buf[start..end])
}
