//! Epoch record interpretation
//!
//! The recovered epoch record carries the timestamp, the epoch flag,
//! the satellite counter and the packed satellite list. Archived files
//! are known to carry malformed satellite lists, a few specific shapes
//! are repaired here instead of dropping the whole epoch.
use hifitime::Epoch;

use crate::{
    constants::{is_numeric, VALID_SATSYS},
    Error, Version, WarningList,
};

/// Converts the recovered epoch record to an UTC timestamp.
pub(crate) fn epoch_to_utc(b: &[u8], version: Version) -> Result<Epoch, Error> {
    match version {
        Version::V3_0 | Version::V3_1 => {
            // "> YYYY mm dd HH MM SS.fffffff"
            if b.len() < 29 {
                return Err(Error::InvalidEpochStr(format!(
                    "epoch record too short: '{}'",
                    String::from_utf8_lossy(b)
                )));
            }
            let year = parse_field(&b[2..6])?;
            let month = parse_field(&b[7..9])? as u8;
            let day = parse_field(&b[10..12])? as u8;
            let hours = parse_field(&b[13..15])? as u8;
            let minutes = parse_field(&b[16..18])? as u8;
            let (seconds, nanos) = parse_seconds(&b[19..29])?;

            Epoch::maybe_from_gregorian_utc(year, month, day, hours, minutes, seconds, nanos)
                .map_err(|_| {
                    Error::InvalidEpochStr(format!(
                        "invalid timestamp: '{}'",
                        String::from_utf8_lossy(b)
                    ))
                })
        },
        Version::V1_0 => {
            // " YY mm dd HH MM SS.fffffff", 100ns resolution
            if b.len() < 26 {
                return Err(Error::InvalidEpochStr(format!(
                    "epoch record too short: '{}'",
                    String::from_utf8_lossy(b)
                )));
            }
            // blank columns must sit where the format puts them
            if (b[0] != b' ' && b[0] != b'&')
                || b[3] != b' '
                || b[6] != b' '
                || b[9] != b' '
                || b[12] != b' '
                || b[15] != b' '
            {
                return Err(Error::InvalidEpochStr(format!(
                    "invalid timestamp: '{}'",
                    String::from_utf8_lossy(b)
                )));
            }

            let yy = parse_field(&b[1..3])?;
            let month = parse_field(&b[4..6])? as u8;
            let day = parse_field(&b[7..9])? as u8;
            let hours = parse_field(&b[10..12])? as u8;
            let minutes = parse_field(&b[13..15])? as u8;
            let seconds = parse_blank_field(&b[16..18])? as u8;
            let nanos = parse_blank_field(&b[19..26])? as u32 * 100;

            // two digit year pivot
            let year = if yy >= 80 { yy + 1900 } else { yy + 2000 };

            Epoch::maybe_from_gregorian_utc(year, month, day, hours, minutes, seconds, nanos)
                .map_err(|_| {
                    Error::InvalidEpochStr(format!(
                        "invalid timestamp: '{}'",
                        String::from_utf8_lossy(b)
                    ))
                })
        },
    }
}

fn parse_field(b: &[u8]) -> Result<i32, Error> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .ok_or_else(|| {
            Error::InvalidEpochStr(format!(
                "failed to parse timestamp field '{}'",
                String::from_utf8_lossy(b)
            ))
        })
}

/// Like [parse_field], an all blank field reads as 0.
fn parse_blank_field(b: &[u8]) -> Result<i32, Error> {
    if b.iter().all(|b| *b == b' ') {
        return Ok(0);
    }
    parse_field(b)
}

/// Splits "SS.fffffff" into whole seconds and nanoseconds.
fn parse_seconds(b: &[u8]) -> Result<(u8, u32), Error> {
    let dot = match b.iter().position(|b| *b == b'.') {
        Some(dot) => dot,
        None => return Ok((parse_blank_field(b)? as u8, 0)),
    };
    let seconds = parse_blank_field(&b[..dot])? as u8;

    let frac = &b[dot + 1..];
    let mut nanos = parse_blank_field(frac)? as u32;
    for _ in frac.len()..9 {
        nanos *= 10;
    }
    Ok((seconds, nanos))
}

/// Packed satellite IDs, 3 bytes each, from the satellite list section
/// of the epoch record.
pub(crate) fn sat_list(b: &[u8], version: Version) -> Vec<String> {
    let mut list = Vec::new();
    let mut s = b;
    while let Some((&b' ', rem)) = s.split_last() {
        s = rem;
    }
    let mut i = version.satlist_offset();
    while i + 3 <= s.len() {
        list.push(String::from_utf8_lossy(&s[i..i + 3]).into_owned());
        i += 3;
    }
    list
}

/// Extracts the satellite list, repairing the malformed shapes observed
/// in archived files. Every repair is reported as a warning. Satellites
/// that remain unusable are skipped, they carry no data line.
pub(crate) fn sat_list_with_correction(
    b: &[u8],
    version: Version,
    line: usize,
    warnings: &mut WarningList,
) -> Result<Vec<String>, Error> {
    let offset_numsat = version.numsat_offset();
    let offset_satlist = version.satlist_offset();

    if b.len() < offset_satlist {
        return Err(Error::InvalidSatList(format!(
            "no satellite list found: '{}'",
            String::from_utf8_lossy(b)
        )));
    }

    let numsat = std::str::from_utf8(&b[offset_numsat..offset_numsat + 3])
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            Error::InvalidSatList(format!(
                "failed to parse satellite count: '{}'",
                String::from_utf8_lossy(b)
            ))
        })?;

    let mut b = b.to_vec();
    let trimmed_len = trimmed_len(&b);
    if trimmed_len != offset_satlist + 3 * numsat {
        warnings.add(
            line,
            format!(
                "length of epoch record is wrong: '{}'",
                String::from_utf8_lossy(&b)
            ),
        );

        if trimmed_len < offset_satlist + 3 * numsat {
            // IDs lost their blank padding ("  4" compressed to " 4"):
            // re-tokenize the tail and rebuild 3-byte wide fields
            let fields: Vec<&[u8]> = b[offset_satlist..]
                .split(|b| *b == b' ')
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() == numsat {
                warnings.add(line, "renormalized satellite IDs to 3-byte fields");
                let mut repaired = b[..offset_satlist].to_vec();
                for field in fields {
                    let field = &field[..field.len().min(3)];
                    for _ in field.len()..3 {
                        repaired.push(b' ');
                    }
                    repaired.extend_from_slice(field);
                }
                b = repaired;
            }
        } else if trimmed_len == offset_satlist + 3 * numsat + 1 && b[offset_satlist] == b' ' {
            // one stray blank shifted the whole list right
            warnings.add(line, "deleted an extra space before the satellite list");
            b.remove(offset_satlist);
        }
    }

    let mut list = sat_list(&b, version);

    // consistency between the satellite counter and the list
    if list.len() != numsat {
        warnings.add(
            line,
            format!(
                "mismatch between satellite count and list: n={}, list={:?}",
                numsat, list
            ),
        );

        // one truncated trailing ID can still be recovered
        let i = offset_satlist + 3 * list.len();
        if b.len() >= i + 2 {
            if let Some(sat_id) = repair_sat_id(&b[i..i + 2]) {
                warnings.add(
                    line,
                    format!(
                        "recovered invalid satellite ID '{}' -> '{}'",
                        String::from_utf8_lossy(&b[i..i + 2]),
                        sat_id
                    ),
                );
                list.push(sat_id);
            }
        }
    }

    // unusable entries are dropped: their system is unknown or their
    // ID is still misaligned, no data line will follow for them
    list.retain(|sat_id| {
        let id = sat_id.as_bytes();
        let usable = VALID_SATSYS.contains(&id[0]) && id[2] != b' ';
        if !usable {
            warnings.add(line, format!("skipped invalid satellite ID '{}'", sat_id));
        }
        usable
    });

    Ok(list)
}

/// Rebuilds "X9" as "X 9", one shape of truncated trailing ID found in
/// archived files.
fn repair_sat_id(b: &[u8]) -> Option<String> {
    if b.len() < 2 {
        return None;
    }
    if VALID_SATSYS.contains(&b[0]) && is_numeric(b[1]) {
        let id = [b[0], b' ', b[1]];
        return Some(String::from_utf8_lossy(&id).into_owned());
    }
    None
}

fn trimmed_len(b: &[u8]) -> usize {
    let mut s = b;
    while let Some((&b' ', rem)) = s.split_last() {
        s = rem;
    }
    s.len()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v3_timestamp() {
        let b = b"> 2022 03 04 00 30 15.5000000  0  4";
        let epoch = epoch_to_utc(b, Version::V3_0).unwrap();
        assert_eq!(
            epoch,
            Epoch::from_gregorian_utc(2022, 3, 4, 0, 30, 15, 500_000_000)
        );

        assert!(epoch_to_utc(b"> 2022 03", Version::V3_0).is_err());
        assert!(epoch_to_utc(
            b"> xxxx 03 04 00 30 15.5000000  0  4",
            Version::V3_0
        )
        .is_err());
    }

    #[test]
    fn v1_timestamp() {
        let b = b"&99  6 12  0 14  0.0000000  0  8";
        let epoch = epoch_to_utc(b, Version::V1_0).unwrap();
        assert_eq!(epoch, Epoch::from_gregorian_utc(1999, 6, 12, 0, 14, 0, 0));

        // year pivot: < 80 maps past 2000
        let b = b" 21  1  2  3  4  5.1234567  0  8";
        let epoch = epoch_to_utc(b, Version::V1_0).unwrap();
        assert_eq!(
            epoch,
            Epoch::from_gregorian_utc(2021, 1, 2, 3, 4, 5, 123_456_700)
        );

        // blank seconds read as zero
        let b = b" 21  1  2  3  4   .       0  8";
        let epoch = epoch_to_utc(b, Version::V1_0).unwrap();
        assert_eq!(epoch, Epoch::from_gregorian_utc(2021, 1, 2, 3, 4, 0, 0));

        // misplaced separator columns are rejected
        let b = b"x21  1  2  3  4  5.1234567  0  8";
        assert!(epoch_to_utc(b, Version::V1_0).is_err());
    }

    #[test]
    fn nominal_list() {
        let b = b"> 2022 03 04 00 00  0.0000000  0  3      G01G22R03";
        let list = sat_list(b, Version::V3_0);
        assert_eq!(list, vec!["G01", "G22", "R03"]);

        let b = b" 99  6 12  0 14  0.0000000  0  2 18 14";
        let list = sat_list(b, Version::V1_0);
        assert_eq!(list, vec![" 18", " 14"]);
    }

    #[test]
    fn correction_not_needed() {
        let b = b"> 2022 03 04 00 00  0.0000000  0  2      G01G22";
        let mut warnings = WarningList::new();
        let list = sat_list_with_correction(b, Version::V3_0, 1, &mut warnings).unwrap();
        assert_eq!(list, vec!["G01", "G22"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn squeezed_ids_renormalized() {
        // " 4" lost its padding: the tail re-tokenizes to exactly 8 IDs
        let b = b" 99  6 12  0 14  0.0000000  0  8 18 14 27 16 4 19 22 15";
        let mut warnings = WarningList::new();
        let list = sat_list_with_correction(b, Version::V1_0, 281, &mut warnings).unwrap();
        assert_eq!(
            list,
            vec![" 18", " 14", " 27", " 16", "  4", " 19", " 22", " 15"]
        );
        assert!(!warnings.is_empty());
        assert_eq!(warnings.as_slice()[0].line, 281);
    }

    #[test]
    fn extra_leading_space_deleted() {
        let b = b" 99  8 13  0 20 30.0000000  0  8  07 27 18 04 10 02 19 13";
        let mut warnings = WarningList::new();
        let list = sat_list_with_correction(b, Version::V1_0, 433, &mut warnings).unwrap();
        assert_eq!(
            list,
            vec![" 07", " 27", " 18", " 04", " 10", " 02", " 19", " 13"]
        );
        assert!(!warnings.is_empty());
    }

    #[test]
    fn truncated_trailing_id() {
        // last ID collapsed to "G9": recovered as "G 9"
        let b = b"> 2022 03 04 00 00  0.0000000  0  3      G01G22G9";
        let mut warnings = WarningList::new();
        let list = sat_list_with_correction(b, Version::V3_0, 7, &mut warnings).unwrap();
        assert_eq!(list, vec!["G01", "G22", "G 9"]);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn unusable_ids_skipped() {
        let b = b"> 2022 03 04 00 00  0.0000000  0  3      G01Z02R1 X";
        let mut warnings = WarningList::new();
        let list = sat_list_with_correction(b, Version::V3_0, 9, &mut warnings).unwrap();
        assert_eq!(list, vec!["G01"]);
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.msg.contains("skipped invalid satellite"))
                .count(),
            2
        );
    }

    #[test]
    fn unusable_record() {
        let mut warnings = WarningList::new();
        assert!(matches!(
            sat_list_with_correction(b"> 2022", Version::V3_0, 1, &mut warnings),
            Err(Error::InvalidSatList(_))
        ));
        assert!(matches!(
            sat_list_with_correction(
                b"> 2022 03 04 00 00  0.0000000  0  x      G01",
                Version::V3_0,
                1,
                &mut warnings
            ),
            Err(Error::InvalidSatList(_))
        ));
    }
}
