//! CRINEX magic and RINEX header handling
//!
//! The two CRINEX specific lines are consumed and validated, then the
//! embedded RINEX header is echoed verbatim while the observation code
//! lists are extracted per satellite system.
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;

use crate::{
    constants::{replace_non_numeric, VALID_SATSYS},
    reader::LineReader,
    Error, Version, WarningList,
};

/// Observation codes per satellite system identifier.
pub type ObsTypes = HashMap<u8, Vec<String>>;

/// Everything recovered from the embedded RINEX header.
pub(crate) struct Header {
    /// Verbatim header echo, `\n` terminated lines
    pub echo: Vec<u8>,
    /// RINEX revision major digit (b'2', b'3' or b'4')
    pub rinex_major: u8,
    /// Observation codes per satellite system
    pub obs_types: ObsTypes,
}

/// Validates the two line CRINEX preamble and returns the compression
/// revision. Line 1 carries the revision and the format magic, line 2
/// (program and date of compression) is discarded.
pub(crate) fn read_magic<R: Read>(lines: &mut LineReader<R>) -> Result<Version, Error> {
    let line = lines.next_line()?.ok_or(Error::BadMagic)?;
    let b = line.as_bytes();

    if b.len() < 40 || &b[20..40] != b"COMPACT RINEX FORMAT" {
        return Err(Error::BadMagic);
    }
    let vers = std::str::from_utf8(&b[..20]).map_err(|_| Error::BadMagic)?;
    let version = Version::from_str(vers)?;

    // "CRINEX PROG / DATE"
    lines.next_line()?;

    Ok(version)
}

/// Echoes RINEX header lines until `END OF HEADER` and collects the
/// observation code lists. Short lines are blank padded and re-tagged
/// as comments. Observation code parse failures downgrade to warnings:
/// the table can still be repaired on first contact with data.
pub(crate) fn scan_header<R: Read>(
    lines: &mut LineReader<R>,
    warnings: &mut WarningList,
) -> Result<Header, Error> {
    let mut echo = Vec::<u8>::with_capacity(4096);
    let mut rinex_major: Option<u8> = None;
    let mut end_of_header = false;

    let mut obs_lines = Vec::<String>::new();
    let mut obs_lines_v2 = Vec::<String>::new();

    while let Some(line) = lines.next_line()? {
        let line = if line.as_bytes().len() < 61 {
            warnings.add(lines.line(), format!("no header label found: '{}'", line));
            format!("{:<60}COMMENT", line)
        } else {
            line
        };

        echo.extend_from_slice(line.as_bytes());
        echo.push(b'\n');

        let label = &line.as_bytes()[60..];
        if label.starts_with(b"RINEX VERSION / TYPE") {
            // '2', '3' or '4'
            rinex_major = line.as_bytes()[..20]
                .iter()
                .copied()
                .find(|b| !b.is_ascii_whitespace());
        } else if label.starts_with(b"SYS / # / OBS TYPES") {
            obs_lines.push(line);
        } else if label.starts_with(b"# / TYPES OF OBSERV") {
            obs_lines_v2.push(line);
        } else if label.starts_with(b"END OF HEADER") {
            end_of_header = true;
            break;
        }
    }

    let rinex_major = rinex_major
        .ok_or_else(|| Error::InvalidHeader("RINEX version not found".to_string()))?;
    if !end_of_header {
        return Err(Error::InvalidHeader("END OF HEADER not found".to_string()));
    }

    let obs_types = if rinex_major >= b'3' {
        match parse_obs_types(&obs_lines) {
            Ok(types) => types,
            Err(e) => {
                // tolerated: the observable count can still be inferred
                // from the first initialization line
                warnings.add(lines.line(), format!("failed to parse obs types: {}", e));
                ObsTypes::new()
            },
        }
    } else if rinex_major >= b'2' {
        match parse_obs_types_v2(&obs_lines_v2, warnings) {
            Ok(types) => types,
            Err(e) => {
                warnings.add(lines.line(), format!("failed to parse obs types: {}", e));
                ObsTypes::new()
            },
        }
    } else {
        return Err(Error::NonSupportedVersion(format!(
            "RINEX {}",
            rinex_major as char
        )));
    };

    Ok(Header {
        echo,
        rinex_major,
        obs_types,
    })
}

/// `SYS / # / OBS TYPES` (RINEX 3/4): one table per satellite system,
/// 3-char codes in columns 8-10, 12-14, ... with a continuation line
/// after every 13 codes.
fn parse_obs_types(buf: &[String]) -> Result<ObsTypes, Error> {
    let mut obs_types = ObsTypes::new();

    let mut k = 0;
    while k < buf.len() {
        let mut s = buf[k].as_bytes();
        if s.len() < 6 {
            return Err(Error::InvalidHeader(format!(
                "obs types line too short: '{}'",
                buf[k]
            )));
        }

        let sat_sys = s[0]; // b'G', b'R', b'E', ...
        let num_codes = std::str::from_utf8(&s[3..6])
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                Error::InvalidHeader(format!("failed to parse obs count: '{}'", buf[k]))
            })?;

        let mut codes = Vec::<String>::with_capacity(num_codes);
        let mut n = 0; // codes on the current line
        let mut idx = 7;
        for i in 0..num_codes {
            if s.len() < idx + 3 {
                return Err(Error::InvalidHeader(format!(
                    "obs types line too short: '{}'",
                    String::from_utf8_lossy(s)
                )));
            }
            codes.push(String::from_utf8_lossy(&s[idx..idx + 3]).into_owned());

            n += 1;
            idx += 4;
            if n == 13 && i + 1 < num_codes {
                // continuation line
                k += 1;
                if k >= buf.len() {
                    return Err(Error::InvalidHeader(
                        "obs types continuation missing".to_string(),
                    ));
                }
                s = buf[k].as_bytes();
                n = 0;
                idx = 7;
            }
        }
        obs_types.insert(sat_sys, codes);
        k += 1;
    }
    Ok(obs_types)
}

/// `# / TYPES OF OBSERV` (RINEX 2): a single table of 2-char codes,
/// 9 per line, registered for every satellite system (the old format
/// does not key them). The count field tolerates stray non numeric
/// characters, one archived production file carries them.
fn parse_obs_types_v2(buf: &[String], warnings: &mut WarningList) -> Result<ObsTypes, Error> {
    let mut obs_types = ObsTypes::new();

    if buf.is_empty() {
        return Err(Error::InvalidHeader(
            "no observation types found".to_string(),
        ));
    }

    let s = &buf[0];
    let head = s.get(..60).unwrap_or(s.as_str());
    let mut fields: Vec<&str> = head.split_ascii_whitespace().collect();
    if !fields.is_empty() {
        fields.remove(0); // the count
    }

    let count_field = &s.as_bytes()[..s.len().min(6)];
    let num_codes = match std::str::from_utf8(count_field)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
    {
        Some(n) => n,
        None => {
            warnings.add(
                0,
                format!(
                    "non numeric observation count '{}'",
                    String::from_utf8_lossy(count_field)
                ),
            );
            let cleaned = replace_non_numeric(count_field);
            std::str::from_utf8(&cleaned)
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| {
                    Error::InvalidHeader(format!(
                        "failed to parse obs count: '{}'",
                        String::from_utf8_lossy(count_field)
                    ))
                })?
        },
    };

    let mut codes = Vec::<String>::with_capacity(num_codes);

    let mut k = 0;
    let mut n = 0; // codes on the current line
    for i in 0..num_codes {
        let field = fields.get(n).ok_or_else(|| {
            Error::InvalidHeader(format!(
                "not enough observation codes, expecting {}",
                num_codes
            ))
        })?;
        if field.len() < 2 || !field.is_char_boundary(2) {
            return Err(Error::InvalidHeader(format!(
                "failed to parse obs code: '{}'",
                field
            )));
        }
        codes.push(field[..2].to_string());

        n += 1;
        if n == 9 && i + 1 < num_codes {
            // continuation line
            k += 1;
            if k >= buf.len() {
                return Err(Error::InvalidHeader(
                    "obs types continuation missing".to_string(),
                ));
            }
            let s = &buf[k];
            let head = s.get(..60).unwrap_or(s.as_str());
            fields = head.split_ascii_whitespace().collect();
            n = 0;
        }
    }

    // the V2 table applies to every system, a blank denotes GPS
    for sat_sys in VALID_SATSYS {
        obs_types.insert(sat_sys, codes.clone());
    }
    Ok(obs_types)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::BufferedReader;

    fn lines(content: &str) -> LineReader<&[u8]> {
        LineReader::new(BufferedReader::plain(content.as_bytes()))
    }

    #[test]
    fn magic() {
        let mut reader = lines(
            "3.0                 COMPACT RINEX FORMAT                    CRINEX VERS   / TYPE\n\
             RNX2CRX ver.4.0.7                       01-Jan-20 00:00     CRINEX PROG / DATE\n",
        );
        assert_eq!(read_magic(&mut reader).unwrap(), Version::V3_0);

        let mut reader = lines("1.0                 COMPACT RINEX");
        assert!(matches!(read_magic(&mut reader), Err(Error::BadMagic)));

        let mut reader = lines(
            "2.0                 COMPACT RINEX FORMAT                    CRINEX VERS   / TYPE\n",
        );
        assert!(matches!(
            read_magic(&mut reader),
            Err(Error::NonSupportedVersion(_))
        ));
    }

    #[test]
    fn v3_obs_types() {
        let content = r"     3.04           OBSERVATION DATA    M                   RINEX VERSION / TYPE
G    6 C1C L1C S1C C2W L2W S2W                              SYS / # / OBS TYPES
R    4 C1C L1C C2P L2P                                      SYS / # / OBS TYPES
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        let header = scan_header(&mut lines(content), &mut warnings).unwrap();
        assert_eq!(header.rinex_major, b'3');
        assert_eq!(
            header.obs_types.get(&b'G').unwrap(),
            &["C1C", "L1C", "S1C", "C2W", "L2W", "S2W"]
        );
        assert_eq!(header.obs_types.get(&b'R').unwrap().len(), 4);
        assert!(warnings.is_empty());
        assert_eq!(header.echo.split(|b| *b == b'\n').count(), 5); // 4 lines + tail
    }

    #[test]
    fn v3_obs_types_continuation() {
        let content = r"     3.04           OBSERVATION DATA    M                   RINEX VERSION / TYPE
E   16 C1C L1C S1C C5Q L5Q S5Q C7Q L7Q S7Q C8Q L8Q S8Q C6C  SYS / # / OBS TYPES
       L6C S6C D6C                                          SYS / # / OBS TYPES
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        let header = scan_header(&mut lines(content), &mut warnings).unwrap();
        let codes = header.obs_types.get(&b'E').unwrap();
        assert_eq!(codes.len(), 16);
        assert_eq!(codes[12], "C6C");
        assert_eq!(codes[13], "L6C");
        assert_eq!(codes[15], "D6C");
    }

    #[test]
    fn v2_obs_types() {
        let content = r"     2.11           OBSERVATION DATA    M (MIXED)           RINEX VERSION / TYPE
     6    C1    L1    L2    P2    S1    S2                  # / TYPES OF OBSERV
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        let header = scan_header(&mut lines(content), &mut warnings).unwrap();
        assert_eq!(header.rinex_major, b'2');
        let codes = header.obs_types.get(&b'G').unwrap();
        assert_eq!(codes, &["C1", "L1", "L2", "P2", "S1", "S2"]);
        // same table registered for every system, blank included
        assert_eq!(header.obs_types.get(&b' ').unwrap(), codes);
        assert_eq!(header.obs_types.get(&b'R').unwrap(), codes);
        assert!(warnings.is_empty());
    }

    #[test]
    fn v2_obs_types_non_numeric_count() {
        let content = r"     2.11           OBSERVATION DATA    M (MIXED)           RINEX VERSION / TYPE
    x5    C1    L1    L2    P2    P1                        # / TYPES OF OBSERV
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        let header = scan_header(&mut lines(content), &mut warnings).unwrap();
        let codes = header.obs_types.get(&b'G').unwrap();
        assert_eq!(codes, &["C1", "L1", "L2", "P2", "P1"]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn short_lines_become_comments() {
        let content = r"     2.11           OBSERVATION DATA    M (MIXED)           RINEX VERSION / TYPE
short line
     6    C1    L1    L2    P2    S1    S2                  # / TYPES OF OBSERV
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        let header = scan_header(&mut lines(content), &mut warnings).unwrap();
        let echo = String::from_utf8(header.echo).unwrap();
        assert!(echo.contains(&format!("{:<60}COMMENT\n", "short line")));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings.as_slice()[0].line, 2);
    }

    #[test]
    fn header_validation() {
        // missing RINEX version
        let content = "\
                                                            END OF HEADER
";
        let mut warnings = WarningList::new();
        assert!(matches!(
            scan_header(&mut lines(content), &mut warnings),
            Err(Error::InvalidHeader(_))
        ));

        // missing END OF HEADER
        let content = "\
     2.11           OBSERVATION DATA    M (MIXED)           RINEX VERSION / TYPE
";
        assert!(matches!(
            scan_header(&mut lines(content), &mut warnings),
            Err(Error::InvalidHeader(_))
        ));
    }
}
