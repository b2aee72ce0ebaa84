//! CRINEX pull scanner
//!
//! [Scanner] drives the decompression epoch by epoch: the caller pulls
//! with [Scanner::scan_epoch] and reads the recovered epoch through the
//! accessors, either as values or as ready to write RINEX bytes.
use std::collections::HashMap;
use std::io::Read;

use hifitime::Epoch;

use crate::{
    constants::all_numeric,
    epoch::{epoch_to_utc, sat_list_with_correction},
    formatter::{epoch_line_v1, epoch_line_v3, value_field},
    header::{read_magic, scan_header, ObsTypes},
    obs::SatDiff,
    reader::{BufferedReader, LineReader},
    Error, NumDiff, TextDiff, Version, WarningList,
};

/// One recovered observation: a value with its flag columns.
#[derive(Debug, Clone, Copy)]
pub struct ObsData {
    /// Observation in its physical unit, NaN when absent this epoch
    pub value: f64,
    /// Loss-of-lock indicator
    pub lli: u8,
    /// Signal strength indicator
    pub ssi: u8,
}

/// All observations of one satellite for the current epoch, ordered
/// like the observation codes of its system.
#[derive(Debug, Clone)]
pub struct SatObservations {
    pub sat_id: String,
    pub observations: Vec<ObsData>,
}

/// Outcome of one epoch scan.
enum Scan {
    /// Epoch fully recovered
    Complete,
    /// Stream ended inside the epoch, truncated content is published
    Partial,
    /// Stream ended before anything new was recovered
    Eof,
}

/// [Scanner] decompresses one CRINEX stream sequentially.
///
/// ```no_run
/// use std::fs::File;
/// use crinex::Scanner;
///
/// let fd = File::open("ACOR00ESP_R_20213550000_01D_30S_MO.crx").unwrap();
/// let mut scanner = Scanner::new(fd).unwrap();
/// scanner.parse_header().unwrap();
/// while scanner.scan_epoch() {
///     let t = scanner.epoch_time().unwrap();
///     for sat in scanner.observations() {
///         println!("{} {}: {:?}", t, sat.sat_id, sat.observations);
///     }
/// }
/// ```
pub struct Scanner<R: Read> {
    /// Compression revision, from the stream magic
    version: Version,
    lines: LineReader<R>,

    /// Verbatim RINEX header echo
    header: Vec<u8>,
    header_parsed: bool,
    /// Observation codes per satellite system
    obs_types: ObsTypes,

    /// Epoch record text state
    epoch_rec: TextDiff,
    /// Pico-second clock field text state (CRINEX 3.1)
    pico_sec: TextDiff,
    /// Receiver clock offset state
    clock: NumDiff,
    /// Per satellite state, keyed by 3-byte satellite ID,
    /// dropped on every initialization
    data: HashMap<String, SatDiff>,

    /// Satellite list of the current epoch
    sat_list: Vec<String>,
    /// Timestamp of the current epoch
    epoch: Option<Epoch>,

    /// Verbatim special event lines skipped since the last scan
    events: Vec<String>,

    warnings: WarningList,
    error: Option<Error>,
}

impl<R: Read> Scanner<R> {
    /// Sets the scanner up over a readable CRINEX stream: the two
    /// magic lines are consumed and validated here.
    pub fn new(r: R) -> Result<Self, Error> {
        Self::from_reader(BufferedReader::plain(r))
    }

    /// Sets the scanner up over a Gzip compressed CRINEX stream.
    #[cfg(feature = "flate2")]
    pub fn gzip(r: R) -> Result<Self, Error> {
        Self::from_reader(BufferedReader::gzip(r))
    }

    fn from_reader(reader: BufferedReader<R>) -> Result<Self, Error> {
        let mut lines = LineReader::new(reader);
        let version = read_magic(&mut lines)?;
        Ok(Self {
            version,
            lines,
            header: Vec::new(),
            header_parsed: false,
            obs_types: ObsTypes::new(),
            epoch_rec: TextDiff::new(),
            pico_sec: TextDiff::new(),
            clock: NumDiff::new(),
            data: HashMap::new(),
            sat_list: Vec::new(),
            epoch: None,
            events: Vec::new(),
            warnings: WarningList::new(),
            error: None,
        })
    }

    /// Compression revision announced by the stream.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Consumes the embedded RINEX header, up to `END OF HEADER`.
    /// Called implicitly by the first [Scanner::scan_epoch] otherwise.
    pub fn parse_header(&mut self) -> Result<(), Error> {
        if self.header_parsed {
            return Ok(());
        }
        let header = scan_header(&mut self.lines, &mut self.warnings)?;
        self.header = header.echo;
        self.obs_types = header.obs_types;
        self.header_parsed = true;
        Ok(())
    }

    /// Advances to the next epoch and recovers it. Returns false at
    /// end of stream or on a fatal error (see [Scanner::err]).
    /// Recoverable issues resynchronize on the next initialization
    /// record and are reported in [Scanner::warnings].
    pub fn scan_epoch(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if !self.header_parsed {
            if let Err(e) = self.parse_header() {
                self.error = Some(e);
                return false;
            }
        }

        let mut line = match self.lines.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => return false,
            Err(e) => {
                self.error = Some(e.into());
                return false;
            },
        };

        loop {
            match self.scan_epoch_inner(&line) {
                Ok(Scan::Eof) => return false,
                Ok(_) => return true,
                Err(e) if e.recoverable() => {
                    // an initialization marker buried mid-line is worth
                    // one retry on the truncated record (V3 only, the
                    // V1 marker is ambiguous with regular content)
                    if let Some(i) = line.find('>') {
                        if i > 0 {
                            self.warnings
                                .add(self.lines.line(), format!("epoch record modified: '{}'", line));
                            line = line.split_off(i);
                            continue;
                        }
                    }

                    // resynchronize on the next initialization record
                    self.warnings
                        .add(self.lines.line(), format!("scanning forward: {}", e));
                    loop {
                        match self.lines.next_line() {
                            Ok(Some(l)) => {
                                if l.starts_with('>') || l.starts_with('&') {
                                    line = l;
                                    break;
                                }
                            },
                            Ok(None) => {
                                self.error = Some(e);
                                return false;
                            },
                            Err(io) => {
                                self.error = Some(io.into());
                                return false;
                            },
                        }
                    }
                },
                Err(e) => {
                    self.error = Some(e);
                    return false;
                },
            }
        }
    }

    fn scan_epoch_inner(&mut self, epoch_line: &str) -> Result<Scan, Error> {
        // (1) epoch record
        if self.update_epoch_rec(epoch_line)?.is_none() {
            return Ok(Scan::Eof);
        }
        let epoch_line_num = self.lines.line();

        // (2) receiver clock offset, with the CRINEX 3.1 pico-second
        // extension as a second field
        let clock_line = match self.lines.next_line()? {
            Some(line) => line,
            None => {
                self.clock.set_missing();
                self.sat_list = sat_list_with_correction(
                    self.epoch_rec.as_bytes(),
                    self.version,
                    epoch_line_num,
                    &mut self.warnings,
                )?;
                return Ok(Scan::Partial);
            },
        };
        let mut fields = clock_line.splitn(2, ' ');
        self.clock.decode(fields.next().unwrap_or("").as_bytes())?;
        if self.version == Version::V3_1 {
            if let Some(pico) = fields.next() {
                self.pico_sec.decode(pico.as_bytes());
            }
        }

        // (3) satellite list of this epoch
        self.sat_list = sat_list_with_correction(
            self.epoch_rec.as_bytes(),
            self.version,
            epoch_line_num,
            &mut self.warnings,
        )?;

        // (4) one data line per satellite
        let sat_list = self.sat_list.clone();
        for (i, sat_id) in sat_list.iter().enumerate() {
            let line = match self.lines.next_line()? {
                Some(line) => line,
                None => {
                    // record interrupted: publish the satellites read
                    if i > 0 {
                        self.truncate_satellites(i);
                    }
                    return Ok(Scan::Partial);
                },
            };

            let sat_sys = sat_id.as_bytes()[0];
            let numobs = match self.obs_types.get(&sat_sys) {
                Some(codes) => codes.len(),
                None => {
                    if !self.version.is_v3() {
                        return Err(Error::InvalidData(format!(
                            "unknown satellite system '{}'",
                            sat_sys as char
                        )));
                    }
                    // repair the table from the line shape itself
                    let numobs = line.trim_end().bytes().filter(|b| *b == b' ').count();
                    self.warnings.add(
                        self.lines.line(),
                        format!(
                            "unknown satellite system '{}', inferred {} observables",
                            sat_sys as char, numobs
                        ),
                    );
                    self.obs_types
                        .insert(sat_sys, vec!["   ".to_string(); numobs]);
                    numobs
                },
            };

            let vals: Vec<&str> = line.splitn(numobs + 1, ' ').collect();

            let v3 = self.version.is_v3();
            let sat = self.data.entry(sat_id.clone()).or_insert_with(|| {
                if v3 {
                    SatDiff::new(numobs)
                } else {
                    SatDiff::new_v1(numobs)
                }
            });

            for j in 0..numobs {
                if vals.len() <= j {
                    // line ended early: trailing observables absent
                    sat.data[j].set_missing();
                    continue;
                }
                let token = vals[j].as_bytes();
                sat.data[j].decode(token)?;

                // V1 arc initialization resets the flag columns too
                if !v3 && token.len() > 1 && token[1] == b'&' {
                    sat.lli[j].set_first(b' ');
                    sat.ssi[j].set_first(b' ');
                }
            }

            // trailing field: LLI and SS columns interleaved,
            // one character each per observable
            if vals.len() == numobs + 1 {
                let mut flags = vals[numobs].as_bytes().to_vec();
                if flags.len() < numobs * 2 {
                    flags.resize(numobs * 2, b' ');
                }
                for j in 0..numobs {
                    sat.lli[j].decode(&flags[2 * j..2 * j + 1]);
                    sat.ssi[j].decode(&flags[2 * j + 1..2 * j + 2]);
                }
            }
        }

        Ok(Scan::Complete)
    }

    /// Latches the epoch record, skipping over special event blocks.
    /// Returns None when the stream ends before a new epoch record.
    fn update_epoch_rec(&mut self, epoch_line: &str) -> Result<Option<()>, Error> {
        let mut line = epoch_line.to_string();
        let mut after_event = false;

        let initialized = loop {
            let (initialized, num_skip) = check_initialized(&line)?;

            if num_skip > 0 {
                // special event: the announced lines are not diff
                // encoded, they are retained verbatim
                self.events.push(line);
                for _ in 0..num_skip {
                    match self.lines.next_line()? {
                        Some(l) => self.events.push(l),
                        None => return Ok(None),
                    }
                }
                line = match self.lines.next_line()? {
                    Some(l) => l,
                    None => return Ok(None),
                };
                after_event = true;
                continue;
            }

            if after_event && !initialized {
                return Err(Error::InvalidEpochStr(format!(
                    "initialization expected after event records: '{}'",
                    line
                )));
            }
            break initialized;
        };

        if initialized {
            self.epoch_rec.force_init(line.as_bytes());
            self.pico_sec = TextDiff::new();
            self.data.clear();
        } else {
            self.epoch_rec.decode(line.as_bytes());
        }

        self.epoch = Some(epoch_to_utc(self.epoch_rec.as_bytes(), self.version)?);
        Ok(Some(()))
    }

    /// Rewrites the satellite counter when the stream ends inside a
    /// data block, so the published epoch stays self consistent.
    fn truncate_satellites(&mut self, n: usize) {
        if n > 999 {
            return;
        }
        self.sat_list.truncate(n);

        let counter = format!("{:3}", n);
        let offset = self.version.numsat_offset();
        let v1 = !self.version.is_v3();

        let buf = self.epoch_rec.buf_mut();
        if buf.len() < offset + 3 {
            return;
        }
        buf[offset..offset + 3].copy_from_slice(counter.as_bytes());

        if v1 {
            let end = 32 + 3 * n;
            if buf.len() > end {
                buf.truncate(end);
            }
        }
    }

    /// Verbatim RINEX header echo.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Observation codes per satellite system identifier.
    pub fn obs_types(&self) -> &ObsTypes {
        &self.obs_types
    }

    /// UTC timestamp of the current epoch.
    pub fn epoch_time(&self) -> Option<Epoch> {
        self.epoch
    }

    /// Satellites of the current epoch, in stream order.
    pub fn sat_list(&self) -> &[String] {
        &self.sat_list
    }

    /// Receiver clock offset in seconds, NaN when missing.
    pub fn clock_offset(&self) -> f64 {
        if self.clock.missing() {
            return f64::NAN;
        }
        match self.version {
            Version::V1_0 => self.clock.value() as f64 * 1.0e-9,
            _ => self.clock.value() as f64 * 1.0e-12,
        }
    }

    /// Pico-second clock field (CRINEX 3.1), -1 when absent or not a
    /// plain unsigned number.
    pub fn pico_seconds(&self) -> i32 {
        if self.version != Version::V3_1 {
            return -1;
        }
        let b = self.pico_sec.as_bytes();
        if !all_numeric(b) {
            return -1;
        }
        std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(-1)
    }

    /// Recovered observations of the current epoch, one entry per
    /// satellite, values in physical units with NaN for missing.
    pub fn observations(&self) -> Vec<SatObservations> {
        self.sat_list
            .iter()
            .map(|sat_id| {
                let mut observations = Vec::new();
                if let Some(sat) = self.data.get(sat_id) {
                    for k in 0..sat.numobs() {
                        if sat.data[k].missing() {
                            observations.push(ObsData {
                                value: f64::NAN,
                                lli: b' ',
                                ssi: b' ',
                            });
                        } else {
                            observations.push(ObsData {
                                value: sat.data[k].value() as f64 * 0.001,
                                lli: sat.lli[k].first_or_space(),
                                ssi: sat.ssi[k].first_or_space(),
                            });
                        }
                    }
                }
                SatObservations {
                    sat_id: sat_id.clone(),
                    observations,
                }
            })
            .collect()
    }

    /// Current epoch line(s), in RINEX form.
    pub fn epoch_as_bytes(&self) -> Vec<u8> {
        let clock = if self.clock.missing() {
            None
        } else {
            Some(self.clock.value())
        };
        match self.version {
            Version::V1_0 => epoch_line_v1(&self.epoch_rec, clock),
            _ => {
                let pico = if self.version == Version::V3_1 && !self.pico_sec.is_empty() {
                    Some(self.pico_sec.as_bytes())
                } else {
                    None
                };
                epoch_line_v3(&self.epoch_rec, clock, pico)
            },
        }
    }

    /// Current data block, in RINEX form.
    pub fn data_as_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::<u8>::with_capacity(self.sat_list.len() * 80);

        if self.version.is_v3() {
            for sat_id in &self.sat_list {
                let mut line = Vec::<u8>::with_capacity(80);
                line.extend_from_slice(sat_id.as_bytes());

                if let Some(sat) = self.data.get(sat_id) {
                    for k in 0..sat.numobs() {
                        if sat.data[k].missing() {
                            line.extend_from_slice(b"                ");
                            continue;
                        }
                        line.extend_from_slice(&value_field(sat.data[k].value()));
                        line.push(sat.lli[k].first_or_space());
                        line.push(sat.ssi[k].first_or_space());
                    }
                }

                push_trimmed(&mut buf, &line);
            }
        } else {
            for sat_id in &self.sat_list {
                let sat = match self.data.get(sat_id) {
                    Some(sat) => sat,
                    None => continue,
                };
                let mut line = Vec::<u8>::with_capacity(80);
                for k in 0..sat.numobs() {
                    if sat.data[k].missing() {
                        line.extend_from_slice(b"                ");
                    } else {
                        line.extend_from_slice(&value_field(sat.data[k].value()));
                        line.push(sat.lli[k].first_or_space());
                        line.push(sat.ssi[k].first_or_space());
                    }

                    // at most 5 observations per line
                    if k == sat.numobs() - 1 || (k + 1) % 5 == 0 {
                        push_trimmed(&mut buf, &line);
                        line.clear();
                    }
                }
            }
        }
        buf
    }

    /// Verbatim special event lines skipped since the last call, in
    /// stream order. [crate::Decompressor] interleaves them back into
    /// its output.
    pub fn take_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }

    /// Fatal error that terminated the scan, if any.
    pub fn err(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Issues reported so far.
    pub fn warnings(&self) -> &WarningList {
        &self.warnings
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub(crate) fn take_warnings(&mut self) -> WarningList {
        std::mem::take(&mut self.warnings)
    }
}

/// Classifies an epoch record: does it carry an initialization flag,
/// and does it announce a special event block (epoch flag > 1, the
/// satellite counter field then counts verbatim records).
fn check_initialized(line: &str) -> Result<(bool, usize), Error> {
    let b = line.as_bytes();

    let (min_len, flag_offset, counter) = if b.first() == Some(&b'>') {
        (35, 31, 32..35)
    } else if b.first() == Some(&b'&') {
        (32, 28, 29..32)
    } else {
        return Ok((false, 0));
    };

    if b.len() < min_len {
        return Err(Error::InvalidEpochStr(format!(
            "initialization record too short: '{}'",
            line
        )));
    }

    if b[flag_offset] > b'1' {
        let num_skip = std::str::from_utf8(&b[counter])
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                Error::InvalidEpochStr(format!("failed to parse event record count: '{}'", line))
            })?;
        return Ok((true, num_skip));
    }

    Ok((true, 0))
}

fn push_trimmed(buf: &mut Vec<u8>, line: &[u8]) {
    let mut line = line;
    while let Some((&b' ', rem)) = line.split_last() {
        line = rem;
    }
    buf.extend_from_slice(line);
    buf.push(b'\n');
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_classification() {
        // plain V3 initialization
        let (init, skip) =
            check_initialized("> 2022 03 04 00 00  0.0000000  0  4").unwrap();
        assert!(init);
        assert_eq!(skip, 0);

        // V3 special event announcing 2 records
        let (init, skip) =
            check_initialized("> 2022 03 04 00 00  0.0000000  4  2").unwrap();
        assert!(init);
        assert_eq!(skip, 2);

        // V1 special event
        let (init, skip) =
            check_initialized("&21  1  1  0  0  0.0000000  4  2").unwrap();
        assert!(init);
        assert_eq!(skip, 2);

        // diff encoded record
        let (init, skip) = check_initialized("       2").unwrap();
        assert!(!init);
        assert_eq!(skip, 0);

        // truncated initialization record
        assert!(check_initialized("> 2022 03").is_err());
    }
}
