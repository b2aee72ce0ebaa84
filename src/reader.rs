//! Buffered reader wrapper and one-shot decompression
#[cfg(feature = "flate2")]
use flate2::read::GzDecoder;

use std::io::{BufRead, BufReader, Cursor, Error as IoError, Read};

use crate::{Error, Scanner, WarningList};

/// [BufferedReader] is an efficient [BufRead] implementer from any
/// [Read]able interface, providing seamless Gzip decompression of the
/// CRINEX stream when the `flate2` feature is active.
pub enum BufferedReader<R: Read> {
    /// Readable stream
    Plain(BufReader<R>),
    /// Seamless Gzip compressed stream (non readable)
    #[cfg(feature = "flate2")]
    Gz(BufReader<GzDecoder<R>>),
}

impl<R: Read> BufferedReader<R> {
    pub fn plain(r: R) -> Self {
        Self::Plain(BufReader::new(r))
    }
    #[cfg(feature = "flate2")]
    pub fn gzip(r: R) -> Self {
        Self::Gz(BufReader::new(GzDecoder::new(r)))
    }
}

impl<R: Read> Read for BufferedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        match self {
            Self::Plain(ref mut r) => r.read(buf),
            #[cfg(feature = "flate2")]
            Self::Gz(ref mut r) => r.read(buf),
        }
    }
}

impl<R: Read> BufRead for BufferedReader<R> {
    fn fill_buf(&mut self) -> Result<&[u8], IoError> {
        match self {
            Self::Plain(r) => r.fill_buf(),
            #[cfg(feature = "flate2")]
            Self::Gz(r) => r.fill_buf(),
        }
    }
    fn consume(&mut self, s: usize) {
        match self {
            Self::Plain(r) => r.consume(s),
            #[cfg(feature = "flate2")]
            Self::Gz(r) => r.consume(s),
        }
    }
}

/// Line oriented scanner over a [BufferedReader], tracking 1-based
/// line numbers for diagnostics. CRINEX is a `\n` terminated format,
/// one logical record per line.
pub(crate) struct LineReader<R: Read> {
    inner: BufferedReader<R>,
    line: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: BufferedReader<R>) -> Self {
        Self { inner, line: 0 }
    }

    /// Number of the line most recently returned, 0 before any read.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next line with its termination stripped, None past end of stream.
    pub fn next_line(&mut self) -> Result<Option<String>, IoError> {
        let mut buf = String::with_capacity(128);
        let size = self.inner.read_line(&mut buf)?;
        if size == 0 {
            return Ok(None);
        }
        self.line += 1;
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') {
                buf.pop();
            }
        }
        Ok(Some(buf))
    }
}

/// [Decompressor] performs one-shot CRINEX decompression: the whole
/// stream is decoded eagerly on construction and the recovered RINEX
/// is then served through [Read]/[BufRead].
///
/// Decoding does not stop at the first problem: repaired records are
/// reported in [Decompressor::warnings], and when a fatal error is hit
/// the output produced up to that point remains readable, with the
/// error held in [Decompressor::error].
///
/// ```no_run
/// use std::fs::File;
/// use std::io::Read;
/// use crinex::Decompressor;
///
/// let fd = File::open("ACOR00ESP_R_20213550000_01D_30S_MO.crx").unwrap();
/// let mut rinex = String::new();
/// Decompressor::new(fd).read_to_string(&mut rinex).unwrap();
/// ```
pub struct Decompressor {
    buf: Cursor<Vec<u8>>,
    error: Option<Error>,
    warnings: WarningList,
}

impl Decompressor {
    /// Decompresses the entire CRINEX stream read from `r`.
    pub fn new<R: Read>(r: R) -> Self {
        Self::run(Scanner::new(r))
    }

    /// Decompresses a Gzip compressed CRINEX stream.
    #[cfg(feature = "flate2")]
    pub fn gzip<R: Read>(r: R) -> Self {
        Self::run(Scanner::gzip(r))
    }

    fn run<R: Read>(scanner: Result<Scanner<R>, Error>) -> Self {
        let mut scanner = match scanner {
            Ok(s) => s,
            Err(e) => {
                return Self {
                    buf: Cursor::new(Vec::new()),
                    error: Some(e),
                    warnings: WarningList::new(),
                }
            },
        };

        let mut buf = Vec::<u8>::with_capacity(8192);

        if let Err(e) = scanner.parse_header() {
            return Self {
                buf: Cursor::new(buf),
                error: Some(e),
                warnings: scanner.take_warnings(),
            };
        }
        buf.extend_from_slice(scanner.header());

        while scanner.scan_epoch() {
            // special events come through verbatim, in stream order
            for event in scanner.take_events() {
                buf.extend_from_slice(event.as_bytes());
                buf.push(b'\n');
            }
            buf.extend_from_slice(&scanner.epoch_as_bytes());
            buf.extend_from_slice(&scanner.data_as_bytes());
        }
        for event in scanner.take_events() {
            buf.extend_from_slice(event.as_bytes());
            buf.push(b'\n');
        }

        Self {
            buf: Cursor::new(buf),
            error: scanner.take_error(),
            warnings: scanner.take_warnings(),
        }
    }

    /// First fatal error hit while decoding, if any.
    /// The output recovered up to that point is still served.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Non fatal issues hit while decoding.
    pub fn warnings(&self) -> &WarningList {
        &self.warnings
    }

    /// Hands out the recovered RINEX without copying.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_inner()
    }
}

impl Read for Decompressor {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.buf.read(buf)
    }
}

impl BufRead for Decompressor {
    fn fill_buf(&mut self) -> Result<&[u8], IoError> {
        self.buf.fill_buf()
    }
    fn consume(&mut self, s: usize) {
        self.buf.consume(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_reader() {
        let content = "first\r\nsecond\nthird";
        let mut lines = LineReader::new(BufferedReader::plain(content.as_bytes()));
        assert_eq!(lines.line(), 0);
        assert_eq!(lines.next_line().unwrap().unwrap(), "first");
        assert_eq!(lines.next_line().unwrap().unwrap(), "second");
        assert_eq!(lines.next_line().unwrap().unwrap(), "third");
        assert_eq!(lines.line(), 3);
        assert!(lines.next_line().unwrap().is_none());
    }

    #[test]
    fn truncated_magic() {
        let decomp = Decompressor::new(&b"not a crinex stream"[..]);
        assert!(matches!(decomp.error(), Some(Error::BadMagic)));
        assert!(decomp.into_inner().is_empty());
    }
}
