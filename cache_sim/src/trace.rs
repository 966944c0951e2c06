use std::io::{BufRead, Lines};

use anyhow::{Context, Result};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{digit1, hex_digit1},
    combinator::{all_consuming, map_res},
    sequence::preceded,
    IResult,
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceError {
    #[error("bad trace line: {0:?} (expected `<op> <address>`)")]
    MalformedTraceEntry(String),
    #[error("bad address {0:?}: expected decimal or 0x-prefixed hex fitting in 64 bits")]
    InvalidAddress(String),
    #[error("line {line_no}: {source}")]
    AtLine {
        line_no: usize,
        #[source]
        source: Box<TraceError>,
    },
}

/// one memory access, borrowed from its line. `op` is never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry<'a> {
    pub op: &'a str,
    pub address: u64,
}

fn hex_address(input: &str) -> IResult<&str, u64> {
    preceded(
        tag_no_case("0x"),
        map_res(hex_digit1, |d| u64::from_str_radix(d, 16)),
    )(input)
}

fn dec_address(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse)(input)
}

pub fn parse_address(token: &str) -> Result<u64, TraceError> {
    all_consuming(alt((hex_address, dec_address)))(token)
        .map(|(_, addr)| addr)
        .map_err(|_| TraceError::InvalidAddress(token.to_string()))
}

/// `Ok(None)` for blank and `#` comment lines.
pub fn parse_line(line: &str) -> Result<Option<TraceEntry<'_>>, TraceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace();
    let (Some(op), Some(addr), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Err(TraceError::MalformedTraceEntry(line.to_string()));
    };
    Ok(Some(TraceEntry {
        op,
        address: parse_address(addr)?,
    }))
}

/// yields addresses one line at a time; the first bad line ends the stream with an error.
pub struct TraceReader<R> {
    lines: Lines<R>,
    line_no: usize,
    entries: usize,
    skipped: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line_no: 0,
            entries: 0,
            skipped: 0,
        }
    }
}

impl<R> TraceReader<R> {
    /// addresses yielded so far
    pub fn entries(&self) -> usize {
        self.entries
    }
    /// blank or comment lines seen so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e).context("failed to read trace")),
            };
            self.line_no += 1;
            match parse_line(&line) {
                Ok(Some(entry)) => {
                    self.entries += 1;
                    log::trace!("{}: {} {:#x}", self.line_no, entry.op, entry.address);
                    return Some(Ok(entry.address));
                }
                Ok(None) => self.skipped += 1,
                Err(e) => {
                    return Some(Err(TraceError::AtLine {
                        line_no: self.line_no,
                        source: Box::new(e),
                    }
                    .into()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0"), Ok(0));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert_eq!(parse_address("0x1F"), Ok(0x1f));
        assert_eq!(parse_address("0XdeadBEEF"), Ok(0xdead_beef));
        assert_eq!(parse_address("0xffffffffffffffff"), Ok(u64::MAX));
        for bad in ["0x", "-4", "+4", "12ab", "0x1g", "0x10000000000000000", "18446744073709551616", "ff"] {
            assert!(
                matches!(parse_address(bad), Err(TraceError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   \t"), Ok(None));
        assert_eq!(parse_line("# R 0x10"), Ok(None));
        assert_eq!(parse_line("   # indented comment"), Ok(None));
        assert_eq!(
            parse_line("  R\t0x10  "),
            Ok(Some(TraceEntry {
                op: "R",
                address: 16
            }))
        );
        assert_eq!(
            parse_line("W 32"),
            Ok(Some(TraceEntry {
                op: "W",
                address: 32
            }))
        );
        for bad in ["R", "0x10", "R 0x10 extra", "R 1 # trailing comment"] {
            assert!(
                matches!(parse_line(bad), Err(TraceError::MalformedTraceEntry(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_reader() {
        let trace_str = "# header
R 0x0000
W 0x0004

R 15
";
        let mut r = TraceReader::new(trace_str.as_bytes());
        let addrs = r.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(addrs, vec![0, 4, 15]);
        assert_eq!(r.entries(), 3);
        assert_eq!(r.skipped(), 2);
    }

    #[test]
    fn test_reader_is_lazy() {
        let mut r = TraceReader::new("R 1\nR 2\nR zz\n".as_bytes());
        assert_eq!(r.next().unwrap().unwrap(), 1);
        assert_eq!(r.entries(), 1);
        assert_eq!(r.next().unwrap().unwrap(), 2);
        assert!(r.next().unwrap().is_err());
    }

    #[test]
    fn test_reader_error_line() {
        let err = TraceReader::new("R 0\n\nR 1 2\nR 3\n".as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        let Some(TraceError::AtLine { line_no, source }) = err.downcast_ref::<TraceError>() else {
            panic!("expected line info");
        };
        assert_eq!(*line_no, 3);
        assert!(matches!(**source, TraceError::MalformedTraceEntry(_)));
    }

    #[test]
    fn test_reader_io_error() {
        let bad_utf8: &[u8] = b"R 0\n\xff\xfe 4\n";
        let mut r = TraceReader::new(bad_utf8);
        assert_eq!(r.next().unwrap().unwrap(), 0);
        assert!(r.next().unwrap().is_err());
    }
}
