//! `Range` header grammar and validation.
//!
//! Only single byte ranges are understood:
//!
//! ```text
//! range      = "bytes" "=" ( int-range / suffix-range )
//! int-range  = first-pos "-" [ last-pos ]
//! suffix-range = "-" suffix-length
//! ```
//!
//! Classification is a pure function of the header value and the resource
//! length, so everything in here is testable without touching a file.

use tracing::debug;

/// An inclusive byte interval `[start, end]` within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes covered. Never zero, since `start <= end`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// How a request should be answered, decided before any byte is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No range requested, send the whole resource with 200.
    FullBody,
    /// Send exactly this window with 206.
    PartialBody(ByteRange),
    /// Send 416. The reason is kept for diagnostics only.
    Unsatisfiable(Unsatisfiable),
}

/// Why a `Range` header could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRange {
    #[error("header value is not visible ASCII")]
    NotAscii,
    #[error("missing `bytes=` unit prefix")]
    MissingUnit,
    #[error("missing `-` between range positions")]
    MissingSeparator,
    #[error("multiple ranges are not supported")]
    MultipleRanges,
    #[error("range spec has neither a first nor a last position")]
    EmptySpec,
    #[error("invalid byte position `{0}`")]
    InvalidPosition(String),
}

/// Why a request ends up as 416.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unsatisfiable {
    #[error("malformed range header: {0}")]
    Malformed(#[from] MalformedRange),
    #[error("resource is empty")]
    EmptyResource,
    #[error("suffix length is zero")]
    ZeroSuffix,
    #[error("range start {start} is after range end {end}")]
    Inverted { start: u64, end: u64 },
    #[error("range start {start} is at or past resource length {length}")]
    StartBeyondLength { start: u64, length: u64 },
}

/// A syntactically valid range spec, not yet checked against a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=<first>-` or `bytes=<first>-<last>`
    FromStart { first: u64, last: Option<u64> },
    /// `bytes=-<suffix>`
    Suffix(u64),
}

const BYTES_UNIT: &str = "bytes";

/// Parse a `Range` header value into a [`RangeSpec`].
pub fn parse_range(header: &str) -> Result<RangeSpec, MalformedRange> {
    let header = header.trim();

    let (unit, set) = header.split_once('=').ok_or(MalformedRange::MissingUnit)?;
    if !unit.eq_ignore_ascii_case(BYTES_UNIT) {
        return Err(MalformedRange::MissingUnit);
    }

    if set.contains(',') {
        return Err(MalformedRange::MultipleRanges);
    }

    let (first, last) = set.split_once('-').ok_or(MalformedRange::MissingSeparator)?;

    match (first.is_empty(), last.is_empty()) {
        (true, true) => Err(MalformedRange::EmptySpec),
        (true, false) => Ok(RangeSpec::Suffix(parse_position(last)?)),
        (false, true) => Ok(RangeSpec::FromStart { first: parse_position(first)?, last: None }),
        (false, false) => Ok(RangeSpec::FromStart {
            first: parse_position(first)?,
            last: Some(parse_position(last)?),
        }),
    }
}

/// Digits only. Values too large for `u64` saturate, which still validates
/// correctly: a saturated start is past any length, a saturated end clamps.
fn parse_position(s: &str) -> Result<u64, MalformedRange> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedRange::InvalidPosition(s.to_string()));
    }

    Ok(s.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    }))
}

impl RangeSpec {
    /// Resolve against the total resource length.
    pub fn resolve(self, length: u64) -> Result<ByteRange, Unsatisfiable> {
        if length == 0 {
            return Err(Unsatisfiable::EmptyResource);
        }
        let last_byte = length - 1;

        match self {
            RangeSpec::Suffix(0) => Err(Unsatisfiable::ZeroSuffix),
            RangeSpec::Suffix(n) => Ok(ByteRange::new(length.saturating_sub(n), last_byte)),
            RangeSpec::FromStart { first, last } => {
                if let Some(last) = last {
                    if first > last {
                        return Err(Unsatisfiable::Inverted { start: first, end: last });
                    }
                }
                if first >= length {
                    return Err(Unsatisfiable::StartBeyondLength { start: first, length });
                }
                let end = last.map_or(last_byte, |last| last.min(last_byte));
                Ok(ByteRange::new(first, end))
            }
        }
    }
}

/// Classify a request given its raw `Range` header (if any) and the resource length.
pub fn classify(header: Option<&str>, length: u64) -> RangeOutcome {
    let header = match header.map(str::trim) {
        None | Some("") => return RangeOutcome::FullBody,
        Some(header) => header,
    };

    let outcome = match parse_range(header) {
        Ok(spec) => match spec.resolve(length) {
            Ok(range) => RangeOutcome::PartialBody(range),
            Err(reason) => RangeOutcome::Unsatisfiable(reason),
        },
        Err(malformed) => RangeOutcome::Unsatisfiable(malformed.into()),
    };

    debug!(header, length, ?outcome, "classified range request");
    outcome
}

/// Like [`classify`], starting from raw header bytes. Values that are not
/// visible ASCII are malformed rather than silently ignored.
pub fn classify_bytes(header: Option<&[u8]>, length: u64) -> RangeOutcome {
    match header {
        None => RangeOutcome::FullBody,
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) if s.bytes().all(|b| b == b' ' || b == b'\t' || b.is_ascii_graphic()) => {
                classify(Some(s), length)
            }
            _ => RangeOutcome::Unsatisfiable(MalformedRange::NotAscii.into()),
        },
    }
}
