//! Measurement data decoding
//!
//! With `FMT 1` every datum in a reply burst is a comma separated field of the form
//! `<status><channel><kind><value>`, e.g. `NAI+1.234000E-06`. The header occupies exactly three
//! ASCII characters, so the kind tag is always the third character and the decimal payload starts right
//! after it. Fields of different kinds interleave in transmission order; within one kind, order is the
//! measurement index.

use std::{ fmt, error::Error };

/// Readings at or above this magnitude are the instrument's "no valid data" marker, e.g. for points
/// after a compliance abort
pub const OVERFLOW_THRESHOLD: f64 = 1e101;

/// What an overflow marker is replaced with before a series is handed out
pub const OVERFLOW_PLACEHOLDER: f64 = 0.0;

const FIELD_DELIMITER: char = ',';
const HEADER_LEN: usize = 3;

/// The quantity a data field carries, from the third header character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind
{
    /// `I`
    Current,
    /// `V`
    Voltage,
    /// `T`
    Time,
}

impl Kind
{
    fn from_tag(tag: u8) -> Option<Self>
    {
        match tag {
            b'I' => Some(Self::Current),
            b'V' => Some(Self::Voltage),
            b'T' => Some(Self::Time),
            _ => None,
        }
    }
}

/// A single decoded data field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token
{
    /// Status flag, `N` when the reading is normal
    pub status: char,
    /// Channel code, `A` for the first channel and so on
    pub channel: char,
    pub kind: Kind,
    /// Value in base units with overflow markers already normalized
    pub value: f64,
}

impl Token
{
    /// Decodes one field. Fields with a kind tag this driver doesn't consume decode to `Ok(None)`,
    /// whatever follows the header. A field too short to carry a tag, or a known tag with no value,
    /// is truncated.
    ///
    /// `index` is the 1-based position of the field in `raw_data` and is only used for error
    /// reporting.
    fn decode(field: &str, index: usize, raw_data: &str) -> Result<Option<Self>, FormatError>
    {
        let bytes = field.as_bytes();

        if bytes.len() < HEADER_LEN {
            return Err(FormatError::new(raw_data, index, "field ends inside its header", FormatErrorCause::Truncated));
        }

        if !field.is_ascii() {
            return Err(FormatError::new(raw_data, index, "field header is not ASCII", FormatErrorCause::NonAscii));
        }

        let kind = match Kind::from_tag(bytes[HEADER_LEN - 1]) {
            Some(kind) => kind,
            None => return Ok(None),
        };

        if bytes.len() == HEADER_LEN {
            return Err(FormatError::new(raw_data, index, "field ends before its value", FormatErrorCause::Truncated));
        }

        let value = field[HEADER_LEN..]
            .parse::<f64>()
            .map_err(|err| FormatError::new(raw_data, index, "failed to parse reading", FormatErrorCause::from(err)))?;

        Ok(Some(Self {
            status: bytes[0] as char,
            channel: bytes[1] as char,
            kind: kind,
            value: normalize(value),
        }))
    }
}

impl std::str::FromStr for Token
{
    type Err = ParseError;

    fn from_str(field: &str) -> Result<Self, Self::Err>
    {
        match Self::decode(field, 1, field)? {
            Some(token) => Ok(token),
            None => Err(FormatError::new(field, 1, "unrecognized kind tag", FormatErrorCause::UnknownKind).into()),
        }
    }
}

/// Replaces the instrument's overflow marker with [`OVERFLOW_PLACEHOLDER`]
pub fn normalize(value: f64) -> f64
{
    if value.abs() >= OVERFLOW_THRESHOLD {
        OVERFLOW_PLACEHOLDER
    }
    else {
        value
    }
}

/// Per-kind series decoded from one or more reply bursts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings
{
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

impl Readings
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn series(&self, kind: Kind) -> &[f64]
    {
        match kind {
            Kind::Current => &self.current,
            Kind::Voltage => &self.voltage,
            Kind::Time => &self.time,
        }
    }

    fn push(&mut self, token: &Token)
    {
        match token.kind {
            Kind::Current => self.current.push(token.value),
            Kind::Voltage => self.voltage.push(token.value),
            Kind::Time => self.time.push(token.value),
        }
    }

    /// Appends every series of `other` to the end of the matching series here
    pub fn append(&mut self, mut other: Readings)
    {
        self.time.append(&mut other.time);
        self.voltage.append(&mut other.voltage);
        self.current.append(&mut other.current);
    }

    /// Checks each of `kinds` holds exactly `expected` readings, or when `expected` is `None` that they
    /// all hold the same number
    pub fn expect_lengths(&self, kinds: &[Kind], expected: Option<usize>) -> Result<(), ParseError>
    {
        let expected = match expected.or_else(|| kinds.first().map(|kind| self.series(*kind).len())) {
            Some(expected) => expected,
            None => return Ok(()),
        };

        if kinds.iter().all(|kind| self.series(*kind).len() == expected) {
            Ok(())
        }
        else {
            Err(ParseError::LengthMismatch {
                expected: expected,
                time: self.time.len(),
                voltage: self.voltage.len(),
                current: self.current.len(),
            })
        }
    }
}

impl std::str::FromStr for Readings
{
    type Err = ParseError;

    /// Decodes a whole reply burst; the line terminator may be left on
    fn from_str(data_str: &str) -> Result<Self, Self::Err>
    {
        let mut readings = Readings::new();
        let trimmed = data_str.trim_end_matches(|c| c == '\r' || c == '\n');

        for (index, field) in trimmed.split(FIELD_DELIMITER).enumerate() {
            let field = field.trim();

            if field.is_empty() {
                continue;
            }

            if let Some(token) = Token::decode(field, index + 1, trimmed)? {
                readings.push(&token);
            }
        }

        Ok(readings)
    }
}

/// Decodes a reply burst into per-kind series
pub fn parse(raw: &str) -> Result<Readings, ParseError>
{
    raw.parse::<Readings>()
}

/// A description of the underlying cause of a field failing to decode
#[derive(Debug)]
pub enum FormatErrorCause
{
    /// The field is too short to hold a header and a value
    Truncated,
    /// The field contains non-ASCII bytes, so the fixed header offsets are meaningless
    NonAscii,
    /// The kind tag is not one of `I`, `V` or `T`
    UnknownKind,
    /// The value after the header is not a decimal number
    InvalidDecimal(std::num::ParseFloatError),
}

impl fmt::Display for FormatErrorCause
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Truncated => f.write_str("Field is shorter than its header"),
            Self::NonAscii => f.write_str("Field contains non-ASCII characters"),
            Self::UnknownKind => f.write_str("Expected one of ['I', 'V', 'T'] as the third character"),
            Self::InvalidDecimal(float_err) => write!(f, "Caused by: {}", float_err),
        }
    }
}

impl From<std::num::ParseFloatError> for FormatErrorCause
{
    fn from(this: std::num::ParseFloatError) -> Self
    {
        Self::InvalidDecimal(this)
    }
}

/// A field of a reply burst which could not be decoded
#[derive(Debug)]
pub struct FormatError
{
    /// The reply burst as received, without its line terminator
    pub raw_data: String,
    /// Which field the error occurred at. Indexed from 1
    pub token: usize,
    mesg: &'static str,
    cause: FormatErrorCause,
}

impl FormatError
{
    fn new(raw_data: &str, token: usize, mesg: &'static str, cause: FormatErrorCause) -> Self
    {
        Self {
            raw_data: String::from(raw_data),
            token: token,
            mesg: mesg,
            cause: cause,
        }
    }

    pub fn cause(&self) -> &FormatErrorCause
    {
        &self.cause
    }
}

impl fmt::Display for FormatError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "At field {}: {}. {}", self.token, self.mesg, self.cause)
    }
}

impl Error for FormatError {}

/// An error describing a failure to turn a reply burst into measurement series
#[derive(Debug, thiserror::Error)]
pub enum ParseError
{
    /// A field does not appear to be in the expected format
    #[error("Unable to interpret data. {0}")]
    InvalidFormat(#[from] FormatError),
    /// The burst decoded but holds fewer or more readings than were programmed
    #[error("Expected {expected} readings per series, got {time} time, {voltage} voltage and {current} current")]
    LengthMismatch { expected: usize, time: usize, voltage: usize, current: usize },
}
