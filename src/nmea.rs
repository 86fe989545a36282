//! NMEA-0183 sentence primitives: tokenizing, checksum verification
//! and hemisphere resolution.
use std::str::FromStr;

use crate::error::DecodeError;

/// Leading sentence delimiter
pub const START_DELIMITER: char = '$';

/// Delimiter preceding the declared checksum
pub const CHECKSUM_DELIMITER: char = '*';

/// Field separator
pub const FIELD_SEPARATOR: char = ',';

/// One sentence, split but not interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence<'a> {
    /// Two letter talker identifier (GP, GN, ..)
    pub talker: &'a str,

    /// Three letter sentence type (GGA, RMC, ..)
    pub kind: &'a str,

    /// Data fields following the identifier, in order
    pub fields: Vec<&'a str>,

    /// Everything between the start and checksum delimiters
    pub body: &'a str,

    /// Declared checksum token
    pub declared: &'a str,
}

impl<'a> Sentence<'a> {
    /// Splits a raw sentence. Only the overall shape is verified here.
    pub fn split(sentence: &'a str) -> Result<Self, DecodeError> {
        let trimmed = sentence.trim();

        let unrecognized = || DecodeError::UnrecognizedSentence(trimmed.to_string());

        let inner = trimmed
            .strip_prefix(START_DELIMITER)
            .ok_or_else(unrecognized)?;

        let (body, declared) = inner
            .rsplit_once(CHECKSUM_DELIMITER)
            .ok_or_else(unrecognized)?;

        let mut tokens = body.split(FIELD_SEPARATOR);

        let identifier = tokens.next().unwrap_or_default();

        if identifier.len() != 5 || !identifier.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(unrecognized());
        }

        let fields = tokens.collect::<Vec<_>>();

        if fields.is_empty() {
            return Err(unrecognized());
        }

        Ok(Self {
            talker: &identifier[..2],
            kind: &identifier[2..],
            fields,
            body,
            declared: declared.trim(),
        })
    }

    /// Returns the field at position `index` (0 = first field after the identifier),
    /// or an empty field when the sentence is short.
    pub fn field(&self, index: usize) -> &'a str {
        self.fields.get(index).copied().unwrap_or_default().trim()
    }

    /// Compares the declared checksum to the one computed over the body.
    pub fn checksum_valid(&self) -> Result<bool, DecodeError> {
        let declared = parse_checksum(self.declared)?;
        Ok(checksum(self.body) == declared)
    }
}

/// Bytewise XOR of all characters
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Parses a two digit hexadecimal checksum token
pub fn parse_checksum(token: &str) -> Result<u8, DecodeError> {
    if token.len() != 2 {
        return Err(DecodeError::malformed("checksum", token));
    }
    u8::from_str_radix(token, 16).map_err(|_| DecodeError::malformed("checksum", token))
}

/// Parses an optional numeric field. Empty fields are absent, not zero.
pub fn optional<T: FromStr>(field: &'static str, value: &str) -> Result<Option<T>, DecodeError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| DecodeError::malformed(field, value))
}

/// Geodetic axis of a degrees+minutes coordinate
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn name(&self) -> &'static str {
        match self {
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    fn hemisphere_name(&self) -> &'static str {
        match self {
            Self::Latitude => "latitude hemisphere",
            Self::Longitude => "longitude hemisphere",
        }
    }

    /// Largest magnitude in decimal degrees
    pub fn limit(&self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }

    /// Sign applied for a hemisphere letter: north and east are positive.
    pub fn hemisphere_sign(&self, hemisphere: &str) -> Result<f64, DecodeError> {
        match (self, hemisphere.trim()) {
            (Self::Latitude, "N") | (Self::Longitude, "E") => Ok(1.0),
            (Self::Latitude, "S") | (Self::Longitude, "W") => Ok(-1.0),
            (_, other) => Err(DecodeError::malformed(self.hemisphere_name(), other)),
        }
    }
}

/// Converts a `DDMM.MMMM` / `DDDMM.MMMM` coordinate and its hemisphere letter
/// to signed decimal degrees. An empty coordinate is absent.
pub fn coordinate(value: &str, hemisphere: &str, axis: Axis) -> Result<Option<f64>, DecodeError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let malformed = || DecodeError::malformed(axis.name(), value);

    // minutes always have two integer digits
    let integer_digits = value.find('.').unwrap_or(value.len());
    if integer_digits < 3 || !value[..integer_digits].bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let (degrees, minutes) = value.split_at(integer_digits - 2);

    let degrees = degrees.parse::<u16>().map_err(|_| malformed())? as f64;
    let minutes = minutes.parse::<f64>().map_err(|_| malformed())?;

    if !(0.0..60.0).contains(&minutes) {
        return Err(malformed());
    }

    let magnitude = degrees + minutes / 60.0;
    if magnitude > axis.limit() {
        return Err(malformed());
    }

    let sign = axis.hemisphere_sign(hemisphere)?;
    Ok(Some(sign * magnitude))
}
