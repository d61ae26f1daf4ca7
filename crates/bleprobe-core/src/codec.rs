//! Current time descriptor codec
//!
//! The descriptor holds 7 bytes:
//! `[year_high, year_low, month, day, hour, minute, second]` with
//! `year = year_low + (year_high << 8)` and a 1-based month. On text
//! transports the bytes travel base64 encoded.
//!
//! Decoding treats a zero in any of the seven positions as an absent field
//! and yields no value. Zero is a legal hour, minute or second, so a
//! timestamp on an exact minute or at midnight does not decode; callers that
//! write such times will read back "no value".

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::errors::CodecError;

/// Encoded length of a [`TimePayload`]
pub const TIME_PAYLOAD_LEN: usize = 7;

/// The 7-byte current time layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePayload {
    pub year_high: u8,
    pub year_low: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimePayload {
    /// Split a calendar timestamp into payload fields
    pub fn from_datetime(datetime: &NaiveDateTime) -> Result<Self, CodecError> {
        let year = u16::try_from(datetime.year())
            .map_err(|_| CodecError::YearOutOfRange(datetime.year()))?;
        let [year_high, year_low] = year.to_be_bytes();

        Ok(Self {
            year_high,
            year_low,
            month: datetime.month() as u8,
            day: datetime.day() as u8,
            hour: datetime.hour() as u8,
            minute: datetime.minute() as u8,
            second: datetime.second() as u8,
        })
    }

    pub fn year(&self) -> u16 {
        u16::from(self.year_low) + (u16::from(self.year_high) << 8)
    }

    pub fn to_bytes(&self) -> [u8; TIME_PAYLOAD_LEN] {
        [
            self.year_high,
            self.year_low,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }

    /// Read a payload from raw descriptor bytes
    ///
    /// Returns `None` when fewer than seven bytes are present or any of the
    /// first seven is zero. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let fields = bytes.get(..TIME_PAYLOAD_LEN)?;
        if fields.iter().any(|byte| *byte == 0) {
            return None;
        }

        Some(Self {
            year_high: fields[0],
            year_low: fields[1],
            month: fields[2],
            day: fields[3],
            hour: fields[4],
            minute: fields[5],
            second: fields[6],
        })
    }

    /// Calendar timestamp, or `None` when the fields do not form a valid date
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year()),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
    }

    /// ISO-8601 rendering with millisecond precision and a `Z` suffix
    pub fn to_iso_string(&self) -> Option<String> {
        self.to_datetime()
            .map(|datetime| datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
    }
}

// ----------------------------------------------------------------------------
// Transport Encoding
// ----------------------------------------------------------------------------

/// Base64 form of a descriptor value
pub fn to_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Raw bytes of a base64 descriptor value, `None` if it is not valid base64
pub fn from_transport(encoded: &str) -> Option<Vec<u8>> {
    STANDARD.decode(encoded.trim()).ok()
}

/// Encode a timestamp as a transport-ready time payload
pub fn encode_time_payload(datetime: &NaiveDateTime) -> Result<String, CodecError> {
    let payload = TimePayload::from_datetime(datetime)?;
    Ok(to_transport(&payload.to_bytes()))
}

/// Decode a transport time payload into an ISO-8601 string
///
/// Empty, malformed, short or zero-containing input yields `None`.
pub fn decode_time_payload(encoded: &str) -> Option<String> {
    let bytes = from_transport(encoded)?;
    TimePayload::from_bytes(&bytes)?.to_iso_string()
}
