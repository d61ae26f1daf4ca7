//! Property-based tests for the current time payload codec
//!
//! These pin down the decode rules: any timestamp whose fields are all
//! nonzero survives encode then decode, while any zero field or short
//! payload decodes to no value.

use bleprobe_core::codec::{self, TimePayload, TIME_PAYLOAD_LEN};
use bleprobe_core::{decode_time_payload, encode_time_payload};
use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

/// Timestamps whose seven encoded bytes are all nonzero
fn arb_nonzero_datetime() -> impl Strategy<Value = NaiveDateTime> {
    // Keeping the low year byte nonzero excludes years that are multiples of 256
    (1u16..=9999, 1u32..=12, 1u32..=28, 1u32..=23, 1u32..=59, 1u32..=59)
        .prop_filter("low year byte must be nonzero", |(year, ..)| year % 256 != 0)
        .prop_filter("high year byte must be nonzero", |(year, ..)| *year >= 256)
        .prop_map(|(year, month, day, hour, minute, second)| {
            NaiveDate::from_ymd_opt(i32::from(year), month, day)
                .unwrap()
                .and_hms_opt(hour, minute, second)
                .unwrap()
        })
}

proptest! {
    /// Property: nonzero timestamps decode to their own ISO rendering
    #[test]
    fn nonzero_timestamps_round_trip(datetime in arb_nonzero_datetime()) {
        let encoded = encode_time_payload(&datetime).unwrap();
        let decoded = decode_time_payload(&encoded);
        let expected = datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        prop_assert_eq!(decoded, Some(expected));
    }

    /// Property: a zero in any of the seven positions yields no value
    #[test]
    fn zero_field_yields_no_value(
        datetime in arb_nonzero_datetime(),
        position in 0usize..TIME_PAYLOAD_LEN,
    ) {
        let mut bytes = TimePayload::from_datetime(&datetime).unwrap().to_bytes();
        bytes[position] = 0;
        prop_assert_eq!(decode_time_payload(&codec::to_transport(&bytes)), None);
    }

    /// Property: payloads shorter than seven bytes never decode
    #[test]
    fn short_payloads_yield_no_value(bytes in prop::collection::vec(1u8..=255, 0..TIME_PAYLOAD_LEN)) {
        prop_assert_eq!(decode_time_payload(&codec::to_transport(&bytes)), None);
    }

    /// Property: the year splits big-endian across the first two bytes
    #[test]
    fn year_layout_is_big_endian(datetime in arb_nonzero_datetime()) {
        let bytes = TimePayload::from_datetime(&datetime).unwrap().to_bytes();
        let year = u16::from(bytes[1]) + (u16::from(bytes[0]) << 8);
        prop_assert_eq!(i32::from(year), chrono::Datelike::year(&datetime));
    }
}
