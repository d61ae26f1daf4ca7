//! Advertisement record parsing
//!
//! An advertisement (or scan response) is a sequence of AD structures, each
//! `[length, type, payload...]` where `length` counts the type byte and the
//! payload. Parsing stops at a zero length or a structure that runs past the
//! end of the record.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::gatt::{uuid_from_u16, uuid_from_u32};

// ----------------------------------------------------------------------------
// AD Types
// ----------------------------------------------------------------------------

mod ad_type {
    pub const INCOMPLETE_SERVICE_UUIDS_16: u8 = 0x02;
    pub const COMPLETE_SERVICE_UUIDS_16: u8 = 0x03;
    pub const INCOMPLETE_SERVICE_UUIDS_32: u8 = 0x04;
    pub const COMPLETE_SERVICE_UUIDS_32: u8 = 0x05;
    pub const INCOMPLETE_SERVICE_UUIDS_128: u8 = 0x06;
    pub const COMPLETE_SERVICE_UUIDS_128: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const SOLICITED_SERVICE_UUIDS_16: u8 = 0x14;
    pub const SOLICITED_SERVICE_UUIDS_128: u8 = 0x15;
    pub const SERVICE_DATA_16: u8 = 0x16;
    pub const SOLICITED_SERVICE_UUIDS_32: u8 = 0x1F;
    pub const SERVICE_DATA_32: u8 = 0x20;
    pub const SERVICE_DATA_128: u8 = 0x21;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

// ----------------------------------------------------------------------------
// Advertisement Data
// ----------------------------------------------------------------------------

/// Structured content of one advertisement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    /// Company identifier (little-endian) followed by the vendor payload
    pub manufacturer_data: Option<Vec<u8>>,
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
    pub tx_power_level: Option<i8>,
    pub solicited_service_uuids: Vec<Uuid>,
    /// The record this data was parsed from, when parsed from raw bytes
    pub raw: Vec<u8>,
}

impl AdvertisementData {
    /// Parse a raw advertisement or scan response record
    pub fn parse(record: &[u8]) -> Self {
        let mut data = Self {
            raw: record.to_vec(),
            ..Self::default()
        };

        let mut rest = record;
        while rest.len() >= 2 {
            let length = rest[0] as usize;
            if length == 0 {
                break;
            }
            let kind = rest[1];
            let payload_len = length - 1;
            let body = &rest[2..];
            if body.len() < payload_len {
                break;
            }
            data.apply(kind, &body[..payload_len]);
            rest = &body[payload_len..];
        }
        data
    }

    fn apply(&mut self, kind: u8, payload: &[u8]) {
        use ad_type::*;

        match kind {
            MANUFACTURER_SPECIFIC_DATA => {
                if payload.len() >= 2 {
                    self.manufacturer_data = Some(payload.to_vec());
                }
            }
            INCOMPLETE_SERVICE_UUIDS_16 | COMPLETE_SERVICE_UUIDS_16 => {
                self.service_uuids.extend(parse_uuids(payload, 2));
            }
            INCOMPLETE_SERVICE_UUIDS_32 | COMPLETE_SERVICE_UUIDS_32 => {
                self.service_uuids.extend(parse_uuids(payload, 4));
            }
            INCOMPLETE_SERVICE_UUIDS_128 | COMPLETE_SERVICE_UUIDS_128 => {
                self.service_uuids.extend(parse_uuids(payload, 16));
            }
            SHORTENED_LOCAL_NAME | COMPLETE_LOCAL_NAME => {
                // A complete name always wins over a shortened one
                if self.local_name.is_none() || kind == COMPLETE_LOCAL_NAME {
                    self.local_name = Some(String::from_utf8_lossy(payload).into_owned());
                }
            }
            TX_POWER_LEVEL => {
                if let [level] = payload {
                    self.tx_power_level = Some(*level as i8);
                }
            }
            SOLICITED_SERVICE_UUIDS_16 => {
                self.solicited_service_uuids.extend(parse_uuids(payload, 2));
            }
            SOLICITED_SERVICE_UUIDS_32 => {
                self.solicited_service_uuids.extend(parse_uuids(payload, 4));
            }
            SOLICITED_SERVICE_UUIDS_128 => {
                self.solicited_service_uuids.extend(parse_uuids(payload, 16));
            }
            SERVICE_DATA_16 => self.insert_service_data(payload, 2),
            SERVICE_DATA_32 => self.insert_service_data(payload, 4),
            SERVICE_DATA_128 => self.insert_service_data(payload, 16),
            _ => {}
        }
    }

    fn insert_service_data(&mut self, payload: &[u8], width: usize) {
        if payload.len() < width {
            return;
        }
        let (uuid_bytes, value) = payload.split_at(width);
        if let Some(uuid) = parse_uuid(uuid_bytes) {
            self.service_data.insert(uuid, value.to_vec());
        }
    }

    /// Check whether the advertisement names a service, in its UUID list or its service data
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.contains(service) || self.service_data.contains_key(service)
    }

    /// Bluetooth SIG company identifier of the manufacturer data
    pub fn company_id(&self) -> Option<u16> {
        self.manufacturer_data
            .as_deref()
            .and_then(|data| data.get(..2))
            .map(|id| u16::from_le_bytes([id[0], id[1]]))
    }
}

// ----------------------------------------------------------------------------
// UUID Decoding
// ----------------------------------------------------------------------------

fn parse_uuids(payload: &[u8], width: usize) -> impl Iterator<Item = Uuid> + '_ {
    payload.chunks_exact(width).filter_map(parse_uuid)
}

/// Decode a little-endian 16, 32 or 128-bit UUID
fn parse_uuid(bytes: &[u8]) -> Option<Uuid> {
    match bytes.len() {
        2 => Some(uuid_from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
        4 => Some(uuid_from_u32(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        16 => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(bytes);
            Some(Uuid::from_u128(u128::from_le_bytes(raw)))
        }
        _ => None,
    }
}
