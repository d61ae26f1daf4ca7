//! Discovered GATT tables and well-known identifiers

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::types::CharacteristicAddress;

// ----------------------------------------------------------------------------
// Bluetooth Base UUID
// ----------------------------------------------------------------------------

/// `00000000-0000-1000-8000-00805F9B34FB`, the base for 16/32-bit UUIDs
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit assigned number on the Bluetooth base UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit assigned number on the Bluetooth base UUID
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

// ----------------------------------------------------------------------------
// Device Time Identifiers
// ----------------------------------------------------------------------------

/// Device Time service
pub const DEVICE_TIME_SERVICE_UUID: Uuid = uuid_from_u16(0x1847);

/// Current Time characteristic
pub const CURRENT_TIME_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0x2A2B);

/// Time Trigger Setting descriptor on the current time characteristic
pub const TIME_TRIGGER_DESCRIPTOR_UUID: Uuid = uuid_from_u16(0x290E);

/// Address of the time descriptor exercised by the autodisconnect flow
pub fn current_time_descriptor() -> CharacteristicAddress {
    CharacteristicAddress::new(
        DEVICE_TIME_SERVICE_UUID,
        CURRENT_TIME_CHARACTERISTIC_UUID,
        TIME_TRIGGER_DESCRIPTOR_UUID,
    )
}

// ----------------------------------------------------------------------------
// GATT Table
// ----------------------------------------------------------------------------

/// Services, characteristics and descriptors of one connected device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GattTable {
    services: BTreeMap<Uuid, BTreeMap<Uuid, BTreeSet<Uuid>>>,
}

impl GattTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a service with no characteristics
    pub fn insert_service(&mut self, service: Uuid) {
        self.services.entry(service).or_default();
    }

    /// Record a characteristic (and its service) with no descriptors
    pub fn insert_characteristic(&mut self, service: Uuid, characteristic: Uuid) {
        self.services
            .entry(service)
            .or_default()
            .entry(characteristic)
            .or_default();
    }

    /// Record a descriptor and every level above it
    pub fn insert(&mut self, address: CharacteristicAddress) {
        self.services
            .entry(address.service)
            .or_default()
            .entry(address.characteristic)
            .or_default()
            .insert(address.descriptor);
    }

    /// Builder form of [`GattTable::insert`]
    pub fn with_descriptor(mut self, address: CharacteristicAddress) -> Self {
        self.insert(address);
        self
    }

    pub fn contains(&self, address: &CharacteristicAddress) -> bool {
        self.services
            .get(&address.service)
            .and_then(|characteristics| characteristics.get(&address.characteristic))
            .map(|descriptors| descriptors.contains(&address.descriptor))
            .unwrap_or(false)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn characteristic_count(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    /// Every addressable descriptor, in UUID order
    pub fn addresses(&self) -> Vec<CharacteristicAddress> {
        self.services
            .iter()
            .flat_map(|(service, characteristics)| {
                characteristics
                    .iter()
                    .flat_map(move |(characteristic, descriptors)| {
                        descriptors.iter().map(move |descriptor| {
                            CharacteristicAddress::new(*service, *characteristic, *descriptor)
                        })
                    })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
