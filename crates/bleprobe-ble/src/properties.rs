//! Conversions from btleplug's platform data into bleprobe types
//!
//! btleplug reports advertisements already split into fields, so the raw
//! record is not available here and [`AdvertisementData::raw`] stays empty.

use std::collections::BTreeSet;

use bleprobe_core::{AdvertisementData, CharacteristicAddress, GattTable};
use btleplug::api::{Descriptor, PeripheralProperties, Service};

/// Build advertisement data from the properties btleplug tracks for a peripheral
pub fn advertisement_from_properties(properties: &PeripheralProperties) -> AdvertisementData {
    // A peripheral normally advertises a single company; take the lowest id
    // so the choice is stable across updates.
    let manufacturer_data = properties
        .manufacturer_data
        .iter()
        .min_by_key(|(company, _)| **company)
        .map(|(company, payload)| {
            let mut data = company.to_le_bytes().to_vec();
            data.extend_from_slice(payload);
            data
        });

    AdvertisementData {
        manufacturer_data,
        service_data: properties
            .service_data
            .iter()
            .map(|(uuid, data)| (*uuid, data.clone()))
            .collect(),
        service_uuids: properties.services.clone(),
        local_name: properties.local_name.clone(),
        tx_power_level: properties
            .tx_power_level
            .and_then(|level| i8::try_from(level).ok()),
        solicited_service_uuids: Vec::new(),
        raw: Vec::new(),
    }
}

/// Flatten btleplug's discovered services into a [`GattTable`]
pub fn gatt_table_from_services(services: &BTreeSet<Service>) -> GattTable {
    let mut table = GattTable::new();
    for service in services {
        table.insert_service(service.uuid);
        for characteristic in &service.characteristics {
            table.insert_characteristic(service.uuid, characteristic.uuid);
            for descriptor in &characteristic.descriptors {
                table.insert(address_of(descriptor));
            }
        }
    }
    table
}

pub(crate) fn address_of(descriptor: &Descriptor) -> CharacteristicAddress {
    CharacteristicAddress::new(
        descriptor.service_uuid,
        descriptor.characteristic_uuid,
        descriptor.uuid,
    )
}
