//! Static device-to-store routing.

use std::collections::HashMap;

use iotqueue::Device;

/// Storage destination for one device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub device: Device,
    pub table: &'static str,
}

/// Adding a device type is one `Device` variant plus one row here.
const ROUTES: &[(Device, &str)] = &[
    (Device::MotionSensor, "motion_sensor_data"),
    (Device::TemperatureSensor, "temperature_sensor_data"),
    (Device::HumiditySensor, "humidity_sensor_data"),
    (Device::SmokeSensor, "smoke_sensor_data"),
];

/// Immutable identifier → destination map, built once at process start.
pub struct StoreRouter {
    routes: HashMap<&'static str, Destination>,
}

impl StoreRouter {
    pub fn new() -> Self {
        let routes = ROUTES
            .iter()
            .map(|&(device, table)| (device.as_str(), Destination { device, table }))
            .collect();

        Self { routes }
    }

    /// Pure lookup. Unknown identifiers mean "no destination", never an
    /// error.
    pub fn destination(&self, device: &str) -> Option<Destination> {
        self.routes.get(device).copied()
    }
}

impl Default for StoreRouter {
    fn default() -> Self {
        Self::new()
    }
}
