//! Flat-file persistence for the list of wakeable devices.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Issue encoding as json")]
    JSONError(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub mac_address: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Devices {
    pub devices: Vec<Device>,
}

impl Devices {
    fn add(&mut self, device: Device) {
        if self.devices.iter().any(|d| d.mac_address == device.mac_address) {
            return;
        }
        self.devices.push(device);
    }

    fn remove(&mut self, device: &Device) {
        self.devices.retain(|d| d.mac_address != device.mac_address);
    }
}

/// Stores the device list as a single JSON file, rewritten whole on every
/// change. Callers share a `DeviceStore` behind a mutex; nothing here caches
/// between calls, the file is the source of truth.
pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> DeviceStore {
        DeviceStore { path: path.into() }
    }

    /// Reads the device list. A missing or empty file is an empty list.
    pub fn read(&self) -> Result<Devices, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        if data.is_empty() {
            return Ok(Devices::default());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Adds a device to the list, deduplicating by mac address.
    pub fn add(&mut self, device: Device) -> Result<(), StoreError> {
        let mut devices = self.read()?;
        devices.add(device);
        self.write(&devices)
    }

    /// Removes every device with a matching mac address.
    pub fn remove(&mut self, device: &Device) -> Result<(), StoreError> {
        let mut devices = self.read()?;
        devices.remove(device);
        self.write(&devices)
    }

    fn write(&self, devices: &Devices) -> Result<(), StoreError> {
        let data = serde_json::to_vec(devices)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
