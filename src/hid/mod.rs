// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! HID access seam.
//!
//! All device I/O flows through the [`HidBackend`]/[`HidDeviceIo`] traits so
//! the network surface can be exercised against a scripted double in tests.
//! The production implementation wraps `hidapi`.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;

use crate::path::VirtualPath;

pub mod reader;

/// Upper bound for a single report payload, in bytes.
pub const MAX_REPORT_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum HidError {
    #[error("no HID device matches the virtual path")]
    NoSuchDevice,

    #[error(transparent)]
    Api(#[from] hidapi::HidError),

    #[error("{0}")]
    Backend(String),
}

pub type HidResult<T> = std::result::Result<T, HidError>;

/// One enumerated HID interface, as reported to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub interface_number: i32,
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
    pub manufacturer_string: String,
    pub product_string: String,
    pub virtual_path: String,
}

impl DeviceSummary {
    /// The canonical path for this interface, with the interface number
    /// masked to 16 bits the way the path format requires.
    #[must_use]
    pub fn virtual_path(&self) -> VirtualPath {
        #[allow(clippy::cast_sign_loss)]
        let interface_number = self.interface_number as u32;
        VirtualPath::new(
            crate::path::truncate_u16(interface_number),
            self.vendor_id,
            self.product_id,
            self.usage_page,
            self.usage,
        )
    }
}

/// An open HID device handle.
///
/// Closing is implicit: dropping the boxed handle releases the device.
pub trait HidDeviceIo: Send {
    /// Read one input report. `Duration::ZERO` requests a non-blocking read;
    /// returns `Ok(0)` when no report is available within the timeout.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> HidResult<usize>;

    /// Send an output report. The first byte is the report id (0 for
    /// devices without numbered reports).
    fn write(&mut self, data: &[u8]) -> HidResult<usize>;

    /// Read a feature report; `buf[0]` carries the report id on entry.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> HidResult<usize>;

    /// Send a feature report; `data[0]` is the report id.
    fn send_feature_report(&mut self, data: &[u8]) -> HidResult<()>;
}

/// Device discovery and opening.
pub trait HidBackend: Send + Sync {
    /// Enumerate devices, filtered by vendor/product id (0 = wildcard).
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> HidResult<Vec<DeviceSummary>>;

    /// Open the first device whose descriptor renders to `path`.
    fn open(&self, path: &VirtualPath) -> HidResult<Box<dyn HidDeviceIo>>;
}

/// Production backend over `hidapi`.
#[allow(missing_debug_implementations)]
pub struct HidapiBackend {
    // refresh_devices() needs &mut while the backend is shared.
    api: Mutex<hidapi::HidApi>,
}

impl HidapiBackend {
    pub fn new() -> HidResult<Self> {
        let api = hidapi::HidApi::new_without_enumerate()?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }

    fn api(&self) -> MutexGuard<'_, hidapi::HidApi> {
        self.api.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn summarize(info: &hidapi::DeviceInfo) -> DeviceSummary {
    let mut summary = DeviceSummary {
        interface_number: info.interface_number(),
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        usage_page: info.usage_page(),
        usage: info.usage(),
        manufacturer_string: info.manufacturer_string().unwrap_or_default().to_owned(),
        product_string: info.product_string().unwrap_or_default().to_owned(),
        virtual_path: String::new(),
    };
    summary.virtual_path = summary.virtual_path().to_string();
    summary
}

impl HidBackend for HidapiBackend {
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> HidResult<Vec<DeviceSummary>> {
        let mut api = self.api();
        api.refresh_devices()?;
        Ok(api
            .device_list()
            .filter(|info| vendor_id == 0 || info.vendor_id() == vendor_id)
            .filter(|info| product_id == 0 || info.product_id() == product_id)
            .map(summarize)
            .collect())
    }

    fn open(&self, path: &VirtualPath) -> HidResult<Box<dyn HidDeviceIo>> {
        let mut api = self.api();
        api.refresh_devices()?;
        let info = api
            .device_list()
            .find(|info| summarize(info).virtual_path() == *path)
            .ok_or(HidError::NoSuchDevice)?;
        let device = api.open_path(info.path())?;
        // Blocking is controlled explicitly by a timeout with each read
        // request; this only ensures a consistent initial state.
        device.set_blocking_mode(true)?;
        Ok(Box::new(HidapiDeviceIo { device }))
    }
}

struct HidapiDeviceIo {
    device: hidapi::HidDevice,
}

impl HidDeviceIo for HidapiDeviceIo {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> HidResult<usize> {
        Ok(self.device.read_timeout(buf, timeout_millis(timeout))?)
    }

    fn write(&mut self, data: &[u8]) -> HidResult<usize> {
        Ok(self.device.write(data)?)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> HidResult<usize> {
        Ok(self.device.get_feature_report(buf)?)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> HidResult<()> {
        Ok(self.device.send_feature_report(data)?)
    }
}

// hidapi only supports timeouts with millisecond precision; 0 requests a
// non-blocking read.
fn timeout_millis(timeout: Duration) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    {
        timeout.as_millis().min(i32::MAX as u128) as i32
    }
}
