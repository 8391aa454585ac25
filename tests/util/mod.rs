// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Scripted HID backend for exercising the network surface without
//! hardware. Opened handles share the scripted state, so tests can observe
//! writes, feed input reports and count handle closes.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use hidbridge::{
    DeviceSummary, HidBackend, HidDeviceIo, HidError, HidResult, VirtualPath, MAX_REPORT_LEN,
};

#[derive(Clone)]
pub struct MockDeviceSpec {
    pub summary: DeviceSummary,
    /// Input reports served to readers, in order.
    pub input_reports: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Last feature report written; echoed back by reads.
    pub feature_store: Arc<Mutex<Option<Vec<u8>>>>,
    /// Output reports written through any handle.
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Number of handle closes.
    pub closed: Arc<AtomicUsize>,
}

impl MockDeviceSpec {
    pub fn new(
        interface_number: i32,
        vendor_id: u16,
        product_id: u16,
        usage_page: u16,
        usage: u16,
    ) -> Self {
        let mut summary = DeviceSummary {
            interface_number,
            vendor_id,
            product_id,
            usage_page,
            usage,
            manufacturer_string: "ACME".to_owned(),
            product_string: "Widget".to_owned(),
            virtual_path: String::new(),
        };
        summary.virtual_path = summary.virtual_path().to_string();
        Self {
            summary,
            input_reports: Arc::new(Mutex::new(VecDeque::new())),
            feature_store: Arc::new(Mutex::new(None)),
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn queue_input_report(&self, report: &[u8]) {
        self.input_reports
            .lock()
            .unwrap()
            .push_back(report.to_vec());
    }

    pub fn pending_input_reports(&self) -> usize {
        self.input_reports.lock().unwrap().len()
    }

    pub fn written_reports(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockBackend {
    pub devices: Vec<MockDeviceSpec>,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDeviceSpec>) -> Self {
        Self { devices }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl HidBackend for MockBackend {
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> HidResult<Vec<DeviceSummary>> {
        Ok(self
            .devices
            .iter()
            .filter(|spec| vendor_id == 0 || spec.summary.vendor_id == vendor_id)
            .filter(|spec| product_id == 0 || spec.summary.product_id == product_id)
            .map(|spec| spec.summary.clone())
            .collect())
    }

    fn open(&self, path: &VirtualPath) -> HidResult<Box<dyn HidDeviceIo>> {
        let spec = self
            .devices
            .iter()
            .find(|spec| spec.summary.virtual_path() == *path)
            .ok_or(HidError::NoSuchDevice)?;
        Ok(Box::new(MockDevice {
            input_reports: Arc::clone(&spec.input_reports),
            feature_store: Arc::clone(&spec.feature_store),
            written: Arc::clone(&spec.written),
            closed: Arc::clone(&spec.closed),
        }))
    }
}

struct MockDevice {
    input_reports: Arc<Mutex<VecDeque<Vec<u8>>>>,
    feature_store: Arc<Mutex<Option<Vec<u8>>>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicUsize>,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl HidDeviceIo for MockDevice {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> HidResult<usize> {
        let Some(report) = self.input_reports.lock().unwrap().pop_front() else {
            return Ok(0);
        };
        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        Ok(len)
    }

    fn write(&mut self, data: &[u8]) -> HidResult<usize> {
        self.written.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> HidResult<usize> {
        let Some(stored) = self.feature_store.lock().unwrap().clone() else {
            return Ok(0);
        };
        let len = stored.len().min(buf.len()).min(MAX_REPORT_LEN);
        buf[..len].copy_from_slice(&stored[..len]);
        Ok(len)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> HidResult<()> {
        *self.feature_store.lock().unwrap() = Some(data.to_vec());
        Ok(())
    }
}
