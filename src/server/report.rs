// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! One-shot report transfers over HTTP.
//!
//! Each request opens a fresh device handle, performs a single transfer and
//! closes the handle again. One-shot requests never touch the session
//! registry; a device streamed by a session stays exclusively owned by it.

use std::time::Duration;

use axum::{
    body::to_bytes,
    extract::Request,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::{
    hid::{HidDeviceIo, HidError, MAX_REPORT_LEN},
    path::{ReportSelector, VirtualPath},
};

// Largest request body buffered before dispatching. Reports are two orders
// of magnitude smaller; anything bigger is rejected outright.
const BODY_LIMIT: usize = 64 * 1024;

const INPUT_READ_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) async fn handle(
    state: &AppState,
    virtual_path: &VirtualPath,
    suffix: &str,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let body = match to_bytes(req.into_body(), BODY_LIMIT).await {
        Ok(body) => body,
        Err(err) => {
            log::debug!("Failed to buffer request body: {err}");
            return not_found("request body could not be read");
        }
    };

    let mut device = match state.backend().open(virtual_path) {
        Ok(device) => device,
        Err(err) => {
            log::debug!("No HID was found for {virtual_path}: {err}");
            return not_found("HID virtual-path is incorrect");
        }
    };

    let is_set_request = method == Method::POST || method == Method::PUT;
    let is_get_request = method == Method::GET;
    match ReportSelector::parse(suffix) {
        Some(ReportSelector::Feature(rid)) if is_get_request => {
            get_feature(device.as_mut(), rid)
        }
        Some(ReportSelector::Feature(rid)) if is_set_request => {
            set_feature(device.as_mut(), rid, &body)
        }
        Some(ReportSelector::Input) if is_get_request => get_input(device.as_mut()),
        Some(ReportSelector::Output(rid)) if is_set_request => {
            set_output(device.as_mut(), rid, &body)
        }
        _ => not_found("HID request type is invalid"),
    }
    // The fresh handle closes when `device` drops here.
}

fn get_feature(device: &mut dyn HidDeviceIo, rid: u8) -> Response {
    let mut buf = [0u8; MAX_REPORT_LEN];
    buf[0] = rid;
    match device.get_feature_report(&mut buf) {
        Ok(len) if len > 0 => (StatusCode::OK, buf[..len].to_vec()).into_response(),
        Ok(_) => upstream_failure("Failed to get HID feature report", None),
        Err(err) => upstream_failure("Failed to get HID feature report", Some(&err)),
    }
}

fn set_feature(device: &mut dyn HidDeviceIo, rid: u8, body: &[u8]) -> Response {
    if body.len() > MAX_REPORT_LEN {
        return upstream_failure("HID feature report is too long", None);
    }
    if body.is_empty() {
        return upstream_failure("HID feature report has no body", None);
    }
    // Byte 0 always carries the report id from the URI; the payload is
    // padded with zeros up to the full report size.
    let mut data = [0u8; MAX_REPORT_LEN];
    data[0] = rid;
    data[1..body.len()].copy_from_slice(&body[1..]);
    match device.send_feature_report(&data) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => upstream_failure("Failed to set HID feature report", Some(&err)),
    }
}

fn get_input(device: &mut dyn HidDeviceIo) -> Response {
    let mut buf = [0u8; MAX_REPORT_LEN];
    match device.read_timeout(&mut buf, INPUT_READ_TIMEOUT) {
        Ok(len) if len > 0 => (StatusCode::OK, buf[..len].to_vec()).into_response(),
        Ok(_) => upstream_failure("Failed to read HID input report", None),
        Err(err) => upstream_failure("Failed to read HID input report", Some(&err)),
    }
}

fn set_output(device: &mut dyn HidDeviceIo, rid: u8, body: &[u8]) -> Response {
    if body.len() > MAX_REPORT_LEN - 1 {
        return upstream_failure("HID output report is too long", None);
    }
    if body.is_empty() {
        return upstream_failure("HID output report has no body", None);
    }
    let mut data = [0u8; MAX_REPORT_LEN];
    data[0] = if rid == 0 { body[0] } else { rid };
    data[1..body.len()].copy_from_slice(&body[1..]);
    match device.write(&data[..body.len()]) {
        Ok(len) if len > 0 => StatusCode::OK.into_response(),
        Ok(_) => upstream_failure("Failed to send HID output report", None),
        Err(err) => upstream_failure("Failed to send HID output report", Some(&err)),
    }
}

fn not_found(diagnostic: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("{diagnostic}\n")).into_response()
}

fn upstream_failure(diagnostic: &str, err: Option<&HidError>) -> Response {
    let body = err.map_or_else(
        || format!("{diagnostic}\n"),
        |err| format!("{diagnostic}\r\n{err}\r\n"),
    );
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}
