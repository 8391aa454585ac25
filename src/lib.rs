// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

#![doc = include_str!("../README.md")]

pub mod config;

pub mod fifo;
pub use self::fifo::PacketFifo;

pub mod hid;
pub use self::hid::{
    DeviceSummary, HidBackend, HidDeviceIo, HidError, HidResult, HidapiBackend, MAX_REPORT_LEN,
};

pub mod path;
pub use self::path::{ReportSelector, VirtualPath, VirtualPathError, VIRTUAL_PATH_LEN};

pub mod server;
pub use self::server::{router, AppState, StaticFiles};

pub mod session;
pub use self::session::{
    ConnectionId, ConnectionIdGenerator, Session, SessionError, SessionRegistry,
};
