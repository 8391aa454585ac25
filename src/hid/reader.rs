// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Input report capture.
//!
//! Each session runs one dedicated OS thread that polls its device with
//! non-blocking reads and appends accepted reports to the session queue.
//! The thread never touches the network connection; the dispatcher drains
//! the queue on its own schedule.

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use super::MAX_REPORT_LEN;
use crate::session::{ConnectionId, SessionShared};

/// Byte length of the little-endian record prefix stamped before each
/// captured report, so coalesced WebSocket frames keep record boundaries.
pub const LENGTH_PREFIX_LEN: usize = 4;

// Polling cadence. The read itself is non-blocking; the sleep bounds both
// latency and CPU burn.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Join handle of one session's reader thread.
#[derive(Debug)]
pub struct ReaderHandle {
    join_handle: JoinHandle<()>,
}

impl ReaderHandle {
    /// Spawn the reader for `shared`.
    ///
    /// The thread exits cooperatively once the session's disconnect flag is
    /// observed; worst-case latency is one poll interval.
    pub(crate) fn spawn(
        conn_id: ConnectionId,
        shared: Arc<SessionShared>,
    ) -> std::io::Result<Self> {
        let join_handle = std::thread::Builder::new()
            .name(format!("hid-reader-{conn_id}"))
            .spawn(move || read_loop(&shared))?;
        Ok(Self { join_handle })
    }

    pub(crate) fn join(self) {
        let Self { join_handle } = self;
        if join_handle.join().is_err() {
            log::error!("Reader thread panicked");
        }
    }
}

fn read_loop(shared: &SessionShared) {
    let mut buf = [0u8; LENGTH_PREFIX_LEN + MAX_REPORT_LEN];
    let filter = shared.report_id_filter();
    while !shared.disconnect_requested() {
        // Try-lock, not lock: the dispatcher needs the same mutex to drain
        // the queue and to write output reports, and must not be starved.
        if let Some(mut guarded) = shared.try_lock() {
            match guarded
                .device
                .read_timeout(&mut buf[LENGTH_PREFIX_LEN..], Duration::ZERO)
            {
                Ok(len) if len > 0 => {
                    let report_id = buf[LENGTH_PREFIX_LEN];
                    if filter == 0 || filter == report_id {
                        #[allow(clippy::cast_possible_truncation)]
                        let prefix = (len as u32).to_le_bytes();
                        buf[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
                        guarded.fifo.push(&buf[..LENGTH_PREFIX_LEN + len]);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    log::debug!("Reading input report failed: {err}");
                }
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
