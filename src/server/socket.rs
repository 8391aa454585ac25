// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! WebSocket sessions.
//!
//! A handshake on a virtual path opens the device and creates a session;
//! every subsequent data frame runs the frame pump: forward an output
//! report downstream, then flush all queued input reports upstream as one
//! coalesced binary frame of `(u32 LE length, bytes)` records. An empty
//! queue is answered with a 4-byte all-zero keepalive frame.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::{
    path::{parse_leading_number, truncate_u8, VirtualPath},
    session::{ConnectionId, Session},
};

/// Handle a WebSocket handshake request on a virtual path.
///
/// The suffix after the path prefix is an optional report-id filter. On any
/// failure the upgrade is refused, which the client observes as an
/// immediately-closed connection.
pub(crate) fn handshake(
    state: &AppState,
    ws: WebSocketUpgrade,
    virtual_path: &VirtualPath,
    suffix: &str,
) -> Response {
    let report_id_filter = truncate_u8(parse_leading_number(suffix));
    let device = match state.backend().open(virtual_path) {
        Ok(device) => device,
        Err(err) => {
            log::warn!("Virtual path {virtual_path} could not be opened: {err}");
            return (StatusCode::NOT_FOUND, "virtual path could not be opened\n").into_response();
        }
    };
    let conn_id = state.conn_ids().next_id();
    let session = match Session::create(conn_id, device, report_id_filter) {
        Ok(session) => session,
        Err(err) => {
            log::error!("Failed to create a session for {virtual_path}: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    state.lock_registry().insert(session);
    log::info!(
        "Connection {conn_id} opened, {count} session(s) alive",
        count = state.lock_registry().count()
    );
    let state = state.clone();
    ws.on_upgrade(move |socket| serve_session(state, conn_id, socket))
}

async fn serve_session(state: AppState, conn_id: ConnectionId, mut socket: WebSocket) {
    while let Some(received) = socket.recv().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                log::debug!("Connection {conn_id} errored: {err}");
                break;
            }
        };
        let pumped = match message {
            Message::Binary(payload) => pump(&state, conn_id, Some(&payload), &mut socket).await,
            // Non-binary data frames still run the pump, without writing.
            Message::Text(_) => pump(&state, conn_id, None, &mut socket).await,
            Message::Ping(_) | Message::Pong(_) => Ok(()),
            Message::Close(_) => break,
        };
        if pumped.is_err() {
            break;
        }
    }
    // Reached on a close frame as well as on raw connection teardown.
    let removed = state.lock_registry().remove(conn_id);
    if let Some(session) = removed {
        session.destroy();
        log::info!(
            "Connection {conn_id} closed, {count} session(s) alive",
            count = state.lock_registry().count()
        );
    } else {
        log::debug!("Connection {conn_id} had no session at teardown");
    }
}

async fn pump(
    state: &AppState,
    conn_id: ConnectionId,
    payload: Option<&[u8]>,
    socket: &mut WebSocket,
) -> Result<(), axum::Error> {
    let shared = {
        let registry = state.lock_registry();
        registry
            .find(conn_id)
            .map(|session| Arc::clone(session.shared()))
    };
    let Some(shared) = shared else {
        // Data frame without a session is a protocol violation: log, ignore.
        log::debug!("Connection {conn_id} has no session");
        return Ok(());
    };
    let frame = {
        // One acquisition covers both the output write and the queue drain;
        // the reader contends on the same mutex.
        let mut guarded = shared.lock();
        if let Some(data) = payload.filter(|data| !data.is_empty()) {
            if let Err(err) = guarded.device.write(data) {
                log::warn!("Writing output report failed: {err}");
            }
        }
        let total = guarded.fifo.drained_len();
        if total > 0 {
            let mut frame = vec![0u8; total];
            let drained = guarded.fifo.drain_into(&mut frame);
            debug_assert_eq!(total, drained);
            frame
        } else {
            // Keepalive: tells the client there are no new reports.
            0_u32.to_le_bytes().to_vec()
        }
    };
    socket.send(Message::Binary(frame)).await
}
