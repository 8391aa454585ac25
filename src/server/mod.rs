// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Network event dispatch.
//!
//! Every request lands in a single fallback handler that classifies it the
//! way the event loop of a classic embedded HTTP server would: virtual-path
//! requests become one-shot report transfers or WebSocket sessions, the
//! enumeration endpoint renders the device list, everything else falls
//! through to static file serving.
//!
//! Handlers run on a current-thread runtime, so all registry mutation
//! happens on one event-loop thread; the registry still travels behind a
//! mutex to satisfy `Send` bounds, and no guard is ever held across an
//! await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{ws::WebSocketUpgrade, Query, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    hid::{DeviceSummary, HidBackend},
    path::{parse_leading_number, truncate_u16, VirtualPath},
    session::{ConnectionIdGenerator, SessionRegistry},
};

mod files;
mod report;
mod socket;

pub use files::StaticFiles;

/// Dispatcher state, dependency-injected instead of process-global.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct AppState {
    backend: Arc<dyn HidBackend>,
    registry: Arc<Mutex<SessionRegistry>>,
    conn_ids: Arc<ConnectionIdGenerator>,
    files: Arc<StaticFiles>,
}

impl AppState {
    #[must_use]
    pub fn new(
        backend: Arc<dyn HidBackend>,
        registry: Arc<Mutex<SessionRegistry>>,
        files: StaticFiles,
    ) -> Self {
        Self {
            backend,
            registry,
            conn_ids: Arc::new(ConnectionIdGenerator::new()),
            files: Arc::new(files),
        }
    }

    pub(crate) fn backend(&self) -> &dyn HidBackend {
        self.backend.as_ref()
    }

    pub(crate) fn conn_ids(&self) -> &ConnectionIdGenerator {
        &self.conn_ids
    }

    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, SessionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the router over the dispatcher.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
    req: Request,
) -> Response {
    let uri = req.uri().clone();
    let path = uri.path();
    if let Ok((virtual_path, suffix)) = VirtualPath::parse_prefix(path) {
        let suffix = suffix.to_owned();
        if let Some(ws) = ws {
            // A failed handshake never reaches the session registry.
            return socket::handshake(&state, ws, &virtual_path, &suffix);
        }
        return report::handle(&state, &virtual_path, &suffix, req).await;
    }
    if path == "/hid//enumerate" {
        return enumerate(&state, &uri);
    }
    if path.starts_with("/hid/") {
        log::debug!("URI was invalid to request HID: {path}");
        return (StatusCode::NOT_FOUND, "URI is not a valid HID request\n").into_response();
    }
    state.files.serve(path).await
}

#[derive(Debug, Default, Deserialize)]
struct EnumerateQuery {
    vid: Option<String>,
    pid: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnumerateDocument {
    devices: Vec<DeviceSummary>,
    count: usize,
}

fn enumerate(state: &AppState, uri: &Uri) -> Response {
    let query = Query::<EnumerateQuery>::try_from_uri(uri)
        .map(|Query(query)| query)
        .unwrap_or_default();
    // 0 or absent enumerates all devices.
    let vid = truncate_u16(parse_leading_number(query.vid.as_deref().unwrap_or_default()));
    let pid = truncate_u16(parse_leading_number(query.pid.as_deref().unwrap_or_default()));
    match state.backend().enumerate(vid, pid) {
        Ok(devices) => {
            log::debug!("{count} HID interface(s) enumerated", count = devices.len());
            let count = devices.len();
            Json(EnumerateDocument { devices, count }).into_response()
        }
        Err(err) => {
            log::warn!("Enumeration failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to enumerate HID devices\r\n{err}\r\n"),
            )
                .into_response()
        }
    }
}

/// Resolve once a termination signal (SIGINT/SIGTERM) arrives.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for interrupt signals: {err}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
    log::info!("Termination signal received");
}
