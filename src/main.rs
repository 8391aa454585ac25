// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Server binary: flag parsing, logging, runtime setup, graceful shutdown.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context as _;
use clap::Parser as _;
use hidbridge::{config::Args, server, AppState, HidapiBackend, SessionRegistry, StaticFiles};
use tokio::net::TcpListener;

const BANNER: &str = "\
================================= hidbridge ==========================================
 HTTP server application for communication with HID devices via WebSocket.
 Browser clients can enumerate, read and write remote HID interfaces.

 Powered by the following Rust crates:
  * axum (MIT, https://github.com/tokio-rs/axum)
  * hidapi (MIT, https://github.com/ruabmbua/hidapi-rs)
  * tokio (MIT, https://github.com/tokio-rs/tokio)
======================================================================================";

fn main() -> anyhow::Result<()> {
    let args = Args::try_parse().unwrap_or_else(|err| {
        // Usage errors exit with status 1, matching the classic server.
        let _ = err.print();
        std::process::exit(1);
    });
    pretty_env_logger::init_timed();

    println!("{BANNER}");
    args.warn_unsupported();

    // One event-loop thread drives all network I/O and every dispatcher
    // path; only the per-session reader threads run beside it.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("creating the runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let backend = Arc::new(HidapiBackend::new().context("initializing hidapi")?);
    let registry = Arc::new(Mutex::new(SessionRegistry::new()));
    let docroot = args.resolved_docroot();
    log::info!("Serving static files from {docroot}", docroot = docroot.display());
    let files = StaticFiles::new(docroot, &args.url_rewrites);
    let state = AppState::new(backend, Arc::clone(&registry), files);
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("starting server on port {port}", port = args.port))?;
    println!("Starting HID streaming server on port {port}", port = args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .context("serving")?;

    // Sessions close before the registry goes away.
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .finalize();
    log::info!("Shutdown complete");
    Ok(())
}
