// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Session management.
//!
//! A session pairs one WebSocket connection with one exclusively-owned HID
//! device: the device handle, the report-id filter, the queue of captured
//! input reports and the reader thread that fills it. One mutex serializes
//! device and queue access between the reader and the dispatcher.
//!
//! Lifecycle invariants:
//! - a session exists exactly while its identity is registered and its
//!   reader thread is alive;
//! - the device handle is closed exactly once, after the reader has
//!   observed the disconnect flag and stopped;
//! - destruction signals the flag, then joins, then drops the handle.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, TryLockError,
};

use thiserror::Error;

use crate::{
    fifo::PacketFifo,
    hid::{reader::ReaderHandle, HidDeviceIo},
};

/// Opaque identity of one network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        let Self(value) = self;
        value
    }
}

/// Thread-safe [`ConnectionId`] generator.
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator(AtomicU64);

impl ConnectionIdGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[must_use]
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn the reader thread")]
    SpawnReader(#[source] std::io::Error),
}

/// State guarded by the session mutex: the device handle and the queue,
/// locked together so a frame pump can write and drain atomically.
#[allow(missing_debug_implementations)]
pub struct SessionGuarded {
    pub(crate) device: Box<dyn HidDeviceIo>,
    pub(crate) fifo: PacketFifo,
}

/// State shared between the session record and its reader thread.
#[allow(missing_debug_implementations)]
pub struct SessionShared {
    report_id_filter: u8,
    // Monotonic: false -> true, read lock-free by the reader.
    disconnect_requested: AtomicBool,
    guarded: Mutex<SessionGuarded>,
}

impl SessionShared {
    /// Report-id filter applied at capture time (0 accepts any report).
    #[must_use]
    pub(crate) fn report_id_filter(&self) -> u8 {
        self.report_id_filter
    }

    #[must_use]
    pub(crate) fn disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::Acquire)
    }

    fn request_disconnect(&self) {
        self.disconnect_requested.store(true, Ordering::Release);
    }

    /// Bounded-wait acquisition for the reader thread.
    #[must_use]
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, SessionGuarded>> {
        match self.guarded.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Blocking acquisition for the dispatcher.
    #[must_use]
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionGuarded> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live pairing of one connection with one opened HID device.
#[allow(missing_debug_implementations)]
pub struct Session {
    conn_id: ConnectionId,
    shared: Arc<SessionShared>,
    reader: Option<ReaderHandle>,
}

impl Session {
    /// Create the session record and spawn its reader thread.
    ///
    /// On failure all partial state unwinds; the device handle closes with
    /// the dropped record.
    pub fn create(
        conn_id: ConnectionId,
        device: Box<dyn HidDeviceIo>,
        report_id_filter: u8,
    ) -> Result<Self, SessionError> {
        let shared = Arc::new(SessionShared {
            report_id_filter,
            disconnect_requested: AtomicBool::new(false),
            guarded: Mutex::new(SessionGuarded {
                device,
                fifo: PacketFifo::new(),
            }),
        });
        let reader = ReaderHandle::spawn(conn_id, Arc::clone(&shared))
            .map_err(SessionError::SpawnReader)?;
        log::debug!("Session {conn_id} created (report-id filter {report_id_filter})");
        Ok(Self {
            conn_id,
            shared,
            reader: Some(reader),
        })
    }

    #[must_use]
    pub const fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    #[must_use]
    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Tear the session down: signal the reader, join it, release the
    /// device handle and the queue.
    ///
    /// The signal is stored before the join and no lock is held across it,
    /// so the reader can take the mutex, observe the flag and run to
    /// completion.
    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        self.shared.request_disconnect();
        reader.join();
        log::debug!("Session {conn_id} destroyed", conn_id = self.conn_id);
        // The device handle and the queue drop with the last Arc clone.
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Covers early-exit paths that never reach an explicit destroy().
        self.teardown();
    }
}

/// Insertion-ordered set of live sessions, keyed by connection identity.
///
/// Linear search is fine: a handful of sessions is the expected population.
/// Only the event-loop thread mutates the registry.
#[allow(missing_debug_implementations)]
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn find(&self, conn_id: ConnectionId) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|session| session.conn_id() == conn_id)
    }

    /// Append a session. The caller guarantees uniqueness by having checked
    /// [`Self::find`] first.
    pub fn insert(&mut self, session: Session) {
        debug_assert!(self.find(session.conn_id()).is_none());
        self.sessions.push(session);
    }

    /// Remove and return the session for `conn_id`, preserving the order of
    /// the surviving entries.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<Session> {
        let index = self
            .sessions
            .iter()
            .position(|session| session.conn_id() == conn_id)?;
        Some(self.sessions.remove(index))
    }

    /// Destroy every surviving session in insertion order.
    pub fn finalize(&mut self) {
        if !self.sessions.is_empty() {
            log::warn!(
                "Finalizing registry with {count} live session(s)",
                count = self.sessions.len()
            );
        }
        for session in self.sessions.drain(..) {
            session.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::hid::{HidResult, MAX_REPORT_LEN};

    /// Scripted device double: serves queued input reports, counts closes.
    struct ScriptedDevice {
        input_reports: Vec<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedDevice {
        fn new(input_reports: Vec<Vec<u8>>, closed: Arc<AtomicUsize>) -> Box<dyn HidDeviceIo> {
            let mut input_reports = input_reports;
            input_reports.reverse();
            Box::new(Self {
                input_reports,
                closed,
            })
        }
    }

    impl Drop for ScriptedDevice {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl HidDeviceIo for ScriptedDevice {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> HidResult<usize> {
            let Some(report) = self.input_reports.pop() else {
                return Ok(0);
            };
            let len = report.len().min(buf.len());
            buf[..len].copy_from_slice(&report[..len]);
            Ok(len)
        }

        fn write(&mut self, data: &[u8]) -> HidResult<usize> {
            Ok(data.len())
        }

        fn get_feature_report(&mut self, _buf: &mut [u8]) -> HidResult<usize> {
            Ok(0)
        }

        fn send_feature_report(&mut self, _data: &[u8]) -> HidResult<()> {
            Ok(())
        }
    }

    fn wait_for<F: FnMut() -> bool>(mut condition: F) {
        let deadline = Instant::now() + Duration::from_millis(500);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn generator_yields_unique_ids() {
        let generator = ConnectionIdGenerator::new();
        let first = generator.next_id();
        let second = generator.next_id();
        assert_ne!(first, second);
        assert_eq!(first.value() + 1, second.value());
    }

    #[test]
    fn reader_captures_length_prefixed_reports() {
        let closed = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice::new(
            vec![b"\x01AAAA".to_vec(), b"\x01BBBB".to_vec()],
            Arc::clone(&closed),
        );
        let session = Session::create(ConnectionId::new(1), device, 0).unwrap();
        wait_for(|| session.shared().lock().fifo.len() == 2);
        let mut buf = vec![0u8; 2 * (4 + 5)];
        let drained = session.shared().lock().fifo.drain_into(&mut buf);
        assert_eq!(buf.len(), drained);
        assert_eq!(
            b"\x05\x00\x00\x00\x01AAAA\x05\x00\x00\x00\x01BBBB".as_slice(),
            &buf[..drained]
        );
        session.destroy();
    }

    #[test]
    fn reader_applies_the_report_id_filter() {
        let closed = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice::new(
            vec![b"\x01MMMM".to_vec(), b"\x02XXXX".to_vec()],
            Arc::clone(&closed),
        );
        let session = Session::create(ConnectionId::new(2), device, 2).unwrap();
        wait_for(|| !session.shared().lock().fifo.is_empty());
        // Give the reader time to (wrongly) capture the filtered report.
        std::thread::sleep(Duration::from_millis(20));
        let mut buf = [0u8; MAX_REPORT_LEN];
        let shared = Arc::clone(session.shared());
        let mut guarded = shared.lock();
        assert_eq!(1, guarded.fifo.len());
        let len = guarded.fifo.pop_into(&mut buf);
        drop(guarded);
        assert_eq!(b"\x02\x00\x00\x00\x02XXXX".as_slice(), &buf[..len]);
        session.destroy();
    }

    #[test]
    fn destroy_stops_the_reader_and_closes_the_handle_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice::new(Vec::new(), Arc::clone(&closed));
        let session = Session::create(ConnectionId::new(3), device, 0).unwrap();
        assert_eq!(0, closed.load(Ordering::SeqCst));
        session.destroy();
        assert_eq!(1, closed.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_an_undestroyed_session_still_tears_down() {
        let closed = Arc::new(AtomicUsize::new(0));
        let device = ScriptedDevice::new(Vec::new(), Arc::clone(&closed));
        drop(Session::create(ConnectionId::new(4), device, 0).unwrap());
        assert_eq!(1, closed.load(Ordering::SeqCst));
    }

    #[test]
    fn find_after_insert_and_remove() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut registry = SessionRegistry::new();
        let conn_id = ConnectionId::new(5);
        assert!(registry.find(conn_id).is_none());

        let device = ScriptedDevice::new(Vec::new(), Arc::clone(&closed));
        registry.insert(Session::create(conn_id, device, 0).unwrap());
        assert_eq!(1, registry.count());
        assert_eq!(
            Some(conn_id),
            registry.find(conn_id).map(Session::conn_id)
        );

        let removed = registry.remove(conn_id).unwrap();
        assert!(registry.find(conn_id).is_none());
        assert_eq!(0, registry.count());
        assert!(registry.remove(conn_id).is_none());
        removed.destroy();
    }

    #[test]
    fn finalize_destroys_survivors_in_order() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut registry = SessionRegistry::new();
        for id in 0..3 {
            let device = ScriptedDevice::new(Vec::new(), Arc::clone(&closed));
            registry.insert(Session::create(ConnectionId::new(id), device, 0).unwrap());
        }
        registry.finalize();
        assert_eq!(0, registry.count());
        assert_eq!(3, closed.load(Ordering::SeqCst));
    }
}
