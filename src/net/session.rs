use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use mio::Token;
use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::codec::Codec;
use crate::error::{Error, Result};

use super::processor::{Op, ProcessorPart};

/// Connection state of a session.
///
/// `Closed` is terminal: no further I/O is permitted and the channel has
/// been released exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Connecting,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionKind {
    Tcp,
    Udp,
}

/// One queued outbound buffer. `target` is set for datagram sessions and
/// `None` on a stream, where bytes go to the connected peer.
pub(crate) struct Outbound {
    pub target: Option<SocketAddr>,
    pub data: Bytes,
}

/// Where a session lives once assigned: the owning processor's op queue and
/// waker, plus the registration token its channel got.
pub(crate) struct Registration<C: Codec> {
    pub token: Token,
    pub part: ProcessorPart<C>,
}

/// Stateful wrapper around one connection: identity, state machine, inbound
/// accumulator ownership (held by the processor), outbound queue, and
/// free-form attributes.
///
/// A session belongs to exactly one event processor for its entire
/// lifetime. Its channel is only ever touched by that processor; any thread
/// may call [`send`](Self::send) and [`close`](Self::close), which work by
/// mutating the queue/state and waking the owner.
pub struct Session<C: Codec> {
    id: Uuid,
    kind: SessionKind,
    remote: Option<SocketAddr>,
    codec: Arc<C>,
    status: Mutex<Status>,
    outbound: Mutex<VecDeque<Outbound>>,
    write_interest: AtomicBool,
    registration: Mutex<Option<Registration<C>>>,
    connect_latch: ConnectLatch,
    attrs: DashMap<String, String>,
    last_activity: Mutex<Instant>,
}

impl<C: Codec> Session<C> {
    fn new(kind: SessionKind, codec: Arc<C>, remote: Option<SocketAddr>, status: Status) -> Self {
        Session {
            id: Uuid::new_v4(),
            kind,
            remote,
            codec,
            status: Mutex::new(status),
            outbound: Mutex::new(VecDeque::new()),
            write_interest: AtomicBool::new(false),
            registration: Mutex::new(None),
            connect_latch: ConnectLatch::new(),
            attrs: DashMap::new(),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// An accepted server-side stream session.
    pub(crate) fn new_tcp(codec: Arc<C>, remote: Option<SocketAddr>) -> Self {
        Session::new(SessionKind::Tcp, codec, remote, Status::New)
    }

    /// A client-side stream session with the connect handshake in flight.
    pub(crate) fn new_tcp_connecting(codec: Arc<C>, remote: SocketAddr) -> Self {
        Session::new(SessionKind::Tcp, codec, Some(remote), Status::Connecting)
    }

    /// A datagram session. `remote` is the default send target, if any.
    pub(crate) fn new_udp(codec: Arc<C>, remote: Option<SocketAddr>) -> Self {
        Session::new(SessionKind::Udp, codec, remote, Status::New)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_udp(&self) -> bool {
        self.kind == SessionKind::Udp
    }

    /// Remote peer for a stream session, default target for a datagram one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == Status::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.status() == Status::Closed
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs.get(key).map(|v| v.value().clone())
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Time since the last I/O event dispatched for this session.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Encodes and queues a message, then requests write readiness from the
    /// owning processor. For a datagram session the configured default
    /// target is used.
    pub fn send(&self, message: &C::Message) -> Result<()> {
        let target = match self.kind {
            SessionKind::Tcp => None,
            SessionKind::Udp => Some(self.remote.ok_or(Error::NotConnected)?),
        };
        let Some(data) = self.codec.encode(message)? else {
            return Ok(());
        };
        self.enqueue(Outbound { target, data })
    }

    /// Queues a message for a specific destination address. Datagram
    /// sessions only.
    pub fn send_to(&self, target: SocketAddr, message: &C::Message) -> Result<()> {
        if self.kind != SessionKind::Udp {
            return Err(Error::IllegalState(
                "send_to is only valid on a datagram session".to_string(),
            ));
        }
        let Some(data) = self.codec.encode(message)? else {
            return Ok(());
        };
        self.enqueue(Outbound {
            target: Some(target),
            data,
        })
    }

    /// Queues pre-encoded bytes (the heartbeat path encodes once up front).
    pub(crate) fn send_raw(&self, data: Bytes) -> Result<()> {
        let target = match self.kind {
            SessionKind::Tcp => None,
            SessionKind::Udp => Some(self.remote.ok_or(Error::NotConnected)?),
        };
        self.enqueue(Outbound { target, data })
    }

    fn enqueue(&self, out: Outbound) -> Result<()> {
        if matches!(self.status(), Status::Closing | Status::Closed) {
            return Err(Error::NotConnected);
        }
        self.outbound.lock().push_back(out);
        self.request_write_interest();
        Ok(())
    }

    /// Initiates close. Idempotent and callable from any thread: the actual
    /// teardown (channel release, before/after callbacks) happens on the
    /// owning processor.
    pub fn close(&self) {
        let mut status = self.status.lock();
        if matches!(*status, Status::Closing | Status::Closed) {
            return;
        }
        let registration = self.registration.lock();
        match registration.as_ref() {
            Some(reg) => {
                *status = Status::Closing;
                let _ = reg.part.request(Op::Close(reg.token));
            }
            None => {
                // never made it to a processor; nothing owns a channel yet
                *status = Status::Closed;
                self.connect_latch.release();
            }
        }
    }

    /// Blocks until the connect handshake resolves or `timeout` elapses,
    /// returning whether the session ended up connected.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.connect_latch.wait(timeout) && self.is_connected()
    }

    pub(crate) fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub(crate) fn transition(&self, status: Status) {
        *self.status.lock() = status;
    }

    /// Terminal transition. Returns false if the session was already closed,
    /// guaranteeing release-once semantics for the caller.
    pub(crate) fn mark_closed(&self) -> bool {
        let mut status = self.status.lock();
        if *status == Status::Closed {
            return false;
        }
        *status = Status::Closed;
        drop(status);
        *self.registration.lock() = None;
        self.outbound.lock().clear();
        self.connect_latch.release();
        true
    }

    pub(crate) fn finish_connect(&self) {
        self.transition(Status::Connected);
        self.connect_latch.release();
    }

    pub(crate) fn set_registration(&self, registration: Registration<C>) {
        *self.registration.lock() = Some(registration);
    }

    pub(crate) fn outbound(&self) -> &Mutex<VecDeque<Outbound>> {
        &self.outbound
    }

    pub(crate) fn outbound_is_empty(&self) -> bool {
        self.outbound.lock().is_empty()
    }

    pub(crate) fn write_interest_flag(&self) -> &AtomicBool {
        &self.write_interest
    }

    /// Asks the owning processor for write readiness, once per queue
    /// non-empty episode. The flag is cleared by the processor when it turns
    /// write interest back off.
    fn request_write_interest(&self) {
        let registration = self.registration.lock();
        if let Some(reg) = registration.as_ref() {
            if !self.write_interest.swap(true, Ordering::AcqRel) {
                if reg.part.request(Op::EnableWrite(reg.token)).is_err() {
                    self.write_interest.store(false, Ordering::Release);
                }
            }
        }
    }
}

impl<C: Codec> fmt::Display for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let remote = self
            .remote
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        write!(
            f,
            "Session [id={}, remote={}, status={:?}]",
            self.id,
            remote,
            self.status()
        )
    }
}

/// One-shot latch resolving the connect handshake; released on success,
/// failure, and close so waiters never hang past the outcome.
struct ConnectLatch {
    done: Mutex<bool>,
    cv: Condvar,
}

impl ConnectLatch {
    fn new() -> Self {
        ConnectLatch {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cv.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.cv.wait_for(&mut done, deadline - now);
        }
        true
    }
}
