use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use bytes::Buf;
use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Events, Interest, Token, Waker};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::{ByteBuf, DecodeCursor};
use crate::codec::Codec;
use crate::error::{Error, Result};

use super::listener::{SessionListener, UdpListener};
use super::poller::{Poller, WAKER_TOKEN};
use super::session::{Registration, Session, Status};

const EVENTS_CAPACITY: usize = 1024;

/// The face a processor shows to other threads: its op queue, its waker and
/// its run flag. Registration and deregistration requests go through here;
/// nothing outside the processor thread touches the poller itself.
pub(crate) struct ProcessorPart<C: Codec> {
    pub ops: Sender<Op<C>>,
    pub waker: Arc<Waker>,
    pub running: Arc<AtomicBool>,
}

impl<C: Codec> Clone for ProcessorPart<C> {
    fn clone(&self) -> Self {
        ProcessorPart {
            ops: self.ops.clone(),
            waker: self.waker.clone(),
            running: self.running.clone(),
        }
    }
}

impl<C: Codec> ProcessorPart<C> {
    /// Enqueues an op and wakes the processor out of its poll.
    pub fn request(&self, op: Op<C>) -> Result<()> {
        self.ops
            .send(op)
            .map_err(|e| Error::ChannelSend(e.to_string()))?;
        self.waker.wake()?;
        Ok(())
    }
}

/// Fixed pool of processors with a round-robin assignment cursor. The
/// cursor is a plain wrapping counter; modulo keeps it a valid index after
/// overflow.
pub(crate) struct ProcessorPool<C: Codec> {
    parts: Vec<ProcessorPart<C>>,
    cursor: AtomicUsize,
}

impl<C: Codec> ProcessorPool<C> {
    pub fn new(parts: Vec<ProcessorPart<C>>) -> Self {
        ProcessorPool {
            parts,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn part(&self, idx: usize) -> &ProcessorPart<C> {
        &self.parts[idx]
    }

    pub fn next(&self) -> &ProcessorPart<C> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.parts.len();
        &self.parts[idx]
    }

    pub fn dispatch(&self, op: Op<C>) -> Result<()> {
        self.next().request(op)
    }

    pub fn shutdown(&self) {
        for part in &self.parts {
            part.running.store(false, Ordering::Release);
            let _ = part.waker.wake();
        }
    }
}

/// Everything an acceptor needs to turn an inbound connection into a
/// registered session on some processor in the pool.
pub(crate) struct AcceptCtx<C: Codec> {
    pub codec: Arc<C>,
    pub listener: Arc<dyn SessionListener<C>>,
    pub pool: Arc<ProcessorPool<C>>,
}

/// Cross-thread requests applied on the processor's own loop iteration.
pub(crate) enum Op<C: Codec> {
    RegisterAcceptor {
        listener: TcpListener,
        ctx: AcceptCtx<C>,
    },
    RegisterStream {
        stream: TcpStream,
        session: Arc<Session<C>>,
        listener: Arc<dyn SessionListener<C>>,
        connecting: bool,
    },
    RegisterDatagram {
        socket: UdpSocket,
        session: Arc<Session<C>>,
        listener: Arc<dyn UdpListener<C>>,
    },
    EnableWrite(Token),
    Close(Token),
}

enum Entry<C: Codec> {
    Acceptor {
        listener: TcpListener,
        ctx: AcceptCtx<C>,
    },
    Stream(StreamConn<C>),
    Datagram(DatagramConn<C>),
}

struct StreamConn<C: Codec> {
    stream: TcpStream,
    session: Arc<Session<C>>,
    listener: Arc<dyn SessionListener<C>>,
    acc: ByteBuf,
    connected: bool,
}

struct DatagramConn<C: Codec> {
    socket: UdpSocket,
    session: Arc<Session<C>>,
    listener: Arc<dyn UdpListener<C>>,
}

enum Outcome {
    Keep,
    Accept,
    Eof,
    Fatal(Error),
}

/// One reactor worker: polls its multiplexer with a bounded timeout,
/// applies pending cross-thread ops, and dispatches readiness events to the
/// owning connections. An error while handling one session never takes the
/// loop down.
pub(crate) struct ProcessorCore<C: Codec> {
    name: String,
    poller: Poller,
    ops: Receiver<Op<C>>,
    self_part: ProcessorPart<C>,
    table: HashMap<Token, Entry<C>>,
    poll_timeout: Duration,
    scratch: Vec<u8>,
}

impl<C: Codec> ProcessorCore<C> {
    pub fn new(
        name: String,
        poller: Poller,
        ops: Receiver<Op<C>>,
        self_part: ProcessorPart<C>,
        poll_timeout: Duration,
        buffer_size: usize,
    ) -> Self {
        ProcessorCore {
            name,
            poller,
            ops,
            self_part,
            table: HashMap::new(),
            poll_timeout,
            scratch: vec![0u8; buffer_size.max(1)],
        }
    }

    pub fn run(mut self) {
        debug!(processor = %self.name, "event processor started");
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        while self.self_part.running.load(Ordering::Acquire) {
            if let Err(e) = self.poller.poll(&mut events, Some(self.poll_timeout)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!(processor = %self.name, error = %e, "poll failed, stopping processor");
                break;
            }
            self.drain_ops();
            for event in events.iter() {
                let token = event.token();
                if token == WAKER_TOKEN {
                    continue;
                }
                self.dispatch(token, event.is_readable(), event.is_writable());
            }
        }
        self.shutdown();
        debug!(processor = %self.name, "event processor stopped");
    }

    fn drain_ops(&mut self) {
        loop {
            match self.ops.try_recv() {
                Ok(op) => self.apply(op),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, op: Op<C>) {
        match op {
            Op::RegisterAcceptor { mut listener, ctx } => {
                let token = self.poller.alloc_token();
                match self.poller.register(&mut listener, token, Interest::READABLE) {
                    Ok(()) => {
                        self.table.insert(token, Entry::Acceptor { listener, ctx });
                    }
                    Err(e) => {
                        error!(processor = %self.name, error = %e, "failed to register acceptor")
                    }
                }
            }
            Op::RegisterStream {
                mut stream,
                session,
                listener,
                connecting,
            } => {
                let token = self.poller.alloc_token();
                let interest = if connecting {
                    Interest::WRITABLE
                } else if !session.outbound_is_empty() {
                    session.write_interest_flag().store(true, Ordering::Release);
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                if let Err(e) = self.poller.register(&mut stream, token, interest) {
                    error!(processor = %self.name, session = %session, error = %e, "failed to register session");
                    listener.on_exception_caught(&e.into(), &session);
                    session.mark_closed();
                    return;
                }
                session.set_registration(Registration {
                    token,
                    part: self.self_part.clone(),
                });
                if !connecting {
                    session.transition(Status::Connected);
                }
                debug!(processor = %self.name, session = %session, "session registered");
                listener.on_session_registered(&session);
                self.table.insert(
                    token,
                    Entry::Stream(StreamConn {
                        stream,
                        session,
                        listener,
                        acc: ByteBuf::with_capacity(self.scratch.len()),
                        connected: !connecting,
                    }),
                );
            }
            Op::RegisterDatagram {
                mut socket,
                session,
                listener,
            } => {
                let token = self.poller.alloc_token();
                let interest = if !session.outbound_is_empty() {
                    session.write_interest_flag().store(true, Ordering::Release);
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                if let Err(e) = self.poller.register(&mut socket, token, interest) {
                    error!(processor = %self.name, session = %session, error = %e, "failed to register datagram socket");
                    session.mark_closed();
                    return;
                }
                session.set_registration(Registration {
                    token,
                    part: self.self_part.clone(),
                });
                session.finish_connect();
                debug!(processor = %self.name, session = %session, "datagram socket registered");
                self.table.insert(
                    token,
                    Entry::Datagram(DatagramConn {
                        socket,
                        session,
                        listener,
                    }),
                );
            }
            Op::EnableWrite(token) => match self.table.get_mut(&token) {
                Some(Entry::Stream(conn)) => {
                    if conn.connected {
                        let _ = self.poller.reregister(
                            &mut conn.stream,
                            token,
                            Interest::READABLE | Interest::WRITABLE,
                        );
                    }
                }
                Some(Entry::Datagram(conn)) => {
                    let _ = self.poller.reregister(
                        &mut conn.socket,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    );
                }
                _ => {}
            },
            Op::Close(token) => self.close_entry(token, None),
        }
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        let outcome = match self.table.get_mut(&token) {
            None => return,
            Some(Entry::Acceptor { .. }) => Outcome::Accept,
            Some(Entry::Stream(conn)) => {
                Self::drive_stream(&self.poller, &mut self.scratch, token, conn, readable, writable)
            }
            Some(Entry::Datagram(conn)) => {
                Self::drive_datagram(&self.poller, &mut self.scratch, token, conn, readable, writable)
            }
        };
        match outcome {
            Outcome::Keep => {}
            Outcome::Accept => self.accept(token),
            Outcome::Eof => self.close_entry(token, None),
            Outcome::Fatal(err) => self.close_entry(token, Some(err)),
        }
    }

    fn accept(&mut self, token: Token) {
        let Some(Entry::Acceptor { listener, ctx }) = self.table.get_mut(&token) else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let session = Arc::new(Session::new_tcp(ctx.codec.clone(), Some(peer)));
                    debug!(processor = %self.name, peer = %peer, session = %session, "accepted connection");
                    ctx.listener.on_session_accepted(&session);
                    let part = ctx.pool.next();
                    if let Err(e) = part.request(Op::RegisterStream {
                        stream,
                        session,
                        listener: ctx.listener.clone(),
                        connecting: false,
                    }) {
                        error!(processor = %self.name, error = %e, "failed to hand off accepted connection");
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(processor = %self.name, error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn drive_stream(
        poller: &Poller,
        scratch: &mut [u8],
        token: Token,
        conn: &mut StreamConn<C>,
        readable: bool,
        writable: bool,
    ) -> Outcome {
        conn.session.touch();
        if writable && !conn.connected {
            match Self::finish_connect(poller, token, conn) {
                Ok(true) => {}
                Ok(false) => return Outcome::Keep,
                Err(err) => return Outcome::Fatal(err),
            }
        }
        if readable {
            match Self::read_stream(scratch, conn) {
                Ok(false) => {}
                Ok(true) => return Outcome::Eof,
                Err(err) => return Outcome::Fatal(err),
            }
        }
        if writable && conn.connected {
            if let Err(err) = Self::write_stream(poller, token, conn) {
                return Outcome::Fatal(err);
            }
        }
        Outcome::Keep
    }

    /// Completes a non-blocking connect: a writable event on a connecting
    /// stream means the handshake resolved one way or the other.
    fn finish_connect(poller: &Poller, token: Token, conn: &mut StreamConn<C>) -> Result<bool> {
        let addr = conn
            .session
            .remote_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        if let Some(err) = conn.stream.take_error()? {
            return Err(Error::Connect { addr, source: err });
        }
        match conn.stream.peer_addr() {
            Ok(_) => {
                conn.connected = true;
                conn.session.finish_connect();
                let interest = if conn.session.outbound_is_empty() {
                    conn.session
                        .write_interest_flag()
                        .store(false, Ordering::Release);
                    Interest::READABLE
                } else {
                    conn.session
                        .write_interest_flag()
                        .store(true, Ordering::Release);
                    Interest::READABLE | Interest::WRITABLE
                };
                poller.reregister(&mut conn.stream, token, interest)?;
                info!(session = %conn.session, "connection established");
                conn.listener.on_session_connected(&conn.session);
                Ok(true)
            }
            Err(ref e) if e.kind() == ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(Error::Connect { addr, source: e }),
        }
    }

    /// Drains the channel until it would block, then attempts decodes on a
    /// cursor over the accumulated bytes. Returns `Ok(true)` on EOF, after
    /// any bytes that arrived ahead of it have been dispatched.
    fn read_stream(scratch: &mut [u8], conn: &mut StreamConn<C>) -> Result<bool> {
        let mut eof = false;
        loop {
            match conn.stream.read(scratch) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    trace!(session = %conn.session, bytes = n, "read");
                    conn.acc.append(&scratch[..n]);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Self::decode_loop(conn)?;
        Ok(eof)
    }

    /// One decode round: each complete message is dispatched and its bytes
    /// consumed; an incomplete decode rewinds to the mark and leaves the
    /// partial bytes accumulated for the next readiness event.
    fn decode_loop(conn: &mut StreamConn<C>) -> Result<()> {
        let consumed = {
            let codec = conn.session.codec().clone();
            let mut cursor = conn.acc.cursor();
            loop {
                if cursor.is_empty() {
                    break;
                }
                cursor.mark();
                match codec.decode(&mut cursor) {
                    Ok(Some(message)) => {
                        conn.listener.on_message_received(message, &conn.session);
                    }
                    Ok(None) => {
                        cursor.reset();
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
            cursor.position()
        };
        conn.acc.consume(consumed);
        Ok(())
    }

    /// Drains the pending-write queue until the channel stops accepting
    /// bytes. When the queue empties, write interest is turned off (while
    /// still holding the queue lock, so a racing send cannot lose its wake).
    fn write_stream(poller: &Poller, token: Token, conn: &mut StreamConn<C>) -> Result<()> {
        let mut queue = conn.session.outbound().lock();
        loop {
            let Some(front) = queue.front_mut() else { break };
            match conn.stream.write(&front.data) {
                Ok(0) => {
                    warn!(session = %conn.session, "write returned zero");
                    break;
                }
                Ok(n) => {
                    trace!(session = %conn.session, bytes = n, "wrote");
                    front.data.advance(n);
                    if front.data.is_empty() {
                        queue.pop_front();
                    } else {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if queue.is_empty() {
            conn.session
                .write_interest_flag()
                .store(false, Ordering::Release);
            poller.reregister(&mut conn.stream, token, Interest::READABLE)?;
        }
        Ok(())
    }

    fn drive_datagram(
        poller: &Poller,
        scratch: &mut [u8],
        token: Token,
        conn: &mut DatagramConn<C>,
        readable: bool,
        writable: bool,
    ) -> Outcome {
        conn.session.touch();
        // datagram I/O errors are reported but never close the socket; a
        // single bad peer must not take the channel down
        if readable {
            if let Err(err) = Self::read_datagrams(scratch, conn) {
                warn!(session = %conn.session, error = %err, "datagram read error");
                conn.listener.on_exception_caught(&err, None);
            }
        }
        if writable {
            if let Err(err) = Self::write_datagrams(poller, token, conn) {
                warn!(session = %conn.session, error = %err, "datagram write error");
                conn.listener.on_exception_caught(&err, None);
            }
        }
        Outcome::Keep
    }

    fn read_datagrams(scratch: &mut [u8], conn: &mut DatagramConn<C>) -> Result<()> {
        loop {
            match conn.socket.recv_from(scratch) {
                Ok((n, source)) => {
                    let codec = conn.session.codec().clone();
                    let mut cursor = DecodeCursor::new(&scratch[..n]);
                    match codec.decode(&mut cursor) {
                        Ok(Some(message)) => {
                            conn.session.touch();
                            let reply =
                                conn.listener
                                    .on_message_received(source, message, &conn.session);
                            if let Some(reply) = reply {
                                if let Err(e) = conn.session.send_to(source, &reply) {
                                    warn!(source = %source, error = %e, "failed to queue reply");
                                }
                            }
                        }
                        // a datagram is a complete frame by definition
                        Ok(None) => {
                            warn!(source = %source, len = n, "dropping truncated datagram")
                        }
                        Err(err) => conn.listener.on_exception_caught(&err, Some(source)),
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn write_datagrams(poller: &Poller, token: Token, conn: &mut DatagramConn<C>) -> Result<()> {
        let mut queue = conn.session.outbound().lock();
        loop {
            let Some(front) = queue.front() else { break };
            let Some(target) = front.target else {
                queue.pop_front();
                continue;
            };
            let data = front.data.clone();
            match conn.socket.send_to(&data, target) {
                Ok(_) => {
                    queue.pop_front();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // drop the poison datagram so the queue cannot wedge
                    queue.pop_front();
                    return Err(e.into());
                }
            }
        }
        if queue.is_empty() {
            conn.session
                .write_interest_flag()
                .store(false, Ordering::Release);
            poller.reregister(&mut conn.socket, token, Interest::READABLE)?;
        }
        Ok(())
    }

    /// Removes a registration and releases its channel, reporting `error`
    /// first if the close was fault-driven. Runs at most once per token:
    /// repeated close requests find nothing in the table.
    fn close_entry(&mut self, token: Token, error: Option<Error>) {
        let Some(entry) = self.table.remove(&token) else {
            return;
        };
        match entry {
            Entry::Acceptor { mut listener, .. } => {
                let _ = self.poller.deregister(&mut listener);
                info!(processor = %self.name, "acceptor closed");
            }
            Entry::Stream(mut conn) => {
                if let Some(err) = &error {
                    warn!(session = %conn.session, error = %err, "closing session after error");
                    conn.listener.on_exception_caught(err, &conn.session);
                }
                conn.session.transition(Status::Closing);
                conn.listener.on_before_session_closed(&conn.session);
                let _ = self.poller.deregister(&mut conn.stream);
                drop(conn.stream);
                if conn.session.mark_closed() {
                    debug!(processor = %self.name, session = %conn.session, "session closed");
                    conn.listener.on_after_session_closed(&conn.session);
                }
            }
            Entry::Datagram(mut conn) => {
                if let Some(err) = &error {
                    warn!(session = %conn.session, error = %err, "closing datagram socket after error");
                    conn.listener.on_exception_caught(err, None);
                }
                let _ = self.poller.deregister(&mut conn.socket);
                drop(conn.socket);
                conn.session.mark_closed();
                debug!(processor = %self.name, session = %conn.session, "datagram socket closed");
            }
        }
    }

    /// Final drain when the loop exits: every remaining registration is
    /// closed with its callbacks so shutdown is observable.
    fn shutdown(&mut self) {
        let tokens: Vec<Token> = self.table.keys().copied().collect();
        for token in tokens {
            self.close_entry(token, None);
        }
    }
}
