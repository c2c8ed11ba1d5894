use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info};

use crate::codec::Codec;
use crate::config::{resolve, ClientConfig, ServerConfig};
use crate::error::{Error, Result};

use super::listener::{SessionListener, UdpListener};
use super::poller::Poller;
use super::processor::{AcceptCtx, Op, ProcessorCore, ProcessorPart, ProcessorPool};
use super::session::Session;

enum Mode<C: Codec> {
    TcpServer {
        host: String,
        port: u16,
        listener: Arc<dyn SessionListener<C>>,
    },
    TcpClient {
        host: String,
        port: u16,
        listener: Arc<dyn SessionListener<C>>,
    },
    UdpServer {
        host: String,
        port: u16,
        listener: Arc<dyn UdpListener<C>>,
    },
    UdpClient {
        host: String,
        port: u16,
        listener: Arc<dyn UdpListener<C>>,
    },
}

impl<C: Codec> Clone for Mode<C> {
    fn clone(&self) -> Self {
        match self {
            Mode::TcpServer { host, port, listener } => Mode::TcpServer {
                host: host.clone(),
                port: *port,
                listener: listener.clone(),
            },
            Mode::TcpClient { host, port, listener } => Mode::TcpClient {
                host: host.clone(),
                port: *port,
                listener: listener.clone(),
            },
            Mode::UdpServer { host, port, listener } => Mode::UdpServer {
                host: host.clone(),
                port: *port,
                listener: listener.clone(),
            },
            Mode::UdpClient { host, port, listener } => Mode::UdpClient {
                host: host.clone(),
                port: *port,
                listener: listener.clone(),
            },
        }
    }
}

impl<C: Codec> Mode<C> {
    fn label(&self) -> &'static str {
        match self {
            Mode::TcpServer { .. } | Mode::UdpServer { .. } => "server",
            Mode::TcpClient { .. } | Mode::UdpClient { .. } => "client",
        }
    }
}

/// Root object for one server binding or one client connection: owns the
/// listening/connecting channel and a fixed pool of event processors, and
/// assigns new sessions to processors round-robin.
pub struct EventGroup<C: Codec> {
    name: String,
    codec: Arc<C>,
    mode: Mode<C>,
    selector_count: usize,
    buffer_size: usize,
    poll_timeout: Duration,
    connection_timeout: Option<Duration>,
    pool: Option<Arc<ProcessorPool<C>>>,
    threads: Vec<JoinHandle<()>>,
    session: Option<Arc<Session<C>>>,
    local_addr: Option<SocketAddr>,
    started: bool,
}

impl<C: Codec> EventGroup<C> {
    pub fn tcp_server(
        config: &ServerConfig,
        codec: Arc<C>,
        listener: Arc<dyn SessionListener<C>>,
    ) -> Self {
        Self::build(
            config.name.clone(),
            codec,
            Mode::TcpServer {
                host: config.host.clone(),
                port: config.port,
                listener,
            },
            config.selector_count,
            config.buffer_size,
            config.poll_timeout(),
            None,
        )
    }

    pub fn udp_server(
        config: &ServerConfig,
        codec: Arc<C>,
        listener: Arc<dyn UdpListener<C>>,
    ) -> Self {
        Self::build(
            config.name.clone(),
            codec,
            Mode::UdpServer {
                host: config.host.clone(),
                port: config.port,
                listener,
            },
            config.selector_count,
            config.buffer_size,
            config.poll_timeout(),
            None,
        )
    }

    pub fn tcp_client(
        config: &ClientConfig,
        codec: Arc<C>,
        listener: Arc<dyn SessionListener<C>>,
    ) -> Self {
        Self::build(
            config.name.clone(),
            codec,
            Mode::TcpClient {
                host: config.remote_host.clone(),
                port: config.port,
                listener,
            },
            1,
            config.buffer_size,
            config.poll_timeout(),
            config.connection_timeout(),
        )
    }

    pub fn udp_client(
        config: &ClientConfig,
        codec: Arc<C>,
        listener: Arc<dyn UdpListener<C>>,
    ) -> Self {
        Self::build(
            config.name.clone(),
            codec,
            Mode::UdpClient {
                host: config.remote_host.clone(),
                port: config.port,
                listener,
            },
            1,
            config.buffer_size,
            config.poll_timeout(),
            config.connection_timeout(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        name: String,
        codec: Arc<C>,
        mode: Mode<C>,
        selector_count: usize,
        buffer_size: usize,
        poll_timeout: Duration,
        connection_timeout: Option<Duration>,
    ) -> Self {
        EventGroup {
            name,
            codec,
            mode,
            selector_count: selector_count.max(1),
            buffer_size,
            poll_timeout,
            connection_timeout,
            pool: None,
            threads: Vec::new(),
            session: None,
            local_addr: None,
            started: false,
        }
    }

    /// Binds/connects the channel, spawns the processor pool and registers
    /// the initial interest (accept for servers, connect for clients).
    ///
    /// For a client with a connection timeout configured this blocks until
    /// the connect completes or fails with [`Error::ConnectionTimeout`].
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let pool = self.spawn_processors()?;
        self.pool = Some(pool.clone());
        if let Err(e) = self.register_channel(&pool) {
            self.stop();
            return Err(e);
        }
        self.started = true;
        Ok(())
    }

    /// Interrupts every processor, closes the channel and releases the
    /// pool. Safe to call at any time, including after a failed start.
    pub fn stop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        if let Some(session) = self.session.take() {
            // registration ops still in flight never reach a processor now
            session.mark_closed();
        }
        self.started = false;
        debug!(name = %self.name, "event group stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client-side session, or the shared socket session of a UDP
    /// server. `None` for a TCP server.
    pub fn session(&self) -> Option<&Arc<Session<C>>> {
        self.session.as_ref()
    }

    /// Actual bound address of a server channel. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn spawn_processors(&mut self) -> Result<Arc<ProcessorPool<C>>> {
        let count = self.selector_count;
        let mut pollers = Vec::with_capacity(count);
        let mut parts = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            let poller = Poller::new()?;
            let (tx, rx) = mpsc::channel();
            parts.push(ProcessorPart {
                ops: tx,
                waker: poller.waker(),
                running: Arc::new(AtomicBool::new(true)),
            });
            pollers.push(poller);
            receivers.push(rx);
        }
        let pool = Arc::new(ProcessorPool::new(parts));
        for (idx, (poller, rx)) in pollers.into_iter().zip(receivers).enumerate() {
            let label = format!("{}-{}-processor-{}", self.name, self.mode.label(), idx);
            let core = ProcessorCore::new(
                label.clone(),
                poller,
                rx,
                pool.part(idx).clone(),
                self.poll_timeout,
                self.buffer_size,
            );
            let handle = thread::Builder::new()
                .name(label)
                .spawn(move || core.run())
                .map_err(Error::Io)?;
            self.threads.push(handle);
        }
        Ok(pool)
    }

    fn register_channel(&mut self, pool: &Arc<ProcessorPool<C>>) -> Result<()> {
        let mode = self.mode.clone();
        match mode {
            Mode::TcpServer { host, port, listener } => {
                let addr = resolve(&host, port)?;
                let sock = TcpListener::bind(addr).map_err(|e| Error::Bind {
                    addr: addr.to_string(),
                    source: e,
                })?;
                self.local_addr = Some(sock.local_addr()?);
                info!(name = %self.name, addr = %self.local_addr.unwrap(), "tcp server listening");
                pool.dispatch(Op::RegisterAcceptor {
                    listener: sock,
                    ctx: AcceptCtx {
                        codec: self.codec.clone(),
                        listener,
                        pool: pool.clone(),
                    },
                })?;
            }
            Mode::TcpClient { host, port, listener } => {
                let addr = resolve(&host, port)?;
                let stream = TcpStream::connect(addr).map_err(|e| Error::Connect {
                    addr: addr.to_string(),
                    source: e,
                })?;
                let _ = stream.set_nodelay(true);
                let session = Arc::new(Session::new_tcp_connecting(self.codec.clone(), addr));
                self.session = Some(session.clone());
                info!(name = %self.name, addr = %addr, "connecting");
                pool.dispatch(Op::RegisterStream {
                    stream,
                    session: session.clone(),
                    listener,
                    connecting: true,
                })?;
                if let Some(timeout) = self.connection_timeout {
                    if !session.wait_connected(timeout) {
                        // a closed session means the handshake failed
                        // outright; anything else is a genuine timeout
                        return Err(if session.is_closed() {
                            Error::Connect {
                                addr: addr.to_string(),
                                source: std::io::Error::new(
                                    std::io::ErrorKind::ConnectionRefused,
                                    "connect failed before the timeout",
                                ),
                            }
                        } else {
                            Error::ConnectionTimeout(timeout)
                        });
                    }
                }
            }
            Mode::UdpServer { host, port, listener } => {
                let addr = resolve(&host, port)?;
                let socket = UdpSocket::bind(addr).map_err(|e| Error::Bind {
                    addr: addr.to_string(),
                    source: e,
                })?;
                self.local_addr = Some(socket.local_addr()?);
                info!(name = %self.name, addr = %self.local_addr.unwrap(), "udp server listening");
                let session = Arc::new(Session::new_udp(self.codec.clone(), None));
                self.session = Some(session.clone());
                pool.dispatch(Op::RegisterDatagram {
                    socket,
                    session,
                    listener,
                })?;
            }
            Mode::UdpClient { host, port, listener } => {
                let remote = resolve(&host, port)?;
                let bind_any: SocketAddr = if remote.is_ipv4() {
                    "0.0.0.0:0".parse().unwrap()
                } else {
                    "[::]:0".parse().unwrap()
                };
                let socket = UdpSocket::bind(bind_any).map_err(|e| Error::Bind {
                    addr: bind_any.to_string(),
                    source: e,
                })?;
                self.local_addr = Some(socket.local_addr()?);
                let session = Arc::new(Session::new_udp(self.codec.clone(), Some(remote)));
                self.session = Some(session.clone());
                info!(name = %self.name, remote = %remote, "udp client ready");
                pool.dispatch(Op::RegisterDatagram {
                    socket,
                    session: session.clone(),
                    listener,
                })?;
                // no handshake, but registration still has to land on the
                // owning processor before the session is usable
                if let Some(timeout) = self.connection_timeout {
                    if !session.wait_connected(timeout) {
                        return Err(Error::ConnectionTimeout(timeout));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<C: Codec> Drop for EventGroup<C> {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}
