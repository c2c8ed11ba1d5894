use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::net::{Session, UdpListener};
use crate::server::UdpServer;
use crate::utils::{spawn_interval, ServiceHandle};

use super::wrapper::SessionWrapper;
use super::SWEEP_INTERVAL_MS;

pub type UdpSessionWrapper<C> = SessionWrapper<SocketAddr, C>;

/// Application-facing callbacks of a managed UDP server.
///
/// A logical peer session is registered on the first datagram from an
/// address; `accept_registration` can veto that (e.g. for addresses that
/// should not become sessions). Returning `Some(reply)` from
/// `on_message_received` sends the reply back to the peer.
pub trait UdpManagedListener<C: Codec>: Send + Sync + 'static {
    fn accept_registration(&self, _wrapper: &Arc<UdpSessionWrapper<C>>) -> bool {
        true
    }

    fn on_session_registered(&self, _wrapper: &Arc<UdpSessionWrapper<C>>) {}

    fn on_message_received(
        &self,
        message: C::Message,
        wrapper: &Arc<UdpSessionWrapper<C>>,
    ) -> Option<C::Message>;

    /// A peer was evicted by the idle checker. The shared datagram socket
    /// stays open; only the table entry goes away.
    fn on_session_idle_removed(&self, _wrapper: &Arc<UdpSessionWrapper<C>>) {}

    fn on_exception_caught(&self, _error: &Error, _wrapper: Option<&Arc<UdpSessionWrapper<C>>>) {}
}

/// Source address → logical peer registry for a UDP server.
///
/// All wrappers share the server's single datagram socket session; identity
/// is the datagram source address and eviction only forgets the peer.
pub struct UdpSessionManager<C: Codec, L> {
    core: Arc<UdpManagerCore<C, L>>,
    server: Mutex<Option<UdpServer<C>>>,
    sweeper: Mutex<Option<ServiceHandle>>,
}

struct UdpManagerCore<C: Codec, L> {
    config: ServerConfig,
    codec: Arc<C>,
    listener: L,
    sessions: DashMap<SocketAddr, Arc<UdpSessionWrapper<C>>>,
    live: AtomicUsize,
    received: AtomicU64,
}

impl<C: Codec, L: UdpManagedListener<C>> UdpSessionManager<C, L> {
    pub fn new(config: ServerConfig, codec: C, listener: L) -> Self {
        UdpSessionManager {
            core: Arc::new(UdpManagerCore {
                config,
                codec: Arc::new(codec),
                listener,
                sessions: DashMap::new(),
                live: AtomicUsize::new(0),
                received: AtomicU64::new(0),
            }),
            server: Mutex::new(None),
            sweeper: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut guard = self.server.lock();
        if guard.is_some() {
            return Ok(());
        }
        let mut server = UdpServer::with_listener(
            self.core.config.clone(),
            self.core.codec.clone(),
            self.core.clone() as Arc<dyn UdpListener<C>>,
        );
        server.start()?;
        *guard = Some(server);
        drop(guard);

        if let Some(idle_timeout) = self.core.config.idle_timeout() {
            let core = self.core.clone();
            let handle = spawn_interval(
                format!("{}-idle-checker", self.core.config.name),
                Duration::from_millis(SWEEP_INTERVAL_MS),
                move || core.process_idle_sessions(idle_timeout),
            )?;
            *self.sweeper.lock() = Some(handle);
        }
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        if let Some(mut server) = self.server.lock().take() {
            server.stop();
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().and_then(|s| s.local_addr())
    }

    pub fn live_session_count(&self) -> usize {
        self.core.live.load(Ordering::Acquire)
    }

    pub fn messages_received(&self) -> u64 {
        self.core.received.load(Ordering::Relaxed)
    }

    pub fn session(&self, id: &SocketAddr) -> Option<Arc<UdpSessionWrapper<C>>> {
        self.core.session(id)
    }

    pub fn sessions(&self) -> Vec<Arc<UdpSessionWrapper<C>>> {
        self.core.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn contains(&self, id: &SocketAddr) -> bool {
        self.core.sessions.contains_key(id)
    }

    /// Sends to one peer by address; false when the address is not in the
    /// table.
    pub fn send_to(&self, id: &SocketAddr, message: &C::Message) -> Result<bool> {
        match self.core.session(id) {
            Some(wrapper) => {
                wrapper.session().send_to(*id, message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evicts peers idle past `idle_timeout`.
    pub fn process_idle_sessions(&self, idle_timeout: Duration) {
        self.core.process_idle_sessions(idle_timeout);
    }
}

impl<C: Codec, L: UdpManagedListener<C>> UdpManagerCore<C, L> {
    fn session(&self, id: &SocketAddr) -> Option<Arc<UdpSessionWrapper<C>>> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Forgets peers idle past the timeout; the shared socket session is
    /// left open.
    fn process_idle_sessions(&self, idle_timeout: Duration) {
        let expired: Vec<SocketAddr> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for() > idle_timeout)
            .map(|e| *e.key())
            .collect();
        for id in expired {
            if let Some((_, wrapper)) = self.sessions.remove(&id) {
                self.live.fetch_sub(1, Ordering::AcqRel);
                info!(session = %wrapper, "idle peer evicted");
                self.listener.on_session_idle_removed(&wrapper);
            }
        }
        debug!(
            live = self.live_count(),
            received = self.received.load(Ordering::Relaxed),
            "peer sweep"
        );
    }
}

impl<C: Codec, L: UdpManagedListener<C>> UdpListener<C> for UdpManagerCore<C, L> {
    fn on_message_received(
        &self,
        source: SocketAddr,
        message: C::Message,
        session: &Arc<Session<C>>,
    ) -> Option<C::Message> {
        let wrapper = match self.session(&source) {
            Some(wrapper) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                wrapper.touch();
                wrapper
            }
            None => {
                let wrapper = Arc::new(SessionWrapper::new(source, session.clone()));
                if !self.listener.accept_registration(&wrapper) {
                    debug!(source = %source, "peer registration rejected by admission hook");
                    return None;
                }
                self.sessions.insert(source, wrapper.clone());
                self.live.fetch_add(1, Ordering::AcqRel);
                debug!(session = %wrapper, count = self.live_count(), "peer registered");
                self.listener.on_session_registered(&wrapper);
                wrapper
            }
        };
        self.listener.on_message_received(message, &wrapper)
    }

    fn on_exception_caught(&self, error: &Error, source: Option<SocketAddr>) {
        let wrapper = source.and_then(|addr| self.session(&addr));
        warn!(source = ?source, error = %error, "datagram error");
        self.listener.on_exception_caught(error, wrapper.as_ref());
    }
}
