use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::Codec;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::net::{Session, SessionListener};
use crate::server::Server;
use crate::utils::{spawn_interval, ServiceHandle};

use super::wrapper::SessionWrapper;
use super::SWEEP_INTERVAL_MS;

pub type TcpSessionWrapper<C> = SessionWrapper<Uuid, C>;

/// Application-facing callbacks of a managed TCP server.
///
/// `accept_registration` is the admission hook: returning false discards
/// the session without adding it to the table.
pub trait ManagedSessionListener<C: Codec>: Send + Sync + 'static {
    fn accept_registration(&self, _wrapper: &Arc<TcpSessionWrapper<C>>) -> bool {
        true
    }

    fn on_session_registered(&self, _wrapper: &Arc<TcpSessionWrapper<C>>) {}

    fn on_message_received(&self, message: C::Message, wrapper: &Arc<TcpSessionWrapper<C>>);

    fn on_before_session_closed(&self, _wrapper: &Arc<TcpSessionWrapper<C>>) {}

    fn on_after_session_closed(&self, _wrapper: &Arc<TcpSessionWrapper<C>>) {}

    /// A session was evicted by the idle checker (already closed).
    fn on_session_idle_removed(&self, _wrapper: &Arc<TcpSessionWrapper<C>>) {}

    fn on_exception_caught(&self, _error: &Error, _wrapper: &Arc<TcpSessionWrapper<C>>) {}
}

/// Identity → session registry for a TCP server.
///
/// The table and the live counter together are the authoritative "currently
/// connected" view: an entry exists exactly while the underlying session is
/// registered and not yet closed, and the counter always equals the table
/// size. The table tolerates concurrent insert/remove/iterate from reactor
/// threads, the idle sweeper and application threads.
pub struct SessionManager<C: Codec, L> {
    core: Arc<ManagerCore<C, L>>,
    server: Mutex<Option<Server<C>>>,
    sweeper: Mutex<Option<ServiceHandle>>,
}

struct ManagerCore<C: Codec, L> {
    config: ServerConfig,
    codec: Arc<C>,
    listener: L,
    sessions: DashMap<Uuid, Arc<TcpSessionWrapper<C>>>,
    live: AtomicUsize,
    received: AtomicU64,
}

impl<C: Codec, L: ManagedSessionListener<C>> SessionManager<C, L> {
    pub fn new(config: ServerConfig, codec: C, listener: L) -> Self {
        SessionManager {
            core: Arc::new(ManagerCore {
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

    /// Builds and starts the underlying server with this manager as its
    /// listener, plus the idle sweeper when an idle timeout is configured.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.server.lock();
        if guard.is_some() {
            return Ok(());
        }
        let mut server = Server::with_listener(
            self.core.config.clone(),
            self.core.codec.clone(),
            self.core.clone() as Arc<dyn SessionListener<C>>,
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

    /// Total messages received across all sessions.
    pub fn messages_received(&self) -> u64 {
        self.core.received.load(Ordering::Relaxed)
    }

    pub fn session(&self, id: &Uuid) -> Option<Arc<TcpSessionWrapper<C>>> {
        self.core.session(id)
    }

    /// Snapshot of the current wrappers.
    pub fn sessions(&self) -> Vec<Arc<TcpSessionWrapper<C>>> {
        self.core.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.core.sessions.contains_key(id)
    }

    /// Sends to one session by identity; false when the identity is not in
    /// the table.
    pub fn send_to(&self, id: &Uuid, message: &C::Message) -> Result<bool> {
        match self.core.session(id) {
            Some(wrapper) => {
                wrapper.session().send(message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes one session by identity. Removal from the table happens via
    /// the regular after-close callback.
    pub fn close_session(&self, id: &Uuid) -> bool {
        match self.core.session(id) {
            Some(wrapper) => {
                wrapper.session().close();
                true
            }
            None => false,
        }
    }

    /// Evicts every session whose last touch is older than `idle_timeout`.
    pub fn process_idle_sessions(&self, idle_timeout: Duration) {
        self.core.process_idle_sessions(idle_timeout);
    }
}

impl<C: Codec, L: ManagedSessionListener<C>> ManagerCore<C, L> {
    fn session(&self, id: &Uuid) -> Option<Arc<TcpSessionWrapper<C>>> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Removes everything idle past the timeout: table entry first, then the
    /// session itself, then the listener notification. Tolerates concurrent
    /// inserts and removals from the reactor threads.
    fn process_idle_sessions(&self, idle_timeout: Duration) {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for() > idle_timeout)
            .map(|e| *e.key())
            .collect();
        for id in expired {
            if let Some((_, wrapper)) = self.sessions.remove(&id) {
                self.live.fetch_sub(1, Ordering::AcqRel);
                info!(session = %wrapper, idle = ?wrapper.idle_for(), "idle session evicted");
                wrapper.session().close();
                self.listener.on_session_idle_removed(&wrapper);
            }
        }
        debug!(
            live = self.live_count(),
            received = self.received.load(Ordering::Relaxed),
            "session sweep"
        );
    }
}

impl<C: Codec, L: ManagedSessionListener<C>> SessionListener<C> for ManagerCore<C, L> {
    fn on_session_registered(&self, session: &Arc<Session<C>>) {
        let wrapper = Arc::new(SessionWrapper::new(session.id(), session.clone()));
        if !self.listener.accept_registration(&wrapper) {
            debug!(session = %wrapper, "session registration rejected by admission hook");
            return;
        }
        self.sessions.insert(session.id(), wrapper.clone());
        self.live.fetch_add(1, Ordering::AcqRel);
        debug!(session = %wrapper, count = self.live_count(), "session registered");
        self.listener.on_session_registered(&wrapper);
    }

    fn on_message_received(&self, message: C::Message, session: &Arc<Session<C>>) {
        let Some(wrapper) = self.session(&session.id()) else {
            return;
        };
        self.received.fetch_add(1, Ordering::Relaxed);
        wrapper.touch();
        self.listener.on_message_received(message, &wrapper);
    }

    fn on_before_session_closed(&self, session: &Arc<Session<C>>) {
        if let Some(wrapper) = self.session(&session.id()) {
            self.listener.on_before_session_closed(&wrapper);
        }
    }

    fn on_after_session_closed(&self, session: &Arc<Session<C>>) {
        if let Some((_, wrapper)) = self.sessions.remove(&session.id()) {
            self.live.fetch_sub(1, Ordering::AcqRel);
            debug!(session = %wrapper, count = self.live_count(), "session removed");
            self.listener.on_after_session_closed(&wrapper);
        }
    }

    fn on_exception_caught(&self, error: &Error, session: &Arc<Session<C>>) {
        if let Some(wrapper) = self.session(&session.id()) {
            warn!(session = %wrapper, error = %error, "session error");
            self.listener.on_exception_caught(error, &wrapper);
        }
    }
}
