//! Client Facade
//!
//! A [`Client`] owns one outbound connection (TCP stream or UDP socket)
//! plus the two background services that keep it healthy: the reconnect
//! loop that repairs a dropped connection and the heartbeat loop that
//! injects keep-alive traffic. Both are enabled through the corresponding
//! intervals in [`ClientConfig`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::net::{EventGroup, Session, SessionListener, Status, UdpListener};
use crate::utils::ServiceHandle;

mod heartbeat;
mod reconnect;

enum ListenerKind<C: Codec> {
    Tcp(Arc<dyn SessionListener<C>>),
    Udp(Arc<dyn UdpListener<C>>),
}

pub(crate) struct ClientCore<C: Codec> {
    config: ClientConfig,
    codec: Arc<C>,
    listener: ListenerKind<C>,
    group: Mutex<Option<EventGroup<C>>>,
    closing: AtomicBool,
    heartbeat_payload: Mutex<Option<Bytes>>,
}

impl<C: Codec> ClientCore<C> {
    fn build_group(&self) -> EventGroup<C> {
        match &self.listener {
            ListenerKind::Tcp(listener) => {
                EventGroup::tcp_client(&self.config, self.codec.clone(), listener.clone())
            }
            ListenerKind::Udp(listener) => {
                EventGroup::udp_client(&self.config, self.codec.clone(), listener.clone())
            }
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.session().map(|s| s.is_connected()).unwrap_or(false)
    }

    pub fn session(&self) -> Option<Arc<Session<C>>> {
        self.group.lock().as_ref().and_then(|g| g.session().cloned())
    }

    fn connect(&self) -> Result<()> {
        let mut guard = self.group.lock();
        if let Some(session) = guard.as_ref().and_then(|g| g.session()) {
            // an in-flight or live connection is left alone
            if matches!(session.status(), Status::New | Status::Connecting | Status::Connected) {
                return Ok(());
            }
        }
        if let Some(mut old) = guard.take() {
            old.stop();
        }
        let mut group = self.build_group();
        info!(
            name = %self.config.name,
            remote = %format!("{}:{}", self.config.remote_host, self.config.port),
            "client connecting"
        );
        group.start()?;
        *guard = Some(group);
        Ok(())
    }

    pub fn reconnect(&self) -> Result<()> {
        if self.is_closing() || self.is_connected() {
            return Ok(());
        }
        let mut guard = self.group.lock();
        if let Some(mut old) = guard.take() {
            old.stop();
        }
        let mut group = self.build_group();
        info!(
            name = %self.config.name,
            remote = %format!("{}:{}", self.config.remote_host, self.config.port),
            "client reconnecting"
        );
        group.start()?;
        *guard = Some(group);
        Ok(())
    }

    fn send(&self, message: &C::Message) -> Result<()> {
        let session = self.session().ok_or(Error::NotConnected)?;
        session.send(message)
    }

    fn send_heartbeat(&self) -> Result<()> {
        let payload = self
            .heartbeat_payload
            .lock()
            .clone()
            .ok_or_else(|| Error::IllegalState("no heartbeat payload configured".to_string()))?;
        let session = self.session().ok_or(Error::NotConnected)?;
        session.send_raw(payload)
    }

    fn stop_group(&self) {
        if let Some(mut group) = self.group.lock().take() {
            group.stop();
        }
    }
}

/// One outbound connection with optional reconnect and heartbeat services.
///
/// `connect` establishes the connection (waiting up to the configured
/// connection timeout for TCP) and starts the services; `close` stops the
/// services first, then tears the connection down. Reconnecting rebuilds
/// the event group from scratch, the way a fresh connect would.
pub struct Client<C: Codec> {
    core: Arc<ClientCore<C>>,
    services: Mutex<Vec<ServiceHandle>>,
}

impl<C: Codec> Client<C> {
    /// A TCP client.
    pub fn tcp<L: SessionListener<C>>(config: ClientConfig, codec: C, listener: L) -> Self {
        Self::build(config, codec, ListenerKind::Tcp(Arc::new(listener)))
    }

    /// A UDP client; datagrams go to the configured remote address.
    pub fn udp<L: UdpListener<C>>(config: ClientConfig, codec: C, listener: L) -> Self {
        Self::build(config, codec, ListenerKind::Udp(Arc::new(listener)))
    }

    fn build(config: ClientConfig, codec: C, listener: ListenerKind<C>) -> Self {
        Client {
            core: Arc::new(ClientCore {
                config,
                codec: Arc::new(codec),
                listener,
                group: Mutex::new(None),
                closing: AtomicBool::new(false),
                heartbeat_payload: Mutex::new(None),
            }),
            services: Mutex::new(Vec::new()),
        }
    }

    /// Sets the keep-alive message sent by the heartbeat service. Encoded
    /// once up front; by convention the payload is the string `"0"` unless
    /// the `heartbeat_message` param says otherwise.
    pub fn set_heartbeat_message(&self, message: &C::Message) -> Result<()> {
        let payload = self.core.codec.encode(message)?;
        *self.core.heartbeat_payload.lock() = payload;
        Ok(())
    }

    /// Connects and starts the configured background services.
    pub fn connect(&self) -> Result<()> {
        self.core.closing.store(false, Ordering::Release);
        self.core.connect()?;
        self.start_services()?;
        Ok(())
    }

    /// Tears down and re-establishes the connection when currently
    /// disconnected; a connected client is left alone.
    pub fn reconnect(&self) -> Result<()> {
        self.core.reconnect()
    }

    pub fn send(&self, message: &C::Message) -> Result<()> {
        self.core.send(message)
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    pub fn is_closing(&self) -> bool {
        self.core.is_closing()
    }

    pub fn session(&self) -> Option<Arc<Session<C>>> {
        self.core.session()
    }

    /// Stops the services, then the connection. Idempotent.
    pub fn close(&self) {
        if self.core.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(name = %self.core.config.name, "client closing");
        for mut service in self.services.lock().drain(..) {
            service.stop();
        }
        self.core.stop_group();
    }

    fn start_services(&self) -> Result<()> {
        let mut services = self.services.lock();
        if !services.is_empty() {
            return Ok(());
        }
        if let Some(interval) = self.core.config.reconnect_interval() {
            services.push(reconnect::spawn(self.core.clone(), interval)?);
        }
        if let Some(interval) = self.core.config.heartbeat_interval() {
            if self.core.heartbeat_payload.lock().is_some() {
                services.push(heartbeat::spawn(self.core.clone(), interval)?);
            } else {
                warn!(
                    name = %self.core.config.name,
                    "heartbeat interval configured but no payload set; heartbeat disabled"
                );
            }
        }
        Ok(())
    }
}

impl<C: Codec> Drop for Client<C> {
    fn drop(&mut self) {
        self.close();
    }
}
