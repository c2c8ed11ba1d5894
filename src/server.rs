use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::codec::Codec;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::net::{EventGroup, Session, SessionListener, UdpListener};

/// TCP server facade: binds the configured address and runs an event group
/// over it. Bind and listen errors surface from [`start`](Self::start) and
/// are not retried.
///
/// For identity-keyed session tracking, idle eviction and `send_to`, front
/// the server with a [`SessionManager`](crate::manager::SessionManager)
/// instead of a bare listener.
pub struct Server<C: Codec> {
    config: ServerConfig,
    codec: Arc<C>,
    listener: Arc<dyn SessionListener<C>>,
    group: Option<EventGroup<C>>,
}

impl<C: Codec> Server<C> {
    pub fn new<L: SessionListener<C>>(config: ServerConfig, codec: C, listener: L) -> Self {
        Self::with_listener(config, Arc::new(codec), Arc::new(listener))
    }

    pub fn with_listener(
        config: ServerConfig,
        codec: Arc<C>,
        listener: Arc<dyn SessionListener<C>>,
    ) -> Self {
        Server {
            config,
            codec,
            listener,
            group: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.group.is_some() {
            return Ok(());
        }
        let mut group = EventGroup::tcp_server(&self.config, self.codec.clone(), self.listener.clone());
        group.start()?;
        self.group = Some(group);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut group) = self.group.take() {
            group.stop();
            info!(name = %self.config.name, "tcp server stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.group.as_ref().map(|g| g.is_started()).unwrap_or(false)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Actual bound address; useful when configured with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.group.as_ref().and_then(|g| g.local_addr())
    }
}

/// UDP server facade: one datagram socket shared by all logical peers.
pub struct UdpServer<C: Codec> {
    config: ServerConfig,
    codec: Arc<C>,
    listener: Arc<dyn UdpListener<C>>,
    group: Option<EventGroup<C>>,
}

impl<C: Codec> UdpServer<C> {
    pub fn new<L: UdpListener<C>>(config: ServerConfig, codec: C, listener: L) -> Self {
        Self::with_listener(config, Arc::new(codec), Arc::new(listener))
    }

    pub fn with_listener(
        config: ServerConfig,
        codec: Arc<C>,
        listener: Arc<dyn UdpListener<C>>,
    ) -> Self {
        UdpServer {
            config,
            codec,
            listener,
            group: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.group.is_some() {
            return Ok(());
        }
        let mut group = EventGroup::udp_server(&self.config, self.codec.clone(), self.listener.clone());
        group.start()?;
        self.group = Some(group);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut group) = self.group.take() {
            group.stop();
            info!(name = %self.config.name, "udp server stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.group.as_ref().map(|g| g.is_started()).unwrap_or(false)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.group.as_ref().and_then(|g| g.local_addr())
    }

    /// The shared socket session, for ad-hoc `send_to` without a manager.
    pub fn session(&self) -> Option<Arc<Session<C>>> {
        self.group.as_ref().and_then(|g| g.session().cloned())
    }
}
