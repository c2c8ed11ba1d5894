#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use wireflow::{
    Error, LineCodec, ManagedSessionListener, Session, SessionListener, TcpSessionWrapper,
};

/// Polls `pred` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

#[derive(Default)]
pub struct RecordingInner {
    pub messages: Mutex<HashMap<String, Vec<String>>>,
    pub registered: AtomicUsize,
    pub after_closed: AtomicUsize,
    pub idle_removed: AtomicUsize,
}

/// Managed server listener recording every message per session id.
#[derive(Clone, Default)]
pub struct RecordingListener {
    inner: Arc<RecordingInner>,
}

impl RecordingListener {
    pub fn new() -> Self {
        RecordingListener::default()
    }

    pub fn total_messages(&self) -> usize {
        self.inner.messages.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn messages_for(&self, session_id: &str) -> Vec<String> {
        self.inner
            .messages
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.inner.messages.lock().unwrap().keys().cloned().collect()
    }

    pub fn registered(&self) -> usize {
        self.inner.registered.load(Ordering::SeqCst)
    }

    pub fn after_closed(&self) -> usize {
        self.inner.after_closed.load(Ordering::SeqCst)
    }

    pub fn idle_removed(&self) -> usize {
        self.inner.idle_removed.load(Ordering::SeqCst)
    }
}

impl ManagedSessionListener<LineCodec> for RecordingListener {
    fn on_session_registered(&self, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        self.inner.registered.fetch_add(1, Ordering::SeqCst);
        self.inner
            .messages
            .lock()
            .unwrap()
            .entry(wrapper.id().to_string())
            .or_default();
    }

    fn on_message_received(&self, message: String, wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        self.inner
            .messages
            .lock()
            .unwrap()
            .entry(wrapper.id().to_string())
            .or_default()
            .push(message);
    }

    fn on_after_session_closed(&self, _wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        self.inner.after_closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_idle_removed(&self, _wrapper: &Arc<TcpSessionWrapper<LineCodec>>) {
        self.inner.idle_removed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct ProbeInner {
    pub connected: AtomicUsize,
    pub registered: AtomicUsize,
    pub before_closed: AtomicUsize,
    pub after_closed: AtomicUsize,
    pub errors: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

/// Client-side listener counting lifecycle callbacks and recording received
/// messages.
#[derive(Clone, Default)]
pub struct ClientProbe {
    inner: Arc<ProbeInner>,
}

impl ClientProbe {
    pub fn new() -> Self {
        ClientProbe::default()
    }

    pub fn connected(&self) -> usize {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn after_closed(&self) -> usize {
        self.inner.after_closed.load(Ordering::SeqCst)
    }

    pub fn before_closed(&self) -> usize {
        self.inner.before_closed.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.messages.lock().unwrap().clone()
    }
}

impl SessionListener<LineCodec> for ClientProbe {
    fn on_session_connected(&self, _session: &Arc<Session<LineCodec>>) {
        self.inner.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_registered(&self, _session: &Arc<Session<LineCodec>>) {
        self.inner.registered.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message_received(&self, message: String, _session: &Arc<Session<LineCodec>>) {
        self.inner.messages.lock().unwrap().push(message);
    }

    fn on_before_session_closed(&self, _session: &Arc<Session<LineCodec>>) {
        self.inner.before_closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_after_session_closed(&self, _session: &Arc<Session<LineCodec>>) {
        self.inner.after_closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exception_caught(&self, _error: &Error, _session: &Arc<Session<LineCodec>>) {
        self.inner.errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Server config bound to an ephemeral loopback port.
pub fn loopback_server_config(name: &str) -> wireflow::ServerConfig {
    wireflow::ServerConfig {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        ..wireflow::ServerConfig::default()
    }
}

/// Client config pointed at `port` on loopback, with fast timeouts suited
/// to tests.
pub fn loopback_client_config(name: &str, port: u16) -> wireflow::ClientConfig {
    wireflow::ClientConfig {
        name: name.to_string(),
        remote_host: "127.0.0.1".to_string(),
        port,
        connection_timeout_ms: 3000,
        ..wireflow::ClientConfig::default()
    }
}
