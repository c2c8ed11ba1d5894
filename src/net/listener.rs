use std::net::SocketAddr;
use std::sync::Arc;

use crate::codec::Codec;
use crate::error::Error;

use super::session::Session;

/// Lifecycle and traffic callbacks for stream (TCP) sessions.
///
/// Callbacks run inline on the session's owning processor thread, so they
/// are strictly ordered per session and must not block; offload anything
/// long-running to your own worker pool. Every method except
/// [`on_message_received`](Self::on_message_received) has a no-op default.
pub trait SessionListener<C: Codec>: Send + Sync + 'static {
    /// A server accepted a new connection. The session is not yet
    /// registered with its owning processor at this point.
    fn on_session_accepted(&self, _session: &Arc<Session<C>>) {}

    /// A client's outbound connect completed.
    fn on_session_connected(&self, _session: &Arc<Session<C>>) {}

    /// The session was registered with its owning processor and can now
    /// receive traffic.
    fn on_session_registered(&self, _session: &Arc<Session<C>>) {}

    fn on_message_received(&self, message: C::Message, session: &Arc<Session<C>>);

    fn on_before_session_closed(&self, _session: &Arc<Session<C>>) {}

    fn on_after_session_closed(&self, _session: &Arc<Session<C>>) {}

    /// A session-fatal error was caught at the processor level. The session
    /// is closed right after this returns; the processor loop itself
    /// carries on.
    fn on_exception_caught(&self, _error: &Error, _session: &Arc<Session<C>>) {}
}

/// Callbacks for datagram (UDP) traffic.
///
/// UDP has no accept/connect lifecycle; each datagram carries its source
/// address for demultiplexing. Returning `Some(reply)` from
/// [`on_message_received`](Self::on_message_received) sends the reply back
/// to the source address.
pub trait UdpListener<C: Codec>: Send + Sync + 'static {
    fn on_message_received(
        &self,
        source: SocketAddr,
        message: C::Message,
        session: &Arc<Session<C>>,
    ) -> Option<C::Message>;

    fn on_exception_caught(&self, _error: &Error, _source: Option<SocketAddr>) {}
}
