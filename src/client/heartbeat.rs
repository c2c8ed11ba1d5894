use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::codec::Codec;
use crate::error::Result;
use crate::utils::{spawn_interval, ServiceHandle};

use super::ClientCore;

/// Starts the heartbeat loop: while connected, the configured keep-alive
/// payload is queued once per interval. A failed send is only logged —
/// distinguishing real failure from transient backpressure is the
/// read-error and reconnect path's job.
pub(crate) fn spawn<C: Codec>(core: Arc<ClientCore<C>>, interval: Duration) -> Result<ServiceHandle> {
    let name = format!("{}-heartbeat", core.config.name);
    let handle = spawn_interval(name, interval, move || {
        if core.is_closing() || !core.is_connected() {
            return;
        }
        match core.send_heartbeat() {
            Ok(()) => trace!(name = %core.config.name, "heartbeat sent"),
            Err(e) => debug!(name = %core.config.name, error = %e, "heartbeat send failed"),
        }
    })?;
    Ok(handle)
}
