use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::codec::Codec;
use crate::error::Result;
use crate::utils::{spawn_interval, ServiceHandle};

use super::ClientCore;

/// Debounced reconnect decision.
///
/// A reconnect fires only on the second consecutive disconnected
/// observation, then the counter resets. The one-iteration grace period is
/// deliberate: a single transient readiness hiccup must not trigger a
/// reconnect storm.
pub(crate) struct ReconnectPolicy {
    failures: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        ReconnectPolicy { failures: 0 }
    }

    /// Feeds one connectivity observation; returns whether to reconnect now.
    pub fn observe(&mut self, connected: bool) -> bool {
        if connected {
            self.failures = 0;
            return false;
        }
        self.failures += 1;
        if self.failures >= 2 {
            self.failures = 0;
            true
        } else {
            false
        }
    }
}

/// Starts the reconnect loop: one connectivity check per interval, repaired
/// through [`ClientCore::reconnect`]. Errors are logged and retried on the
/// next iteration; the loop only ends on explicit client shutdown.
pub(crate) fn spawn<C: Codec>(core: Arc<ClientCore<C>>, interval: Duration) -> Result<ServiceHandle> {
    let name = format!("{}-reconnect", core.config.name);
    let mut policy = ReconnectPolicy::new();
    let handle = spawn_interval(name, interval, move || {
        if core.is_closing() {
            return;
        }
        if policy.observe(core.is_connected()) {
            debug!(name = %core.config.name, "disconnected twice in a row, reconnecting");
            if let Err(e) = core.reconnect() {
                warn!(name = %core.config.name, error = %e, "reconnect attempt failed");
            }
        }
    })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_two_consecutive_disconnected_observations() {
        let mut policy = ReconnectPolicy::new();
        assert!(!policy.observe(false));
        assert!(policy.observe(false));
    }

    #[test]
    fn a_connected_observation_resets_the_streak() {
        let mut policy = ReconnectPolicy::new();
        assert!(!policy.observe(false));
        assert!(!policy.observe(true));
        assert!(!policy.observe(false));
        assert!(policy.observe(false));
    }

    #[test]
    fn one_reconnect_per_disconnected_streak() {
        let mut policy = ReconnectPolicy::new();
        let reconnects = (0..10).filter(|_| policy.observe(false)).count();
        // counter resets after each trigger, so every second check fires
        assert_eq!(reconnects, 5);
    }

    #[test]
    fn connected_stream_never_triggers() {
        let mut policy = ReconnectPolicy::new();
        assert!((0..10).all(|_| !policy.observe(true)));
    }
}
