use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::codec::Codec;
use crate::net::Session;

/// Session manager table entry: identity key, back-reference to the live
/// session, last-touch timestamp for idle eviction, and a free attribute
/// map for application bookkeeping.
pub struct SessionWrapper<K, C: Codec> {
    id: K,
    session: Arc<Session<C>>,
    last_touch: Mutex<Instant>,
    attrs: DashMap<String, String>,
}

impl<K, C: Codec> SessionWrapper<K, C> {
    pub(crate) fn new(id: K, session: Arc<Session<C>>) -> Self {
        SessionWrapper {
            id,
            session,
            last_touch: Mutex::new(Instant::now()),
            attrs: DashMap::new(),
        }
    }

    pub fn id(&self) -> &K {
        &self.id
    }

    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    /// Resets the idle clock; called on every received message.
    pub fn touch(&self) {
        *self.last_touch.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touch.lock().elapsed()
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs.get(key).map(|v| v.value().clone())
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }
}

impl<K: fmt::Display, C: Codec> fmt::Display for SessionWrapper<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionWrapper [id={}]", self.id)
    }
}
