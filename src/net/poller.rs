use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};

/// Token reserved for the cross-thread waker; never handed to a channel.
pub(crate) const WAKER_TOKEN: Token = Token(0);

/// One readiness multiplexer.
///
/// Thin wrapper over `mio::Poll` that also owns the waker and the token
/// space. Tokens are allocated monotonically and never reused, so a stale
/// close request can never hit a newer registration.
pub(crate) struct Poller {
    poll: Poll,
    waker: Arc<Waker>,
    next_token: usize,
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(Poller {
            poll,
            waker,
            next_token: WAKER_TOKEN.0 + 1,
        })
    }

    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    pub fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        source.register(self.poll.registry(), token, interest)
    }

    pub fn reregister<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        source.reregister(self.poll.registry(), token, interest)
    }

    pub fn deregister<S: Source + ?Sized>(&self, source: &mut S) -> io::Result<()> {
        source.deregister(self.poll.registry())
    }

    pub fn poll(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(events, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_never_reused() {
        let mut poller = Poller::new().unwrap();
        let a = poller.alloc_token();
        let b = poller.alloc_token();
        assert_ne!(a, WAKER_TOKEN);
        assert_ne!(a, b);
    }

    #[test]
    fn wake_interrupts_a_blocked_poll() {
        let mut poller = Poller::new().unwrap();
        let waker = poller.waker();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            waker.wake().unwrap();
        });
        let mut events = Events::with_capacity(8);
        poller.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == WAKER_TOKEN));
        handle.join().unwrap();
    }
}
