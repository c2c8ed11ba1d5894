//! Reactor Core
//!
//! The non-blocking I/O engine: a pool of event processors, each owning one
//! readiness poller and the sessions registered to it, with an event group
//! as the root object per server binding or client connection.
//!
//! # Architecture
//!
//! ```text
//! EventGroup ──owns──> [EventProcessor; selector_count]
//!     │                      │ owns
//!     │                      ├── Poller (one readiness multiplexer)
//!     │                      └── token → connection table
//!     └──round-robin assigns new sessions to processors
//! ```
//!
//! Every I/O event for a session is dispatched by its single owning
//! processor thread, so session reads, writes and close callbacks are
//! strictly ordered. Other threads interact with a processor only through
//! its pending-operation queue plus a waker, never by touching the poller
//! directly.

pub use group::EventGroup;
pub use listener::{SessionListener, UdpListener};
pub use session::{Session, Status};

mod group;
mod listener;
mod poller;
mod processor;
mod session;
