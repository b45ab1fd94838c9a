//! Mock backend for testing.
//!
//! [`MockServer`] implements [`Connector`](crate::backend::Connector) without
//! any network. Exec requests and shell input run through a tiny fake shell
//! unless a fixed [`MockTimeline`] is configured, and a [`MockProbe`] records
//! every connect, authentication attempt, write and close so tests can check
//! that cleanup happened exactly once.
//!
//! # Example
//!
//! ```ignore
//! use ssh_sampler::mock::{MockServer, MockTimeline};
//!
//! let server = MockServer::new()
//!     .exec_reply(MockTimeline::new().stdout("partial").hang());
//! let probe = server.probe();
//! ```

pub mod event;
pub mod server;
mod shell;

pub use event::{MockEvent, MockTimeline};
pub use server::{MockConnection, MockControl, MockProbe, MockServer, MockSource, ProbeSnapshot};
