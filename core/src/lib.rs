//! Serialized HTTP request dispatcher for constrained hosts.
//!
//! # Overview
//! Callers submit requests to a [`Dispatcher`]; a single worker executes
//! them strictly one after another through a host-supplied [`Transport`],
//! retrying failures in place and throttling on constrained platforms
//! (mini-game hosts). Every accepted request resolves exactly once, through
//! a callback or a [`Ticket`] future.
//!
//! # Design
//! - The core opens no sockets; the host plugs in a `Transport`,
//!   a `CapabilitySource` and a `ReachabilitySource`.
//! - `DispatcherConfig` is resolved against the platform once, at
//!   construction, into an immutable `RetryPolicy`.
//! - There is no global instance. The application builds one dispatcher and
//!   hands out clones.

pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod network;
pub mod platform;
pub mod transport;

pub use config::{DispatcherConfig, RetryPolicy};
pub use descriptor::{Outcome, RequestState, Ticket};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::DispatchError;
pub use http::{merge_headers, Headers, HttpMethod, HttpRequest, HttpResponse};
pub use network::{NetworkReachability, ReachabilitySource};
pub use platform::{CapabilitySource, PlatformType};
pub use transport::{BlockingTransport, Transport};
