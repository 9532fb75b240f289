//! Queue backend connection supervision for hookgate.
//!
//! In queue mode, workflow executions are dispatched to workers through a
//! shared Redis-compatible backing store. This crate keeps the main process
//! honest about whether that store is reachable:
//!
//! - [`RetryPolicy`] decides how long to wait after each failure and when the
//!   accumulated downtime is too large to continue.
//! - [`Reconnector`] drives a [`QueueTransport`] through connect/reconnect
//!   cycles, asking a [`ReconnectHook`] for every delay.
//! - [`QueueConnectionMonitor`] is that hook: it tracks [`MonitorState`],
//!   publishes queue readiness, and reports a fatal outage.
//! - [`RespTransport`] talks RESP2 to a single node or a cluster.
//!
//! # Example
//!
//! ```ignore
//! use hookgate_queue::{QueueConnectionMonitor, RespTransport, RedisSettings, RetryPolicy};
//!
//! let transport = RespTransport::new(RedisSettings::single("localhost", 6379));
//! let handle = QueueConnectionMonitor::new(RetryPolicy::default()).start(transport);
//! handle.fatal().await; // resolves only if the backend stays unreachable
//! ```

pub mod error;
pub mod monitor;
pub mod resp;
pub mod retry;
pub mod transport;

pub use error::{TransportError, TransportErrorKind};
pub use monitor::{MonitorHandle, MonitorState, QueueConnectionMonitor, QueueReadiness};
pub use resp::{RedisSettings, RespTransport, Topology};
pub use retry::{RetryDecision, RetryPolicy, RetryWindow};
pub use transport::{QueueSession, QueueTransport, ReconnectHook, Reconnector};
