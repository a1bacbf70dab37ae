//! brigade-worker — the coordination core.
//!
//! A worker process joins the bus, converges on a list of same-kind
//! peers, takes its turns accepting wildcard-routed jobs via the
//! rotating token, relays jobs along explicit routes with
//! retry-on-silence, and routes failures back to job originators.
//!
//! Business logic plugs in through [`JobHandler`]; everything else in
//! this crate is the protocol.

pub mod handler;
pub mod peer_set;
pub mod relay;
pub mod worker;

pub use handler::{JobContext, JobHandler};
pub use peer_set::PeerSet;
pub use relay::{InFlightJob, InFlightTable, RetryTimer};
pub use worker::{Worker, WorkerError, WorkerHandle, WorkerSnapshot};
