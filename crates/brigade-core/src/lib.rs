//! brigade-core — shared types, route grammar, wire codec, and configuration.
//! All other Brigade crates depend on this one.

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod topic;

pub use codec::{CodecError, WireCodec};
pub use config::BrigadeConfig;
pub use descriptor::{RouteTarget, WorkerDescriptor};
pub use envelope::{ErrorNotice, JobEnvelope, PeerEntry};
