//! In-process APM agent (spec §4.9): the top-level facade.
//!
//! [`Agent`] is the only type most host applications construct
//! directly — it validates configuration, wires every collector in
//! dependency order, and exposes each one's public handle for manual
//! instrumentation (the method tracer, the pool/session/live-query
//! feeds) plus the `tower` layer for automatic HTTP instrumentation.

mod snapshot;
mod supervisor;

pub use skysignal_types::AgentConfig;
pub use supervisor::Agent;
