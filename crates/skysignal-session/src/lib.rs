//! Session Wrapper (spec §4.6): intercepts per-session send/receive
//! traffic exactly once per session, drives the subscription lifecycle
//! state machine, and tracks ping/pong latency.

mod frame;
mod registry;

pub use frame::{extract_msg_type, parse_control_frame, ControlFrame};
pub use registry::{Direction, SessionRegistry};
