//! Live-Query Observer Registry (spec §4.4): driver classification,
//! activity-derived performance rating, and capacity eviction.

mod classify;
mod performance;
mod registry;

pub use classify::{classify_driver, HandleIntrospection};
pub use performance::rate as rate_performance;
pub use registry::{LiveQueryRegistry, UpdateKind, MAX_OBSERVERS};
