//! System Sampler (spec §4.7): periodic CPU/memory/disk/network/process
//! sampling plus an event-loop-lag measurement, emitted on the
//! `systemMetrics` stream.

mod jobs;
mod sampler;

pub use jobs::JobCollector;
pub use sampler::SystemSampler;
