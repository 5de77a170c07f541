//! Ingestion Pipeline (spec §3, §4.1): multi-stream batching, sampling
//! and HTTP shipping with retry-and-backoff for the SkySignal agent.

mod batch;
mod client;
mod counters;
mod serializer;

pub use client::IngestionClient;
pub use counters::{CounterSnapshot, IngestionCounters};
pub use serializer::{serialize_envelope, to_value, DynValue, CIRCULAR_TOKEN};
