//! Pool Observer (spec §4.3): connection-pool event consumption,
//! checkout-latency tracking and periodic `mongoPoolMetrics` snapshots.

mod bootstrap;
mod events;
mod observer;
mod state;

pub use bootstrap::parse_pool_config;
pub use events::PoolEvent;
pub use observer::PoolObserver;
pub use state::{PoolState, CHECKOUT_LATENCY_RING_SIZE, MAX_CHECKOUT_QUEUE_SIZE};
