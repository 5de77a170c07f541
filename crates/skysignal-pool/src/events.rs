//! Connection pool event stream (spec §4.3).

use skysignal_types::pool::PoolConfig;

/// One event emitted by the host's connection pool. `PoolObserver::handle`
/// folds these into [`crate::state::PoolState`].
#[derive(Debug, Clone)]
pub enum PoolEvent {
    PoolCreated { config: PoolConfig },
    ConnectionCreated { id: String, address: String },
    ConnectionClosed { id: String },
    CheckOutStarted { address: String },
    CheckedOut { id: String, address: String },
    CheckOutFailed { address: String, reason: String },
    CheckedIn { id: String },
}
