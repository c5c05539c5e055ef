//! Default knobs for the node binary.

use std::time::Duration;

/// Worker threads for the runtime when the config does not set one.
pub(crate) const DEFAULT_THREAD_COUNT: u8 = 4;

/// Receipt poll cadence when the config does not set one.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
