//! Default knobs for chain access.

use std::time::Duration;

/// Default number of retries for transient RPC failures.
pub const DEFAULT_MAX_RETRY_COUNT: usize = 3;

/// Default pause between retries of a transient RPC failure.
pub const DEFAULT_BACKOFF_PERIOD: Duration = Duration::from_secs(1);

/// Default pause between successive receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
