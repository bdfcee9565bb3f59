//! Process-wide HTTP transport shared by every webhook client

use crate::error::Result;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Idle connections kept per host; local receivers see bursts of events
pub const MAX_IDLE_PER_HOST: usize = 100;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// The shared client. Clones share one connection pool.
pub fn shared_client() -> Result<reqwest::Client> {
    if let Some(client) = SHARED_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .build()?;
    debug!("Initialized shared webhook HTTP transport");
    Ok(SHARED_CLIENT.get_or_init(|| client).clone())
}
