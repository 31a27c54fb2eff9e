//! Network-idle detection for page loads.
//!
//! A page counts as settled once no request has been in flight for a quiet
//! window. Pages that never go quiet (long polling, sockets) are cut off at
//! a hard limit.

use std::collections::HashSet;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;

/// A request starting or ending, keyed by its request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkActivity {
    Started(String),
    Finished(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idle {
    Reached,
    TimedOut,
}

/// Consume `activity` until nothing has been in flight for `quiet`, or
/// `limit` has passed.
///
/// A redirect re-announces the same id, so ids are tracked as a set. A
/// finish for an unknown id only restarts the quiet window.
pub async fn wait_for_network_idle<S>(mut activity: S, quiet: Duration, limit: Duration) -> Idle
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let deadline = Instant::now() + limit;
    let mut in_flight: HashSet<String> = HashSet::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Idle::TimedOut;
        }
        let left = deadline - now;
        let wait = if in_flight.is_empty() { quiet.min(left) } else { left };

        match tokio::time::timeout(wait, activity.next()).await {
            Err(_) if in_flight.is_empty() && Instant::now() < deadline => return Idle::Reached,
            Err(_) => return Idle::TimedOut,
            Ok(Some(NetworkActivity::Started(id))) => {
                in_flight.insert(id);
            }
            Ok(Some(NetworkActivity::Finished(id))) => {
                in_flight.remove(&id);
            }
            // The page is gone; nothing more will arrive.
            Ok(None) if in_flight.is_empty() => return Idle::Reached,
            Ok(None) => return Idle::TimedOut,
        }
    }
}
