// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// Cooperative self-throttle driven by the quota a provider reports on each response.
///
/// Discogs reports the requests left in the current window. When that number falls
/// below `floor`, the next request waits out `cooldown` before it is issued. Requests
/// are serialized through the permit so concurrent callers never race on the counter.
#[derive(Debug, Clone)]
pub struct QuotaThrottle {
    state: Arc<Mutex<QuotaState>>,
    floor: u32,
    cooldown: Duration,
}

#[derive(Debug, Default)]
struct QuotaState {
    remaining: Option<u32>,
}

/// Exclusive right to issue one request. Dropping it without recording keeps the old count.
#[derive(Debug)]
pub struct QuotaPermit<'a> {
    guard: MutexGuard<'a, QuotaState>,
}

impl QuotaThrottle {
    pub fn new(floor: u32, cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QuotaState::default())),
            floor,
            cooldown,
        }
    }

    /// Discogs defaults: cool down for 90 seconds once fewer than 2 requests remain.
    pub fn discogs_default() -> Self {
        Self::new(2, Duration::from_secs(90))
    }

    /// Wait for the quota lock, sitting out the cooldown first if the last response was low.
    pub async fn acquire(&self) -> QuotaPermit<'_> {
        let mut guard = self.state.lock().await;

        if let Some(remaining) = guard.remaining {
            if remaining < self.floor {
                info!(
                    target: "discogs",
                    remaining,
                    floor = self.floor,
                    "quota nearly exhausted: cooling down for {:?}",
                    self.cooldown
                );
                sleep(self.cooldown).await;
                guard.remaining = None;
            }
        }

        QuotaPermit { guard }
    }

    /// Last quota reported by the provider, if any response has carried one since the last cooldown.
    pub async fn remaining(&self) -> Option<u32> {
        self.state.lock().await.remaining
    }
}

impl QuotaPermit<'_> {
    /// Store the quota reported by the response this permit was used for.
    pub fn record(mut self, remaining: Option<u32>) {
        if let Some(remaining) = remaining {
            debug!(target: "discogs", remaining, "quota updated");
            self.guard.remaining = Some(remaining);
        }
    }
}
