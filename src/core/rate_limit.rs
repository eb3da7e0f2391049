//! Fixed-window connect rate limiting keyed by client IP

use super::error::RequestError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Limits how many WebSocket upgrades one address may attempt per window
pub struct ConnectRateLimiter {
    max_per_window: u32,
    window: Duration,
    entries: Mutex<HashMap<IpAddr, Window>>,
}

impl ConnectRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Count one attempt from `ip`, rejecting it if the window is exhausted
    pub async fn check(&self, ip: IpAddr) -> Result<(), RequestError> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), RequestError> {
        let mut entries = self.entries.lock().await;

        // Prune expired windows once the map gets large
        if entries.len() > 1024 {
            let window = self.window;
            entries.retain(|_, w| now.duration_since(w.started) <= window);
        }

        let entry = entries.entry(ip).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) > self.window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= self.max_per_window {
            let remaining = self
                .window
                .saturating_sub(now.duration_since(entry.started));
            return Err(RequestError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        entry.count += 1;
        Ok(())
    }
}
