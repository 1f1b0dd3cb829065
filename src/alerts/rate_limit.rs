use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter keyed by recipient address.
///
/// A recipient over the cap is excluded from the current delivery attempt
/// and reported as rate limited, never treated as a delivery failure.
pub struct RecipientRateLimiter {
    window: Duration,
    max_per_window: u32,
    sends: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RecipientRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            window,
            max_per_window,
            sends: Mutex::new(HashMap::new()),
        }
    }

    /// Records a send for `recipient` if they are under the cap. Returns
    /// false when the recipient is currently rate limited.
    pub fn try_acquire(&self, recipient: &str) -> bool {
        let now = Instant::now();
        let mut sends = self.sends.lock().expect("rate limiter mutex poisoned");
        let timestamps = sends.entry(recipient.to_string()).or_default();

        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() as u32 >= self.max_per_window {
            return false;
        }

        timestamps.push_back(now);
        true
    }
}
